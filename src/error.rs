//! Error types for the push directory.

use crate::types::EntityKind;
use std::fmt;
use std::io;
use thiserror::Error;

/// Main error type for directory operations.
#[derive(Debug, Error)]
pub enum PushDbError {
    #[error("Invalid database config: {0}")]
    ConfigInvalid(String),

    #[error("{op} failed on {keys}: store unavailable: {source}")]
    StoreUnavailable {
        op: &'static str,
        keys: String,
        #[source]
        source: io::Error,
    },

    #[error("{op} failed on {keys}: {detail}")]
    StoreProtocol {
        op: &'static str,
        keys: String,
        detail: String,
    },

    #[error("Cannot decode {kind} {name:?}: {reason}")]
    DecodeFailure {
        kind: EntityKind,
        name: String,
        reason: String,
    },

    #[error("Invalid {field} identifier {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Snapshot is locked by another process")]
    Locked,
}

impl PushDbError {
    /// Whether this error came from the backing store rather than from the caller's input.
    pub fn is_store_fault(&self) -> bool {
        matches!(
            self,
            PushDbError::StoreUnavailable { .. } | PushDbError::StoreProtocol { .. }
        )
    }
}

impl From<serde_json::Error> for PushDbError {
    fn from(e: serde_json::Error) -> Self {
        PushDbError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for PushDbError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        PushDbError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for PushDbError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        PushDbError::Deserialization(e.to_string())
    }
}

/// Result type for directory operations.
pub type Result<T> = std::result::Result<T, PushDbError>;

/// Raw fault reported by a [`KvStore`](crate::kv::KvStore) implementation.
///
/// Carries no operation context; callers attach it with [`StoreFault::context`].
#[derive(Debug)]
pub enum StoreFault {
    /// Transport-level failure: the backend could not be reached or the connection broke.
    Unavailable(io::Error),
    /// The backend answered, but with an error or an unexpected reply.
    Protocol(String),
}

impl StoreFault {
    pub fn protocol(detail: impl Into<String>) -> Self {
        StoreFault::Protocol(detail.into())
    }

    /// Attach the directory operation and the key(s) it touched.
    pub fn context(self, op: &'static str, keys: impl fmt::Display) -> PushDbError {
        let keys = keys.to_string();
        match self {
            StoreFault::Unavailable(source) => PushDbError::StoreUnavailable { op, keys, source },
            StoreFault::Protocol(detail) => PushDbError::StoreProtocol { op, keys, detail },
        }
    }
}

impl fmt::Display for StoreFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreFault::Unavailable(e) => write!(f, "unavailable: {e}"),
            StoreFault::Protocol(detail) => write!(f, "protocol: {detail}"),
        }
    }
}

impl std::error::Error for StoreFault {}

impl From<io::Error> for StoreFault {
    fn from(e: io::Error) -> Self {
        StoreFault::Unavailable(e)
    }
}

/// Result type for raw store primitives.
pub type StoreResult<T> = std::result::Result<T, StoreFault>;
