//! Entity payload encoding.
//!
//! The repository never interprets payload bytes itself; it hands them to an
//! injected [`EntityCodec`]. Two codecs ship with the crate: JSON (the
//! default, readable with any client) and MessagePack.

use crate::error::{PushDbError, Result};
use crate::types::{DeliveryPoint, PushServiceProvider};
use thiserror::Error;

/// Payload bytes could not be turned into an entity.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

/// Converts entities to and from stored bytes.
pub trait EntityCodec: Send + Sync {
    fn encode_delivery_point(&self, dp: &DeliveryPoint) -> Result<Vec<u8>>;

    fn decode_delivery_point(&self, bytes: &[u8]) -> std::result::Result<DeliveryPoint, DecodeError>;

    fn encode_push_service_provider(&self, psp: &PushServiceProvider) -> Result<Vec<u8>>;

    fn decode_push_service_provider(
        &self,
        bytes: &[u8],
    ) -> std::result::Result<PushServiceProvider, DecodeError>;
}

/// JSON payloads via `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl EntityCodec for JsonCodec {
    fn encode_delivery_point(&self, dp: &DeliveryPoint) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(dp)?)
    }

    fn decode_delivery_point(&self, bytes: &[u8]) -> std::result::Result<DeliveryPoint, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError(e.to_string()))
    }

    fn encode_push_service_provider(&self, psp: &PushServiceProvider) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(psp)?)
    }

    fn decode_push_service_provider(
        &self,
        bytes: &[u8],
    ) -> std::result::Result<PushServiceProvider, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError(e.to_string()))
    }
}

/// Compact MessagePack payloads via `rmp-serde`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MsgPackCodec;

impl EntityCodec for MsgPackCodec {
    fn encode_delivery_point(&self, dp: &DeliveryPoint) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(dp).map_err(PushDbError::from)
    }

    fn decode_delivery_point(&self, bytes: &[u8]) -> std::result::Result<DeliveryPoint, DecodeError> {
        rmp_serde::from_slice(bytes).map_err(|e| DecodeError(e.to_string()))
    }

    fn encode_push_service_provider(&self, psp: &PushServiceProvider) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(psp).map_err(PushDbError::from)
    }

    fn decode_push_service_provider(
        &self,
        bytes: &[u8],
    ) -> std::result::Result<PushServiceProvider, DecodeError> {
        rmp_serde::from_slice(bytes).map_err(|e| DecodeError(e.to_string()))
    }
}
