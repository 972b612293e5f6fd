//! Database configuration and adapter construction.

use crate::error::{PushDbError, Result};
use crate::kv::{KvStore, MemoryStore, RedisSettings, RedisStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 6379;
const DEFAULT_DB_NAME: &str = "0";

/// Supported backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Engine {
    /// Networked backend spoken to over RESP.
    Redis,
    /// In-process store, optionally snapshotted to `snapshot_path`.
    Memory,
}

impl Engine {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Engine::Redis),
            "memory" => Ok(Engine::Memory),
            "" => Err(PushDbError::ConfigInvalid("no database engine given".into())),
            other => Err(PushDbError::ConfigInvalid(format!(
                "unsupported database engine {other:?}"
            ))),
        }
    }
}

/// Connection parameters for the backing store.
///
/// Empty or zero fields fall back to defaults: host `localhost`, port
/// `6379`, database `"0"`. A database name that is not a number selects
/// database 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub password: Option<String>,
    /// Snapshot file for the memory engine.
    pub snapshot_path: Option<PathBuf>,
    pub connect_timeout_ms: u64,
    /// Socket read/write timeout; 0 blocks indefinitely.
    pub io_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: "redis".to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            name: DEFAULT_DB_NAME.to_string(),
            password: None,
            snapshot_path: None,
            connect_timeout_ms: 5_000,
            io_timeout_ms: 0,
        }
    }
}

impl DatabaseConfig {
    /// In-memory engine without durable backing.
    pub fn memory() -> Self {
        Self {
            engine: "memory".to_string(),
            ..Default::default()
        }
    }

    /// In-memory engine persisted to `path` on flush.
    pub fn memory_at(path: impl Into<PathBuf>) -> Self {
        Self {
            engine: "memory".to_string(),
            snapshot_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Parse from JSON; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PushDbError::ConfigInvalid(format!("malformed config: {e}")))
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Database index selected on connect.
    pub fn database_index(&self) -> i64 {
        let name = self.name.trim();
        if name.is_empty() {
            return 0;
        }
        name.parse().unwrap_or(0)
    }

    /// Check the parameters and resolve the backend to use.
    pub fn engine(&self) -> Result<Engine> {
        let engine = Engine::parse(&self.engine)?;
        match engine {
            Engine::Redis => {
                if self.snapshot_path.is_some() {
                    return Err(PushDbError::ConfigInvalid(
                        "snapshot_path only applies to the memory engine".into(),
                    ));
                }
                if self.host.contains(char::is_whitespace) {
                    return Err(PushDbError::ConfigInvalid(format!(
                        "invalid host {:?}",
                        self.host
                    )));
                }
                if self.database_index() < 0 {
                    return Err(PushDbError::ConfigInvalid(format!(
                        "negative database index {:?}",
                        self.name
                    )));
                }
            }
            Engine::Memory => {}
        }
        Ok(engine)
    }

    /// Settings for the RESP adapter, with defaults applied.
    pub fn redis_settings(&self) -> RedisSettings {
        let host = self.host.trim();
        RedisSettings {
            host: if host.is_empty() { DEFAULT_HOST } else { host }.to_string(),
            port: if self.port == 0 { DEFAULT_PORT } else { self.port },
            password: self.password.clone().filter(|p| !p.is_empty()),
            database: self.database_index(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms.max(1)),
            io_timeout: (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms)),
        }
    }
}

/// Build the store adapter described by `config`.
///
/// The RESP adapter connects lazily, so an unreachable backend shows up on
/// the first operation rather than here.
pub fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn KvStore>> {
    match config.engine()? {
        Engine::Redis => {
            let settings = config.redis_settings();
            debug!(host = %settings.host, port = settings.port, db = settings.database, "using redis engine");
            Ok(Arc::new(RedisStore::new(settings)))
        }
        Engine::Memory => match &config.snapshot_path {
            Some(path) => {
                debug!(path = %path.display(), "using memory engine with snapshots");
                Ok(Arc::new(MemoryStore::open(path)?))
            }
            None => {
                debug!("using memory engine");
                Ok(Arc::new(MemoryStore::new()))
            }
        },
    }
}
