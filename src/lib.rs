//! # Push Directory Storage
//!
//! Persistence for a push-notification directory: delivery points, push
//! service providers, and the indices relating them to services and
//! subscribers, kept on a key-value store that only offers single-key
//! atomic operations.
//!
//! ## Core Concepts
//!
//! - **Entities**: delivery points and providers, stored whole by name
//! - **Subscriptions**: per (service, subscriber) sets of delivery points,
//!   with a reference counter per delivery point that deletes it once no
//!   subscriber uses it
//! - **Assignments**: which provider serves a delivery point in a service,
//!   and which providers a service may use
//! - **Maintenance**: flush to durable media, counter reconciliation
//!
//! ## Example
//!
//! ```ignore
//! use pushdb::{DatabaseConfig, DeliveryPoint, PushDatabase};
//!
//! let db = PushDatabase::open(&DatabaseConfig::default().host("cache-1"))?;
//!
//! db.entities().set_delivery_point(&DeliveryPoint::new("iphone-1", "apns"))?;
//! db.subscriptions().add_association("app1", "alice", "iphone-1")?;
//! db.assignments().set_assigned_psp("app1", "iphone-1", "apns-cred-1")?;
//!
//! // Dropping the last subscriber deletes the delivery point
//! db.subscriptions().remove_association("app1", "alice", "iphone-1")?;
//! assert!(db.entities().get_delivery_point("iphone-1")?.is_none());
//! ```

pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod index;
pub mod keys;
pub mod kv;
pub mod maintenance;
pub mod repository;
pub mod types;

// Re-exports
pub use codec::{DecodeError, EntityCodec, JsonCodec, MsgPackCodec};
pub use config::{open_store, DatabaseConfig, Engine};
pub use database::PushDatabase;
pub use error::{PushDbError, Result, StoreFault, StoreResult};
pub use index::{AssignmentIndex, SubscriptionIndex};
pub use kv::{GlobPattern, KvStore, MemoryStore, RedisSettings, RedisStore};
pub use maintenance::{CounterCorrection, Maintenance, ReconcileReport};
pub use repository::EntityRepository;
pub use types::*;
