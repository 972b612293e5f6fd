//! Primitive store adapters.
//!
//! Everything above this module talks to the backend through [`KvStore`],
//! which exposes only single-key atomic primitives. Two adapters exist:
//! - [`RedisStore`]: a blocking RESP2 client for a networked backend
//! - [`MemoryStore`]: an in-process store with the same semantics, persisted
//!   to a snapshot file on [`KvStore::save`]
//!
//! Adapters report raw [`StoreFault`](crate::error::StoreFault)s; the
//! components attach the operation name and keys.

mod memory;
mod pattern;
mod redis;
mod resp;

pub use memory::MemoryStore;
pub use pattern::GlobPattern;
pub use redis::{RedisSettings, RedisStore};

use crate::error::StoreResult;

/// Atomic single-key operations offered by the backing store.
///
/// No method spans more than one key atomically except `mget`, which is a
/// consistent read only as far as the backend guarantees it.
pub trait KvStore: Send + Sync {
    /// Read a string value. `None` when the key is absent.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Read many string values, in input order; `None` for absent keys.
    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    /// Overwrite a string value.
    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete a key of any type. Returns whether it existed.
    fn del(&self, key: &str) -> StoreResult<bool>;

    /// Increment an integer value (absent counts as 0), returning the new value.
    fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Decrement an integer value (absent counts as 0), returning the new value.
    fn decr(&self, key: &str) -> StoreResult<i64>;

    /// Add a member to a set. Returns whether it was newly inserted.
    fn sadd(&self, key: &str, member: &[u8]) -> StoreResult<bool>;

    /// Remove a member from a set. Returns whether it was present.
    fn srem(&self, key: &str, member: &[u8]) -> StoreResult<bool>;

    /// All members of a set; empty when the key is absent.
    fn smembers(&self, key: &str) -> StoreResult<Vec<Vec<u8>>>;

    /// Keys matching a glob pattern.
    fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Synchronously persist in-memory state to durable media.
    fn save(&self) -> StoreResult<()>;
}
