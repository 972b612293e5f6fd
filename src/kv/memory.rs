//! In-process key-value store with snapshot persistence.

use super::pattern::GlobPattern;
use super::KvStore;
use crate::error::{PushDbError, Result, StoreFault, StoreResult};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Magic bytes for snapshot files.
const SNAPSHOT_MAGIC: &[u8; 4] = b"PKV\0";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u8 = 1;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

const NOT_AN_INTEGER: &str = "ERR value is not an integer or out of range";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum Value {
    Bytes(Vec<u8>),
    Set(BTreeSet<Vec<u8>>),
}

/// Where snapshots go, plus the lock that keeps other processes out.
struct SnapshotFile {
    path: PathBuf,
    _lock_file: File,
}

/// Key-value store kept entirely in memory.
///
/// Follows the backend's semantics: values are either strings or sets,
/// operating on the wrong kind is a protocol error, and a set that loses its
/// last member disappears.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Value>>,
    snapshot: Option<SnapshotFile>,
}

impl MemoryStore {
    /// Create an empty store with no durable backing; `save` is a no-op.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            snapshot: None,
        }
    }

    /// Open a store persisted at `path`, loading the existing snapshot if any.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = Self::acquire_lock(&path)?;

        let data = if path.exists() {
            Self::load_snapshot(&path)?
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), keys = data.len(), "opened memory store");

        Ok(Self {
            data: RwLock::new(data),
            snapshot: Some(SnapshotFile {
                path,
                _lock_file: lock_file,
            }),
        })
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let mut lock_path = path.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_file = File::create(PathBuf::from(lock_path))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| PushDbError::Locked)?;

        Ok(lock_file)
    }

    fn add_to_counter(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut data = self.data.write();
        let current = match data.get(key) {
            None => 0,
            Some(Value::Bytes(bytes)) => parse_integer(bytes)?,
            Some(Value::Set(_)) => return Err(StoreFault::protocol(WRONGTYPE)),
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreFault::protocol(NOT_AN_INTEGER))?;
        data.insert(key.to_string(), Value::Bytes(next.to_string().into_bytes()));
        Ok(next)
    }

    fn write_snapshot(&self, path: &Path) -> StoreResult<()> {
        let encoded = {
            let data = self.data.read();
            rmp_serde::to_vec(&*data)
                .map_err(|e| StoreFault::protocol(format!("snapshot encode: {e}")))?
        };

        let mut tmp_path = path.as_os_str().to_owned();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        // Write header
        file.write_all(SNAPSHOT_MAGIC)?;
        file.write_all(&[SNAPSHOT_VERSION])?;

        // Write body
        file.write_all(&(encoded.len() as u64).to_le_bytes())?;
        file.write_all(&encoded)?;

        // Write checksum
        let checksum = crc32fast::hash(&encoded);
        file.write_all(&checksum.to_le_bytes())?;

        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)?;
        info!(path = %path.display(), bytes = encoded.len(), "snapshot written");
        Ok(())
    }

    fn load_snapshot(path: &Path) -> Result<HashMap<String, Value>> {
        let mut file = File::open(path)?;

        // Read and verify magic
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(PushDbError::InvalidFormat("Invalid snapshot magic".into()));
        }

        // Read version
        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != SNAPSHOT_VERSION {
            return Err(PushDbError::InvalidFormat(format!(
                "Unsupported snapshot version: {}",
                version[0]
            )));
        }

        // Read body
        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);

        // Header plus checksum trailer
        let available = file.metadata()?.len().saturating_sub(17);
        if len > available {
            return Err(PushDbError::InvalidFormat(format!(
                "Snapshot body length {len} exceeds the {available} bytes present"
            )));
        }

        let mut encoded = vec![0u8; len as usize];
        file.read_exact(&mut encoded)?;

        // Read and verify checksum
        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&encoded);

        if stored_checksum != computed_checksum {
            return Err(PushDbError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(rmp_serde::from_slice(&encoded)?)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_integer(bytes: &[u8]) -> StoreResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| StoreFault::protocol(NOT_AN_INTEGER))
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.data.read().get(key) {
            None => Ok(None),
            Some(Value::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(Value::Set(_)) => Err(StoreFault::protocol(WRONGTYPE)),
        }
    }

    fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let data = self.data.read();
        Ok(keys
            .iter()
            .map(|key| match data.get(key) {
                Some(Value::Bytes(bytes)) => Some(bytes.clone()),
                _ => None,
            })
            .collect())
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.data
            .write()
            .insert(key.to_string(), Value::Bytes(value.to_vec()));
        Ok(())
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn incr(&self, key: &str) -> StoreResult<i64> {
        self.add_to_counter(key, 1)
    }

    fn decr(&self, key: &str) -> StoreResult<i64> {
        self.add_to_counter(key, -1)
    }

    fn sadd(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        let mut data = self.data.write();
        match data
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(BTreeSet::new()))
        {
            Value::Set(members) => Ok(members.insert(member.to_vec())),
            Value::Bytes(_) => Err(StoreFault::protocol(WRONGTYPE)),
        }
    }

    fn srem(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        let mut data = self.data.write();
        let (removed, now_empty) = match data.get_mut(key) {
            None => return Ok(false),
            Some(Value::Bytes(_)) => return Err(StoreFault::protocol(WRONGTYPE)),
            Some(Value::Set(members)) => (members.remove(member), members.is_empty()),
        };
        if now_empty {
            data.remove(key);
        }
        Ok(removed)
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        match self.data.read().get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(Value::Bytes(_)) => Err(StoreFault::protocol(WRONGTYPE)),
        }
    }

    fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let glob = GlobPattern::new(pattern)?;
        let mut keys: Vec<String> = self
            .data
            .read()
            .keys()
            .filter(|key| glob.matches(key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn save(&self) -> StoreResult<()> {
        match &self.snapshot {
            Some(snapshot) => self.write_snapshot(&snapshot.path),
            None => Ok(()),
        }
    }
}
