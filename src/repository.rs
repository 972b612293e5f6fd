//! Whole-entity storage for delivery points and push service providers.

use crate::codec::EntityCodec;
use crate::error::{PushDbError, Result};
use crate::keys;
use crate::kv::KvStore;
use crate::types::{DeliveryPoint, EntityKind, PushServiceProvider};
use std::sync::Arc;
use tracing::debug;

/// Stores and loads entities by name under their fixed key prefixes.
#[derive(Clone)]
pub struct EntityRepository {
    store: Arc<dyn KvStore>,
    codec: Arc<dyn EntityCodec>,
}

impl EntityRepository {
    pub fn new(store: Arc<dyn KvStore>, codec: Arc<dyn EntityCodec>) -> Self {
        Self { store, codec }
    }

    // --- Delivery points ---

    /// Load a delivery point. Absent (or empty) values are `Ok(None)`.
    pub fn get_delivery_point(&self, name: &str) -> Result<Option<DeliveryPoint>> {
        let key = keys::delivery_point(name);
        let bytes = self
            .store
            .get(&key)
            .map_err(|e| e.context("get_delivery_point", &key))?;

        match bytes {
            Some(bytes) if !bytes.is_empty() => {
                let dp = self.codec.decode_delivery_point(&bytes).map_err(|e| {
                    decode_failure(EntityKind::DeliveryPoint, name, e.to_string())
                })?;
                check_name(EntityKind::DeliveryPoint, name, &dp.name)?;
                Ok(Some(dp))
            }
            _ => Ok(None),
        }
    }

    pub fn set_delivery_point(&self, dp: &DeliveryPoint) -> Result<()> {
        keys::validate_name("delivery point", &dp.name)?;
        let key = keys::delivery_point(&dp.name);
        let bytes = self.codec.encode_delivery_point(dp)?;

        self.store
            .set(&key, &bytes)
            .map_err(|e| e.context("set_delivery_point", &key))?;
        debug!(delivery_point = %dp.name, bytes = bytes.len(), "stored delivery point");
        Ok(())
    }

    /// Delete a delivery point record. Deleting an absent record is not an error.
    pub fn remove_delivery_point(&self, name: &str) -> Result<()> {
        let key = keys::delivery_point(name);
        let existed = self
            .store
            .del(&key)
            .map_err(|e| e.context("remove_delivery_point", &key))?;
        debug!(delivery_point = %name, existed, "removed delivery point");
        Ok(())
    }

    /// Raw payloads for many delivery points, in input order; `None` where absent.
    pub fn multi_get_delivery_points(&self, names: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = names.iter().map(|n| keys::delivery_point(n)).collect();

        let values = self
            .store
            .mget(&keys)
            .map_err(|e| e.context("multi_get_delivery_points", keys.join(",")))?;
        Ok(values
            .into_iter()
            .map(|v| v.filter(|bytes| !bytes.is_empty()))
            .collect())
    }

    // --- Push service providers ---

    /// Load a push service provider. Absent (or empty) values are `Ok(None)`.
    pub fn get_push_service_provider(&self, name: &str) -> Result<Option<PushServiceProvider>> {
        let key = keys::push_service_provider(name);
        let bytes = self
            .store
            .get(&key)
            .map_err(|e| e.context("get_push_service_provider", &key))?;

        match bytes {
            Some(bytes) if !bytes.is_empty() => {
                let psp = self.codec.decode_push_service_provider(&bytes).map_err(|e| {
                    decode_failure(EntityKind::PushServiceProvider, name, e.to_string())
                })?;
                check_name(EntityKind::PushServiceProvider, name, &psp.name)?;
                Ok(Some(psp))
            }
            _ => Ok(None),
        }
    }

    pub fn set_push_service_provider(&self, psp: &PushServiceProvider) -> Result<()> {
        keys::validate_name("push service provider", &psp.name)?;
        let key = keys::push_service_provider(&psp.name);
        let bytes = self.codec.encode_push_service_provider(psp)?;

        self.store
            .set(&key, &bytes)
            .map_err(|e| e.context("set_push_service_provider", &key))?;
        debug!(psp = %psp.name, bytes = bytes.len(), "stored push service provider");
        Ok(())
    }

    pub fn remove_push_service_provider(&self, name: &str) -> Result<()> {
        let key = keys::push_service_provider(name);
        let existed = self
            .store
            .del(&key)
            .map_err(|e| e.context("remove_push_service_provider", &key))?;
        debug!(psp = %name, existed, "removed push service provider");
        Ok(())
    }
}

fn decode_failure(kind: EntityKind, name: &str, reason: String) -> PushDbError {
    PushDbError::DecodeFailure {
        kind,
        name: name.to_string(),
        reason,
    }
}

/// A payload stored under one name but describing another is corrupt.
fn check_name(kind: EntityKind, expected: &str, found: &str) -> Result<()> {
    if expected != found {
        return Err(decode_failure(
            kind,
            expected,
            format!("payload names {found:?}"),
        ));
    }
    Ok(())
}
