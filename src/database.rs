//! PushDatabase tying all components to one shared store.

use crate::codec::{EntityCodec, JsonCodec};
use crate::config::{open_store, DatabaseConfig};
use crate::error::Result;
use crate::index::{AssignmentIndex, SubscriptionIndex};
use crate::kv::KvStore;
use crate::maintenance::Maintenance;
use crate::repository::EntityRepository;
use std::sync::Arc;

/// The directory's persistence layer.
///
/// Every component holds the same store handle and nothing else; they do
/// not call one another. Cloning is cheap and clones share the store.
#[derive(Clone)]
pub struct PushDatabase {
    store: Arc<dyn KvStore>,
    entities: EntityRepository,
    subscriptions: SubscriptionIndex,
    assignments: AssignmentIndex,
    maintenance: Maintenance,
}

impl PushDatabase {
    /// Open the configured backend with the JSON codec.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        Self::open_with_codec(config, Arc::new(JsonCodec))
    }

    pub fn open_with_codec(config: &DatabaseConfig, codec: Arc<dyn EntityCodec>) -> Result<Self> {
        let store = open_store(config)?;
        Ok(Self::with_store(store, codec))
    }

    /// Build on an existing store handle (a test double, a shared adapter, ...).
    pub fn with_store(store: Arc<dyn KvStore>, codec: Arc<dyn EntityCodec>) -> Self {
        Self {
            entities: EntityRepository::new(Arc::clone(&store), codec),
            subscriptions: SubscriptionIndex::new(Arc::clone(&store)),
            assignments: AssignmentIndex::new(Arc::clone(&store)),
            maintenance: Maintenance::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn entities(&self) -> &EntityRepository {
        &self.entities
    }

    pub fn subscriptions(&self) -> &SubscriptionIndex {
        &self.subscriptions
    }

    pub fn assignments(&self) -> &AssignmentIndex {
        &self.assignments
    }

    pub fn maintenance(&self) -> &Maintenance {
        &self.maintenance
    }

    /// The raw store, for diagnostics.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Shorthand for `maintenance().flush()`.
    pub fn flush(&self) -> Result<()> {
        self.maintenance.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryPoint;

    #[test]
    fn test_components_share_store() {
        let db = PushDatabase::open(&DatabaseConfig::memory()).unwrap();

        db.entities()
            .set_delivery_point(&DeliveryPoint::new("d1", "apns"))
            .unwrap();
        db.subscriptions().add_association("app1", "alice", "d1").unwrap();
        db.assignments().set_assigned_psp("app1", "d1", "apns-cred").unwrap();

        assert!(db.store().get("delivery.point:d1").unwrap().is_some());
        assert_eq!(db.subscriptions().delivery_point_refcount("d1").unwrap(), Some(1));

        let clone = db.clone();
        clone.subscriptions().remove_association("app1", "alice", "d1").unwrap();
        assert!(db.entities().get_delivery_point("d1").unwrap().is_none());

        db.flush().unwrap();
    }
}
