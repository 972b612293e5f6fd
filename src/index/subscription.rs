//! Subscriber -> delivery point sets and delivery point reference counts.
//!
//! The membership set is authoritative for whether an association exists.
//! The counter is a cache of how many sets (across every service) hold a
//! delivery point, and exists only to decide when the delivery point record
//! can be deleted. Each step below is one atomic store call; nothing is
//! rolled back when a later step fails.

use crate::error::{Result, StoreFault};
use crate::keys;
use crate::kv::KvStore;
use crate::types::{AssociationAdded, AssociationRemoved};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maintains `srv.sub-2-dp:*` sets and `delivery.point.counter:*` counters.
#[derive(Clone)]
pub struct SubscriptionIndex {
    store: Arc<dyn KvStore>,
}

impl SubscriptionIndex {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Delivery point names per subscriber.
    ///
    /// Either argument may contain `*`, in which case every matching
    /// subscriber set is read and grouped by its subscriber component.
    /// Subscribers with no delivery points are omitted.
    pub fn list_delivery_point_names(
        &self,
        service: &str,
        subscriber: &str,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        const OP: &str = "list_delivery_point_names";
        keys::validate_pattern("service", service)?;
        keys::validate_pattern("subscriber", subscriber)?;

        let key = keys::subscriber_delivery_points(service, subscriber);
        let set_keys = if keys::has_wildcard(service) || keys::has_wildcard(subscriber) {
            self.store.keys(&key).map_err(|e| e.context(OP, &key))?
        } else {
            vec![key]
        };

        let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for set_key in &set_keys {
            let members = self
                .store
                .smembers(set_key)
                .map_err(|e| e.context(OP, set_key))?;
            if members.is_empty() {
                continue;
            }

            let Some((_, sub)) = keys::parse_subscriber_key(set_key) else {
                warn!(key = %set_key, "skipping subscriber key that does not parse");
                continue;
            };

            result
                .entry(sub.to_string())
                .or_default()
                .extend(members.into_iter().map(member_to_string));
        }

        Ok(result)
    }

    /// Subscribe `subscriber` of `service` to `delivery_point`.
    ///
    /// Re-adding an existing association changes nothing. If the counter
    /// increment fails after the set insert succeeded, the error is returned
    /// and the counter under-counts until reconciled.
    pub fn add_association(
        &self,
        service: &str,
        subscriber: &str,
        delivery_point: &str,
    ) -> Result<AssociationAdded> {
        const OP: &str = "add_association";
        keys::validate("service", service)?;
        keys::validate("subscriber", subscriber)?;
        keys::validate_name("delivery point", delivery_point)?;

        let set_key = keys::subscriber_delivery_points(service, subscriber);
        let added = self
            .store
            .sadd(&set_key, delivery_point.as_bytes())
            .map_err(|e| e.context(OP, &set_key))?;

        if !added {
            debug!(service, subscriber, delivery_point, "association already present");
            return Ok(AssociationAdded::AlreadyPresent);
        }

        let counter_key = keys::delivery_point_counter(delivery_point);
        let refcount = self.store.incr(&counter_key).map_err(|e| {
            warn!(
                service,
                subscriber,
                delivery_point,
                error = %e,
                "association stored but reference counter not incremented"
            );
            e.context(OP, &counter_key)
        })?;

        debug!(service, subscriber, delivery_point, refcount, "association added");
        Ok(AssociationAdded::Added { refcount })
    }

    /// Unsubscribe `subscriber` of `service` from `delivery_point`.
    ///
    /// Removing an association that does not exist changes nothing. When the
    /// last reference goes away the counter key and then the delivery point
    /// record are deleted.
    pub fn remove_association(
        &self,
        service: &str,
        subscriber: &str,
        delivery_point: &str,
    ) -> Result<AssociationRemoved> {
        const OP: &str = "remove_association";

        let set_key = keys::subscriber_delivery_points(service, subscriber);
        let removed = self
            .store
            .srem(&set_key, delivery_point.as_bytes())
            .map_err(|e| e.context(OP, &set_key))?;

        if !removed {
            debug!(service, subscriber, delivery_point, "association not present");
            return Ok(AssociationRemoved::NotPresent);
        }

        let counter_key = keys::delivery_point_counter(delivery_point);
        let remaining = self.store.decr(&counter_key).map_err(|e| {
            warn!(
                service,
                subscriber,
                delivery_point,
                error = %e,
                "association removed but reference counter not decremented"
            );
            e.context(OP, &counter_key)
        })?;

        if remaining > 0 {
            debug!(service, subscriber, delivery_point, refcount = remaining, "association removed");
            return Ok(AssociationRemoved::Removed { refcount: remaining });
        }
        if remaining < 0 {
            warn!(delivery_point, refcount = remaining, "reference counter went negative");
        }

        self.store
            .del(&counter_key)
            .map_err(|e| e.context(OP, &counter_key))?;

        let record_key = keys::delivery_point(delivery_point);
        self.store.del(&record_key).map_err(|e| {
            warn!(delivery_point, error = %e, "counter removed but delivery point record orphaned");
            e.context(OP, &record_key)
        })?;

        debug!(service, subscriber, delivery_point, "last association removed, delivery point deleted");
        Ok(AssociationRemoved::Cascaded)
    }

    /// Current reference count of a delivery point; `None` when no counter exists.
    pub fn delivery_point_refcount(&self, delivery_point: &str) -> Result<Option<i64>> {
        const OP: &str = "delivery_point_refcount";
        let key = keys::delivery_point_counter(delivery_point);

        let Some(bytes) = self.store.get(&key).map_err(|e| e.context(OP, &key))? else {
            return Ok(None);
        };
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(Some)
            .ok_or_else(|| StoreFault::protocol("counter value is not an integer").context(OP, &key))
    }
}

fn member_to_string(member: Vec<u8>) -> String {
    String::from_utf8(member).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PushDbError;
    use crate::kv::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, SubscriptionIndex) {
        let store = Arc::new(MemoryStore::new());
        let index = SubscriptionIndex::new(store.clone());
        (store, index)
    }

    #[test]
    fn test_add_increments_once() {
        let (_store, index) = setup();

        assert_eq!(
            index.add_association("app1", "alice", "iphone-1").unwrap(),
            AssociationAdded::Added { refcount: 1 }
        );
        assert_eq!(
            index.add_association("app1", "alice", "iphone-1").unwrap(),
            AssociationAdded::AlreadyPresent
        );
        assert_eq!(index.delivery_point_refcount("iphone-1").unwrap(), Some(1));
    }

    #[test]
    fn test_counter_spans_services() {
        let (_store, index) = setup();

        index.add_association("app1", "alice", "tablet").unwrap();
        index.add_association("app2", "alice", "tablet").unwrap();
        index.add_association("app2", "bob", "tablet").unwrap();
        assert_eq!(index.delivery_point_refcount("tablet").unwrap(), Some(3));

        index.remove_association("app2", "alice", "tablet").unwrap();
        assert_eq!(index.delivery_point_refcount("tablet").unwrap(), Some(2));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let (store, index) = setup();
        index.add_association("app1", "alice", "d1").unwrap();

        assert_eq!(
            index.remove_association("app1", "alice", "d2").unwrap(),
            AssociationRemoved::NotPresent
        );
        assert_eq!(
            index.remove_association("app1", "nobody", "d1").unwrap(),
            AssociationRemoved::NotPresent
        );
        assert_eq!(index.delivery_point_refcount("d1").unwrap(), Some(1));
        assert_eq!(index.delivery_point_refcount("d2").unwrap(), None);
        assert_eq!(store.smembers("srv.sub-2-dp:app1:alice").unwrap(), vec![b"d1".to_vec()]);
    }

    #[test]
    fn test_cascade_deletes_counter_and_record() {
        let (store, index) = setup();
        store.set("delivery.point:d1", b"{}").unwrap();

        index.add_association("app1", "alice", "d1").unwrap();
        assert_eq!(
            index.remove_association("app1", "alice", "d1").unwrap(),
            AssociationRemoved::Cascaded
        );

        assert_eq!(store.get("delivery.point.counter:d1").unwrap(), None);
        assert_eq!(store.get("delivery.point:d1").unwrap(), None);

        // Second removal finds nothing to do
        assert_eq!(
            index.remove_association("app1", "alice", "d1").unwrap(),
            AssociationRemoved::NotPresent
        );
    }

    #[test]
    fn test_cascade_on_drifted_counter() {
        let (store, index) = setup();
        store.set("delivery.point:d1", b"{}").unwrap();
        store.sadd("srv.sub-2-dp:app1:alice", b"d1").unwrap();

        // No counter was ever written; decrement lands at -1
        assert_eq!(
            index.remove_association("app1", "alice", "d1").unwrap(),
            AssociationRemoved::Cascaded
        );
        assert_eq!(store.get("delivery.point.counter:d1").unwrap(), None);
        assert_eq!(store.get("delivery.point:d1").unwrap(), None);
    }

    #[test]
    fn test_list_exact() {
        let (_store, index) = setup();
        index.add_association("app1", "alice", "d1").unwrap();
        index.add_association("app1", "alice", "d2").unwrap();
        index.add_association("app1", "bob", "d3").unwrap();

        let listed = index.list_delivery_point_names("app1", "alice").unwrap();
        assert_eq!(listed.len(), 1);
        let mut dps = listed["alice"].clone();
        dps.sort();
        assert_eq!(dps, vec!["d1", "d2"]);

        assert!(index.list_delivery_point_names("app1", "carol").unwrap().is_empty());
    }

    #[test]
    fn test_list_wildcard_groups_by_subscriber() {
        let (_store, index) = setup();
        index.add_association("app1", "alice", "d1").unwrap();
        index.add_association("app1", "alice", "d2").unwrap();
        index.add_association("app1", "bob", "d3").unwrap();
        index.add_association("app2", "carol", "d4").unwrap();

        let listed = index.list_delivery_point_names("app1", "*").unwrap();
        assert_eq!(listed.len(), 2);
        let mut alice = listed["alice"].clone();
        alice.sort();
        assert_eq!(alice, vec!["d1", "d2"]);
        assert_eq!(listed["bob"], vec!["d3"]);

        let everyone = index.list_delivery_point_names("*", "*").unwrap();
        assert_eq!(everyone.len(), 3);
        assert_eq!(everyone["carol"], vec!["d4"]);
    }

    #[test]
    fn test_list_wildcard_skips_emptied_sets() {
        let (_store, index) = setup();
        index.add_association("app1", "alice", "d1").unwrap();
        index.add_association("app1", "bob", "d2").unwrap();
        index.remove_association("app1", "bob", "d2").unwrap();

        let listed = index.list_delivery_point_names("app1", "*").unwrap();
        assert_eq!(listed.keys().collect::<Vec<_>>(), vec!["alice"]);
    }

    #[test]
    fn test_identifiers_validated() {
        let (store, index) = setup();

        assert!(matches!(
            index.add_association("app1", "ali:ce", "d1"),
            Err(PushDbError::InvalidIdentifier { field: "subscriber", .. })
        ));
        assert!(matches!(
            index.add_association("app1", "*", "d1"),
            Err(PushDbError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            index.list_delivery_point_names("app:1", "*"),
            Err(PushDbError::InvalidIdentifier { field: "service", .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_refcount_rejects_garbage() {
        let (store, index) = setup();
        store.set("delivery.point.counter:d1", b"many").unwrap();

        assert!(matches!(
            index.delivery_point_refcount("d1"),
            Err(PushDbError::StoreProtocol { .. })
        ));
    }
}
