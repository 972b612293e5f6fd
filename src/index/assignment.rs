//! Which push service provider serves what.

use crate::error::Result;
use crate::keys;
use crate::kv::KvStore;
use std::sync::Arc;
use tracing::debug;

/// Maintains `srv.dp-2-psp:*` assignments and `srv-2-psp:*` sets.
///
/// Nothing here is reference counted: a provider dropped from every service
/// keeps its record until it is removed explicitly.
#[derive(Clone)]
pub struct AssignmentIndex {
    store: Arc<dyn KvStore>,
}

impl AssignmentIndex {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// The provider assigned to a delivery point within a service, if any.
    pub fn get_assigned_psp(&self, service: &str, delivery_point: &str) -> Result<Option<String>> {
        let key = keys::assigned_psp(service, delivery_point);
        let value = self
            .store
            .get(&key)
            .map_err(|e| e.context("get_assigned_psp", &key))?;

        Ok(value
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn set_assigned_psp(&self, service: &str, delivery_point: &str, psp: &str) -> Result<()> {
        keys::validate("service", service)?;
        keys::validate_name("delivery point", delivery_point)?;
        keys::validate_name("push service provider", psp)?;

        let key = keys::assigned_psp(service, delivery_point);
        self.store
            .set(&key, psp.as_bytes())
            .map_err(|e| e.context("set_assigned_psp", &key))?;
        debug!(service, delivery_point, psp, "assigned provider");
        Ok(())
    }

    /// Drop the assignment. Clearing an absent assignment is not an error.
    pub fn clear_assigned_psp(&self, service: &str, delivery_point: &str) -> Result<()> {
        let key = keys::assigned_psp(service, delivery_point);
        let existed = self
            .store
            .del(&key)
            .map_err(|e| e.context("clear_assigned_psp", &key))?;
        debug!(service, delivery_point, existed, "cleared provider assignment");
        Ok(())
    }

    /// Providers registered to a service; empty when there are none.
    pub fn list_psp_names_for_service(&self, service: &str) -> Result<Vec<String>> {
        let key = keys::service_psps(service);
        let members = self
            .store
            .smembers(&key)
            .map_err(|e| e.context("list_psp_names_for_service", &key))?;

        Ok(members
            .into_iter()
            .map(|m| String::from_utf8_lossy(&m).into_owned())
            .collect())
    }

    pub fn add_psp_to_service(&self, service: &str, psp: &str) -> Result<()> {
        keys::validate("service", service)?;
        keys::validate_name("push service provider", psp)?;

        let key = keys::service_psps(service);
        let added = self
            .store
            .sadd(&key, psp.as_bytes())
            .map_err(|e| e.context("add_psp_to_service", &key))?;
        debug!(service, psp, added, "provider added to service");
        Ok(())
    }

    pub fn remove_psp_from_service(&self, service: &str, psp: &str) -> Result<()> {
        let key = keys::service_psps(service);
        let removed = self
            .store
            .srem(&key, psp.as_bytes())
            .map_err(|e| e.context("remove_psp_from_service", &key))?;
        debug!(service, psp, removed, "provider removed from service");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PushDbError;
    use crate::kv::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, AssignmentIndex) {
        let store = Arc::new(MemoryStore::new());
        let index = AssignmentIndex::new(store.clone());
        (store, index)
    }

    #[test]
    fn test_assignment_reflects_latest_write() {
        let (store, index) = setup();

        assert_eq!(index.get_assigned_psp("app1", "d1").unwrap(), None);

        index.set_assigned_psp("app1", "d1", "gcm-cred-1").unwrap();
        assert_eq!(
            index.get_assigned_psp("app1", "d1").unwrap().as_deref(),
            Some("gcm-cred-1")
        );
        assert_eq!(
            store.get("srv.dp-2-psp:app1:d1").unwrap(),
            Some(b"gcm-cred-1".to_vec())
        );

        index.set_assigned_psp("app1", "d1", "gcm-cred-2").unwrap();
        assert_eq!(
            index.get_assigned_psp("app1", "d1").unwrap().as_deref(),
            Some("gcm-cred-2")
        );

        index.clear_assigned_psp("app1", "d1").unwrap();
        assert_eq!(index.get_assigned_psp("app1", "d1").unwrap(), None);

        // Clearing twice is fine
        index.clear_assigned_psp("app1", "d1").unwrap();
    }

    #[test]
    fn test_assignments_are_per_service() {
        let (_store, index) = setup();
        index.set_assigned_psp("app1", "d1", "apns-a").unwrap();
        index.set_assigned_psp("app2", "d1", "apns-b").unwrap();

        assert_eq!(index.get_assigned_psp("app1", "d1").unwrap().as_deref(), Some("apns-a"));
        assert_eq!(index.get_assigned_psp("app2", "d1").unwrap().as_deref(), Some("apns-b"));
    }

    #[test]
    fn test_service_psp_set() {
        let (store, index) = setup();

        assert!(index.list_psp_names_for_service("app1").unwrap().is_empty());

        index.add_psp_to_service("app1", "gcm-cred-1").unwrap();
        index.add_psp_to_service("app1", "apns-cred-1").unwrap();
        index.add_psp_to_service("app1", "gcm-cred-1").unwrap();

        let mut names = index.list_psp_names_for_service("app1").unwrap();
        names.sort();
        assert_eq!(names, vec!["apns-cred-1", "gcm-cred-1"]);

        index.remove_psp_from_service("app1", "gcm-cred-1").unwrap();
        index.remove_psp_from_service("app1", "never-added").unwrap();
        assert_eq!(index.list_psp_names_for_service("app1").unwrap(), vec!["apns-cred-1"]);

        index.remove_psp_from_service("app1", "apns-cred-1").unwrap();
        assert!(index.list_psp_names_for_service("app1").unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_provider_record_untouched_by_set_changes() {
        let (store, index) = setup();
        store.set("push.service.provider:gcm-cred-1", b"{}").unwrap();

        index.add_psp_to_service("app1", "gcm-cred-1").unwrap();
        index.remove_psp_from_service("app1", "gcm-cred-1").unwrap();

        assert!(store.get("push.service.provider:gcm-cred-1").unwrap().is_some());
    }

    #[test]
    fn test_invalid_psp_name_rejected() {
        let (_store, index) = setup();
        assert!(matches!(
            index.set_assigned_psp("app1", "d1", ""),
            Err(PushDbError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            index.add_psp_to_service("app*", "p1"),
            Err(PushDbError::InvalidIdentifier { field: "service", .. })
        ));
    }

    #[test]
    fn test_provider_names_with_separator() {
        let (_store, index) = setup();
        index.set_assigned_psp("app1", "apns:0f3a", "gcm:cred").unwrap();
        index.add_psp_to_service("app1", "gcm:cred").unwrap();

        assert_eq!(
            index.get_assigned_psp("app1", "apns:0f3a").unwrap(),
            Some("gcm:cred".to_string())
        );
        assert_eq!(index.list_psp_names_for_service("app1").unwrap(), vec!["gcm:cred"]);
    }
}
