//! Core types for the push directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which kind of stored entity a value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    DeliveryPoint,
    PushServiceProvider,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::DeliveryPoint => write!(f, "delivery point"),
            EntityKind::PushServiceProvider => write!(f, "push service provider"),
        }
    }
}

/// An endpoint that can receive a push (a device token, a mailbox, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPoint {
    /// Unique name; the identity used by every index.
    pub name: String,

    /// Push channel this endpoint belongs to (e.g., "apns", "gcm").
    pub push_service_type: String,

    /// Data that identifies the endpoint and never changes.
    #[serde(default)]
    pub fixed_data: BTreeMap<String, String>,

    /// Data the provider may refresh over time (e.g., a rotated token).
    #[serde(default)]
    pub volatile_data: BTreeMap<String, String>,
}

impl DeliveryPoint {
    pub fn new(name: impl Into<String>, push_service_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            push_service_type: push_service_type.into(),
            fixed_data: BTreeMap::new(),
            volatile_data: BTreeMap::new(),
        }
    }

    /// Add a fixed data entry.
    pub fn with_fixed(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixed_data.insert(key.into(), value.into());
        self
    }

    /// Add a volatile data entry.
    pub fn with_volatile(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.volatile_data.insert(key.into(), value.into());
        self
    }
}

/// A credential set able to send through one push channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushServiceProvider {
    /// Unique name; the identity used by every index.
    pub name: String,

    /// Push channel these credentials are for.
    pub push_service_type: String,

    #[serde(default)]
    pub fixed_data: BTreeMap<String, String>,

    #[serde(default)]
    pub volatile_data: BTreeMap<String, String>,
}

impl PushServiceProvider {
    pub fn new(name: impl Into<String>, push_service_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            push_service_type: push_service_type.into(),
            fixed_data: BTreeMap::new(),
            volatile_data: BTreeMap::new(),
        }
    }

    pub fn with_fixed(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixed_data.insert(key.into(), value.into());
        self
    }

    pub fn with_volatile(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.volatile_data.insert(key.into(), value.into());
        self
    }
}

/// What `add_association` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationAdded {
    /// The delivery point was new to the subscriber; the counter now holds `refcount`.
    Added { refcount: i64 },
    /// The association already existed; nothing changed.
    AlreadyPresent,
}

/// What `remove_association` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationRemoved {
    /// The association did not exist; nothing changed.
    NotPresent,
    /// Removed; other associations still reference the delivery point.
    Removed { refcount: i64 },
    /// Removed the last reference; counter and delivery point record are gone.
    Cascaded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_point_builder() {
        let dp = DeliveryPoint::new("iphone-1", "apns")
            .with_fixed("devtoken", "abc")
            .with_volatile("badge", "3");

        assert_eq!(dp.name, "iphone-1");
        assert_eq!(dp.fixed_data.get("devtoken").map(String::as_str), Some("abc"));
        assert_eq!(dp.volatile_data.get("badge").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::DeliveryPoint.to_string(), "delivery point");
        assert_eq!(
            EntityKind::PushServiceProvider.to_string(),
            "push service provider"
        );
    }
}
