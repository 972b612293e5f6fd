//! Key layout shared by every component.
//!
//! All keys are `:`-separated strings under a fixed prefix. Services and
//! subscribers must not contain the separator or a glob metacharacter,
//! otherwise wildcard enumeration could not split them back out. Delivery
//! point and provider names always sit last in a key or inside a set, so
//! they are opaque.

use crate::error::{PushDbError, Result};

/// Delivery point name -> encoded delivery point.
pub const DELIVERY_POINT_PREFIX: &str = "delivery.point:";

/// PSP name -> encoded push service provider.
pub const PUSH_SERVICE_PROVIDER_PREFIX: &str = "push.service.provider:";

/// Service + subscriber -> set of delivery point names.
pub const SERVICE_SUBSCRIBER_TO_DELIVERY_POINTS_PREFIX: &str = "srv.sub-2-dp:";

/// Service + delivery point -> PSP name.
pub const SERVICE_DELIVERY_POINT_TO_PSP_PREFIX: &str = "srv.dp-2-psp:";

/// Service -> set of PSP names.
pub const SERVICE_TO_PSPS_PREFIX: &str = "srv-2-psp:";

/// Delivery point name -> number of subscriptions referencing it.
pub const DELIVERY_POINT_COUNTER_PREFIX: &str = "delivery.point.counter:";

pub const SEPARATOR: char = ':';

pub const WILDCARD: char = '*';

const FORBIDDEN: &[char] = &[SEPARATOR, WILDCARD, '?', '[', ']'];

pub fn delivery_point(name: &str) -> String {
    format!("{DELIVERY_POINT_PREFIX}{name}")
}

pub fn push_service_provider(name: &str) -> String {
    format!("{PUSH_SERVICE_PROVIDER_PREFIX}{name}")
}

pub fn subscriber_delivery_points(service: &str, subscriber: &str) -> String {
    format!("{SERVICE_SUBSCRIBER_TO_DELIVERY_POINTS_PREFIX}{service}{SEPARATOR}{subscriber}")
}

pub fn assigned_psp(service: &str, delivery_point: &str) -> String {
    format!("{SERVICE_DELIVERY_POINT_TO_PSP_PREFIX}{service}{SEPARATOR}{delivery_point}")
}

pub fn service_psps(service: &str) -> String {
    format!("{SERVICE_TO_PSPS_PREFIX}{service}")
}

pub fn delivery_point_counter(name: &str) -> String {
    format!("{DELIVERY_POINT_COUNTER_PREFIX}{name}")
}

/// Whether the argument asks for wildcard enumeration.
pub fn has_wildcard(s: &str) -> bool {
    s.contains(WILDCARD)
}

/// Split a `srv.sub-2-dp:<service>:<subscriber>` key into its components.
pub fn parse_subscriber_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(SERVICE_SUBSCRIBER_TO_DELIVERY_POINTS_PREFIX)?;
    let mut parts = rest.splitn(2, SEPARATOR);
    let service = parts.next()?;
    let subscriber = parts.next()?;
    if subscriber.contains(SEPARATOR) {
        return None;
    }
    Some((service, subscriber))
}

/// Reject identifiers that would corrupt a composite key.
pub fn validate(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(FORBIDDEN) {
        return Err(PushDbError::InvalidIdentifier {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Delivery point and provider names only need to be non-empty.
pub fn validate_name(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(PushDbError::InvalidIdentifier {
            field,
            value: String::new(),
        });
    }
    Ok(())
}

/// Like [`validate`], but `*` is allowed since the value is a lookup pattern.
pub fn validate_pattern(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(SEPARATOR) {
        return Err(PushDbError::InvalidIdentifier {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
