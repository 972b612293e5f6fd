//! Store-wide maintenance: durability checkpoints and counter repair.

use crate::error::{Result, StoreFault};
use crate::keys;
use crate::kv::KvStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A reference counter that did not match the subscriber sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterCorrection {
    pub delivery_point: String,
    /// What the counter held (`None` if absent or unreadable).
    pub stored: Option<i64>,
    /// Number of subscriber sets that actually hold the delivery point.
    pub actual: i64,
}

/// Outcome of [`Maintenance::reconcile_counters`].
#[derive(Clone, Debug, Default)]
pub struct ReconcileReport {
    /// Subscriber sets scanned.
    pub sets_scanned: usize,
    /// Counters rewritten or deleted.
    pub corrections: Vec<CounterCorrection>,
    /// Delivery point records no subscriber set references. Reported, not deleted.
    pub orphaned_delivery_points: Vec<String>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.corrections.is_empty() && self.orphaned_delivery_points.is_empty()
    }
}

/// Operations that act on the store as a whole rather than on one index.
#[derive(Clone)]
pub struct Maintenance {
    store: Arc<dyn KvStore>,
}

impl Maintenance {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Ask the backend to write its in-memory state to durable media now.
    pub fn flush(&self) -> Result<()> {
        self.store.save().map_err(|e| {
            warn!(error = %e, "flush failed");
            e.context("flush", "*")
        })?;
        info!("store flushed");
        Ok(())
    }

    /// Recompute every delivery point reference counter from the subscriber sets.
    ///
    /// Counters that disagree are overwritten (or deleted when nothing
    /// references the delivery point). Delivery point records are never
    /// deleted here. Each fix is a separate store call, so concurrent
    /// association changes during a run can be lost; run it while writers are
    /// quiet.
    pub fn reconcile_counters(&self) -> Result<ReconcileReport> {
        const OP: &str = "reconcile_counters";
        let mut report = ReconcileReport::default();

        // Ground truth from the membership sets
        let set_pattern = format!("{}*", keys::SERVICE_SUBSCRIBER_TO_DELIVERY_POINTS_PREFIX);
        let set_keys = self
            .store
            .keys(&set_pattern)
            .map_err(|e| e.context(OP, &set_pattern))?;

        let mut actual: BTreeMap<String, i64> = BTreeMap::new();
        for set_key in &set_keys {
            let members = self
                .store
                .smembers(set_key)
                .map_err(|e| e.context(OP, set_key))?;
            for member in members {
                *actual
                    .entry(String::from_utf8_lossy(&member).into_owned())
                    .or_insert(0) += 1;
            }
        }
        report.sets_scanned = set_keys.len();

        // What the counters currently claim
        let counter_pattern = format!("{}*", keys::DELIVERY_POINT_COUNTER_PREFIX);
        let counter_keys = self
            .store
            .keys(&counter_pattern)
            .map_err(|e| e.context(OP, &counter_pattern))?;

        let mut stored: BTreeMap<String, Option<i64>> = BTreeMap::new();
        for counter_key in &counter_keys {
            let Some(name) = counter_key.strip_prefix(keys::DELIVERY_POINT_COUNTER_PREFIX) else {
                continue;
            };
            let value = self
                .store
                .get(counter_key)
                .map_err(|e| e.context(OP, counter_key))?
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .and_then(|s| s.trim().parse::<i64>().ok());
            stored.insert(name.to_string(), value);
        }

        let mut names: Vec<&String> = actual.keys().chain(stored.keys()).collect();
        names.sort();
        names.dedup();

        for name in names {
            let actual_count = actual.get(name).copied().unwrap_or(0);
            let stored_count = stored.get(name).copied().flatten();
            if stored_count == Some(actual_count) {
                continue;
            }

            let counter_key = keys::delivery_point_counter(name);
            if actual_count == 0 {
                self.store
                    .del(&counter_key)
                    .map_err(|e| e.context(OP, &counter_key))?;
            } else {
                self.store
                    .set(&counter_key, actual_count.to_string().as_bytes())
                    .map_err(|e| e.context(OP, &counter_key))?;
            }

            warn!(
                delivery_point = %name,
                stored = ?stored_count,
                actual = actual_count,
                "corrected reference counter"
            );
            report.corrections.push(CounterCorrection {
                delivery_point: name.clone(),
                stored: stored_count,
                actual: actual_count,
            });
        }

        // Records nothing points at
        let record_pattern = format!("{}*", keys::DELIVERY_POINT_PREFIX);
        let record_keys = self
            .store
            .keys(&record_pattern)
            .map_err(|e| e.context(OP, &record_pattern))?;
        for record_key in &record_keys {
            let Some(name) = record_key.strip_prefix(keys::DELIVERY_POINT_PREFIX) else {
                continue;
            };
            if !actual.contains_key(name) {
                report.orphaned_delivery_points.push(name.to_string());
            }
        }

        info!(
            sets = report.sets_scanned,
            corrections = report.corrections.len(),
            orphans = report.orphaned_delivery_points.len(),
            "reference counters reconciled"
        );
        Ok(report)
    }

    /// Delete delivery point records that no subscriber set references.
    ///
    /// Returns the names removed. Like reconciliation, this reads then
    /// deletes without atomicity; an association added in between loses its
    /// record.
    pub fn purge_orphaned_delivery_points(&self, orphans: &[String]) -> Result<Vec<String>> {
        const OP: &str = "purge_orphaned_delivery_points";
        let mut purged = Vec::new();

        for name in orphans {
            let counter_key = keys::delivery_point_counter(name);
            let still_referenced = match self.store.get(&counter_key) {
                Ok(Some(bytes)) => String::from_utf8_lossy(&bytes)
                    .trim()
                    .parse::<i64>()
                    .map(|n| n > 0)
                    .map_err(|_| {
                        StoreFault::protocol("counter value is not an integer")
                            .context(OP, &counter_key)
                    })?,
                Ok(None) => false,
                Err(e) => return Err(e.context(OP, &counter_key)),
            };
            if still_referenced {
                continue;
            }

            let record_key = keys::delivery_point(name);
            if self
                .store
                .del(&record_key)
                .map_err(|e| e.context(OP, &record_key))?
            {
                purged.push(name.clone());
            }
        }

        info!(purged = purged.len(), "orphaned delivery points purged");
        Ok(purged)
    }
}
