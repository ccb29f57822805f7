//! In-flight order registry.
//!
//! Every submitted order is tracked under
//! `(strategy_id, window_id, request_id)` with a deadline. A sweep
//! collects orders past `inflight_timeout_ms` so the orchestrator can
//! cancel them; cancellation removes the record.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use updown_safety::state_file::InflightSummary;
use uuid::Uuid;

/// One tracked order.
#[derive(Debug, Clone)]
pub struct InflightOrder {
    pub strategy_id: Uuid,
    pub window_id: String,
    pub request_id: Uuid,
    /// Venue order id, once known.
    pub order_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    deadline: Instant,
}

type Key = (Uuid, String, Uuid);

/// Registry of unacknowledged orders.
pub struct InflightRegistry {
    orders: DashMap<Key, InflightOrder>,
    timeout: Duration,
}

impl InflightRegistry {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            orders: DashMap::new(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Track a new submission; returns the request id.
    pub fn track(&self, strategy_id: Uuid, window_id: &str) -> Uuid {
        let request_id = Uuid::new_v4();
        let order = InflightOrder {
            strategy_id,
            window_id: window_id.to_string(),
            request_id,
            order_id: None,
            submitted_at: Utc::now(),
            deadline: Instant::now() + self.timeout,
        };
        self.orders
            .insert((strategy_id, window_id.to_string(), request_id), order);
        request_id
    }

    /// Attach the venue order id after submission.
    pub fn set_order_id(&self, strategy_id: Uuid, window_id: &str, request_id: Uuid, order_id: &str) {
        if let Some(mut entry) =
            self.orders
                .get_mut(&(strategy_id, window_id.to_string(), request_id))
        {
            entry.order_id = Some(order_id.to_string());
        }
    }

    /// Remove a record on acknowledgement or cancellation.
    pub fn resolve(&self, strategy_id: Uuid, window_id: &str, request_id: Uuid) {
        if self
            .orders
            .remove(&(strategy_id, window_id.to_string(), request_id))
            .is_some()
        {
            debug!(%strategy_id, window_id, %request_id, "In-flight record resolved");
        }
    }

    /// Orders past their deadline, removed from the registry. The
    /// caller cancels them against the venue.
    pub fn sweep_expired(&self) -> Vec<InflightOrder> {
        let now = Instant::now();
        let expired: Vec<Key> = self
            .orders
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|key| self.orders.remove(&key).map(|(_, order)| order))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Snapshot for the last-known-state file.
    pub fn summaries(&self) -> Vec<InflightSummary> {
        self.orders
            .iter()
            .map(|entry| InflightSummary {
                strategy_id: entry.strategy_id.to_string(),
                window_id: entry.window_id.clone(),
                order_id: entry.order_id.clone().unwrap_or_default(),
                submitted_at: entry.submitted_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_resolve() {
        let registry = InflightRegistry::new(60_000);
        let sid = Uuid::new_v4();
        let request = registry.track(sid, "w1");
        assert_eq!(registry.len(), 1);

        registry.set_order_id(sid, "w1", request, "ord-1");
        assert_eq!(registry.summaries()[0].order_id, "ord-1");

        registry.resolve(sid, "w1", request);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_only_expired() {
        let registry = InflightRegistry::new(0);
        let sid = Uuid::new_v4();
        registry.track(sid, "w1");

        let fresh_registry = InflightRegistry::new(60_000);
        fresh_registry.track(sid, "w2");

        // Zero timeout: expired immediately.
        let expired = registry.sweep_expired();
        assert_eq!(expired.len(), 1);
        assert!(registry.is_empty());

        // Long timeout: nothing swept.
        assert!(fresh_registry.sweep_expired().is_empty());
        assert_eq!(fresh_registry.len(), 1);
    }
}
