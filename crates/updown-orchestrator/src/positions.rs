//! The position book.
//!
//! At most one position with status `open` or `closing` per
//! `(strategy_id, window_id)`. Restart recovery re-binds persisted
//! open positions before the first tick and flags orphans whose
//! strategy is no longer active for graceful exit.

use crate::error::{OrchError, OrchResult};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tracing::{info, warn};
use updown_core::{Position, PositionStatus, Price};
use uuid::Uuid;

/// Durable backing for positions.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn upsert_position(&self, position: &Position) -> OrchResult<()>;
    async fn load_live_positions(&self) -> OrchResult<Vec<Position>>;
}

type SlotKey = (Uuid, String);

/// In-memory position book with write-through persistence.
pub struct PositionBook {
    /// Live (open or closing) positions by slot.
    live: DashMap<SlotKey, Position>,
    /// Slots whose strategy is gone; exit at the next opportunity.
    orphans: DashSet<SlotKey>,
    store: Option<Arc<dyn PositionStore>>,
}

impl PositionBook {
    pub fn new(store: Option<Arc<dyn PositionStore>>) -> Self {
        Self {
            live: DashMap::new(),
            orphans: DashSet::new(),
            store,
        }
    }

    /// The live position for a slot, if any.
    pub fn get(&self, strategy_id: Uuid, window_id: &str) -> Option<Position> {
        self.live
            .get(&(strategy_id, window_id.to_string()))
            .map(|p| p.clone())
    }

    pub fn has_live(&self, strategy_id: Uuid, window_id: &str) -> bool {
        self.live.contains_key(&(strategy_id, window_id.to_string()))
    }

    /// All live positions.
    pub fn live_positions(&self) -> Vec<Position> {
        self.live.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Live positions held in one window.
    pub fn positions_for_window(&self, window_id: &str) -> Vec<Position> {
        self.live
            .iter()
            .filter(|entry| entry.key().1 == window_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Open a position, enforcing the one-per-slot rule.
    pub async fn open(&self, position: Position) -> OrchResult<()> {
        let key = (position.strategy_id, position.window_id.clone());
        if self.live.contains_key(&key) {
            return Err(OrchError::SlotOccupied {
                strategy_id: key.0,
                window_id: key.1,
            });
        }
        if let Some(store) = &self.store {
            store.upsert_position(&position).await?;
        }
        self.live.insert(key, position);
        Ok(())
    }

    /// Move a slot to `closing` while the exit order is in flight.
    pub async fn mark_closing(&self, strategy_id: Uuid, window_id: &str) -> OrchResult<Position> {
        let key = (strategy_id, window_id.to_string());
        let mut position = self
            .live
            .get_mut(&key)
            .ok_or_else(|| OrchError::PositionNotFound {
                strategy_id,
                window_id: window_id.to_string(),
            })?;
        position.status = PositionStatus::Closing;
        let updated = position.clone();
        drop(position);
        if let Some(store) = &self.store {
            store.upsert_position(&updated).await?;
        }
        Ok(updated)
    }

    /// Close a slot, recording exit price and reason. Returns the
    /// closed position.
    pub async fn close(
        &self,
        strategy_id: Uuid,
        window_id: &str,
        exit_price: Option<Price>,
        exit_reason: impl Into<String>,
    ) -> OrchResult<Position> {
        let key = (strategy_id, window_id.to_string());
        let (_, mut position) =
            self.live
                .remove(&key)
                .ok_or_else(|| OrchError::PositionNotFound {
                    strategy_id,
                    window_id: window_id.to_string(),
                })?;
        position.status = PositionStatus::Closed;
        position.exit_price = exit_price;
        position.exit_reason = Some(exit_reason.into());
        self.orphans.remove(&key);
        if let Some(store) = &self.store {
            store.upsert_position(&position).await?;
        }
        Ok(position)
    }

    /// Rebuild the book from the store at start, before any tick.
    ///
    /// Positions whose strategy is not in `active_strategies` are
    /// kept but flagged as orphans for graceful exit.
    pub async fn recover(&self, active_strategies: &[Uuid]) -> OrchResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let positions = store.load_live_positions().await?;
        let count = positions.len();
        for position in positions {
            let key = (position.strategy_id, position.window_id.clone());
            if !active_strategies.contains(&position.strategy_id) {
                warn!(
                    strategy_id = %position.strategy_id,
                    window_id = %position.window_id,
                    "Orphan position recovered, will exit gracefully"
                );
                self.orphans.insert(key.clone());
            }
            self.live.insert(key, position);
        }
        info!(count, "Positions recovered");
        Ok(count)
    }

    /// Slots flagged for graceful exit.
    pub fn orphans(&self) -> Vec<(Uuid, String)> {
        self.orphans.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn is_orphan(&self, strategy_id: Uuid, window_id: &str) -> bool {
        self.orphans.contains(&(strategy_id, window_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use updown_core::{OrderSide, Size};

    struct MemoryStore {
        rows: Mutex<Vec<Position>>,
    }

    #[async_trait]
    impl PositionStore for MemoryStore {
        async fn upsert_position(&self, position: &Position) -> OrchResult<()> {
            let mut rows = self.rows.lock();
            rows.retain(|p| p.id != position.id);
            rows.push(position.clone());
            Ok(())
        }

        async fn load_live_positions(&self) -> OrchResult<Vec<Position>> {
            Ok(self
                .rows
                .lock()
                .iter()
                .filter(|p| p.status.is_live())
                .cloned()
                .collect())
        }
    }

    fn position(strategy_id: Uuid, window_id: &str) -> Position {
        Position::open(
            strategy_id,
            window_id.to_string(),
            "down-tok".into(),
            OrderSide::Buy,
            Size::new(dec!(10)),
            Price::new(dec!(0.30)),
        )
    }

    #[tokio::test]
    async fn test_one_live_position_per_slot() {
        let book = PositionBook::new(None);
        let sid = Uuid::new_v4();
        book.open(position(sid, "w1")).await.unwrap();

        let err = book.open(position(sid, "w1")).await.unwrap_err();
        assert!(matches!(err, OrchError::SlotOccupied { .. }));

        // Closing still occupies the slot.
        book.mark_closing(sid, "w1").await.unwrap();
        assert!(book.has_live(sid, "w1"));
        let err = book.open(position(sid, "w1")).await.unwrap_err();
        assert!(matches!(err, OrchError::SlotOccupied { .. }));

        // Closed frees it.
        book.close(sid, "w1", Some(Price::new(dec!(0.2))), "test")
            .await
            .unwrap();
        assert!(!book.has_live(sid, "w1"));
        book.open(position(sid, "w1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_different_windows_independent() {
        let book = PositionBook::new(None);
        let sid = Uuid::new_v4();
        book.open(position(sid, "w1")).await.unwrap();
        book.open(position(sid, "w2")).await.unwrap();
        assert_eq!(book.live_positions().len(), 2);
        assert_eq!(book.positions_for_window("w1").len(), 1);
    }

    #[tokio::test]
    async fn test_close_records_exit() {
        let book = PositionBook::new(None);
        let sid = Uuid::new_v4();
        book.open(position(sid, "w1")).await.unwrap();
        let closed = book
            .close(sid, "w1", Some(Price::new(dec!(0.9))), "settlement")
            .await
            .unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.exit_price.unwrap().inner(), dec!(0.9));
        assert_eq!(closed.exit_reason.as_deref(), Some("settlement"));
    }

    #[tokio::test]
    async fn test_recover_rebinds_and_flags_orphans() {
        let active = Uuid::new_v4();
        let gone = Uuid::new_v4();
        let store = Arc::new(MemoryStore {
            rows: Mutex::new(vec![position(active, "w1"), position(gone, "w1")]),
        });

        let book = PositionBook::new(Some(store));
        let recovered = book.recover(&[active]).await.unwrap();
        assert_eq!(recovered, 2);

        assert!(book.has_live(active, "w1"));
        assert!(book.has_live(gone, "w1"));
        assert!(!book.is_orphan(active, "w1"));
        assert!(book.is_orphan(gone, "w1"));
        assert_eq!(book.orphans().len(), 1);
    }

    #[tokio::test]
    async fn test_store_sees_transitions() {
        let store = Arc::new(MemoryStore {
            rows: Mutex::new(vec![]),
        });
        let book = PositionBook::new(Some(store.clone()));
        let sid = Uuid::new_v4();
        book.open(position(sid, "w1")).await.unwrap();
        book.close(sid, "w1", None, "test").await.unwrap();

        let rows = store.rows.lock();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PositionStatus::Closed);
    }
}
