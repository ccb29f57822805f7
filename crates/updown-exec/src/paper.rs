//! Deterministic paper-trading simulator.
//!
//! Mirrors live semantics: a marketable order fills immediately at
//! the touch plus configured slippage; a non-marketable order rests
//! until cancelled. Fills are fully determined by the current book
//! view, so paper runs are reproducible.

use crate::client::{ExecutionClient, PriceView, TradingMode};
use crate::error::{ExecError, ExecResult};
use crate::order::{OrderRequest, OrderStatus, PlacedOrder};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use updown_core::{OrderSide, Price, Size};

/// Slippage applied to marketable fills.
#[derive(Debug, Clone, Copy)]
pub struct SlippageModel {
    /// Fractional slippage, e.g. 0.002 = 20 bps against the taker.
    pub slippage: Decimal,
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self {
            slippage: Decimal::new(2, 3), // 0.002
        }
    }
}

impl SlippageModel {
    /// Fill price for a taker order at the touch.
    fn fill_price(&self, side: OrderSide, touch: Price) -> Price {
        let adjusted = match side {
            OrderSide::Buy => touch.inner() * (Decimal::ONE + self.slippage),
            OrderSide::Sell => touch.inner() * (Decimal::ONE - self.slippage),
        };
        Price::new(adjusted).clamp_unit()
    }
}

struct RestingOrder {
    request: OrderRequest,
}

/// Fully simulated execution client.
pub struct PaperExecutor {
    prices: Arc<dyn PriceView>,
    slippage: SlippageModel,
    /// Cash in dollars.
    cash: Mutex<Decimal>,
    /// Held contracts per token.
    holdings: Mutex<HashMap<String, Decimal>>,
    resting: Mutex<HashMap<String, RestingOrder>>,
    next_id: AtomicU64,
}

impl PaperExecutor {
    pub fn new(prices: Arc<dyn PriceView>, slippage: SlippageModel, starting_cash: Decimal) -> Self {
        info!(%starting_cash, "Paper executor ready");
        Self {
            prices,
            slippage,
            cash: Mutex::new(starting_cash),
            holdings: Mutex::new(HashMap::new()),
            resting: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> String {
        format!("paper-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Apply a fill to cash and holdings.
    fn settle_fill(&self, order: &OrderRequest, fill_price: Price) -> ExecResult<()> {
        let cost = order.size.notional(fill_price);
        match order.side {
            OrderSide::Buy => {
                let mut cash = self.cash.lock();
                if *cash < cost {
                    return Err(ExecError::InsufficientBalance {
                        needed: cost.to_string(),
                        available: cash.to_string(),
                    });
                }
                *cash -= cost;
                *self
                    .holdings
                    .lock()
                    .entry(order.token_id.clone())
                    .or_default() += order.size.inner();
            }
            OrderSide::Sell => {
                let mut holdings = self.holdings.lock();
                let held = holdings.entry(order.token_id.clone()).or_default();
                if *held < order.size.inner() {
                    return Err(ExecError::InsufficientBalance {
                        needed: order.size.to_string(),
                        available: held.to_string(),
                    });
                }
                *held -= order.size.inner();
                *self.cash.lock() += cost;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionClient for PaperExecutor {
    async fn place_order(&self, order: OrderRequest) -> ExecResult<PlacedOrder> {
        if !order.size.is_positive() {
            return Err(ExecError::Rejected("size must be positive".into()));
        }
        if !order.price.is_positive() || order.price > Price::ONE {
            return Err(ExecError::Rejected(format!(
                "price {} outside (0, 1]",
                order.price
            )));
        }

        let top = self.prices.book_top(&order.token_id);
        let order_id = self.allocate_id();

        // Marketable? Fill at the touch with slippage.
        let touch = match (&top, order.side) {
            (Some(t), OrderSide::Buy) if t.best_ask.is_positive() && order.price >= t.best_ask => {
                Some(t.best_ask)
            }
            (Some(t), OrderSide::Sell) if t.best_bid.is_positive() && order.price <= t.best_bid => {
                Some(t.best_bid)
            }
            _ => None,
        };

        match touch {
            Some(touch) => {
                let fill_price = self.slippage.fill_price(order.side, touch);
                self.settle_fill(&order, fill_price)?;
                debug!(order_id, token = %order.token_id, %fill_price, "Paper fill");
                Ok(PlacedOrder {
                    order_id,
                    status: OrderStatus::Matched,
                    making: Size::ZERO,
                    taking: order.size,
                    fill_price: Some(fill_price),
                    tx_hashes: None,
                })
            }
            None => {
                let making = order.size;
                self.resting
                    .lock()
                    .insert(order_id.clone(), RestingOrder { request: order });
                debug!(order_id, "Paper order resting");
                Ok(PlacedOrder {
                    order_id,
                    status: OrderStatus::Live,
                    making,
                    taking: Size::ZERO,
                    fill_price: None,
                    tx_hashes: None,
                })
            }
        }
    }

    async fn cancel(&self, order_id: &str) -> ExecResult<()> {
        match self.resting.lock().remove(order_id) {
            Some(order) => {
                debug!(order_id, token = %order.request.token_id, "Paper order cancelled");
                Ok(())
            }
            None => Err(ExecError::OrderNotFound(order_id.to_string())),
        }
    }

    async fn get_balance<'a>(&self, token_id: Option<&'a str>) -> ExecResult<Decimal> {
        match token_id {
            None => Ok(*self.cash.lock()),
            Some(token) => Ok(self
                .holdings
                .lock()
                .get(token)
                .copied()
                .unwrap_or(Decimal::ZERO)),
        }
    }

    fn mode(&self) -> TradingMode {
        TradingMode::Paper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use rust_decimal_macros::dec;
    use updown_core::BookTop;

    struct FixedBook {
        top: RwLock<Option<BookTop>>,
    }

    impl PriceView for FixedBook {
        fn book_top(&self, _token_id: &str) -> Option<BookTop> {
            *self.top.read()
        }
    }

    fn book(bid: Decimal, ask: Decimal) -> Arc<FixedBook> {
        Arc::new(FixedBook {
            top: RwLock::new(Some(BookTop {
                best_bid: Price::new(bid),
                bid_size: Size::new(dec!(1000)),
                best_ask: Price::new(ask),
                ask_size: Size::new(dec!(1000)),
            })),
        })
    }

    fn executor(prices: Arc<FixedBook>) -> PaperExecutor {
        PaperExecutor::new(
            prices,
            SlippageModel {
                slippage: Decimal::ZERO,
            },
            dec!(1000),
        )
    }

    fn buy(price: Decimal, size: Decimal) -> OrderRequest {
        OrderRequest {
            token_id: "tok".into(),
            side: OrderSide::Buy,
            price: Price::new(price),
            size: Size::new(size),
        }
    }

    #[tokio::test]
    async fn test_marketable_buy_fills_at_ask() {
        let exec = executor(book(dec!(0.40), dec!(0.44)));
        let placed = exec.place_order(buy(dec!(0.45), dec!(10))).await.unwrap();

        assert_eq!(placed.status, OrderStatus::Matched);
        assert_eq!(placed.taking.inner(), dec!(10));
        assert_eq!(placed.fill_price.unwrap().inner(), dec!(0.44));
        // Cash debited: 1000 - 4.4
        assert_eq!(exec.get_balance(None).await.unwrap(), dec!(995.6));
        assert_eq!(exec.get_balance(Some("tok")).await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn test_non_marketable_rests_and_cancels() {
        let exec = executor(book(dec!(0.40), dec!(0.44)));
        let placed = exec.place_order(buy(dec!(0.30), dec!(10))).await.unwrap();

        assert_eq!(placed.status, OrderStatus::Live);
        assert_eq!(placed.making.inner(), dec!(10));
        // No cash movement while resting.
        assert_eq!(exec.get_balance(None).await.unwrap(), dec!(1000));

        exec.cancel(&placed.order_id).await.unwrap();
        assert!(matches!(
            exec.cancel(&placed.order_id).await,
            Err(ExecError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_slippage_applied_to_taker() {
        let prices = book(dec!(0.40), dec!(0.50));
        let exec = PaperExecutor::new(
            prices,
            SlippageModel {
                slippage: dec!(0.01),
            },
            dec!(1000),
        );
        let placed = exec.place_order(buy(dec!(0.55), dec!(10))).await.unwrap();
        assert_eq!(placed.fill_price.unwrap().inner(), dec!(0.505));
    }

    #[tokio::test]
    async fn test_insufficient_cash_rejected() {
        let prices = book(dec!(0.40), dec!(0.44));
        let exec = PaperExecutor::new(prices, SlippageModel::default(), dec!(1));
        let err = exec.place_order(buy(dec!(0.45), dec!(10))).await.unwrap_err();
        assert!(matches!(err, ExecError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_sell_requires_holdings() {
        let exec = executor(book(dec!(0.40), dec!(0.44)));
        let sell = OrderRequest {
            token_id: "tok".into(),
            side: OrderSide::Sell,
            price: Price::new(dec!(0.40)),
            size: Size::new(dec!(5)),
        };
        let err = exec.place_order(sell.clone()).await.unwrap_err();
        assert!(matches!(err, ExecError::InsufficientBalance { .. }));

        // Buy first, then the sell succeeds.
        exec.place_order(buy(dec!(0.45), dec!(5))).await.unwrap();
        let placed = exec.place_order(sell).await.unwrap();
        assert_eq!(placed.status, OrderStatus::Matched);
    }

    #[tokio::test]
    async fn test_invalid_price_rejected() {
        let exec = executor(book(dec!(0.40), dec!(0.44)));
        let err = exec.place_order(buy(dec!(1.5), dec!(10))).await.unwrap_err();
        assert!(matches!(err, ExecError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_empty_book_rests_order() {
        let prices = Arc::new(FixedBook {
            top: RwLock::new(None),
        });
        let exec = executor(prices);
        let placed = exec.place_order(buy(dec!(0.45), dec!(10))).await.unwrap();
        assert_eq!(placed.status, OrderStatus::Live);
    }
}
