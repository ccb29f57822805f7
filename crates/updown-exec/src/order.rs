//! Normalized order types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use updown_core::{OrderSide, Price, Size};

/// An order to place on the CLOB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: OrderSide,
    /// Limit price in [0, 1].
    pub price: Price,
    /// Contracts.
    pub size: Size,
}

impl OrderRequest {
    /// Dollar cost at the limit price.
    pub fn cost(&self) -> Decimal {
        self.size.notional(self.price)
    }
}

/// Venue-reported order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Resting on the book.
    Live,
    /// Fully matched.
    Matched,
    /// Cancelled before a full match.
    Cancelled,
}

/// Result of a placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
    pub status: OrderStatus,
    /// Size resting as a maker.
    pub making: Size,
    /// Size filled as a taker.
    pub taking: Size,
    /// Average fill price for the taking portion.
    pub fill_price: Option<Price>,
    /// On-chain settlement hashes, live mode only.
    pub tx_hashes: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_cost() {
        let order = OrderRequest {
            token_id: "tok".into(),
            side: OrderSide::Buy,
            price: Price::new(dec!(0.40)),
            size: Size::new(dec!(25)),
        };
        assert_eq!(order.cost(), dec!(10.0));
    }
}
