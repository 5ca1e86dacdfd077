//! Trade types produced by the order book.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketId, OrderId, OrderSide, PartyId, TradeId};

/// A matched fill between two orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub market_id: MarketId,
    pub price: Decimal,
    pub size: Decimal,
    pub buyer: PartyId,
    pub seller: PartyId,
    pub buy_order: OrderId,
    pub sell_order: OrderId,
    /// Side of the incoming order; `None` for auction uncrossing.
    pub aggressor: Option<OrderSide>,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Traded notional (price × size).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price
            .checked_mul(self.size)
            .unwrap_or(Decimal::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notional_is_price_times_size() {
        let m = MarketId::new("m");
        let trade = Trade {
            id: TradeId::deterministic(&m, 0),
            market_id: m.clone(),
            price: Decimal::new(25, 1),
            size: Decimal::new(4, 0),
            buyer: PartyId::new("b"),
            seller: PartyId::new("s"),
            buy_order: crate::OrderId::deterministic(&m, 1),
            sell_order: crate::OrderId::deterministic(&m, 2),
            aggressor: Some(OrderSide::Buy),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        };
        assert_eq!(trade.notional(), Decimal::new(10, 0));
    }
}
