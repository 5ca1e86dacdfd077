//! Price-monitoring bounds.
//!
//! A market is monitored against a reference price: the first trade (or the
//! auction uncrossing price passed to `reset`) anchors it, and any trade or
//! mid price that moves further than `bound` (relative) from the anchor
//! triggers a monitoring auction. A zero bound disables monitoring.

use marketcore_types::AuctionTrigger;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct PriceBounds {
    bound: Decimal,
    reference: Option<Decimal>,
}

impl PriceBounds {
    #[must_use]
    pub fn new(bound: Decimal) -> Self {
        Self {
            bound,
            reference: None,
        }
    }

    #[must_use]
    pub fn reference(&self) -> Option<Decimal> {
        self.reference
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.bound > Decimal::ZERO
    }

    fn breaches(&self, price: Decimal) -> bool {
        match self.reference {
            Some(reference) if reference > Decimal::ZERO => {
                (price - reference).abs() / reference > self.bound
            }
            _ => false,
        }
    }
}

impl AuctionTrigger for PriceBounds {
    fn on_trade(&mut self, price: Decimal) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if self.reference.is_none() {
            self.reference = Some(price);
            return false;
        }
        let breached = self.breaches(price);
        if breached {
            tracing::info!(
                price = %price,
                reference = ?self.reference,
                bound = %self.bound,
                "Trade price outside monitoring bounds"
            );
        }
        breached
    }

    fn on_book_change(&mut self, best_bid: Option<Decimal>, best_ask: Option<Decimal>) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => self.breaches((bid + ask) / Decimal::TWO),
            _ => false,
        }
    }

    fn reset(&mut self, reference: Option<Decimal>) {
        self.reference = reference;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bound_never_triggers() {
        let mut bounds = PriceBounds::new(Decimal::ZERO);
        assert!(!bounds.on_trade(Decimal::new(100, 0)));
        assert!(!bounds.on_trade(Decimal::new(1000, 0)));
        assert!(bounds.reference().is_none());
    }

    #[test]
    fn first_trade_anchors() {
        let mut bounds = PriceBounds::new(Decimal::new(1, 1));
        assert!(!bounds.on_trade(Decimal::new(100, 0)));
        assert_eq!(bounds.reference(), Some(Decimal::new(100, 0)));
        assert!(!bounds.on_trade(Decimal::new(110, 0)));
        assert!(bounds.on_trade(Decimal::new(111, 0)));
        assert!(bounds.on_trade(Decimal::new(89, 0)));
    }

    #[test]
    fn book_change_uses_mid() {
        let mut bounds = PriceBounds::new(Decimal::new(5, 2));
        bounds.reset(Some(Decimal::new(100, 0)));
        assert!(!bounds.on_book_change(Some(Decimal::new(99, 0)), Some(Decimal::new(101, 0))));
        assert!(bounds.on_book_change(Some(Decimal::new(120, 0)), Some(Decimal::new(122, 0))));
        assert!(!bounds.on_book_change(Some(Decimal::new(120, 0)), None));
    }
}
