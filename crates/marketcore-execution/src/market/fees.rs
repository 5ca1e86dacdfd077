//! Liquidity fee accrual and periodic distribution.

use chrono::{DateTime, Duration, Utc};
use marketcore_types::{PartyId, Trade};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept on distributed fee amounts.
const FEE_PRECISION: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityFees {
    factor: Decimal,
    /// Fees charged on trades but not yet credited to the fee pool.
    pending: Decimal,
    step: Duration,
    next_distribution: Option<DateTime<Utc>>,
}

impl LiquidityFees {
    #[must_use]
    pub fn new(factor: Decimal, cap: Decimal, step: Duration) -> Self {
        Self {
            factor: factor.min(cap),
            pending: Decimal::ZERO,
            step,
            next_distribution: None,
        }
    }

    #[must_use]
    pub fn factor(&self) -> Decimal {
        self.factor
    }

    pub fn set_factor(&mut self, factor: Decimal, cap: Decimal) {
        self.factor = factor.min(cap);
    }

    /// Applies a new cap to the current factor.
    pub fn cap(&mut self, cap: Decimal) {
        self.factor = self.factor.min(cap);
    }

    /// Changes the distribution step, moving a scheduled distribution along.
    pub fn set_step(&mut self, step: Duration) {
        if let Some(next) = self.next_distribution {
            self.next_distribution = Some(next - self.step + step);
        }
        self.step = step;
    }

    /// Starts the distribution schedule; a no-op once started.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.next_distribution.is_none() {
            self.next_distribution = Some(now + self.step);
        }
    }

    /// Charges the fee on a trade. Returns the amount charged.
    pub fn on_trade(&mut self, trade: &Trade) -> Decimal {
        let fee = (trade.notional() * self.factor)
            .round_dp_with_strategy(FEE_PRECISION, RoundingStrategy::ToZero);
        self.pending += fee;
        fee
    }

    /// Takes the fees charged since the last call.
    pub fn take_pending(&mut self) -> Decimal {
        std::mem::take(&mut self.pending)
    }

    /// Whether a distribution is due, advancing the schedule if so.
    pub fn distribution_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.next_distribution {
            Some(next) if now >= next => {
                self.next_distribution = Some(now + self.step);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn next_distribution(&self) -> Option<DateTime<Utc>> {
        self.next_distribution
    }
}

/// Splits `pool` by share weights. Amounts are truncated so the total never
/// exceeds the pool; zero amounts are omitted.
#[must_use]
pub fn split_pool(
    pool: Decimal,
    weights: impl IntoIterator<Item = (PartyId, Decimal)>,
) -> Vec<(PartyId, Decimal)> {
    if pool <= Decimal::ZERO {
        return Vec::new();
    }
    weights
        .into_iter()
        .filter_map(|(party, weight)| {
            let amount =
                (pool * weight).round_dp_with_strategy(FEE_PRECISION, RoundingStrategy::ToZero);
            (amount > Decimal::ZERO).then_some((party, amount))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use marketcore_types::{MarketId, OrderId, TradeId};

    use super::*;

    fn trade(price: i64, size: i64) -> Trade {
        let m = MarketId::new("m");
        Trade {
            id: TradeId::deterministic(&m, 0),
            market_id: m.clone(),
            price: Decimal::new(price, 0),
            size: Decimal::new(size, 0),
            buyer: PartyId::new("b"),
            seller: PartyId::new("s"),
            buy_order: OrderId::deterministic(&m, 1),
            sell_order: OrderId::deterministic(&m, 2),
            aggressor: None,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn factor_is_capped() {
        let fees = LiquidityFees::new(Decimal::new(5, 2), Decimal::new(1, 2), Duration::seconds(1));
        assert_eq!(fees.factor(), Decimal::new(1, 2));
    }

    #[test]
    fn trade_fee_accumulates() {
        let mut fees = LiquidityFees::new(Decimal::new(1, 3), Decimal::ONE, Duration::seconds(1));
        assert_eq!(fees.on_trade(&trade(100, 10)), Decimal::ONE);
        fees.on_trade(&trade(100, 10));
        assert_eq!(fees.take_pending(), Decimal::TWO);
        assert_eq!(fees.take_pending(), Decimal::ZERO);
    }

    #[test]
    fn schedule_advances() {
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let mut fees = LiquidityFees::new(Decimal::ZERO, Decimal::ONE, Duration::seconds(10));
        assert!(!fees.distribution_due(t0 + Duration::days(1)));
        fees.start(t0);
        assert!(!fees.distribution_due(t0 + Duration::seconds(9)));
        assert!(fees.distribution_due(t0 + Duration::seconds(10)));
        assert_eq!(fees.next_distribution(), Some(t0 + Duration::seconds(20)));

        fees.set_step(Duration::seconds(5));
        assert_eq!(fees.next_distribution(), Some(t0 + Duration::seconds(15)));
    }

    #[test]
    fn split_truncates() {
        let third = Decimal::ONE / Decimal::from(3);
        let amounts = split_pool(
            Decimal::ONE,
            [(PartyId::new("a"), third), (PartyId::new("b"), Decimal::ONE - third)],
        );
        let total: Decimal = amounts.iter().map(|(_, a)| *a).sum();
        assert!(total <= Decimal::ONE);
        assert_eq!(amounts[0].1, Decimal::new(33_333_333, 8));
    }
}
