//! Market definition, lifecycle state and market-data snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, MarketId, constants};

/// Lifecycle state of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum MarketState {
    /// Accepted by governance, not yet enacted.
    Proposed,
    /// Enacted, inside its opening auction.
    Pending,
    /// Continuous trading.
    Active,
    /// In a price-monitoring auction.
    Suspended,
    /// Suspended by a governance action.
    SuspendedViaGovernance,
    /// Trading terminated without final settlement data.
    Closed,
    /// Trading terminated and settled.
    Settled,
    /// A successor market has taken over.
    Succeeded,
    /// Rejected before enactment.
    Rejected,
    /// Terminated while still in its opening auction.
    Cancelled,
}

impl MarketState {
    /// States reached after trading has ended for good.
    #[must_use]
    pub fn is_final(self) -> bool {
        matches!(self, Self::Closed | Self::Settled | Self::Rejected | Self::Cancelled)
    }

    /// States in which orders may be placed.
    #[must_use]
    pub fn accepts_orders(self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::Active
                | Self::Suspended
                | Self::SuspendedViaGovernance
                | Self::Succeeded
        )
    }

    /// Closed and settled markets keep their full definition in checkpoints.
    #[must_use]
    pub fn keeps_definition(self) -> bool {
        matches!(self, Self::Closed | Self::Settled)
    }
}

impl std::fmt::Display for MarketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposed => write!(f, "PROPOSED"),
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Suspended => write!(f, "SUSPENDED"),
            Self::SuspendedViaGovernance => write!(f, "SUSPENDED_VIA_GOVERNANCE"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// How the book is currently being matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradingMode {
    NoTrading,
    OpeningAuction,
    Continuous,
    MonitoringAuction,
    SuspendedViaGovernance,
}

impl TradingMode {
    #[must_use]
    pub fn is_auction(self) -> bool {
        matches!(
            self,
            Self::OpeningAuction | Self::MonitoringAuction | Self::SuspendedViaGovernance
        )
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTrading => write!(f, "NO_TRADING"),
            Self::OpeningAuction => write!(f, "OPENING_AUCTION"),
            Self::Continuous => write!(f, "CONTINUOUS"),
            Self::MonitoringAuction => write!(f, "MONITORING_AUCTION"),
            Self::SuspendedViaGovernance => write!(f, "SUSPENDED_VIA_GOVERNANCE"),
        }
    }
}

/// Full definition of a market, as proposed through governance.
///
/// The `state` and `trading_mode` fields are maintained by the market itself;
/// values supplied on submission are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDefinition {
    pub id: MarketId,
    pub state: MarketState,
    pub trading_mode: TradingMode,
    /// Market this one succeeds, if any. A back-reference, not ownership.
    pub parent_market_id: Option<MarketId>,
    /// Share of the parent's insurance pool moved here on enactment.
    pub insurance_pool_fraction: Decimal,
    pub settlement_asset: Asset,
    /// Minimum opening auction length in milliseconds.
    pub opening_auction_duration_ms: u64,
    /// Relative price move that triggers a monitoring auction. Zero disables.
    pub price_monitoring_bound: Decimal,
    /// Fraction of traded notional accrued for liquidity providers.
    pub liquidity_fee_factor: Decimal,
}

impl MarketDefinition {
    /// A plain market settling in `asset` with default parameters.
    #[must_use]
    pub fn new(id: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            id: MarketId::new(id),
            state: MarketState::Proposed,
            trading_mode: TradingMode::NoTrading,
            parent_market_id: None,
            insurance_pool_fraction: Decimal::ZERO,
            settlement_asset: asset.into(),
            opening_auction_duration_ms: constants::DEFAULT_OPENING_AUCTION_MS,
            price_monitoring_bound: Decimal::ZERO,
            liquidity_fee_factor: constants::DEFAULT_LIQUIDITY_FEE_FACTOR,
        }
    }

    /// Builder: make this market a successor of `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>, fraction: Decimal) -> Self {
        self.parent_market_id = Some(MarketId::new(parent));
        self.insurance_pool_fraction = fraction;
        self
    }

    /// Builder: override the opening auction length.
    #[must_use]
    pub fn with_opening_auction_ms(mut self, ms: u64) -> Self {
        self.opening_auction_duration_ms = ms;
        self
    }

    /// Builder: enable price monitoring with a relative bound.
    #[must_use]
    pub fn with_price_monitoring_bound(mut self, bound: Decimal) -> Self {
        self.price_monitoring_bound = bound;
        self
    }

    #[must_use]
    pub fn is_successor(&self) -> bool {
        self.parent_market_id.is_some()
    }
}

/// Governance-driven state change for a live market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStateUpdate {
    /// Enter a governance suspension auction.
    Suspend,
    /// Leave a governance suspension.
    Resume,
    /// Terminate trading; with a price the market settles, without it closes.
    Terminate { settlement_price: Option<Decimal> },
}

/// Point-in-time view of a market published on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketData {
    pub market_id: MarketId,
    pub state: MarketState,
    pub trading_mode: TradingMode,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub best_static_bid: Option<Decimal>,
    pub best_static_ask: Option<Decimal>,
    pub mid_price: Option<Decimal>,
    pub last_traded_price: Option<Decimal>,
    /// Uncrossing price of the running auction, if the book crosses.
    pub indicative_price: Option<Decimal>,
    pub auction_end: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

/// Resource counters for one market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCounters {
    pub order_count: usize,
    pub pegged_orders: usize,
    pub parked_orders: usize,
    pub liquidity_orders: usize,
    pub liquidity_providers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(MarketState::Pending.to_string(), "PENDING");
        assert_eq!(
            MarketState::SuspendedViaGovernance.to_string(),
            "SUSPENDED_VIA_GOVERNANCE"
        );
    }

    #[test]
    fn only_closed_and_settled_keep_definition() {
        assert!(MarketState::Closed.keeps_definition());
        assert!(MarketState::Settled.keeps_definition());
        assert!(!MarketState::Active.keeps_definition());
        assert!(!MarketState::Cancelled.keeps_definition());
    }

    #[test]
    fn proposed_market_rejects_orders() {
        assert!(!MarketState::Proposed.accepts_orders());
        assert!(MarketState::Pending.accepts_orders());
        assert!(MarketState::Succeeded.accepts_orders());
    }

    #[test]
    fn builder_sets_parent() {
        let def = MarketDefinition::new("m2", "USDT").with_parent("m1", Decimal::new(5, 1));
        assert!(def.is_successor());
        assert_eq!(def.parent_market_id, Some(MarketId::new("m1")));
        assert_eq!(def.insurance_pool_fraction, Decimal::new(5, 1));
    }

    #[test]
    fn definition_serde_roundtrip() {
        let def = MarketDefinition::new("m1", "USDT").with_price_monitoring_bound(Decimal::new(1, 1));
        let json = serde_json::to_string(&def).unwrap();
        let back: MarketDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }
}
