//! Events published to the external event sink.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, MarketData, MarketDefinition, MarketId, Order, PartyId, Trade};

/// A ledger account touched by a movement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum AccountId {
    /// Per-market insurance pool.
    Insurance(MarketId),
    /// Network-wide insurance pool for an asset.
    GlobalInsurance,
    /// Per-market liquidity fee pool.
    LiquidityFees(MarketId),
    /// A party's general account.
    General(PartyId),
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insurance(m) => write!(f, "insurance:{m}"),
            Self::GlobalInsurance => write!(f, "global_insurance"),
            Self::LiquidityFees(m) => write!(f, "lp_fees:{m}"),
            Self::General(p) => write!(f, "general:{p}"),
        }
    }
}

/// A single transfer between two ledger accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMovement {
    pub from: AccountId,
    pub to: AccountId,
    pub asset: Asset,
    pub amount: Decimal,
}

/// Everything the engine reports to the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    MarketCreated(MarketDefinition),
    MarketUpdated(MarketDefinition),
    MarketData(MarketData),
    LedgerMovements(Vec<LedgerMovement>),
    OrderUpdated(Order),
    Trade(Trade),
    /// A liquidity commitment was cancelled because the party could not keep
    /// its orders on the book.
    LiquidityProvisionCancelled { market_id: MarketId, party: PartyId },
    LiquidityFeesDistributed {
        market_id: MarketId,
        amounts: Vec<(PartyId, Decimal)>,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Short tag for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MarketCreated(_) => "market_created",
            Self::MarketUpdated(_) => "market_updated",
            Self::MarketData(_) => "market_data",
            Self::LedgerMovements(_) => "ledger_movements",
            Self::OrderUpdated(_) => "order_updated",
            Self::Trade(_) => "trade",
            Self::LiquidityProvisionCancelled { .. } => "liquidity_provision_cancelled",
            Self::LiquidityFeesDistributed { .. } => "liquidity_fees_distributed",
        }
    }
}
