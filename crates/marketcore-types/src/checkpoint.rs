//! Checkpoint records: the minimal per-market state retained across
//! restarts and exposed to successor markets.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketDefinition, MarketId, MarketState, PartyId};

/// One party's equity-like share in a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EquityShareEntry {
    /// Committed stake.
    pub stake: Decimal,
    /// Virtual stake, grown with market value since the party joined.
    pub vstake: Decimal,
    /// Market valuation at which the party entered.
    pub avg_entry_valuation: Decimal,
    /// Normalised share of the market (sums to one across parties).
    pub share: Decimal,
}

/// Equity-like shares keyed by party in deterministic order.
pub type Shares = BTreeMap<PartyId, EquityShareEntry>;

/// In-memory retained state for a market, with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpMarketState {
    pub id: MarketId,
    pub shares: Shares,
    pub insurance_balance: Decimal,
    pub last_trade_value: Decimal,
    /// Discarded once chain time reaches this instant.
    pub ttl: DateTime<Utc>,
    /// Market state when the record was captured.
    pub state: MarketState,
    /// Full definition, present only for Closed or Settled markets.
    pub market: Option<MarketDefinition>,
}

impl CpMarketState {
    /// A record is expired once its TTL is no longer strictly in the future.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl <= now
    }

    #[must_use]
    pub fn to_record(&self) -> CheckpointRecord {
        CheckpointRecord {
            id: self.id.clone(),
            shares: self.shares.clone(),
            insurance_balance: self.insurance_balance,
            last_trade_value: self.last_trade_value,
            market: self.market.clone(),
        }
    }

    /// Rebuilds a retained record from its serialized form.
    #[must_use]
    pub fn from_record(record: CheckpointRecord, ttl: DateTime<Utc>) -> Self {
        let state = record
            .market
            .as_ref()
            .map_or(MarketState::Active, |m| m.state);
        Self {
            id: record.id,
            shares: record.shares,
            insurance_balance: record.insurance_balance,
            last_trade_value: record.last_trade_value,
            ttl,
            state,
            market: record.market,
        }
    }
}

/// Serialized form of one market's retained state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: MarketId,
    pub shares: Shares,
    pub insurance_balance: Decimal,
    pub last_trade_value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<MarketDefinition>,
}

/// Top-level checkpoint payload; `markets` is sorted by ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub version: u32,
    pub markets: Vec<CheckpointRecord>,
}
