//! Liquidity provision commitments and the shape component's output.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    MarketId, MarketcoreError, Order, OrderId, OrderSide, PartyId, PeggedOrder, PeggedReference,
    Result,
};

/// One leg of a liquidity shape: volume is split across legs by
/// `proportion`, each priced `offset` away from its reference (buys below,
/// sells above).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeEntry {
    pub reference: PeggedReference,
    pub proportion: u32,
    pub offset: Decimal,
}

impl ShapeEntry {
    #[must_use]
    pub fn new(reference: PeggedReference, proportion: u32, offset: Decimal) -> Self {
        Self {
            reference,
            proportion,
            offset,
        }
    }
}

/// A party's commitment to keep a shape of orders around the reference price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityCommitment {
    pub market_id: MarketId,
    /// Committed notional (bond) in the settlement asset.
    pub commitment_amount: Decimal,
    /// Proposed liquidity fee.
    pub fee: Decimal,
    pub buys: Vec<ShapeEntry>,
    pub sells: Vec<ShapeEntry>,
}

impl LiquidityCommitment {
    pub fn validate(&self) -> Result<()> {
        if self.commitment_amount <= Decimal::ZERO {
            return Err(MarketcoreError::InvalidLiquidityProvision {
                reason: "commitment amount must be positive".into(),
            });
        }
        if self.fee < Decimal::ZERO {
            return Err(MarketcoreError::InvalidLiquidityProvision {
                reason: "fee cannot be negative".into(),
            });
        }
        if self.buys.is_empty() || self.sells.is_empty() {
            return Err(MarketcoreError::InvalidLiquidityProvision {
                reason: "shape needs at least one buy and one sell".into(),
            });
        }
        let legs = self
            .buys
            .iter()
            .map(|e| (OrderSide::Buy, e))
            .chain(self.sells.iter().map(|e| (OrderSide::Sell, e)));
        for (side, entry) in legs {
            if entry.proportion == 0 {
                return Err(MarketcoreError::InvalidLiquidityProvision {
                    reason: "shape proportions must be non-zero".into(),
                });
            }
            // Same placement rules as pegged orders.
            PeggedOrder::new(entry.reference, entry.offset)
                .validate(side)
                .map_err(|e| MarketcoreError::InvalidLiquidityProvision {
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}

/// Partial update to an existing commitment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityAmendment {
    pub market_id: MarketId,
    pub commitment_amount: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub buys: Option<Vec<ShapeEntry>>,
    pub sells: Option<Vec<ShapeEntry>>,
}

impl LiquidityAmendment {
    /// Applies the amendment on top of `current`, returning the new commitment.
    #[must_use]
    pub fn apply(&self, current: &LiquidityCommitment) -> LiquidityCommitment {
        LiquidityCommitment {
            market_id: current.market_id.clone(),
            commitment_amount: self.commitment_amount.unwrap_or(current.commitment_amount),
            fee: self.fee.unwrap_or(current.fee),
            buys: self.buys.clone().unwrap_or_else(|| current.buys.clone()),
            sells: self.sells.clone().unwrap_or_else(|| current.sells.clone()),
        }
    }
}

/// Best static prices handed to the shape component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferencePrices {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

impl ReferencePrices {
    #[must_use]
    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, reference: PeggedReference) -> Option<Decimal> {
        match reference {
            PeggedReference::Mid => self.mid(),
            PeggedReference::BestBid => self.best_bid,
            PeggedReference::BestAsk => self.best_ask,
        }
    }
}

/// Orders a party should no longer have on the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityCancel {
    pub party: PartyId,
    pub order_ids: Vec<OrderId>,
}

/// Result of a shape recalculation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiquidityUpdate {
    /// Replacement orders, grouped by party in party-ID order.
    pub new_orders: Vec<Order>,
    pub cancels: Vec<LiquidityCancel>,
}
