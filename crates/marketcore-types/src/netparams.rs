//! Network parameters the engine reacts to.
//!
//! Each tunable is one variant with a typed payload, so an update handler is
//! an exhaustive `match` and there is no "wrong value type" failure path.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Margin level multipliers applied on top of the risk model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingFactors {
    pub search_level: Decimal,
    pub initial_margin: Decimal,
    pub collateral_release: Decimal,
}

impl Default for ScalingFactors {
    fn default() -> Self {
        Self {
            search_level: Decimal::new(11, 1),
            initial_margin: Decimal::new(12, 1),
            collateral_release: Decimal::new(14, 1),
        }
    }
}

/// A network parameter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkParameter {
    // Fanned out to every market and cached for new ones.
    MakerFee(Decimal),
    InfrastructureFee(Decimal),
    LiquidityFeeCap(Decimal),
    AuctionMinDuration(Duration),
    MarginScalingFactors(ScalingFactors),
    LiquidityBondPenalty(Decimal),
    FeeDistributionTimeStep(Duration),
    // Engine-level only.
    SuccessorWindow(Duration),
    MarketCreationQuantumMultiple(Decimal),
    MaxPeggedOrders(u64),
}

impl NetworkParameter {
    /// Canonical dotted key, as governance names it.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::MakerFee(_) => "market.fee.factors.makerFee",
            Self::InfrastructureFee(_) => "market.fee.factors.infrastructureFee",
            Self::LiquidityFeeCap(_) => "market.liquidity.maximumLiquidityFeeFactorLevel",
            Self::AuctionMinDuration(_) => "market.auction.minimumDuration",
            Self::MarginScalingFactors(_) => "market.margin.scalingFactors",
            Self::LiquidityBondPenalty(_) => "market.liquidity.bondPenaltyParameter",
            Self::FeeDistributionTimeStep(_) => "market.liquidity.providers.fee.distributionTimeStep",
            Self::SuccessorWindow(_) => "market.liquidity.successorLaunchWindowLength",
            Self::MarketCreationQuantumMultiple(_) => "market.value.windowLength.quantumMultiple",
            Self::MaxPeggedOrders(_) => "limits.markets.maxPeggedOrders",
        }
    }

    /// Whether the value is applied to individual markets.
    #[must_use]
    pub fn is_market_level(&self) -> bool {
        !matches!(
            self,
            Self::SuccessorWindow(_) | Self::MarketCreationQuantumMultiple(_) | Self::MaxPeggedOrders(_)
        )
    }
}
