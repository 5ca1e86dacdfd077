//! Configuration types for the engine and per-market tunables.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ScalingFactors, constants};

/// Engine-wide configuration, fixed at construction.
///
/// Values here are the genesis defaults; the matching network parameters
/// override them later through `update_network_parameter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a market's checkpoint state stays available to successors.
    pub successor_window_ms: u64,
    /// Multiple of the asset quantum a market must trade for its proposer
    /// to earn a bonus.
    pub market_creation_quantum_multiple: Decimal,
    /// Engine-wide cap on live pegged orders.
    pub max_pegged_orders: u64,
    /// Parameters every new market starts with.
    pub market_defaults: MarketParams,
}

impl EngineConfig {
    /// Successor window as a duration.
    #[must_use]
    pub fn successor_window(&self) -> Duration {
        duration_from_ms(self.successor_window_ms)
    }

    /// A configuration with short windows, convenient for simulations.
    #[must_use]
    pub fn short_windows() -> Self {
        Self {
            successor_window_ms: 60_000,
            market_defaults: MarketParams {
                auction_min_duration_ms: 100,
                fee_distribution_step_ms: 1_000,
                ..MarketParams::default()
            },
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            successor_window_ms: constants::DEFAULT_SUCCESSOR_WINDOW_MS,
            market_creation_quantum_multiple: constants::DEFAULT_MARKET_CREATION_QUANTUM_MULTIPLE,
            max_pegged_orders: constants::DEFAULT_MAX_PEGGED_ORDERS,
            market_defaults: MarketParams::default(),
        }
    }
}

/// Tunables every market carries; updated by network parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    pub maker_fee: Decimal,
    pub infrastructure_fee: Decimal,
    /// Upper bound on the liquidity fee factor a market may charge.
    pub liquidity_fee_cap: Decimal,
    pub auction_min_duration_ms: u64,
    pub scaling_factors: ScalingFactors,
    pub bond_penalty: Decimal,
    pub fee_distribution_step_ms: u64,
}

impl MarketParams {
    #[must_use]
    pub fn auction_min_duration(&self) -> Duration {
        duration_from_ms(self.auction_min_duration_ms)
    }

    #[must_use]
    pub fn fee_distribution_step(&self) -> Duration {
        duration_from_ms(self.fee_distribution_step_ms)
    }
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            maker_fee: Decimal::new(2, 4),
            infrastructure_fee: Decimal::new(5, 4),
            liquidity_fee_cap: Decimal::ONE,
            auction_min_duration_ms: constants::DEFAULT_AUCTION_MIN_DURATION_MS,
            scaling_factors: ScalingFactors::default(),
            bond_penalty: Decimal::new(1, 1),
            fee_distribution_step_ms: constants::DEFAULT_FEE_DISTRIBUTION_STEP_MS,
        }
    }
}

/// Converts milliseconds to a `chrono::Duration`, saturating on overflow.
#[must_use]
pub fn duration_from_ms(ms: u64) -> Duration {
    i64::try_from(ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or(Duration::MAX)
}

/// Converts a duration to whole milliseconds, clamping negatives to zero.
#[must_use]
pub fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.num_milliseconds()).unwrap_or(0)
}
