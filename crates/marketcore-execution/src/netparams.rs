//! Network parameter updates.
//!
//! Market-level parameters are written to the defaults new markets start
//! with and fanned out to every live market. Engine-level parameters only
//! touch engine state.

use chrono::Duration;
use marketcore_types::{Collateral, MarketParams, NetworkParameter, duration_to_ms};

use crate::engine::Engine;

/// Applies a market-level parameter to a parameter set. Engine-level
/// parameters are ignored.
pub(crate) fn apply_to_params(params: &mut MarketParams, param: &NetworkParameter) {
    match *param {
        NetworkParameter::MakerFee(v) => params.maker_fee = v,
        NetworkParameter::InfrastructureFee(v) => params.infrastructure_fee = v,
        NetworkParameter::LiquidityFeeCap(v) => params.liquidity_fee_cap = v,
        NetworkParameter::AuctionMinDuration(d) => params.auction_min_duration_ms = duration_to_ms(d),
        NetworkParameter::MarginScalingFactors(f) => params.scaling_factors = f,
        NetworkParameter::LiquidityBondPenalty(v) => params.bond_penalty = v,
        NetworkParameter::FeeDistributionTimeStep(d) => {
            params.fee_distribution_step_ms = duration_to_ms(d);
        }
        NetworkParameter::SuccessorWindow(_)
        | NetworkParameter::MarketCreationQuantumMultiple(_)
        | NetworkParameter::MaxPeggedOrders(_) => {}
    }
}

impl<C: Collateral> Engine<C> {
    pub fn update_network_parameter(&mut self, param: NetworkParameter) {
        tracing::info!(key = param.key(), value = ?param, "Network parameter updated");
        match param {
            NetworkParameter::SuccessorWindow(window) => self.on_successor_window_update(window),
            NetworkParameter::MarketCreationQuantumMultiple(multiple) => {
                self.config.market_creation_quantum_multiple = multiple;
            }
            NetworkParameter::MaxPeggedOrders(max) => self.config.max_pegged_orders = max,
            NetworkParameter::MakerFee(_)
            | NetworkParameter::InfrastructureFee(_)
            | NetworkParameter::LiquidityFeeCap(_)
            | NetworkParameter::AuctionMinDuration(_)
            | NetworkParameter::MarginScalingFactors(_)
            | NetworkParameter::LiquidityBondPenalty(_)
            | NetworkParameter::FeeDistributionTimeStep(_) => {
                apply_to_params(&mut self.config.market_defaults, &param);
                for id in self.market_order.clone() {
                    if let Some(market) = self.markets.get_mut(&id) {
                        market.apply_network_parameter(&param);
                    }
                    self.flush(&id);
                }
            }
        }
    }

    /// Retained records keep their remaining lifetime relative to the new
    /// window: every TTL moves by the change in window length.
    fn on_successor_window_update(&mut self, window: Duration) {
        let delta = window - self.config.successor_window();
        if delta != Duration::zero() {
            for state in self.cp_states.values_mut() {
                state.ttl += delta;
            }
        }
        self.config.successor_window_ms = duration_to_ms(window);
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn market_level_values_land_in_params() {
        let mut params = MarketParams::default();
        apply_to_params(&mut params, &NetworkParameter::MakerFee(Decimal::new(3, 4)));
        apply_to_params(
            &mut params,
            &NetworkParameter::AuctionMinDuration(Duration::seconds(2)),
        );
        assert_eq!(params.maker_fee, Decimal::new(3, 4));
        assert_eq!(params.auction_min_duration_ms, 2_000);
    }

    #[test]
    fn engine_level_values_leave_params_alone() {
        let mut params = MarketParams::default();
        apply_to_params(&mut params, &NetworkParameter::MaxPeggedOrders(1));
        apply_to_params(&mut params, &NetworkParameter::SuccessorWindow(Duration::hours(1)));
        assert_eq!(params, MarketParams::default());
    }
}
