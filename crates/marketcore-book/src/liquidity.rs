//! Default liquidity-shape component.
//!
//! Each provider's commitment is turned into one limit order per shape leg.
//! The committed amount is split across a side's legs by proportion and
//! converted to size at the leg's price. Every recalculation cancels the
//! previous batch and emits a fresh one; while entering an auction only the
//! cancellations are produced.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use marketcore_types::constants::LIQUIDITY_SIZE_PRECISION;
use marketcore_types::*;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::{Digest, Sha256};

/// Commitments and live generated orders for one market.
#[derive(Debug)]
pub struct LiquidityEngine {
    market: MarketId,
    /// Namespace for generated order IDs so they never collide with user
    /// order IDs of the same market.
    id_namespace: MarketId,
    commitments: BTreeMap<PartyId, LiquidityCommitment>,
    live: BTreeMap<PartyId, BTreeSet<OrderId>>,
    sequence: u64,
}

impl LiquidityEngine {
    #[must_use]
    pub fn new(market: MarketId) -> Self {
        let id_namespace = MarketId::new(format!("{market}/lp"));
        Self {
            market,
            id_namespace,
            commitments: BTreeMap::new(),
            live: BTreeMap::new(),
            sequence: 0,
        }
    }

    /// Live generated orders of a party.
    #[must_use]
    pub fn live_orders(&self, party: &PartyId) -> Vec<OrderId> {
        self.live
            .get(party)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn not_found(&self, party: &PartyId) -> MarketcoreError {
        MarketcoreError::LiquidityProvisionNotFound {
            market: self.market.clone(),
            party: party.clone(),
        }
    }

    fn take_live(&mut self, party: &PartyId) -> Vec<OrderId> {
        self.live
            .remove(party)
            .map(|ids| ids.into_iter().collect())
            .unwrap_or_default()
    }

    fn shape_orders(
        &mut self,
        party: &PartyId,
        commitment: &LiquidityCommitment,
        prices: ReferencePrices,
        now: DateTime<Utc>,
    ) -> Vec<Order> {
        let mut orders = Vec::new();
        for (side, legs) in [(OrderSide::Buy, &commitment.buys), (OrderSide::Sell, &commitment.sells)] {
            let total: u32 = legs.iter().map(|leg| leg.proportion).sum();
            if total == 0 {
                continue;
            }
            for leg in legs {
                let Some(price) = prices
                    .get(leg.reference)
                    .and_then(|reference| PeggedOrder::new(leg.reference, leg.offset).price_from(side, reference))
                else {
                    tracing::debug!(
                        market = %self.market,
                        party = %party,
                        side = %side,
                        "No price for liquidity shape leg, skipping"
                    );
                    continue;
                };

                let share = commitment.commitment_amount * Decimal::from(leg.proportion) / Decimal::from(total);
                let size = (share / price)
                    .round_dp_with_strategy(LIQUIDITY_SIZE_PRECISION, RoundingStrategy::ToZero);
                if size.is_zero() {
                    continue;
                }

                let sequence = self.sequence;
                self.sequence += 1;
                orders.push(Order {
                    id: OrderId::deterministic(&self.id_namespace, sequence),
                    market_id: self.market.clone(),
                    party: party.clone(),
                    side,
                    order_type: OrderType::Limit,
                    status: OrderStatus::Active,
                    price,
                    size,
                    remaining: size,
                    pegged: None,
                    origin: OrderOrigin::Liquidity,
                    sequence,
                    created_at: now,
                    updated_at: now,
                    expires_at: None,
                });
            }
        }
        orders
    }
}

impl LiquidityShape for LiquidityEngine {
    fn submit(&mut self, party: &PartyId, commitment: LiquidityCommitment) -> Result<()> {
        if self.commitments.contains_key(party) {
            return Err(MarketcoreError::LiquidityProvisionExists(party.clone()));
        }
        commitment.validate()?;
        tracing::debug!(
            market = %self.market,
            party = %party,
            amount = %commitment.commitment_amount,
            "Liquidity provision submitted"
        );
        self.commitments.insert(party.clone(), commitment);
        Ok(())
    }

    fn amend(&mut self, party: &PartyId, amendment: &LiquidityAmendment) -> Result<()> {
        let current = self
            .commitments
            .get(party)
            .ok_or_else(|| self.not_found(party))?;
        let next = amendment.apply(current);
        next.validate()?;
        self.commitments.insert(party.clone(), next);
        Ok(())
    }

    fn cancel(&mut self, party: &PartyId) -> Result<Vec<OrderId>> {
        if self.commitments.remove(party).is_none() {
            return Err(self.not_found(party));
        }
        Ok(self.take_live(party))
    }

    fn commitment(&self, party: &PartyId) -> Option<&LiquidityCommitment> {
        self.commitments.get(party)
    }

    fn stake(&self, party: &PartyId) -> Decimal {
        self.commitments
            .get(party)
            .map_or(Decimal::ZERO, |c| c.commitment_amount)
    }

    fn providers(&self) -> Vec<PartyId> {
        self.commitments.keys().cloned().collect()
    }

    fn update(
        &mut self,
        prices: ReferencePrices,
        updated_orders: &[Order],
        entering_auction: bool,
        now: DateTime<Utc>,
    ) -> Result<LiquidityUpdate> {
        // Filled orders are gone already; no need to cancel them.
        for order in updated_orders.iter().filter(|o| !o.status.is_live()) {
            if let Some(ids) = self.live.get_mut(&order.party) {
                ids.remove(&order.id);
            }
        }

        let parties: Vec<PartyId> = self.live.keys().cloned().collect();
        let cancels: Vec<LiquidityCancel> = parties
            .into_iter()
            .filter_map(|party| {
                let order_ids = self.take_live(&party);
                (!order_ids.is_empty()).then_some(LiquidityCancel { party, order_ids })
            })
            .collect();

        if entering_auction {
            return Ok(LiquidityUpdate {
                new_orders: Vec::new(),
                cancels,
            });
        }

        let commitments: Vec<(PartyId, LiquidityCommitment)> = self
            .commitments
            .iter()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        let mut new_orders = Vec::new();
        for (party, commitment) in &commitments {
            new_orders.extend(self.shape_orders(party, commitment, prices, now));
        }

        Ok(LiquidityUpdate { new_orders, cancels })
    }

    fn set_active(&mut self, party: &PartyId, order: OrderId) {
        self.live.entry(party.clone()).or_default().insert(order);
    }

    fn cancel_distressed(&mut self, party: &PartyId) -> Vec<OrderId> {
        if self.commitments.remove(party).is_some() {
            tracing::warn!(
                market = %self.market,
                party = %party,
                "Liquidity provider distressed, commitment cancelled"
            );
        }
        self.take_live(party)
    }

    fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"marketcore:liquidity:v1:");
        hasher.update(self.market.as_str().as_bytes());
        hasher.update((self.commitments.len() as u64).to_le_bytes());
        for (party, commitment) in &self.commitments {
            hasher.update(party.as_str().as_bytes());
            hasher.update(commitment.commitment_amount.to_string().as_bytes());
            hasher.update(commitment.fee.to_string().as_bytes());
            for leg in commitment.buys.iter().chain(&commitment.sells) {
                hasher.update([leg.reference as u8]);
                hasher.update(leg.proportion.to_le_bytes());
                hasher.update(leg.offset.to_string().as_bytes());
            }
        }
        for (party, ids) in &self.live {
            hasher.update(party.as_str().as_bytes());
            for id in ids {
                hasher.update(id.0.as_bytes());
            }
        }
        hasher.update(self.sequence.to_le_bytes());
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    fn commitment(amount: i64) -> LiquidityCommitment {
        LiquidityCommitment {
            market_id: MarketId::new("TEST"),
            commitment_amount: Decimal::new(amount, 0),
            fee: Decimal::new(1, 3),
            buys: vec![
                ShapeEntry::new(PeggedReference::BestBid, 1, Decimal::ONE),
                ShapeEntry::new(PeggedReference::Mid, 1, Decimal::new(2, 0)),
            ],
            sells: vec![ShapeEntry::new(PeggedReference::BestAsk, 1, Decimal::ONE)],
        }
    }

    fn prices() -> ReferencePrices {
        ReferencePrices {
            best_bid: Some(Decimal::new(99, 0)),
            best_ask: Some(Decimal::new(101, 0)),
        }
    }

    fn engine_with(party: &str) -> (LiquidityEngine, PartyId) {
        let mut engine = LiquidityEngine::new(MarketId::new("TEST"));
        let party = PartyId::new(party);
        engine.submit(&party, commitment(1000)).unwrap();
        (engine, party)
    }

    #[test]
    fn duplicate_commitment_rejected() {
        let (mut engine, party) = engine_with("lp");
        assert_eq!(
            engine.submit(&party, commitment(10)),
            Err(MarketcoreError::LiquidityProvisionExists(party.clone()))
        );
    }

    #[test]
    fn shape_prices_and_sizes() {
        let (mut engine, _) = engine_with("lp");
        let update = engine.update(prices(), &[], false, now()).unwrap();
        assert!(update.cancels.is_empty());
        assert_eq!(update.new_orders.len(), 3);

        let buy_bid = &update.new_orders[0];
        assert_eq!(buy_bid.side, OrderSide::Buy);
        assert_eq!(buy_bid.price, Decimal::new(98, 0));
        assert_eq!(buy_bid.origin, OrderOrigin::Liquidity);
        // 500 / 98, truncated to 8 dp
        assert_eq!(buy_bid.size, Decimal::new(510_204_081, 8));

        let buy_mid = &update.new_orders[1];
        assert_eq!(buy_mid.price, Decimal::new(98, 0));

        let sell = &update.new_orders[2];
        assert_eq!(sell.price, Decimal::new(102, 0));
        assert_eq!(sell.side, OrderSide::Sell);
    }

    #[test]
    fn missing_reference_skips_leg() {
        let (mut engine, _) = engine_with("lp");
        let update = engine
            .update(
                ReferencePrices {
                    best_bid: Some(Decimal::new(99, 0)),
                    best_ask: None,
                },
                &[],
                false,
                now(),
            )
            .unwrap();
        assert_eq!(update.new_orders.len(), 1);
    }

    #[test]
    fn update_cancels_previous_batch() {
        let (mut engine, party) = engine_with("lp");
        let first = engine.update(prices(), &[], false, now()).unwrap();
        for order in &first.new_orders {
            engine.set_active(&party, order.id);
        }
        let second = engine.update(prices(), &[], false, now()).unwrap();
        assert_eq!(second.cancels.len(), 1);
        assert_eq!(second.cancels[0].order_ids.len(), 3);
        assert!(second.new_orders.iter().all(|o| first.new_orders.iter().all(|f| f.id != o.id)));
    }

    #[test]
    fn filled_orders_not_cancelled() {
        let (mut engine, party) = engine_with("lp");
        let first = engine.update(prices(), &[], false, now()).unwrap();
        for order in &first.new_orders {
            engine.set_active(&party, order.id);
        }
        let mut filled = first.new_orders[0].clone();
        filled.status = OrderStatus::Filled;
        let second = engine.update(prices(), &[filled.clone()], false, now()).unwrap();
        assert!(!second.cancels[0].order_ids.contains(&filled.id));
    }

    #[test]
    fn entering_auction_only_cancels() {
        let (mut engine, party) = engine_with("lp");
        let first = engine.update(prices(), &[], false, now()).unwrap();
        engine.set_active(&party, first.new_orders[0].id);
        let update = engine.update(prices(), &[], true, now()).unwrap();
        assert!(update.new_orders.is_empty());
        assert_eq!(update.cancels.len(), 1);
    }

    #[test]
    fn cancel_returns_live_orders() {
        let (mut engine, party) = engine_with("lp");
        let first = engine.update(prices(), &[], false, now()).unwrap();
        engine.set_active(&party, first.new_orders[0].id);
        let ids = engine.cancel(&party).unwrap();
        assert_eq!(ids, vec![first.new_orders[0].id]);
        assert!(engine.providers().is_empty());
        assert!(matches!(
            engine.cancel(&party),
            Err(MarketcoreError::LiquidityProvisionNotFound { .. })
        ));
    }

    #[test]
    fn amend_and_stake() {
        let (mut engine, party) = engine_with("lp");
        engine
            .amend(
                &party,
                &LiquidityAmendment {
                    commitment_amount: Some(Decimal::new(2000, 0)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(engine.stake(&party), Decimal::new(2000, 0));
        assert_eq!(engine.stake(&PartyId::new("nobody")), Decimal::ZERO);
    }

    #[test]
    fn distressed_party_dropped() {
        let (mut engine, party) = engine_with("lp");
        let before = engine.hash();
        assert!(engine.cancel_distressed(&party).is_empty());
        assert!(engine.commitment(&party).is_none());
        assert_ne!(before, engine.hash());
    }
}
