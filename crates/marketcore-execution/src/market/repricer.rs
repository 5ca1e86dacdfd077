//! Special-order repricer.
//!
//! Pegged and liquidity orders are priced off the static book (orders that
//! are neither pegged nor generated from a commitment). Whenever a static
//! reference moves they are pulled, repriced and put back passively:
//!
//! 1. liquidity orders come off the book and the shape component produces
//!    their replacements
//! 2. affected pegged orders are repriced in arrival order; an order without
//!    a valid price is parked
//! 3. repriced pegged orders are placed back, consulting price monitoring
//!    after each placement
//! 4. the replacement liquidity orders are placed
//!
//! Passive placement can never trade. A placement that would cross means the
//! static references were wrong, which no replica can recover from.

use std::collections::{BTreeMap, BTreeSet};

use marketcore_types::{
    Event, Order, OrderId, OrderStatus, PartyId, PeggedReference, PlacementError,
    ReferencePrices,
};
use rust_decimal::Decimal;

use super::Market;
use crate::fatal::invariant_violated;

/// Best static bid, best static ask and their mid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StaticReferences {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub mid: Option<Decimal>,
}

impl StaticReferences {
    fn prices(self) -> ReferencePrices {
        ReferencePrices {
            best_bid: self.best_bid,
            best_ask: self.best_ask,
        }
    }

    /// References whose value differs from `previous`.
    fn changed_since(self, previous: Self) -> Vec<PeggedReference> {
        let mut changed = Vec::new();
        if self.mid != previous.mid {
            changed.push(PeggedReference::Mid);
        }
        if self.best_bid != previous.best_bid {
            changed.push(PeggedReference::BestBid);
        }
        if self.best_ask != previous.best_ask {
            changed.push(PeggedReference::BestAsk);
        }
        changed
    }
}

const ALL_REFERENCES: [PeggedReference; 3] = [
    PeggedReference::Mid,
    PeggedReference::BestBid,
    PeggedReference::BestAsk,
];

impl Market {
    fn static_references(&self) -> StaticReferences {
        let prices = ReferencePrices {
            best_bid: self.book.best_static_bid(),
            best_ask: self.book.best_static_ask(),
        };
        StaticReferences {
            best_bid: prices.best_bid,
            best_ask: prices.best_ask,
            mid: prices.mid(),
        }
    }

    /// Price a pegged order would take right now, if any.
    pub(super) fn pegged_price(&self, order: &Order) -> Option<Decimal> {
        if self.auction.in_auction() {
            return None;
        }
        let peg = order.pegged?;
        let reference = self.static_references().prices().get(peg.reference)?;
        peg.price_from(order.side, reference)
    }

    /// Takes a pegged order off the book's price grid: price zeroed, status
    /// Parked, held in the side index.
    pub(super) fn park_pegged(&mut self, mut order: Order) {
        order.park(self.now);
        tracing::debug!(market = %self.def.id, order = %order.id, "Pegged order parked");
        self.emit(Event::OrderUpdated(order.clone()));
        self.pegged.park(order);
    }

    /// Entry point after anything that may have moved the static book.
    ///
    /// `updated` are orders touched since the last cycle (fills, amendments).
    /// With no reference change and nothing updated this is a no-op unless
    /// `force` is set.
    pub(super) fn check_for_reference_moves(&mut self, updated: Vec<Order>, force: bool) {
        if self.auction.in_auction() {
            return;
        }
        let current = self.static_references();
        let changed = if force {
            ALL_REFERENCES.to_vec()
        } else {
            current.changed_since(self.references)
        };
        if changed.is_empty() && updated.is_empty() {
            return;
        }

        let replacements = self.pull_liquidity_orders(&updated, current);
        if !changed.is_empty() && self.reprice_pegged(&changed, current) {
            // Price monitoring fired; auction entry has dealt with the rest.
            self.references = self.static_references();
            return;
        }
        if let Some(orders) = replacements {
            self.place_liquidity_orders(orders);
        }
        self.references = current;
    }

    /// Regenerates liquidity orders outside of any reference move.
    pub(super) fn refresh_liquidity(&mut self) {
        if self.auction.in_auction() {
            return;
        }
        let current = self.static_references();
        if let Some(orders) = self.pull_liquidity_orders(&[], current) {
            self.place_liquidity_orders(orders);
        }
    }

    /// Steps 1 and 2: reprice affected pegged orders and put them back.
    /// Returns `true` if price monitoring moved the market into an auction.
    fn reprice_pegged(&mut self, changed: &[PeggedReference], refs: StaticReferences) -> bool {
        let prices = refs.prices();
        let mut staged = Vec::new();

        for id in self.pegged.ids() {
            let order = self
                .pegged
                .get_parked(&id)
                .or_else(|| self.book.get(&id));
            let Some(order) = order else {
                invariant_violated(
                    &self.def.id,
                    &format!("pegged order {id} neither parked nor on the book"),
                );
            };
            let Some(peg) = order.pegged else {
                invariant_violated(&self.def.id, &format!("order {id} tracked as pegged has no peg"));
            };
            if !changed.contains(&peg.reference) {
                continue;
            }

            let mut order = match self.pegged.unpark(&id) {
                Some(parked) => parked,
                None => match self.book.remove(&id, OrderStatus::Parked) {
                    Ok(order) => order,
                    Err(err) => invariant_violated(
                        &self.def.id,
                        &format!("pegged order {id} could not be taken off the book: {err}"),
                    ),
                },
            };

            match prices
                .get(peg.reference)
                .and_then(|reference| peg.price_from(order.side, reference))
            {
                Some(price) => {
                    order.price = price;
                    order.updated_at = self.now;
                    staged.push(order);
                }
                None => self.park_pegged(order),
            }
        }

        let mut staged = staged.into_iter();
        while let Some(order) = staged.next() {
            let id = order.id;
            match self.book.place_passive(order.clone()) {
                Ok(placed) => self.emit(Event::OrderUpdated(placed)),
                Err(PlacementError::WouldCross { order, touch }) => invariant_violated(
                    &self.def.id,
                    &format!("repriced pegged order {order} would cross at {touch}"),
                ),
                Err(PlacementError::Rejected(err)) => {
                    tracing::warn!(
                        market = %self.def.id,
                        order = %id,
                        error = %err,
                        "Repriced pegged order rejected by the book, dropping it"
                    );
                    self.pegged.remove(&id);
                    self.emit(Event::OrderUpdated(Order {
                        status: OrderStatus::Rejected,
                        ..order
                    }));
                }
            }

            if self
                .trigger
                .on_book_change(self.book.best_bid(), self.book.best_ask())
            {
                for rest in staged.by_ref() {
                    self.park_pegged(rest);
                }
                self.enter_monitoring_auction();
                return true;
            }
        }
        false
    }

    /// Removes every live liquidity order and asks the shape component for
    /// replacements. `None` when the static book cannot price them.
    fn pull_liquidity_orders(
        &mut self,
        updated: &[Order],
        refs: StaticReferences,
    ) -> Option<Vec<Order>> {
        if refs.best_bid.is_none() || refs.best_ask.is_none() {
            if !self.liquidity.providers().is_empty() {
                tracing::warn!(
                    market = %self.def.id,
                    best_static_bid = ?refs.best_bid,
                    best_static_ask = ?refs.best_ask,
                    "No static reference prices, liquidity orders not refreshed"
                );
            }
            return None;
        }
        match self.liquidity.update(refs.prices(), updated, false, self.now) {
            Ok(update) => {
                for cancel in update.cancels {
                    self.remove_liquidity_orders(&cancel.order_ids);
                }
                Some(update.new_orders)
            }
            Err(err) => {
                tracing::warn!(market = %self.def.id, error = %err, "Liquidity update failed");
                None
            }
        }
    }

    /// Step 4. A party whose order the book refuses is distressed: its
    /// orders from this batch come off again and its commitment is dropped.
    fn place_liquidity_orders(&mut self, orders: Vec<Order>) {
        let mut distressed: BTreeSet<PartyId> = BTreeSet::new();
        let mut placed: BTreeMap<PartyId, Vec<OrderId>> = BTreeMap::new();

        for order in orders {
            if distressed.contains(&order.party) {
                continue;
            }
            let party = order.party.clone();
            let id = order.id;
            match self.book.place_passive(order) {
                Ok(order) => {
                    self.liquidity.set_active(&party, id);
                    placed.entry(party).or_default().push(id);
                    self.emit(Event::OrderUpdated(order));
                }
                Err(PlacementError::WouldCross { order, touch }) => invariant_violated(
                    &self.def.id,
                    &format!("liquidity order {order} would cross at {touch}"),
                ),
                Err(PlacementError::Rejected(err)) => {
                    tracing::warn!(
                        market = %self.def.id,
                        party = %party,
                        order = %id,
                        error = %err,
                        "Liquidity order rejected, provider distressed"
                    );
                    let batch = placed.remove(&party).unwrap_or_default();
                    self.cancel_distressed(&party, &batch);
                    distressed.insert(party);
                }
            }
        }
    }

    fn cancel_distressed(&mut self, party: &PartyId, batch: &[OrderId]) {
        self.remove_liquidity_orders(batch);
        let live = self.liquidity.cancel_distressed(party);
        self.remove_liquidity_orders(&live);
        self.equity.set_party_stake(party, Decimal::ZERO);
        self.emit(Event::LiquidityProvisionCancelled {
            market_id: self.def.id.clone(),
            party: party.clone(),
        });
    }

    /// Takes liquidity orders off the book. Orders already gone (filled) are
    /// skipped.
    pub(super) fn remove_liquidity_orders(&mut self, ids: &[OrderId]) {
        for id in ids {
            match self.book.remove(id, OrderStatus::Cancelled) {
                Ok(mut order) => {
                    order.updated_at = self.now;
                    self.emit(Event::OrderUpdated(order));
                }
                Err(_) => {
                    tracing::trace!(market = %self.def.id, order = %id, "Liquidity order already off the book");
                }
            }
        }
    }

    /// Auction entry: every pegged order on the book is parked and liquidity
    /// orders are cancelled without replacement.
    pub(super) fn enter_auction_special_orders(&mut self) {
        for id in self.pegged.on_book() {
            match self.book.remove(&id, OrderStatus::Parked) {
                Ok(order) => self.park_pegged(order),
                Err(err) => invariant_violated(
                    &self.def.id,
                    &format!("pegged order {id} missing from the book on auction entry: {err}"),
                ),
            }
        }

        let prices = self.static_references().prices();
        match self.liquidity.update(prices, &[], true, self.now) {
            Ok(update) => {
                if let Some(order) = update.new_orders.first() {
                    invariant_violated(
                        &self.def.id,
                        &format!("liquidity order {} created while entering an auction", order.id),
                    );
                }
                for cancel in update.cancels {
                    self.remove_liquidity_orders(&cancel.order_ids);
                }
            }
            Err(err) => {
                tracing::warn!(market = %self.def.id, error = %err, "Liquidity cancel on auction entry failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(bid: Option<i64>, ask: Option<i64>) -> StaticReferences {
        let prices = ReferencePrices {
            best_bid: bid.map(Decimal::from),
            best_ask: ask.map(Decimal::from),
        };
        StaticReferences {
            best_bid: prices.best_bid,
            best_ask: prices.best_ask,
            mid: prices.mid(),
        }
    }

    #[test]
    fn no_change_detected_for_identical_references() {
        assert!(refs(Some(99), Some(101)).changed_since(refs(Some(99), Some(101))).is_empty());
    }

    #[test]
    fn bid_move_also_moves_mid() {
        let changed = refs(Some(100), Some(101)).changed_since(refs(Some(99), Some(101)));
        assert_eq!(changed, vec![PeggedReference::Mid, PeggedReference::BestBid]);
    }

    #[test]
    fn symmetric_move_keeps_mid() {
        let changed = refs(Some(98), Some(102)).changed_since(refs(Some(99), Some(101)));
        assert_eq!(changed, vec![PeggedReference::BestBid, PeggedReference::BestAsk]);
    }
}
