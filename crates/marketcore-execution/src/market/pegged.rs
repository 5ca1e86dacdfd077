//! Side index of a market's pegged orders.
//!
//! Tracks every live pegged order in arrival order. Orders on the book are
//! referenced by ID only; parked orders are held here in full because the
//! book no longer has them.

use std::collections::BTreeMap;

use marketcore_types::{Order, OrderId, PartyId};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Default)]
pub struct PeggedOrders {
    ids: Vec<OrderId>,
    parked: BTreeMap<OrderId, Order>,
}

impl PeggedOrders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an order that rests on the book.
    pub fn add(&mut self, id: OrderId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    /// Track an order off the book.
    pub fn add_parked(&mut self, order: Order) {
        self.add(order.id);
        self.parked.insert(order.id, order);
    }

    /// Move an order that was on the book into the parked set.
    pub fn park(&mut self, order: Order) {
        self.parked.insert(order.id, order);
    }

    /// Take a parked order out of the parked set; it stays tracked.
    pub fn unpark(&mut self, id: &OrderId) -> Option<Order> {
        self.parked.remove(id)
    }

    /// Stop tracking an order. Returns the order if it was parked.
    pub fn remove(&mut self, id: &OrderId) -> Option<Order> {
        self.ids.retain(|i| i != id);
        self.parked.remove(id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<OrderId> {
        self.ids.clone()
    }

    #[must_use]
    pub fn contains(&self, id: &OrderId) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn is_parked(&self, id: &OrderId) -> bool {
        self.parked.contains_key(id)
    }

    #[must_use]
    pub fn get_parked(&self, id: &OrderId) -> Option<&Order> {
        self.parked.get(id)
    }

    /// Parked orders of a party, in arrival order.
    #[must_use]
    pub fn parked_for_party(&self, party: &PartyId) -> Vec<OrderId> {
        self.ids
            .iter()
            .filter(|id| self.parked.get(id).is_some_and(|o| o.party == *party))
            .copied()
            .collect()
    }

    /// IDs tracked as on the book, in arrival order.
    #[must_use]
    pub fn on_book(&self) -> Vec<OrderId> {
        self.ids
            .iter()
            .filter(|id| !self.parked.contains_key(id))
            .copied()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    pub(crate) fn hash_into(&self, hasher: &mut Sha256) {
        hasher.update((self.ids.len() as u64).to_le_bytes());
        for id in &self.ids {
            hasher.update(id.0.as_bytes());
            hasher.update([u8::from(self.parked.contains_key(id))]);
        }
    }
}

#[cfg(test)]
mod tests {
    use marketcore_types::OrderSide;
    use rust_decimal::Decimal;

    use super::*;

    fn order(seq: u64) -> Order {
        Order::dummy_with_sequence("p", OrderSide::Buy, Decimal::ONE, Decimal::ONE, seq)
    }

    #[test]
    fn arrival_order_is_kept_across_parking() {
        let mut index = PeggedOrders::new();
        let (a, b, c) = (order(1), order(2), order(3));
        index.add(a.id);
        index.add_parked(b.clone());
        index.add(c.id);

        index.park(a.clone());
        assert_eq!(index.ids(), vec![a.id, b.id, c.id]);
        assert_eq!(index.on_book(), vec![c.id]);
        assert_eq!(index.parked_len(), 2);

        assert!(index.unpark(&b.id).is_some());
        assert!(index.contains(&b.id));
        assert!(!index.is_parked(&b.id));
    }

    #[test]
    fn remove_untracks() {
        let mut index = PeggedOrders::new();
        let a = order(1);
        index.add_parked(a.clone());
        assert_eq!(index.remove(&a.id), Some(a.clone()));
        assert!(index.is_empty());
        assert!(index.remove(&a.id).is_none());
    }

    #[test]
    fn parked_for_party_filters() {
        let mut index = PeggedOrders::new();
        let mut other = order(2);
        other.party = PartyId::new("q");
        index.add_parked(order(1));
        index.add_parked(other);
        assert_eq!(index.parked_for_party(&PartyId::new("p")).len(), 1);
    }
}
