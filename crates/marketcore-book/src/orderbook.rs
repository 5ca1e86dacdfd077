//! Default [`Book`] implementation: one price-time book per market.
//!
//! Levels live in two `BTreeMap`s so that iterating either side starts at
//! its best price (bids are keyed by `Reverse`). A side index from order ID
//! to `(side, price)` finds an order's level without scanning; it is never
//! iterated, so its hash order cannot leak into results.
//!
//! In continuous trading incoming orders match in price-time priority at the
//! resting order's price. During an auction orders only rest; leaving the
//! auction uncrosses the book at a single clearing price.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use marketcore_types::*;
use rust_decimal::Decimal;

use crate::clearing::uncrossing;
use crate::determinism::compute_book_hash;
use crate::price_level::PriceLevel;

#[derive(Debug)]
pub struct OrderBook {
    market: MarketId,
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
    index: HashMap<OrderId, (OrderSide, Decimal)>,
    in_auction: bool,
    /// Sequence feeding deterministic trade IDs.
    fill_sequence: u64,
}

impl OrderBook {
    #[must_use]
    pub fn new(market: MarketId) -> Self {
        Self {
            market,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            in_auction: false,
            fill_sequence: 0,
        }
    }

    #[must_use]
    pub fn market(&self) -> &MarketId {
        &self.market
    }

    // =================================================================
    // Insertion / removal
    // =================================================================

    /// Rest an order on the book at its limit price without matching.
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if self.index.contains_key(&order.id) {
            return Err(MarketcoreError::DuplicateOrder(order.id));
        }

        let price = order.price;
        self.index.insert(order.id, (order.side, price));

        match order.side {
            OrderSide::Buy => {
                self.bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price))
                    .enqueue(order);
            }
            OrderSide::Sell => {
                self.asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price))
                    .enqueue(order);
            }
        }
        Ok(())
    }

    /// Remove an order by ID. Returns the removed order.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Result<Order> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(MarketcoreError::OrderNotFound(*order_id))?;

        let order = self
            .level_mut(side, price)
            .and_then(|level| level.take(order_id))
            .ok_or(MarketcoreError::OrderNotFound(*order_id))?;
        self.drop_level_if_empty(side, price);
        Ok(order)
    }

    // =================================================================
    // Matching
    // =================================================================

    /// Match an incoming order against the opposite side, resting any
    /// limit remainder.
    ///
    /// An order that meets its own party's resting order is stopped; market
    /// order remainders are stopped rather than rested.
    pub fn match_order(&mut self, mut order: Order, now: DateTime<Utc>) -> Result<OrderConfirmation> {
        if self.index.contains_key(&order.id) {
            return Err(MarketcoreError::DuplicateOrder(order.id));
        }

        let opposite = order.side.opposite();
        let mut trades = Vec::new();
        let mut passive_updates = Vec::new();

        while !order.remaining.is_zero() {
            let Some(price) = self.best_price(opposite) else {
                break;
            };
            if !order.crosses(price) {
                break;
            }

            let (resting, fill) = {
                let Some(front) = self.level_mut(opposite, price).and_then(PriceLevel::head_mut)
                else {
                    break;
                };
                if front.party == order.party {
                    tracing::debug!(
                        market = %order.market_id,
                        party = %order.party,
                        order = %order.id,
                        resting = %front.id,
                        "Self-trade prevented, stopping incoming order"
                    );
                    order.status = OrderStatus::Stopped;
                    break;
                }
                let fill = order.remaining.min(front.remaining);
                front.remaining -= fill;
                front.status = if front.remaining.is_zero() {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartiallyFilled
                };
                front.updated_at = now;
                (front.clone(), fill)
            };

            order.remaining -= fill;
            if resting.is_filled() {
                self.pop_filled(opposite, price, &resting.id);
            }

            let trade = match order.side {
                OrderSide::Buy => self.next_trade(&order, &resting, price, fill, Some(OrderSide::Buy), now),
                OrderSide::Sell => self.next_trade(&resting, &order, price, fill, Some(OrderSide::Sell), now),
            };
            trades.push(trade);
            passive_updates.push(resting);
        }

        order.updated_at = now;
        if order.status != OrderStatus::Stopped {
            if order.is_filled() {
                order.status = OrderStatus::Filled;
            } else if order.order_type == OrderType::Market {
                order.status = OrderStatus::Stopped;
            } else {
                order.status = if order.filled().is_zero() {
                    OrderStatus::Active
                } else {
                    OrderStatus::PartiallyFilled
                };
                self.insert_order(order.clone())?;
            }
        }

        Ok(OrderConfirmation {
            order,
            trades,
            passive_updates,
        })
    }

    /// Uncross a crossed (auction) book at the uniform clearing price.
    ///
    /// Fronts of the best bid and ask levels are matched until the book no
    /// longer crosses. When both fronts belong to the same party the newer
    /// order is stopped.
    pub fn uncross(&mut self, now: DateTime<Utc>) -> Vec<Trade> {
        let clearing = uncrossing(self);
        let Some(price) = clearing.price else {
            return Vec::new();
        };

        let mut trades = Vec::new();
        loop {
            let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) else {
                break;
            };
            if bid < ask {
                break;
            }
            let (Some(buy), Some(sell)) = (
                self.bids.get(&Reverse(bid)).and_then(PriceLevel::head).cloned(),
                self.asks.get(&ask).and_then(PriceLevel::head).cloned(),
            ) else {
                break;
            };

            if buy.party == sell.party {
                let newer = if buy.sequence > sell.sequence { buy.id } else { sell.id };
                tracing::warn!(
                    market = %self.market,
                    party = %buy.party,
                    order = %newer,
                    "Self-trade during uncrossing, stopping newer order"
                );
                if self.remove_order(&newer).is_err() {
                    break;
                }
                continue;
            }

            let fill = buy.remaining.min(sell.remaining);
            let buy = self.fill_front(OrderSide::Buy, bid, fill, now);
            let sell = self.fill_front(OrderSide::Sell, ask, fill, now);
            let (Some(buy), Some(sell)) = (buy, sell) else {
                break;
            };
            trades.push(self.next_trade(&buy, &sell, price, fill, None, now));
        }

        tracing::debug!(
            market = %self.market,
            clearing_price = %price,
            volume = %clearing.volume,
            trades = trades.len(),
            "Auction uncrossed"
        );
        trades
    }

    fn fill_front(&mut self, side: OrderSide, price: Decimal, fill: Decimal, now: DateTime<Utc>) -> Option<Order> {
        let front = self.level_mut(side, price)?.head_mut()?;
        front.remaining -= fill;
        front.status = if front.remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        front.updated_at = now;
        let snapshot = front.clone();
        if snapshot.is_filled() {
            self.pop_filled(side, price, &snapshot.id);
        }
        Some(snapshot)
    }

    fn pop_filled(&mut self, side: OrderSide, price: Decimal, id: &OrderId) {
        if let Some(level) = self.level_mut(side, price) {
            level.dequeue();
        }
        self.index.remove(id);
        self.drop_level_if_empty(side, price);
    }

    fn next_trade(
        &mut self,
        buy: &Order,
        sell: &Order,
        price: Decimal,
        size: Decimal,
        aggressor: Option<OrderSide>,
        now: DateTime<Utc>,
    ) -> Trade {
        let id = TradeId::deterministic(&self.market, self.fill_sequence);
        self.fill_sequence += 1;
        Trade {
            id,
            market_id: self.market.clone(),
            price,
            size,
            buyer: buy.party.clone(),
            seller: sell.party.clone(),
            buy_order: buy.id,
            sell_order: sell.id,
            aggressor,
            timestamp: now,
        }
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Highest bid level holding at least one static order.
    #[must_use]
    pub fn best_static_bid(&self) -> Option<Decimal> {
        self.bids.values().find(|l| l.has_static()).map(|l| l.price)
    }

    /// Lowest ask level holding at least one static order.
    #[must_use]
    pub fn best_static_ask(&self) -> Option<Decimal> {
        self.asks.values().find(|l| l.has_static()).map(|l| l.price)
    }

    /// Halfway between the touch prices, when both sides are quoted.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    #[must_use]
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn contains_order(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    #[must_use]
    pub fn get_order(&self, order_id: &OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(order_id)?;
        match side {
            OrderSide::Buy => self.bids.get(&Reverse(*price))?.find(order_id),
            OrderSide::Sell => self.asks.get(price)?.find(order_id),
        }
    }

    #[must_use]
    pub fn is_auction(&self) -> bool {
        self.in_auction
    }

    /// Bid levels, best first.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Ask levels, best first.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// IDs of orders matching `filter`, in arrival order.
    fn ids_by_sequence(&self, filter: impl Fn(&Order) -> bool) -> Vec<OrderId> {
        let mut orders: Vec<&Order> = self
            .bid_levels()
            .chain(self.ask_levels())
            .flat_map(|l| l.queue.iter())
            .filter(|o| filter(o))
            .collect();
        orders.sort_by_key(|o| o.sequence);
        orders.into_iter().map(|o| o.id).collect()
    }

    fn best_price(&self, side: OrderSide) -> Option<Decimal> {
        match side {
            OrderSide::Buy => self.best_bid(),
            OrderSide::Sell => self.best_ask(),
        }
    }

    fn level_mut(&mut self, side: OrderSide, price: Decimal) -> Option<&mut PriceLevel> {
        match side {
            OrderSide::Buy => self.bids.get_mut(&Reverse(price)),
            OrderSide::Sell => self.asks.get_mut(&price),
        }
    }

    fn drop_level_if_empty(&mut self, side: OrderSide, price: Decimal) {
        match side {
            OrderSide::Buy => {
                if self.bids.get(&Reverse(price)).is_some_and(PriceLevel::is_empty) {
                    self.bids.remove(&Reverse(price));
                }
            }
            OrderSide::Sell => {
                if self.asks.get(&price).is_some_and(PriceLevel::is_empty) {
                    self.asks.remove(&price);
                }
            }
        }
    }
}

// =================================================================
// Book collaborator
// =================================================================

impl Book for OrderBook {
    fn submit(&mut self, mut order: Order, now: DateTime<Utc>) -> Result<OrderConfirmation> {
        if !self.in_auction {
            return self.match_order(order, now);
        }
        if order.order_type == OrderType::Market {
            return Err(MarketcoreError::InvalidOrder {
                reason: "market orders are not accepted during an auction".into(),
            });
        }
        order.status = OrderStatus::Active;
        order.updated_at = now;
        self.insert_order(order.clone())?;
        Ok(OrderConfirmation {
            order,
            trades: Vec::new(),
            passive_updates: Vec::new(),
        })
    }

    fn place_passive(&mut self, mut order: Order) -> std::result::Result<Order, PlacementError> {
        if order.order_type != OrderType::Limit || order.price <= Decimal::ZERO {
            return Err(PlacementError::Rejected(MarketcoreError::InvalidOrder {
                reason: format!("passive order {} needs a positive limit price", order.id),
            }));
        }
        if !self.in_auction {
            if let Some(touch) = self.best_price(order.side.opposite()) {
                if order.crosses(touch) {
                    return Err(PlacementError::WouldCross {
                        order: order.id,
                        touch,
                    });
                }
            }
        }
        order.status = OrderStatus::Active;
        self.insert_order(order.clone())
            .map_err(PlacementError::Rejected)?;
        Ok(order)
    }

    fn remove(&mut self, id: &OrderId, status: OrderStatus) -> Result<Order> {
        let mut order = self.remove_order(id)?;
        order.status = status;
        Ok(order)
    }

    fn get(&self, id: &OrderId) -> Option<&Order> {
        self.get_order(id)
    }

    fn orders_for_party(&self, party: &PartyId) -> Vec<OrderId> {
        self.ids_by_sequence(|o| o.party == *party)
    }

    fn best_bid(&self) -> Option<Decimal> {
        OrderBook::best_bid(self)
    }

    fn best_ask(&self) -> Option<Decimal> {
        OrderBook::best_ask(self)
    }

    fn best_static_bid(&self) -> Option<Decimal> {
        OrderBook::best_static_bid(self)
    }

    fn best_static_ask(&self) -> Option<Decimal> {
        OrderBook::best_static_ask(self)
    }

    fn in_auction(&self) -> bool {
        self.in_auction
    }

    fn enter_auction(&mut self) {
        self.in_auction = true;
    }

    fn leave_auction(&mut self, now: DateTime<Utc>) -> Vec<Trade> {
        let trades = self.uncross(now);
        self.in_auction = false;
        trades
    }

    fn indicative_price(&self) -> Option<Decimal> {
        uncrossing(self).price
    }

    fn order_count(&self) -> usize {
        self.index.len()
    }

    fn hash(&self) -> [u8; 32] {
        compute_book_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use marketcore_types::*;
    use rust_decimal::Decimal;

    use super::*;

    fn book() -> OrderBook {
        OrderBook::new(MarketId::new("TEST"))
    }

    fn order(party: &str, side: OrderSide, price: i64, qty: i64, seq: u64) -> Order {
        Order::dummy_with_sequence(party, side, Decimal::new(price, 0), Decimal::new(qty, 0), seq)
    }

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    #[test]
    fn insert_and_query_best_bid_ask() {
        let mut book = book();
        book.insert_order(order("a", OrderSide::Buy, 100, 1, 0)).unwrap();
        book.insert_order(order("a", OrderSide::Buy, 99, 1, 1)).unwrap();
        book.insert_order(order("b", OrderSide::Sell, 101, 1, 2)).unwrap();
        book.insert_order(order("b", OrderSide::Sell, 102, 1, 3)).unwrap();

        assert_eq!(book.best_bid(), Some(Decimal::new(100, 0)));
        assert_eq!(book.best_ask(), Some(Decimal::new(101, 0)));
        assert_eq!(book.mid_price(), Some(Decimal::new(1005, 1)));
        assert_eq!(book.order_count(), 4);
    }

    #[test]
    fn remove_order_drops_empty_level() {
        let mut book = book();
        let o = order("a", OrderSide::Buy, 100, 1, 0);
        let id = o.id;
        book.insert_order(o).unwrap();
        assert_eq!(book.bid_depth(), 1);

        let removed = book.remove_order(&id).unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(book.bid_depth(), 0);
        assert!(book.is_empty());
        assert!(book.remove_order(&id).is_err());
    }

    #[test]
    fn duplicate_order_rejected() {
        let mut book = book();
        let o = order("a", OrderSide::Buy, 100, 1, 0);
        book.insert_order(o.clone()).unwrap();
        assert!(matches!(
            book.insert_order(o),
            Err(MarketcoreError::DuplicateOrder(_))
        ));
    }

    #[test]
    fn continuous_match_at_resting_price() {
        let mut book = book();
        book.insert_order(order("maker", OrderSide::Sell, 100, 5, 0)).unwrap();
        let conf = book
            .match_order(order("taker", OrderSide::Buy, 101, 3, 1), now())
            .unwrap();

        assert_eq!(conf.trades.len(), 1);
        assert_eq!(conf.trades[0].price, Decimal::new(100, 0));
        assert_eq!(conf.trades[0].size, Decimal::new(3, 0));
        assert_eq!(conf.trades[0].buyer, PartyId::new("taker"));
        assert_eq!(conf.order.status, OrderStatus::Filled);
        assert_eq!(conf.passive_updates[0].status, OrderStatus::PartiallyFilled);
        assert_eq!(book.best_ask(), Some(Decimal::new(100, 0)));
    }

    #[test]
    fn remainder_rests_after_sweeping_levels() {
        let mut book = book();
        book.insert_order(order("m1", OrderSide::Sell, 100, 1, 0)).unwrap();
        book.insert_order(order("m2", OrderSide::Sell, 101, 1, 1)).unwrap();
        let conf = book
            .match_order(order("t", OrderSide::Buy, 101, 5, 2), now())
            .unwrap();

        assert_eq!(conf.trades.len(), 2);
        assert_eq!(conf.order.status, OrderStatus::PartiallyFilled);
        assert_eq!(conf.order.remaining, Decimal::new(3, 0));
        assert_eq!(book.best_bid(), Some(Decimal::new(101, 0)));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn self_trade_stops_incoming_order() {
        let mut book = book();
        book.insert_order(order("same", OrderSide::Sell, 100, 1, 0)).unwrap();
        let conf = book
            .match_order(order("same", OrderSide::Buy, 100, 1, 1), now())
            .unwrap();
        assert!(conf.trades.is_empty());
        assert_eq!(conf.order.status, OrderStatus::Stopped);
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn market_order_remainder_is_stopped() {
        let mut book = book();
        book.insert_order(order("m", OrderSide::Sell, 100, 1, 0)).unwrap();
        let mut mo = order("t", OrderSide::Buy, 0, 2, 1);
        mo.order_type = OrderType::Market;
        let conf = book.match_order(mo, now()).unwrap();
        assert_eq!(conf.trades.len(), 1);
        assert_eq!(conf.order.status, OrderStatus::Stopped);
        assert!(book.is_empty());
    }

    #[test]
    fn static_prices_skip_pegged_levels() {
        let mut book = book();
        book.insert_order(order("a", OrderSide::Buy, 98, 1, 0)).unwrap();
        let mut pegged = order("b", OrderSide::Buy, 99, 1, 1);
        pegged.pegged = Some(PeggedOrder::new(PeggedReference::BestBid, Decimal::ZERO));
        book.insert_order(pegged).unwrap();

        assert_eq!(book.best_bid(), Some(Decimal::new(99, 0)));
        assert_eq!(book.best_static_bid(), Some(Decimal::new(98, 0)));
    }

    #[test]
    fn passive_placement_never_trades() {
        let mut book = book();
        book.insert_order(order("m", OrderSide::Sell, 100, 1, 0)).unwrap();
        let err = book.place_passive(order("t", OrderSide::Buy, 100, 1, 1)).unwrap_err();
        assert!(matches!(err, PlacementError::WouldCross { .. }));
        assert_eq!(book.order_count(), 1);

        let placed = book.place_passive(order("t", OrderSide::Buy, 99, 1, 2)).unwrap();
        assert_eq!(placed.status, OrderStatus::Active);
        assert_eq!(book.order_count(), 2);
    }

    #[test]
    fn auction_rests_then_uncrosses() {
        let mut book = book();
        Book::enter_auction(&mut book);
        Book::submit(&mut book, order("b", OrderSide::Buy, 105, 2, 0), now()).unwrap();
        Book::submit(&mut book, order("s", OrderSide::Sell, 95, 2, 1), now()).unwrap();
        assert_eq!(book.order_count(), 2);
        assert_eq!(Book::indicative_price(&book), Some(Decimal::new(100, 0)));

        let trades = Book::leave_auction(&mut book, now());
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, Decimal::new(100, 0));
        assert!(trades[0].aggressor.is_none());
        assert!(book.is_empty());
        assert!(!Book::in_auction(&book));
    }

    #[test]
    fn remove_applies_status() {
        let mut book = book();
        let o = order("a", OrderSide::Buy, 100, 1, 0);
        let id = o.id;
        book.insert_order(o).unwrap();
        let removed = Book::remove(&mut book, &id, OrderStatus::Parked).unwrap();
        assert_eq!(removed.status, OrderStatus::Parked);
    }
}
