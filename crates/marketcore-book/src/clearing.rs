//! Single-price uncrossing of an auction book.
//!
//! Bid levels are consumed from the top and ask levels from the bottom for
//! as long as they still cross. Two levels that trade with each other last
//! are the marginal pair; the book clears at their midpoint.

use rust_decimal::Decimal;

use crate::OrderBook;

/// Outcome of [`uncrossing`]. `price` is `None` when the book does not cross.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Uncrossing {
    pub price: Option<Decimal>,
    /// Size that changes hands at `price`.
    pub volume: Decimal,
    pub marginal_bid: Option<Decimal>,
    pub marginal_ask: Option<Decimal>,
}

#[must_use]
pub fn uncrossing(book: &OrderBook) -> Uncrossing {
    let crossed = matches!((book.best_bid(), book.best_ask()), (Some(bid), Some(ask)) if bid >= ask);
    if !crossed {
        return Uncrossing::default();
    }

    let mut bids = book.bid_levels().map(|l| (l.price, l.volume()));
    let mut asks = book.ask_levels().map(|l| (l.price, l.volume()));
    let mut bid = bids.next();
    let mut ask = asks.next();
    let mut volume = Decimal::ZERO;
    let mut marginal = None;

    while let (Some((bid_price, bid_left)), Some((ask_price, ask_left))) = (bid, ask) {
        if bid_price < ask_price {
            break;
        }
        let fill = bid_left.min(ask_left);
        volume += fill;
        marginal = Some((bid_price, ask_price));
        bid = if fill == bid_left { bids.next() } else { Some((bid_price, bid_left - fill)) };
        ask = if fill == ask_left { asks.next() } else { Some((ask_price, ask_left - fill)) };
    }

    match marginal {
        Some((bid, ask)) if !volume.is_zero() => Uncrossing {
            price: Some((bid + ask) / Decimal::TWO),
            volume,
            marginal_bid: Some(bid),
            marginal_ask: Some(ask),
        },
        _ => Uncrossing::default(),
    }
}
