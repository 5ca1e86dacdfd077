//! One price on one side of the book.
//!
//! Orders queue in arrival order; the head is matched first. Static,
//! pegged and liquidity orders share the queue, so a level can exist with
//! no static order in it and must not count towards best static prices.

use std::collections::VecDeque;

use marketcore_types::{Order, OrderId};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    pub queue: VecDeque<Order>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            queue: VecDeque::new(),
        }
    }

    /// Appends behind everything already resting at this price.
    pub fn enqueue(&mut self, order: Order) {
        self.queue.push_back(order);
    }

    pub fn dequeue(&mut self) -> Option<Order> {
        self.queue.pop_front()
    }

    #[must_use]
    pub fn head(&self) -> Option<&Order> {
        self.queue.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut Order> {
        self.queue.front_mut()
    }

    /// Remaining size of every order at this price.
    #[must_use]
    pub fn volume(&self) -> Decimal {
        self.queue.iter().map(|o| o.remaining).sum()
    }

    #[must_use]
    pub fn has_static(&self) -> bool {
        self.queue.iter().any(Order::is_static)
    }

    /// Pulls `id` out of the queue, keeping everyone else's priority.
    pub fn take(&mut self, id: &OrderId) -> Option<Order> {
        let at = self.queue.iter().position(|o| &o.id == id)?;
        self.queue.remove(at)
    }

    #[must_use]
    pub fn find(&self, id: &OrderId) -> Option<&Order> {
        self.queue.iter().find(|o| &o.id == id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
