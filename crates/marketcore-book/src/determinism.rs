//! Deterministic book digests for cross-node consistency.
//!
//! Every replica holding the same orders must produce the same hash. Levels
//! are visited best-first per side and orders in time priority, so the hash
//! never depends on hash-map iteration order.

use marketcore_types::Order;
use sha2::{Digest, Sha256};

use crate::OrderBook;

/// Compute the digest of a book: auction flag, then bid levels, then ask
/// levels with every resting order.
#[must_use]
pub fn compute_book_hash(book: &OrderBook) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"marketcore:book:v1:");
    hasher.update(book.market().as_str().as_bytes());
    hasher.update([u8::from(book.is_auction())]);
    hasher.update((book.order_count() as u64).to_le_bytes());

    for (tag, levels) in [(b'B', book.bid_levels().collect::<Vec<_>>()), (b'S', book.ask_levels().collect())] {
        hasher.update([tag]);
        hasher.update((levels.len() as u64).to_le_bytes());
        for level in levels {
            hasher.update(level.price.to_string().as_bytes());
            hasher.update((level.len() as u64).to_le_bytes());
            for order in &level.queue {
                hash_order(&mut hasher, order);
            }
        }
    }

    hasher.finalize().into()
}

fn hash_order(hasher: &mut Sha256, order: &Order) {
    hasher.update(order.id.0.as_bytes());
    hasher.update(order.party.as_str().as_bytes());
    hasher.update(order.remaining.to_string().as_bytes());
    hasher.update(order.status.to_string().as_bytes());
    hasher.update(order.sequence.to_le_bytes());
}

/// Hex rendering of [`compute_book_hash`], for logs.
#[must_use]
pub fn book_hash_hex(book: &OrderBook) -> String {
    hex::encode(compute_book_hash(book))
}
