//! # marketcore-book
//!
//! **Default per-market components for the marketcore engine.**
//!
//! - [`OrderBook`]: price-time priority book with continuous matching,
//!   passive placement and auction uncrossing
//! - [`LiquidityEngine`]: turns liquidity commitments into shaped orders
//! - [`PriceBounds`]: price monitoring that triggers auctions
//! - Deterministic book hashing for cross-node consistency
//!
//! None of these types touch balances or global state; the execution engine
//! drives them through the traits in `marketcore_types::interfaces`.

pub mod bounds;
pub mod clearing;
pub mod determinism;
pub mod liquidity;
pub mod orderbook;
pub mod price_level;

pub use bounds::PriceBounds;
pub use clearing::{Uncrossing, uncrossing};
pub use determinism::{book_hash_hex, compute_book_hash};
pub use liquidity::LiquidityEngine;
pub use orderbook::OrderBook;
pub use price_level::PriceLevel;
