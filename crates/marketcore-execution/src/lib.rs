//! # marketcore-execution
//!
//! Execution engine for the **marketcore** workspace: the registry of
//! markets, their lifecycle, succession between markets and the checkpoint
//! state that survives restarts.
//!
//! - [`Engine`]: market registry, tick driver, order routing and hashing
//! - [`Market`]: one market's state machine, auctions and special orders
//! - [`SuccessionGraph`]: parent/successor links between markets
//! - [`checkpoint`]: byte codec for retained per-market state
//! - [`testing`]: in-memory event sink and clock
//!
//! ## Market Lifecycle
//!
//! ```text
//! submit_market ─▶ Proposed ─▶ Pending (opening auction) ─▶ Active ◀─▶ Suspended
//!                     │                │                       │
//!                     ▼                ▼                       ▼
//!                 Rejected       Cancelled/Rejected      Closed / Settled
//! ```
//!
//! ## Succession
//!
//! A market may name a parent. While it sits in its opening auction it
//! tentatively inherits the parent's equity-like shares and trade value; the
//! moment it opens it takes a fraction of the parent's insurance pool, the
//! parent is marked Succeeded and competing successors are rejected.

pub mod activity_tracker;
pub mod checkpoint;
pub mod components;
pub mod engine;
pub mod fatal;
pub mod market;
pub mod netparams;
pub mod succession;
pub mod testing;

pub use activity_tracker::MarketActivityTracker;
pub use components::DefaultComponents;
pub use engine::Engine;
pub use market::{Market, TickOutcome};
pub use succession::SuccessionGraph;
pub use testing::{EventRecorder, ManualClock};
