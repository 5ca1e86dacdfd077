//! Fatal invariant violations.
//!
//! Every replica executes the same input, so a broken invariant on one node
//! is broken on all of them. Continuing would produce state no node can
//! agree on; the process halts with a diagnostic instead.

use marketcore_types::MarketId;

/// Log the violation and abort. Never returns.
#[track_caller]
pub fn invariant_violated(market: &MarketId, what: &str) -> ! {
    tracing::error!(market = %market, violation = what, "Invariant violated, halting");
    panic!("invariant violated: {what} (market {market})");
}
