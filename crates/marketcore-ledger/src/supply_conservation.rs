//! Per-asset supply audit for the collateral ledger.
//!
//! Only two operations change how much of an asset exists inside the
//! ledger: funding an account from outside (mint) and overwriting a
//! balance on restore (mint or burn for the difference). Pool transfers
//! and fee payouts move value between accounts and never touch the
//! audit. After any mint or burn:
//!
//! ```text
//! Σ balances(asset) == minted(asset) - burned(asset)
//! ```

use std::collections::BTreeMap;

use marketcore_types::{Asset, MarketcoreError, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Flow {
    minted: Decimal,
    burned: Decimal,
}

impl Flow {
    fn net(self) -> Decimal {
        self.minted - self.burned
    }
}

/// Running mint/burn totals, keyed by asset in sorted order.
#[derive(Debug, Clone, Default)]
pub struct SupplyConservation {
    flows: BTreeMap<Asset, Flow>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_mint(&mut self, asset: &str, amount: Decimal) {
        self.flows.entry(asset.to_string()).or_default().minted += amount;
    }

    pub fn record_burn(&mut self, asset: &str, amount: Decimal) {
        self.flows.entry(asset.to_string()).or_default().burned += amount;
    }

    /// What the ledger's balances in `asset` must add up to.
    #[must_use]
    pub fn outstanding(&self, asset: &str) -> Decimal {
        self.flows.get(asset).copied().unwrap_or_default().net()
    }

    /// # Errors
    /// [`MarketcoreError::SupplyInvariantViolation`] when `held` differs
    /// from [`Self::outstanding`].
    pub fn check(&self, asset: &str, held: Decimal) -> Result<()> {
        let flow = self.flows.get(asset).copied().unwrap_or_default();
        if held == flow.net() {
            return Ok(());
        }
        Err(MarketcoreError::SupplyInvariantViolation {
            reason: format!(
                "{asset} ledger holds {held}, minted {} burned {}",
                flow.minted, flow.burned
            ),
        })
    }

    /// Every asset with recorded flow, sorted.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.flows.keys()
    }
}
