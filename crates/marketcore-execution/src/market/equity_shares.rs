//! Equity-like shares of liquidity providers.
//!
//! Every provider holds a virtual stake that grows with the market's traded
//! value while they stay committed. A provider's share of the fee pool is
//! their virtual stake over the total.

use std::collections::BTreeMap;

use marketcore_types::{EquityShareEntry, PartyId, Shares};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquityShares {
    entries: Shares,
    /// Entries as they were before the last `inherit`, kept for rollback.
    backup: Option<Shares>,
    /// Traded value at the last growth update.
    last_value: Decimal,
}

impl EquityShares {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shares(&self) -> &Shares {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, party: &PartyId) -> Option<&EquityShareEntry> {
        self.entries.get(party)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn total_vstake(&self) -> Decimal {
        self.entries.values().map(|e| e.vstake).sum()
    }

    /// Set a party's committed stake. Zero removes the party.
    ///
    /// A new or increased stake enters at the current total virtual stake,
    /// weighted into the party's average entry valuation. A decreased stake
    /// shrinks the virtual stake proportionally.
    pub fn set_party_stake(&mut self, party: &PartyId, stake: Decimal) {
        if stake <= Decimal::ZERO {
            self.entries.remove(party);
            self.recompute_shares();
            return;
        }

        let current = self.entries.get(party).copied().unwrap_or_default();
        let mut next = current;
        if stake > current.stake {
            let delta = stake - current.stake;
            let vstake = current.vstake + delta;
            let total_after = self.total_vstake() + delta;
            next.avg_entry_valuation =
                (current.avg_entry_valuation * current.vstake + total_after * delta) / vstake;
            next.vstake = vstake;
        } else if stake < current.stake && !current.stake.is_zero() {
            next.vstake = current.vstake * stake / current.stake;
        }
        next.stake = stake;
        self.entries.insert(party.clone(), next);
        self.recompute_shares();
    }

    /// Grow virtual stakes by the relative change in traded value since the
    /// previous call. Virtual stake never drops below the committed stake.
    pub fn apply_growth(&mut self, traded_value: Decimal) {
        if self.last_value > Decimal::ZERO && traded_value > self.last_value {
            let factor = traded_value / self.last_value;
            for entry in self.entries.values_mut() {
                entry.vstake = entry.stake.max(entry.vstake * factor);
            }
            self.recompute_shares();
        }
        self.last_value = traded_value;
    }

    /// Adopt the parent's virtual stakes and entry valuations for the
    /// parties committed here. The previous entries are kept until the next
    /// `rollback` or `inherit`.
    pub fn inherit(&mut self, parent: &Shares) {
        let base = self.backup.take().unwrap_or_else(|| self.entries.clone());
        let mut next = base.clone();
        for (party, entry) in &mut next {
            if let Some(p) = parent.get(party) {
                entry.vstake = p.vstake.max(entry.stake);
                entry.avg_entry_valuation = p.avg_entry_valuation;
            }
        }
        self.backup = Some(base);
        self.entries = next;
        self.recompute_shares();
    }

    /// Undo the last `inherit`.
    pub fn rollback(&mut self) {
        if let Some(base) = self.backup.take() {
            self.entries = base;
        }
    }

    /// Drop the rollback point, keeping inherited values.
    pub fn commit(&mut self) {
        self.backup = None;
    }

    /// Replace everything with a checkpointed set.
    pub fn restore(&mut self, shares: &Shares, traded_value: Decimal) {
        self.entries = shares.clone();
        self.backup = None;
        self.last_value = traded_value;
        self.recompute_shares();
    }

    fn recompute_shares(&mut self) {
        let total = self.total_vstake();
        for entry in self.entries.values_mut() {
            entry.share = if total.is_zero() {
                Decimal::ZERO
            } else {
                entry.vstake / total
            };
        }
    }

    /// Shares in party order, for fee distribution.
    #[must_use]
    pub fn share_weights(&self) -> BTreeMap<PartyId, Decimal> {
        self.entries
            .iter()
            .map(|(p, e)| (p.clone(), e.share))
            .collect()
    }

    pub(crate) fn hash_into(&self, hasher: &mut Sha256) {
        hasher.update((self.entries.len() as u64).to_le_bytes());
        for (party, e) in &self.entries {
            hasher.update(party.as_str().as_bytes());
            hasher.update(e.stake.to_string().as_bytes());
            hasher.update(e.vstake.to_string().as_bytes());
            hasher.update(e.avg_entry_valuation.to_string().as_bytes());
        }
        hasher.update(self.last_value.to_string().as_bytes());
    }
}
