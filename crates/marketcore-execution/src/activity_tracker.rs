//! Tracks who proposed which market.

use std::collections::BTreeMap;

use marketcore_types::{ActivityTracker, Asset, MarketId, PartyId};

#[derive(Debug, Clone, Default)]
pub struct MarketActivityTracker {
    proposers: BTreeMap<MarketId, (Asset, PartyId)>,
}

impl MarketActivityTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Markets tracked for an asset, in ID order.
    #[must_use]
    pub fn markets_for_asset(&self, asset: &str) -> Vec<MarketId> {
        self.proposers
            .iter()
            .filter(|(_, (a, _))| a == asset)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl ActivityTracker for MarketActivityTracker {
    fn market_proposed(&mut self, asset: &str, market: &MarketId, proposer: &PartyId) {
        self.proposers
            .insert(market.clone(), (asset.to_string(), proposer.clone()));
    }

    fn remove_market(&mut self, asset: &str, market: &MarketId) {
        if self
            .proposers
            .get(market)
            .is_some_and(|(a, _)| a == asset)
        {
            self.proposers.remove(market);
        }
    }

    fn proposer(&self, market: &MarketId) -> Option<PartyId> {
        self.proposers.get(market).map(|(_, p)| p.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposer_round_trip() {
        let mut t = MarketActivityTracker::new();
        let m = MarketId::new("m");
        t.market_proposed("USDT", &m, &PartyId::new("alice"));
        assert_eq!(t.proposer(&m), Some(PartyId::new("alice")));
        assert_eq!(t.markets_for_asset("USDT"), vec![m.clone()]);

        // Wrong asset leaves the entry alone.
        t.remove_market("BTC", &m);
        assert!(t.proposer(&m).is_some());
        t.remove_market("USDT", &m);
        assert!(t.proposer(&m).is_none());
    }
}
