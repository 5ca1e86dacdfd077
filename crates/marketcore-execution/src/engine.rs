//! The execution engine: market registry, succession and checkpoint state.
//!
//! One [`Engine`] owns every market and everything that relates markets to
//! each other. It is driven synchronously by the caller: governance actions
//! (`submit_market`, `reject_market`, ...), order flow, `on_tick` with the
//! chain time and `block_end` once per block.
//!
//! # Determinism Contract
//!
//! Markets are ticked in registration order. Every other iteration that can
//! influence state, events or bytes (sibling rejection, TTL sweeps, hashing,
//! checkpoints) runs in market-ID order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use marketcore_types::{
    ActivityTracker, CheckpointRecord, Collateral, ComponentFactory, CpMarketState, EngineConfig,
    Event, EventSink, LiquidityAmendment, LiquidityCommitment, MarketCounters, MarketData,
    MarketDefinition, MarketId, MarketState, MarketStateUpdate, MarketcoreError, Order,
    OrderAmendment, OrderCancellation, OrderConfirmation, OrderSubmission, PartyId, Result,
    TimeService,
};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::checkpoint;
use crate::components::DefaultComponents;
use crate::fatal::invariant_violated;
use crate::market::Market;
use crate::succession::SuccessionGraph;

pub struct Engine<C: Collateral> {
    pub(crate) config: EngineConfig,
    collateral: C,
    components: Box<dyn ComponentFactory>,
    events: Box<dyn EventSink>,
    clock: Box<dyn TimeService>,
    tracker: Box<dyn ActivityTracker>,
    pub(crate) markets: HashMap<MarketId, Market>,
    /// Registration order; the tick order.
    pub(crate) market_order: Vec<MarketId>,
    succession: SuccessionGraph,
    /// Retained per-market state, available to successors until its TTL.
    pub(crate) cp_states: BTreeMap<MarketId, CpMarketState>,
    /// Parents whose successor was restored with state: any other successor
    /// of theirs is rejected when restored.
    skip_restore_successors: BTreeSet<MarketId>,
    now: DateTime<Utc>,
}

impl<C: Collateral> Engine<C> {
    pub fn new(
        config: EngineConfig,
        collateral: C,
        events: Box<dyn EventSink>,
        clock: Box<dyn TimeService>,
        tracker: Box<dyn ActivityTracker>,
    ) -> Self {
        let now = clock.now();
        Self {
            config,
            collateral,
            components: Box::new(DefaultComponents),
            events,
            clock,
            tracker,
            markets: HashMap::new(),
            market_order: Vec::new(),
            succession: SuccessionGraph::new(),
            cp_states: BTreeMap::new(),
            skip_restore_successors: BTreeSet::new(),
            now,
        }
    }

    /// Replaces the factory used for the book, liquidity and price-monitoring
    /// components of markets created from now on.
    #[must_use]
    pub fn with_components(mut self, components: Box<dyn ComponentFactory>) -> Self {
        self.components = components;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn collateral(&self) -> &C {
        &self.collateral
    }

    pub fn collateral_mut(&mut self) -> &mut C {
        &mut self.collateral
    }

    #[must_use]
    pub fn succession(&self) -> &SuccessionGraph {
        &self.succession
    }

    /// Retained checkpoint state of a market, if any.
    #[must_use]
    pub fn retained_state(&self, id: &MarketId) -> Option<&CpMarketState> {
        self.cp_states.get(id)
    }

    // =================================================================
    // Market lifecycle
    // =================================================================

    /// Registers a new market in the Proposed state.
    ///
    /// # Errors
    /// `NoMarketId`, `DuplicateMarket`, `UnknownAsset`, or any ledger error
    /// while creating the market's accounts.
    pub fn submit_market(
        &mut self,
        definition: MarketDefinition,
        proposer: &PartyId,
        opening_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = definition.id.clone();
        let asset = definition.settlement_asset.clone();
        self.build_market(definition, opening_at, false)?;
        self.tracker.market_proposed(&asset, &id, proposer);
        tracing::info!(market = %id, proposer = %proposer, "Market submitted");
        Ok(())
    }

    /// Registers a new market together with its proposer's liquidity
    /// commitment. A refused commitment takes the market out again.
    ///
    /// # Errors
    /// As [`Engine::submit_market`], or the commitment's validation errors.
    pub fn submit_market_with_liquidity_provision(
        &mut self,
        definition: MarketDefinition,
        commitment: LiquidityCommitment,
        proposer: &PartyId,
        opening_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = definition.id.clone();
        let asset = definition.settlement_asset.clone();
        self.submit_market(definition, proposer, opening_at)?;
        let result = self
            .market_mut(&id)?
            .submit_proposal_commitment(proposer, commitment);
        self.flush(&id);
        if let Err(err) = result {
            tracing::info!(market = %id, proposer = %proposer, error = %err, "Proposer commitment refused, market removed");
            self.remove_market(&id);
            self.clear_pool(&id, &asset);
            return Err(err);
        }
        Ok(())
    }

        /// Rebuilds a market from its definition after a restart and reattaches
    /// any retained checkpoint state.
    ///
    /// # Errors
    /// As [`Engine::submit_market`], plus errors from the succession protocol
    /// run in restore mode.
    pub fn restore_market(&mut self, definition: MarketDefinition) -> Result<()> {
        let id = definition.id.clone();
        let parent = definition.parent_market_id.clone();
        let now = self.clock.now();
        self.build_market(definition, now, true)?;

        if self.restore_own_state(&id)? {
            if let Some(parent) = parent {
                // A successor that carried state already left its opening
                // auction; no other successor of this parent may follow.
                self.skip_restore_successors.insert(parent);
            }
            tracing::info!(market = %id, "Market restored with retained state");
            return Ok(());
        }
        tracing::info!(market = %id, "Market restored");
        match parent {
            Some(parent) => self.succeed_or_restore(&id, &parent, true),
            None => Ok(()),
        }
    }

    fn build_market(
        &mut self,
        definition: MarketDefinition,
        opening_at: DateTime<Utc>,
        restoring: bool,
    ) -> Result<()> {
        let id = definition.id.clone();
        if id.is_empty() {
            return Err(MarketcoreError::NoMarketId);
        }
        if self.markets.contains_key(&id) {
            return Err(MarketcoreError::DuplicateMarket(id));
        }
        if !self.collateral.asset_exists(&definition.settlement_asset) {
            return Err(MarketcoreError::UnknownAsset(definition.settlement_asset));
        }
        let fraction = definition.insurance_pool_fraction;
        if fraction < Decimal::ZERO || fraction > Decimal::ONE {
            return Err(MarketcoreError::InvalidMarketUpdate {
                reason: format!("insurance pool fraction {fraction} outside [0, 1]"),
            });
        }
        if definition.parent_market_id.as_ref() == Some(&id) {
            return Err(MarketcoreError::InvalidMarketUpdate {
                reason: "a market cannot succeed itself".into(),
            });
        }

        match self
            .collateral
            .create_market_accounts(&id, &definition.settlement_asset)
        {
            Ok(()) => {}
            Err(MarketcoreError::DuplicateAccounts(_)) if restoring => {
                tracing::debug!(market = %id, "Market accounts already present");
            }
            Err(err) => return Err(err),
        }

        let parent = definition.parent_market_id.clone();
        let market = Market::new(
            definition,
            self.config.market_defaults.clone(),
            self.components.as_ref(),
            opening_at,
            self.now,
        );
        let created = market.definition().clone();
        let data = market.market_data();
        self.markets.insert(id.clone(), market);
        self.market_order.push(id.clone());
        if let Some(parent) = parent {
            self.succession.link(&parent, &id);
            tracing::debug!(market = %id, parent = %parent, "Successor linked");
        }

        self.events.send_batch(vec![
            Event::MarketCreated(created.clone()),
            Event::MarketUpdated(created),
            Event::MarketData(data),
        ]);
        Ok(())
    }

    /// Reattaches retained state to a freshly restored market. Returns
    /// whether there was any.
    fn restore_own_state(&mut self, id: &MarketId) -> Result<bool> {
        let market = self
            .markets
            .get_mut(id)
            .ok_or_else(|| MarketcoreError::MarketDoesNotExist(id.clone()))?;
        let Some(state) = self.cp_states.get(id).cloned() else {
            return Ok(false);
        };
        market.restore_els(&state);
        let asset = market.settlement_asset().to_string();
        let parent = market.parent_id().cloned();
        self.collateral
            .restore_insurance_balance(id, &asset, state.insurance_balance)?;

        if let Some(parent) = parent {
            if let Some(parent_market) = self.markets.get_mut(&parent) {
                if let Err(err) = parent_market.set_succeeded() {
                    tracing::warn!(market = %parent, error = %err, "Could not mark restored parent succeeded");
                }
                self.flush(&parent);
            }
            for sibling in self.succession.siblings(&parent, id) {
                if let Err(err) = self.reject_market(&sibling) {
                    tracing::warn!(market = %sibling, error = %err, "Could not reject pending sibling");
                }
            }
            self.succession.take_successors(&parent);
        }
        Ok(true)
    }

    /// Moves a Proposed market into its opening auction.
    ///
    /// # Errors
    /// `MarketDoesNotExist`, `CannotStartOpeningAuction`.
    pub fn start_opening_auction(&mut self, id: &MarketId) -> Result<()> {
        let market = self.market_mut(id)?;
        let result = market.start_opening_auction();
        self.flush(id);
        result
    }

    /// Governance enacted `successor` as the successor of `parent`.
    ///
    /// # Errors
    /// `MarketDoesNotExist` if the successor is unknown,
    /// `ParentMarketNotEnactedYet` if the parent is still Proposed (the
    /// successor is rejected).
    pub fn succeed_market(&mut self, successor: &MarketId, parent: &MarketId) -> Result<()> {
        self.succeed_or_restore(successor, parent, false)
    }

    fn succeed_or_restore(
        &mut self,
        successor: &MarketId,
        parent: &MarketId,
        restore: bool,
    ) -> Result<()> {
        if !self.markets.contains_key(successor) {
            return Err(MarketcoreError::MarketDoesNotExist(successor.clone()));
        }
        if restore && self.skip_restore_successors.contains(parent) {
            tracing::info!(market = %successor, parent = %parent, "Parent already succeeded, rejecting restored successor");
            if let Err(err) = self.reject_market(successor) {
                tracing::warn!(market = %successor, error = %err, "Could not reject restored successor");
            }
            self.succession.take_successors(parent);
            return Ok(());
        }

        let parent_known = self.get_market(parent, true).is_some();
        let retained = self.cp_states.contains_key(parent);
        if !parent_known && (!restore || !retained) {
            // The parent is gone for good: open as a fresh market. Governance
            // deals with the proposal itself.
            self.detach_from_parent(successor);
            tracing::info!(market = %successor, parent = %parent, "Parent not found, successor reset");
            return Ok(());
        }

        if !restore
            && self
                .markets
                .get(parent)
                .is_some_and(|p| p.state() == MarketState::Proposed)
        {
            if let Err(err) = self.reject_market(successor) {
                tracing::warn!(market = %successor, error = %err, "Could not reject successor");
            }
            return Err(MarketcoreError::ParentMarketNotEnactedYet(parent.clone()));
        }
        Ok(())
    }

    fn detach_from_parent(&mut self, id: &MarketId) {
        self.succession.unlink(id);
        if let Some(market) = self.markets.get_mut(id) {
            market.reset_parent();
        }
    }

    /// Rejects a market that has not been enacted, together with every
    /// successor proposed for it.
    ///
    /// # Errors
    /// `MarketDoesNotExist`, `CannotRejectMarket`.
    pub fn reject_market(&mut self, id: &MarketId) -> Result<()> {
        let market = self.market_mut(id)?;
        market.reject()?;
        let data = market.market_data();
        self.flush(id);
        self.events.send(Event::MarketData(data));
        self.remove_market(id);

        for successor in self.succession.take_successors(id) {
            if let Err(err) = self.reject_market(&successor) {
                tracing::warn!(market = %successor, parent = %id, error = %err, "Could not reject successor");
            }
        }
        self.cp_states.remove(id);
        Ok(())
    }

    /// Replaces the mutable parts of a market's definition.
    ///
    /// # Errors
    /// `MarketDoesNotExist`, `InvalidMarketUpdate`.
    pub fn update_market(&mut self, definition: &MarketDefinition) -> Result<()> {
        let market = self
            .markets
            .get_mut(&definition.id)
            .ok_or_else(|| MarketcoreError::MarketDoesNotExist(definition.id.clone()))?;
        let result = market.update(definition, self.components.as_ref());
        self.flush(&definition.id);
        result
    }

    /// Governance suspension, resumption or termination.
    ///
    /// # Errors
    /// `MarketDoesNotExist`, `InvalidStateChange`.
    pub fn update_market_state(&mut self, id: &MarketId, update: &MarketStateUpdate) -> Result<()> {
        let market = self.market_mut(id)?;
        let result = market.update_state(update);
        self.flush(id);
        result
    }

    /// Takes a market out of the registry. Pools of markets nobody can
    /// succeed any more are cleared here; closed markets keep theirs until
    /// their retained state expires.
    fn remove_market(&mut self, id: &MarketId) {
        let Some(mut market) = self.markets.remove(id) else {
            return;
        };
        self.market_order.retain(|m| m != id);
        self.succession.unlink(id);
        let asset = market.settlement_asset().to_string();
        self.tracker.remove_market(&asset, id);
        self.events.send_batch(market.take_events());

        let clear = matches!(market.state(), MarketState::Rejected | MarketState::Cancelled)
            || market.is_succeeded();
        if clear {
            self.clear_pool(id, &asset);
        }
        tracing::info!(market = %id, state = %market.state(), "Market removed");
    }

    fn clear_pool(&mut self, id: &MarketId, asset: &str) {
        match self.collateral.clear_insurance_pool(id, asset, true) {
            Ok(movements) if !movements.is_empty() => {
                self.events.send(Event::LedgerMovements(movements));
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(market = %id, asset, error = %err, "Could not clear insurance pool");
            }
        }
    }

    // =================================================================
    // Time
    // =================================================================

    /// Advances every market to `now` and runs succession and retention
    /// bookkeeping.
    pub fn on_tick(&mut self, now: DateTime<Utc>) {
        self.now = now;
        let ttl = now + self.config.successor_window();
        let parent_states = self.parent_states();
        let blocked = self.successors_of_proposed_parents();
        let mut to_skip: BTreeSet<MarketId> = BTreeSet::new();
        let mut closing = Vec::new();
        let mut market_data = Vec::with_capacity(self.market_order.len());

        for id in self.market_order.clone() {
            if to_skip.contains(&id) || blocked.contains(&id) {
                continue;
            }
            let Some(market) = self.markets.get_mut(&id) else {
                invariant_violated(&id, "market in tick order is not registered");
            };

            let parent_state = parent_states.get(&id);
            let mut is_successor = parent_state.is_some();
            let in_opening = is_successor && market.state() == MarketState::Pending;
            if in_opening {
                match parent_state.and_then(Option::as_ref) {
                    Some(state) => market.inherit_parent(state),
                    None => {
                        tracing::info!(market = %id, "Parent state gone, successor reset");
                        market.reset_parent();
                        self.succession.unlink(&id);
                        is_successor = false;
                    }
                }
            }

            let outcome = market.on_tick(now);
            if outcome.closing {
                tracing::info!(market = %id, state = %market.state(), "Market closed, removing");
                closing.push(id.clone());
            }

            let parent = market.parent_id().cloned();
            match parent {
                Some(parent) if in_opening && is_successor && outcome.left_opening_auction => {
                    let fraction = market.insurance_pool_fraction();
                    let asset = market.settlement_asset().to_string();
                    self.flush(&id);
                    self.complete_succession(&id, &parent, fraction, &asset, &mut to_skip);
                }
                _ if is_successor => market.rollback_inherit(),
                _ => {}
            }

            let Some(market) = self.markets.get(&id) else {
                continue;
            };
            if market.is_succeeded() {
                self.cp_states.remove(&id);
            } else if market.state() != MarketState::Proposed {
                let balance = self
                    .collateral
                    .insurance_balance(&id, market.settlement_asset());
                self.cp_states
                    .insert(id.clone(), market.get_cp_state(balance, ttl));
            }
            market_data.push(Event::MarketData(market.market_data()));
            self.flush(&id);
        }
        self.events.send_batch(market_data);

        for sibling in to_skip {
            if let Err(err) = self.reject_market(&sibling) {
                tracing::warn!(market = %sibling, error = %err, "Could not reject superseded successor");
            }
        }
        for successor in blocked {
            let parent = self.succession.parent_of(&successor).cloned();
            tracing::info!(market = %successor, parent = ?parent, "Parent market not enacted yet, rejecting successor");
            if let Err(err) = self.reject_market(&successor) {
                tracing::warn!(market = %successor, error = %err, "Could not reject successor");
            }
        }

        let mut purge = Vec::new();
        for id in closing {
            // A cancelled market can never be succeeded.
            if self
                .markets
                .get(&id)
                .is_some_and(|m| m.state() == MarketState::Cancelled)
            {
                purge.push(id.clone());
            }
            self.remove_market(&id);
        }

        self.sweep_expired(now, purge);
    }

    /// A successor left its opening auction: hand over the insurance
    /// fraction, retire the parent and queue the other candidates for
    /// rejection.
    fn complete_succession(
        &mut self,
        successor: &MarketId,
        parent: &MarketId,
        fraction: Decimal,
        asset: &str,
        to_skip: &mut BTreeSet<MarketId>,
    ) {
        if !fraction.is_zero() {
            if let Some(movement) =
                self.collateral
                    .successor_insurance_fraction(successor, parent, asset, fraction)
            {
                self.events.send(Event::LedgerMovements(vec![movement]));
            }
        }

        if let Some(parent_market) = self.markets.get_mut(parent) {
            if let Err(err) = parent_market.set_succeeded() {
                tracing::warn!(market = %parent, error = %err, "Could not mark parent succeeded");
            }
            self.flush(parent);
        } else {
            self.clear_pool(parent, asset);
        }

        for sibling in self.succession.siblings(parent, successor) {
            if self.markets.contains_key(&sibling) {
                to_skip.insert(sibling);
            }
        }
        self.succession.take_successors(parent);
        self.cp_states.remove(parent);
        tracing::info!(market = %successor, parent = %parent, %fraction, "Successor market enacted");
    }

    /// Successors in their opening auction whose parent was never enacted.
    /// They cannot take anything over and are rejected instead of ticked.
    fn successors_of_proposed_parents(&self) -> BTreeSet<MarketId> {
        self.succession
            .parents()
            .filter(|(parent, _)| {
                self.markets
                    .get(*parent)
                    .is_some_and(|p| p.state() == MarketState::Proposed)
            })
            .flat_map(|(_, successors)| successors.iter())
            .filter(|id| {
                self.markets
                    .get(*id)
                    .is_some_and(|m| m.state() == MarketState::Pending)
            })
            .cloned()
            .collect()
    }

        /// Parent snapshot for every linked successor: the retained record, else
    /// the live parent's current state, else nothing.
    fn parent_states(&self) -> BTreeMap<MarketId, Option<CpMarketState>> {
        let ttl = self.now + self.config.successor_window();
        let mut states = BTreeMap::new();
        for (parent, successors) in self.succession.parents() {
            let state = self.cp_states.get(parent).cloned().or_else(|| {
                self.markets.get(parent).map(|p| {
                    let balance = self.collateral.insurance_balance(parent, p.settlement_asset());
                    p.get_cp_state(balance, ttl)
                })
            });
            for successor in successors {
                states.insert(successor.clone(), state.clone());
            }
        }
        states
    }

    /// Drops expired retained state, plus the records in `purge`. Pools of
    /// expired closed markets go to the global insurance pool.
    fn sweep_expired(&mut self, now: DateTime<Utc>, mut purge: Vec<MarketId>) {
        let mut pools = Vec::new();
        for (id, state) in &self.cp_states {
            if !state.is_expired(now) {
                continue;
            }
            match &state.market {
                // Still live: the record is refreshed on the next tick.
                None if self.markets.contains_key(id) => {}
                None => purge.push(id.clone()),
                Some(definition) => {
                    purge.push(id.clone());
                    pools.push((id.clone(), definition.settlement_asset.clone()));
                }
            }
        }
        for (id, asset) in pools {
            self.clear_pool(&id, &asset);
        }

        for id in purge {
            if self.cp_states.remove(&id).is_some() {
                tracing::debug!(market = %id, "Retained state purged");
            }
            for successor in self.succession.take_successors(&id) {
                if let Some(market) = self.markets.get_mut(&successor) {
                    market.reset_parent();
                }
            }
        }
    }

    /// End-of-block maintenance: liquidity fee accrual and distribution.
    pub fn block_end(&mut self) {
        for id in self.market_order.clone() {
            if let Some(market) = self.markets.get_mut(&id) {
                market.block_end(&mut self.collateral);
            }
            self.flush(&id);
        }
    }

    // =================================================================
    // Orders
    // =================================================================

    /// # Errors
    /// `MarketDoesNotExist`, `TooManyPeggedOrders`, or the market's order
    /// validation errors.
    pub fn submit_order(
        &mut self,
        party: &PartyId,
        submission: &OrderSubmission,
    ) -> Result<OrderConfirmation> {
        if submission.pegged.is_some() {
            let live: usize = self.markets.values().map(Market::pegged_count).sum();
            if live as u64 >= self.config.max_pegged_orders {
                return Err(MarketcoreError::TooManyPeggedOrders {
                    max: self.config.max_pegged_orders,
                });
            }
        }
        let id = submission.market_id.clone();
        let result = self.market_mut(&id)?.submit_order(party, submission);
        self.flush(&id);
        result
    }

    /// # Errors
    /// `MarketDoesNotExist`, `OrderNotFound`, `OrderNotOwned`, `InvalidOrder`.
    pub fn amend_order(
        &mut self,
        party: &PartyId,
        amendment: &OrderAmendment,
    ) -> Result<OrderConfirmation> {
        let id = amendment.market_id.clone();
        let result = self.market_mut(&id)?.amend_order(party, amendment);
        self.flush(&id);
        result
    }

    /// Cancels one order, a party's orders in one market, or a party's
    /// orders everywhere, depending on which IDs are given.
    ///
    /// # Errors
    /// `InvalidOrderCancellation` for an order ID without a market ID,
    /// `MarketDoesNotExist`, or the market's cancellation errors.
    pub fn cancel_order(
        &mut self,
        party: &PartyId,
        cancellation: &OrderCancellation,
    ) -> Result<Vec<Order>> {
        match (&cancellation.market_id, &cancellation.order_id) {
            (None, Some(_)) => Err(MarketcoreError::InvalidOrderCancellation),
            (Some(market), Some(order)) => {
                let result = self.market_mut(market)?.cancel_order(party, order);
                self.flush(market);
                result.map(|order| vec![order])
            }
            (Some(market), None) => {
                let result = self.market_mut(market)?.cancel_all_orders(party);
                self.flush(market);
                result
            }
            (None, None) => {
                let mut cancelled = Vec::new();
                for id in self.market_order.clone() {
                    let result = self.market_mut(&id)?.cancel_all_orders(party);
                    self.flush(&id);
                    match result {
                        Ok(orders) => cancelled.extend(orders),
                        Err(MarketcoreError::TradingNotAllowed { .. }) => {}
                        Err(err) => return Err(err),
                    }
                }
                Ok(cancelled)
            }
        }
    }

    // =================================================================
    // Liquidity provision
    // =================================================================

    /// # Errors
    /// `MarketDoesNotExist`, or the shape component's validation errors.
    pub fn submit_liquidity_provision(
        &mut self,
        party: &PartyId,
        commitment: LiquidityCommitment,
    ) -> Result<()> {
        let id = commitment.market_id.clone();
        let result = self
            .market_mut(&id)?
            .submit_liquidity_provision(party, commitment);
        self.flush(&id);
        result
    }

    /// # Errors
    /// `MarketDoesNotExist`, `LiquidityProvisionNotFound`.
    pub fn amend_liquidity_provision(
        &mut self,
        party: &PartyId,
        amendment: &LiquidityAmendment,
    ) -> Result<()> {
        let id = amendment.market_id.clone();
        let result = self
            .market_mut(&id)?
            .amend_liquidity_provision(party, amendment);
        self.flush(&id);
        result
    }

    /// # Errors
    /// `MarketDoesNotExist`, `LiquidityProvisionNotFound`.
    pub fn cancel_liquidity_provision(&mut self, market: &MarketId, party: &PartyId) -> Result<()> {
        let result = self.market_mut(market)?.cancel_liquidity_provision(party);
        self.flush(market);
        result
    }

    // =================================================================
    // Checkpoint
    // =================================================================

    /// Serializes the retained state of every market, ordered by ID.
    ///
    /// Live markets are captured fresh; retained records of markets that are
    /// gone are included while still valid. Markets that were never enacted
    /// and successors still in their opening auction carry no state yet: a
    /// record for them would make a restore treat the succession as done.
    ///
    /// # Errors
    /// `CheckpointEncode` if serialization fails.
    pub fn checkpoint(&self) -> Result<Vec<u8>> {
        let mut records: BTreeMap<MarketId, CheckpointRecord> = self
            .cp_states
            .iter()
            .filter(|(id, state)| !state.is_expired(self.now) && !self.is_unsettled(id))
            .map(|(id, state)| (id.clone(), state.to_record()))
            .collect();
        let ttl = self.now + self.config.successor_window();
        for (id, market) in &self.markets {
            if self.is_unsettled(id) {
                continue;
            }
            let balance = self.collateral.insurance_balance(id, market.settlement_asset());
            records.insert(id.clone(), market.get_cp_state(balance, ttl).to_record());
        }
        let bytes = checkpoint::encode(records)?;
        tracing::debug!(markets = self.markets.len(), bytes = bytes.len(), "Checkpoint taken");
        Ok(bytes)
    }

    /// Proposed, or a successor that has not left its opening auction.
    fn is_unsettled(&self, id: &MarketId) -> bool {
        self.markets.get(id).is_some_and(|m| match m.state() {
            MarketState::Proposed => true,
            MarketState::Pending => m.parent_id().is_some(),
            _ => false,
        })
    }

        /// Replaces retained state with the contents of a checkpoint. Empty
    /// input clears it.
    ///
    /// # Errors
    /// `CheckpointDecode` or `UnsupportedCheckpointVersion`; retained state
    /// is untouched on error.
    pub fn load(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            self.cp_states.clear();
            tracing::info!("Empty checkpoint, retained state cleared");
            return Ok(());
        }
        let records = checkpoint::decode(bytes)?;
        let ttl = self.clock.now() + self.config.successor_window();
        self.cp_states = records
            .into_iter()
            .map(|(id, record)| (id, CpMarketState::from_record(record, ttl)))
            .collect();
        tracing::info!(markets = self.cp_states.len(), %ttl, "Checkpoint loaded");
        Ok(())
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn market_exists(&self, id: &MarketId) -> bool {
        self.markets.contains_key(id)
    }

    #[must_use]
    pub fn markets_len(&self) -> usize {
        self.markets.len()
    }

    #[must_use]
    pub fn market(&self, id: &MarketId) -> Option<&Market> {
        self.markets.get(id)
    }

    /// Definition of a live market; with `settled`, also the frozen
    /// definition of a closed or settled market still retained.
    #[must_use]
    pub fn get_market(&self, id: &MarketId, settled: bool) -> Option<MarketDefinition> {
        if let Some(market) = self.markets.get(id) {
            return Some(market.definition().clone());
        }
        if settled {
            return self.cp_states.get(id).and_then(|s| s.market.clone());
        }
        None
    }

    /// # Errors
    /// `MarketDoesNotExist`.
    pub fn get_market_state(&self, id: &MarketId) -> Result<MarketState> {
        self.market_ref(id).map(Market::state)
    }

    /// # Errors
    /// `MarketDoesNotExist`.
    pub fn get_market_data(&self, id: &MarketId) -> Result<MarketData> {
        self.market_ref(id).map(Market::market_data)
    }

    /// # Errors
    /// `MarketDoesNotExist`.
    pub fn get_market_asset(&self, id: &MarketId) -> Result<String> {
        self.market_ref(id)
            .map(|m| m.settlement_asset().to_string())
    }

    /// A party's equity-like share; zero for a party without one. `None`
    /// when the market does not exist.
    #[must_use]
    pub fn get_equity_like_share_for_market_and_party(
        &self,
        market: &MarketId,
        party: &PartyId,
    ) -> Option<Decimal> {
        self.markets
            .get(market)
            .map(|m| m.equity_like_share(party).unwrap_or(Decimal::ZERO))
    }

    /// Only live markets can report succession; a parent that is gone has
    /// no say in whether a successor proposal goes ahead.
    #[must_use]
    pub fn is_succeeded(&self, id: &MarketId) -> bool {
        self.markets.get(id).is_some_and(Market::is_succeeded)
    }

    #[must_use]
    pub fn market_counters(&self) -> BTreeMap<MarketId, MarketCounters> {
        self.markets
            .iter()
            .map(|(id, m)| (id.clone(), m.counters()))
            .collect()
    }

    /// Whether `value` traded in a market earns its proposer a bonus.
    #[must_use]
    pub fn is_eligible_for_proposer_bonus(&self, id: &MarketId, value: Decimal) -> bool {
        let Some(market) = self.markets.get(id) else {
            return false;
        };
        match self.collateral.asset_quantum(market.settlement_asset()) {
            Ok(quantum) => value > quantum * self.config.market_creation_quantum_multiple,
            Err(err) => {
                tracing::warn!(market = %id, error = %err, "Asset quantum unavailable");
                false
            }
        }
    }

    /// Deterministic digest of all markets (in ID order) and the ledger.
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        let mut ids: Vec<&MarketId> = self.markets.keys().collect();
        ids.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(b"marketcore:engine:v1:");
        hasher.update((ids.len() as u64).to_le_bytes());
        for id in ids {
            if let Some(market) = self.markets.get(id) {
                let hash = market.hash();
                tracing::trace!(market = %id, hash = %hex::encode(hash), "Market state hash");
                hasher.update(hash);
            }
        }
        hasher.update(self.collateral.hash());
        hasher.finalize().into()
    }

    // =================================================================
    // Helpers
    // =================================================================

    fn market_ref(&self, id: &MarketId) -> Result<&Market> {
        self.markets
            .get(id)
            .ok_or_else(|| MarketcoreError::MarketDoesNotExist(id.clone()))
    }

    fn market_mut(&mut self, id: &MarketId) -> Result<&mut Market> {
        self.markets
            .get_mut(id)
            .ok_or_else(|| MarketcoreError::MarketDoesNotExist(id.clone()))
    }

    /// Publishes whatever a market emitted since the last flush.
    pub(crate) fn flush(&mut self, id: &MarketId) {
        if let Some(market) = self.markets.get_mut(id) {
            let events = market.take_events();
            if !events.is_empty() {
                self.events.send_batch(events);
            }
        }
    }
}
