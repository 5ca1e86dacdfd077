//! A single market: lifecycle state machine, order entry and the
//! per-tick maintenance the engine drives.
//!
//! ```text
//! Proposed ──start_opening_auction──▶ Pending ──auction ends──▶ Active
//!    │                                   │                    │  ▲
//!    └──reject──▶ Rejected               │         bounds hit ▼  │ auction ends
//!                                        │                  Suspended
//!                      terminate ◀───────┴──── any live state ───▶ Closed / Settled
//!                      (Cancelled)
//! ```
//!
//! `Succeeded` behaves like `Active` for trading; it only records that a
//! successor has taken over.

mod auction;
mod equity_shares;
mod fees;
mod pegged;
mod repricer;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use marketcore_types::{
    AuctionTrigger, Book, Collateral, ComponentFactory, CpMarketState, Event, LiquidityAmendment,
    LiquidityCommitment, LiquidityShape, MarketCounters, MarketData, MarketDefinition, MarketId,
    MarketParams, MarketState, MarketStateUpdate, MarketcoreError, NetworkParameter, Order,
    OrderAmendment, OrderConfirmation, OrderId, OrderOrigin, OrderStatus, OrderSubmission,
    PartyId, PeggedOrder, Result, Trade, TradingMode, duration_from_ms,
};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

pub use auction::AuctionState;
pub use equity_shares::EquityShares;
pub use fees::{LiquidityFees, split_pool};
pub use pegged::PeggedOrders;
use repricer::StaticReferences;

/// What happened to a market during a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// The market reached a final state and should be removed.
    pub closing: bool,
    /// The market left its opening auction on this tick.
    pub left_opening_auction: bool,
}

pub struct Market {
    def: MarketDefinition,
    params: MarketParams,
    book: Box<dyn Book>,
    liquidity: Box<dyn LiquidityShape>,
    trigger: Box<dyn AuctionTrigger>,
    auction: AuctionState,
    pegged: PeggedOrders,
    equity: EquityShares,
    fees: LiquidityFees,
    /// Static prices seen by the last repricing cycle.
    references: StaticReferences,
    /// Parties that ever placed orders or commitments here.
    participants: BTreeSet<PartyId>,
    /// Good-till-time orders by expiry. Entries of orders that already left
    /// are skipped when they come due.
    expiring: BTreeSet<(DateTime<Utc>, u64, OrderId)>,
    opening_at: DateTime<Utc>,
    last_traded_price: Option<Decimal>,
    /// Accumulated traded notional.
    last_trade_value: Decimal,
    /// Own trade value before a parent's was inherited.
    pre_inherit_trade_value: Option<Decimal>,
    order_sequence: u64,
    succeeded: bool,
    closing: bool,
    now: DateTime<Utc>,
    events: Vec<Event>,
}

impl Market {
    /// Builds a market in the Proposed state. `state` and `trading_mode` of
    /// the definition are overwritten.
    pub fn new(
        mut definition: MarketDefinition,
        params: MarketParams,
        components: &dyn ComponentFactory,
        opening_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        definition.state = MarketState::Proposed;
        definition.trading_mode = TradingMode::NoTrading;
        let id = definition.id.clone();
        let fees = LiquidityFees::new(
            definition.liquidity_fee_factor,
            params.liquidity_fee_cap,
            params.fee_distribution_step(),
        );
        definition.liquidity_fee_factor = fees.factor();
        Self {
            book: components.book(&id),
            liquidity: components.liquidity(&id),
            trigger: components.auction_trigger(&id, definition.price_monitoring_bound),
            def: definition,
            params,
            auction: AuctionState::default(),
            pegged: PeggedOrders::new(),
            equity: EquityShares::new(),
            fees,
            references: StaticReferences::default(),
            participants: BTreeSet::new(),
            expiring: BTreeSet::new(),
            opening_at,
            last_traded_price: None,
            last_trade_value: Decimal::ZERO,
            pre_inherit_trade_value: None,
            order_sequence: 0,
            succeeded: false,
            closing: false,
            now,
            events: Vec::new(),
        }
    }

    // =================================================================
    // Accessors
    // =================================================================

    #[must_use]
    pub fn id(&self) -> &MarketId {
        &self.def.id
    }

    #[must_use]
    pub fn definition(&self) -> &MarketDefinition {
        &self.def
    }

    #[must_use]
    pub fn state(&self) -> MarketState {
        self.def.state
    }

    #[must_use]
    pub fn trading_mode(&self) -> TradingMode {
        self.def.trading_mode
    }

    #[must_use]
    pub fn settlement_asset(&self) -> &str {
        &self.def.settlement_asset
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<&MarketId> {
        self.def.parent_market_id.as_ref()
    }

    #[must_use]
    pub fn insurance_pool_fraction(&self) -> Decimal {
        self.def.insurance_pool_fraction
    }

    #[must_use]
    pub fn params(&self) -> &MarketParams {
        &self.params
    }

    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.succeeded
    }

    #[must_use]
    pub fn in_opening_auction(&self) -> bool {
        self.auction.is_opening()
    }

    #[must_use]
    pub fn last_trade_value(&self) -> Decimal {
        self.last_trade_value
    }

    #[must_use]
    pub fn equity(&self) -> &EquityShares {
        &self.equity
    }

    #[must_use]
    pub fn equity_like_share(&self, party: &PartyId) -> Option<Decimal> {
        self.equity.get(party).map(|e| e.share)
    }

    /// Live pegged orders, parked or not.
    #[must_use]
    pub fn pegged_count(&self) -> usize {
        self.pegged.len()
    }

    #[must_use]
    pub fn book(&self) -> &dyn Book {
        self.book.as_ref()
    }

    /// Looks up an order on the book or among parked pegged orders.
    #[must_use]
    pub fn order(&self, id: &OrderId) -> Option<&Order> {
        self.pegged.get_parked(id).or_else(|| self.book.get(id))
    }

    /// Drains the events produced since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    fn emit_updated(&mut self) {
        self.emit(Event::MarketUpdated(self.def.clone()));
    }

    fn set_mode(&mut self) {
        self.def.trading_mode = self.auction.mode();
    }

    fn continuous_state(&self) -> MarketState {
        if self.succeeded {
            MarketState::Succeeded
        } else {
            MarketState::Active
        }
    }

    fn ensure_trading(&self) -> Result<()> {
        if self.def.state.accepts_orders() && !self.closing {
            Ok(())
        } else {
            Err(MarketcoreError::TradingNotAllowed {
                market: self.def.id.clone(),
                state: self.def.state,
            })
        }
    }

    // =================================================================
    // Lifecycle
    // =================================================================

    /// Moves a Proposed market into its opening auction.
    pub fn start_opening_auction(&mut self) -> Result<()> {
        if self.def.state != MarketState::Proposed {
            return Err(MarketcoreError::CannotStartOpeningAuction {
                market: self.def.id.clone(),
                state: self.def.state,
            });
        }
        let length = duration_from_ms(self.def.opening_auction_duration_ms);
        let min_end = self.opening_at + self.params.auction_min_duration();
        self.auction.start_opening(self.opening_at, length, min_end);
        self.book.enter_auction();
        self.def.state = MarketState::Pending;
        self.set_mode();
        tracing::info!(
            market = %self.def.id,
            auction_end = ?self.auction.end(),
            "Opening auction started"
        );
        self.emit_updated();
        Ok(())
    }

    /// Rejection is only valid before enactment: for Proposed markets, and
    /// for successors still in their opening auction.
    pub fn reject(&mut self) -> Result<()> {
        let allowed = match self.def.state {
            MarketState::Proposed => true,
            MarketState::Pending => self.def.parent_market_id.is_some(),
            _ => false,
        };
        if !allowed {
            return Err(MarketcoreError::CannotRejectMarket {
                market: self.def.id.clone(),
                state: self.def.state,
            });
        }
        self.close_out(MarketState::Rejected);
        tracing::info!(market = %self.def.id, "Market rejected");
        Ok(())
    }

    /// Records that a successor took over. Trading carries on.
    pub fn set_succeeded(&mut self) -> Result<()> {
        if self.def.state == MarketState::Proposed {
            return Err(MarketcoreError::InvalidStateChange {
                market: self.def.id.clone(),
                reason: "a proposed market cannot be succeeded".into(),
            });
        }
        self.succeeded = true;
        if self.def.state == MarketState::Active {
            self.def.state = MarketState::Succeeded;
            self.emit_updated();
        }
        tracing::info!(market = %self.def.id, state = %self.def.state, "Market succeeded");
        Ok(())
    }

    /// Replaces the mutable parts of the definition.
    pub fn update(
        &mut self,
        definition: &MarketDefinition,
        components: &dyn ComponentFactory,
    ) -> Result<()> {
        if definition.id != self.def.id
            || definition.settlement_asset != self.def.settlement_asset
            || definition.parent_market_id != self.def.parent_market_id
        {
            return Err(MarketcoreError::InvalidMarketUpdate {
                reason: "market ID, settlement asset and parent cannot change".into(),
            });
        }
        if definition.insurance_pool_fraction < Decimal::ZERO
            || definition.insurance_pool_fraction > Decimal::ONE
        {
            return Err(MarketcoreError::InvalidMarketUpdate {
                reason: format!(
                    "insurance pool fraction {} outside [0, 1]",
                    definition.insurance_pool_fraction
                ),
            });
        }

        self.def.insurance_pool_fraction = definition.insurance_pool_fraction;
        self.def.opening_auction_duration_ms = definition.opening_auction_duration_ms;
        if definition.price_monitoring_bound != self.def.price_monitoring_bound {
            self.def.price_monitoring_bound = definition.price_monitoring_bound;
            self.trigger = components.auction_trigger(&self.def.id, definition.price_monitoring_bound);
            self.trigger.reset(self.last_traded_price);
        }
        self.fees
            .set_factor(definition.liquidity_fee_factor, self.params.liquidity_fee_cap);
        self.def.liquidity_fee_factor = self.fees.factor();

        tracing::info!(market = %self.def.id, "Market definition updated");
        self.emit_updated();
        Ok(())
    }

    /// Governance-driven state change.
    pub fn update_state(&mut self, update: &MarketStateUpdate) -> Result<()> {
        let invalid = |market: &MarketId, reason: &str| MarketcoreError::InvalidStateChange {
            market: market.clone(),
            reason: reason.to_string(),
        };
        match update {
            MarketStateUpdate::Suspend => {
                if self.def.state == MarketState::Proposed || self.def.state.is_final() {
                    return Err(invalid(&self.def.id, "market is not trading"));
                }
                if self.def.state == MarketState::SuspendedViaGovernance {
                    return Ok(());
                }
                if !self.auction.in_auction() {
                    self.book.enter_auction();
                    self.enter_auction_special_orders();
                }
                self.auction.suspend();
                self.def.state = MarketState::SuspendedViaGovernance;
                self.set_mode();
                tracing::info!(market = %self.def.id, "Market suspended via governance");
                self.emit_updated();
            }
            MarketStateUpdate::Resume => {
                if self.def.state != MarketState::SuspendedViaGovernance {
                    return Err(invalid(&self.def.id, "market is not suspended via governance"));
                }
                match self.auction.resume() {
                    Some(TradingMode::OpeningAuction) => {
                        self.def.state = MarketState::Pending;
                        self.set_mode();
                        self.emit_updated();
                    }
                    Some(TradingMode::MonitoringAuction) => {
                        self.def.state = MarketState::Suspended;
                        self.set_mode();
                        self.emit_updated();
                    }
                    _ => self.leave_auction(false),
                }
                tracing::info!(market = %self.def.id, state = %self.def.state, "Market resumed");
            }
            MarketStateUpdate::Terminate { settlement_price } => {
                if self.def.state.is_final() {
                    return Err(invalid(&self.def.id, "market already terminated"));
                }
                let state = match (self.def.state, settlement_price) {
                    (MarketState::Proposed | MarketState::Pending, _) => MarketState::Cancelled,
                    (_, Some(_)) => MarketState::Settled,
                    (_, None) => MarketState::Closed,
                };
                if let Some(price) = settlement_price {
                    self.last_traded_price = Some(*price);
                }
                self.close_out(state);
                tracing::info!(
                    market = %self.def.id,
                    state = %state,
                    settlement_price = ?settlement_price,
                    "Market terminated"
                );
            }
        }
        Ok(())
    }

    /// Cancels everything on the book and moves to a final state.
    fn close_out(&mut self, state: MarketState) {
        let now = self.now;
        let parties: Vec<PartyId> = self.participants.iter().cloned().collect();
        for party in &parties {
            for id in self.book.orders_for_party(party) {
                if let Ok(mut order) = self.book.remove(&id, OrderStatus::Cancelled) {
                    order.updated_at = now;
                    self.emit(Event::OrderUpdated(order));
                }
            }
            for id in self.pegged.parked_for_party(party) {
                if let Some(mut order) = self.pegged.remove(&id) {
                    order.status = OrderStatus::Cancelled;
                    order.updated_at = now;
                    self.emit(Event::OrderUpdated(order));
                }
            }
            if self.liquidity.commitment(party).is_some() {
                // Orders are gone already; only the commitment remains.
                match self.liquidity.cancel(party) {
                    Ok(orders) => {
                        tracing::debug!(market = %self.def.id, party = %party, orders = orders.len(), "Commitment closed out");
                    }
                    Err(err) => {
                        tracing::debug!(market = %self.def.id, party = %party, error = %err, "Commitment already gone");
                    }
                }
            }
        }
        self.pegged = PeggedOrders::new();
        self.expiring.clear();
        self.auction.stop();
        self.def.state = state;
        self.set_mode();
        self.closing = true;
        self.emit_updated();
    }

    /// Advances the market to `now`, ending any auction whose time is up.
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        self.now = now;
        if self.closing {
            return TickOutcome {
                closing: true,
                left_opening_auction: false,
            };
        }
        self.remove_expired_orders(now);
        let mut left_opening_auction = false;
        if self.auction.can_end(now) {
            left_opening_auction = self.auction.is_opening();
            self.leave_auction(left_opening_auction);
        }
        TickOutcome {
            closing: self.closing,
            left_opening_auction,
        }
    }

    /// Takes every good-till-time order due at `now` off the book or out of
    /// the parked set.
    fn remove_expired_orders(&mut self, now: DateTime<Utc>) {
        let mut expired = Vec::new();
        while let Some(&(at, _, id)) = self.expiring.first() {
            if at > now {
                break;
            }
            self.expiring.pop_first();
            let order = match self.pegged.remove(&id) {
                Some(mut parked) => {
                    parked.status = OrderStatus::Expired;
                    Some(parked)
                }
                None => self.book.remove(&id, OrderStatus::Expired).ok(),
            };
            let Some(mut order) = order else {
                continue;
            };
            order.updated_at = now;
            self.emit(Event::OrderUpdated(order.clone()));
            expired.push(order);
        }
        if !expired.is_empty() {
            tracing::debug!(market = %self.def.id, count = expired.len(), "Orders expired");
            self.check_for_reference_moves(expired, false);
        }
    }

    fn enter_monitoring_auction(&mut self) {
        self.auction
            .start_monitoring(self.now, self.params.auction_min_duration());
        self.book.enter_auction();
        if matches!(self.def.state, MarketState::Active | MarketState::Succeeded) {
            self.def.state = MarketState::Suspended;
        }
        self.set_mode();
        self.enter_auction_special_orders();
        tracing::info!(
            market = %self.def.id,
            auction_end = ?self.auction.end(),
            "Price monitoring auction started"
        );
        self.emit_updated();
    }

    /// Uncrosses the book and resumes continuous trading.
    fn leave_auction(&mut self, opening: bool) {
        let now = self.now;
        let trades = self.book.leave_auction(now);
        self.auction.set_continuous();
        self.def.state = self.continuous_state();
        self.set_mode();

        self.record_trades(&trades, false);
        for trade in trades {
            self.emit(Event::Trade(trade));
        }
        self.trigger.reset(self.last_traded_price);

        if opening {
            // Inherited values become permanent once the market opens.
            self.pre_inherit_trade_value = None;
            self.equity.commit();
            self.fees.start(now);
            tracing::info!(market = %self.def.id, "Opening auction ended, trading continuously");
        } else {
            tracing::info!(market = %self.def.id, "Auction ended, trading continuously");
        }
        self.emit_updated();
        self.check_for_reference_moves(Vec::new(), true);
    }

    /// Accounts for trades. Returns whether price monitoring was breached.
    fn record_trades(&mut self, trades: &[Trade], monitor: bool) -> bool {
        let mut breached = false;
        for trade in trades {
            self.last_traded_price = Some(trade.price);
            self.last_trade_value += trade.notional();
            self.fees.on_trade(trade);
            if monitor && self.trigger.on_trade(trade.price) {
                breached = true;
            }
        }
        breached
    }

    /// Credits accrued liquidity fees and, when due, pays the fee pool out
    /// by equity-like share.
    pub fn block_end(&mut self, collateral: &mut impl Collateral) {
        let id = self.def.id.clone();
        let asset = self.def.settlement_asset.clone();
        let accrued = self.fees.take_pending();
        if accrued > Decimal::ZERO {
            collateral.accrue_liquidity_fees(&id, &asset, accrued);
        }
        if !self.fees.distribution_due(self.now) {
            return;
        }

        self.equity.apply_growth(self.last_trade_value);
        let pool = collateral.liquidity_fee_balance(&id, &asset);
        let amounts = split_pool(pool, self.equity.share_weights());
        if amounts.is_empty() {
            return;
        }
        match collateral.distribute_liquidity_fees(&id, &asset, &amounts) {
            Ok(movements) => {
                tracing::debug!(
                    market = %id,
                    pool = %pool,
                    providers = amounts.len(),
                    "Liquidity fees distributed"
                );
                self.emit(Event::LiquidityFeesDistributed {
                    market_id: id,
                    amounts,
                    timestamp: self.now,
                });
                self.emit(Event::LedgerMovements(movements));
            }
            Err(err) => {
                tracing::warn!(market = %id, error = %err, "Liquidity fee distribution failed");
            }
        }
    }

    pub fn apply_network_parameter(&mut self, param: &NetworkParameter) {
        crate::netparams::apply_to_params(&mut self.params, param);
        match *param {
            NetworkParameter::LiquidityFeeCap(cap) => {
                self.fees.cap(cap);
                if self.def.liquidity_fee_factor != self.fees.factor() {
                    self.def.liquidity_fee_factor = self.fees.factor();
                    self.emit_updated();
                }
            }
            NetworkParameter::FeeDistributionTimeStep(step) => self.fees.set_step(step),
            NetworkParameter::AuctionMinDuration(min) => {
                // A running opening auction must still last the new minimum.
                if self.auction.is_opening() {
                    self.auction.extend_to(self.opening_at + min);
                }
            }
            _ => {}
        }
    }

    // =================================================================
    // Succession and checkpoint state
    // =================================================================

    /// Snapshot of the state successors inherit.
    #[must_use]
    pub fn get_cp_state(&self, insurance_balance: Decimal, ttl: DateTime<Utc>) -> CpMarketState {
        CpMarketState {
            id: self.def.id.clone(),
            shares: self.equity.shares().clone(),
            insurance_balance,
            last_trade_value: self.last_trade_value,
            ttl,
            state: self.def.state,
            market: self
                .def
                .state
                .keeps_definition()
                .then(|| self.def.clone()),
        }
    }

    /// Tentatively adopts the parent's trade value and equity-like shares.
    /// Skipped while the parent is itself not yet trading.
    pub fn inherit_parent(&mut self, parent: &CpMarketState) {
        if matches!(parent.state, MarketState::Proposed | MarketState::Pending) {
            return;
        }
        if self.pre_inherit_trade_value.is_none() {
            self.pre_inherit_trade_value = Some(self.last_trade_value);
        }
        self.last_trade_value = parent.last_trade_value;
        self.equity.inherit(&parent.shares);
    }

    /// Undoes `inherit_parent` for a market that did not open.
    pub fn rollback_inherit(&mut self) {
        if !matches!(self.def.state, MarketState::Proposed | MarketState::Pending) {
            return;
        }
        if let Some(value) = self.pre_inherit_trade_value.take() {
            self.last_trade_value = value;
        }
        self.equity.rollback();
    }

    /// Reinstates checkpointed equity-like shares and trade value.
    pub fn restore_els(&mut self, state: &CpMarketState) {
        self.equity.restore(&state.shares, state.last_trade_value);
        self.last_trade_value = state.last_trade_value;
        self.pre_inherit_trade_value = None;
    }

    /// Forgets the parent: the market will open as a fresh market.
    pub fn reset_parent(&mut self) {
        if self.def.parent_market_id.take().is_some() {
            tracing::debug!(market = %self.def.id, "Parent link reset");
        }
        self.def.insurance_pool_fraction = Decimal::ZERO;
    }

    // =================================================================
    // Orders
    // =================================================================

    pub fn submit_order(
        &mut self,
        party: &PartyId,
        submission: &OrderSubmission,
    ) -> Result<OrderConfirmation> {
        self.ensure_trading()?;
        if submission.market_id != self.def.id {
            return Err(MarketcoreError::InvalidOrder {
                reason: format!("order for market {} sent to {}", submission.market_id, self.def.id),
            });
        }
        submission.validate()?;
        if let Some(at) = submission.expires_at.filter(|at| *at <= self.now) {
            return Err(MarketcoreError::InvalidOrder {
                reason: format!("expiry {at} is not after {}", self.now),
            });
        }

        let sequence = self.order_sequence;
        self.order_sequence += 1;
        let now = self.now;
        let mut order = Order {
            id: OrderId::deterministic(&self.def.id, sequence),
            market_id: self.def.id.clone(),
            party: party.clone(),
            side: submission.side,
            order_type: submission.order_type,
            status: OrderStatus::Active,
            price: submission.price.unwrap_or(Decimal::ZERO),
            size: submission.size,
            remaining: submission.size,
            pegged: submission.pegged,
            origin: OrderOrigin::User,
            sequence,
            created_at: now,
            updated_at: now,
            expires_at: submission.expires_at,
        };
        self.participants.insert(party.clone());
        if let Some(at) = order.expires_at {
            self.expiring.insert((at, sequence, order.id));
        }

        if order.is_pegged() {
            match self.pegged_price(&order) {
                Some(price) => order.price = price,
                None => {
                    order.park(now);
                    tracing::debug!(market = %self.def.id, order = %order.id, "Pegged order parked on entry");
                    self.pegged.add_parked(order.clone());
                    self.emit(Event::OrderUpdated(order.clone()));
                    return Ok(OrderConfirmation {
                        order,
                        trades: Vec::new(),
                        passive_updates: Vec::new(),
                    });
                }
            }
        }

        let confirmation = self.book.submit(order, now)?;
        if confirmation.order.is_pegged() && confirmation.order.status.is_live() {
            self.pegged.add(confirmation.order.id);
        }
        self.after_matching(&confirmation);
        Ok(confirmation)
    }

    pub fn amend_order(
        &mut self,
        party: &PartyId,
        amendment: &OrderAmendment,
    ) -> Result<OrderConfirmation> {
        self.ensure_trading()?;
        let id = amendment.order_id.ok_or_else(|| MarketcoreError::InvalidOrder {
            reason: "amendment without order ID".into(),
        })?;
        let mut order = self
            .order(&id)
            .cloned()
            .ok_or(MarketcoreError::OrderNotFound(id))?;
        self.check_owned(&order, party)?;

        if let Some(size) = amendment.size {
            if size <= order.filled() {
                return Err(MarketcoreError::InvalidOrder {
                    reason: format!("new size {size} does not exceed filled {}", order.filled()),
                });
            }
            order.remaining = size - order.filled();
            order.size = size;
        }
        match (order.pegged, amendment.pegged_reference, amendment.pegged_offset) {
            (None, None, None) => {}
            (None, _, _) => {
                return Err(MarketcoreError::InvalidOrder {
                    reason: "only pegged orders take a pegged reference or offset".into(),
                });
            }
            (Some(peg), reference, offset) => {
                let next = PeggedOrder::new(
                    reference.unwrap_or(peg.reference),
                    offset.unwrap_or(peg.offset),
                );
                next.validate(order.side)?;
                order.pegged = Some(next);
            }
        }
        if let Some(price) = amendment.price {
            if order.is_pegged() || price <= Decimal::ZERO {
                return Err(MarketcoreError::InvalidOrder {
                    reason: "price amendments need a positive price on a non-pegged order".into(),
                });
            }
            order.price = price;
        }

        let now = self.now;
        if self.pegged.unpark(&id).is_none() {
            self.book.remove(&id, order.status)?;
        }
        order.updated_at = now;

        if order.is_pegged() {
            match self.pegged_price(&order) {
                Some(price) => order.price = price,
                None => {
                    self.park_pegged(order.clone());
                    return Ok(OrderConfirmation {
                        order: Order {
                            status: OrderStatus::Parked,
                            price: Decimal::ZERO,
                            ..order
                        },
                        trades: Vec::new(),
                        passive_updates: Vec::new(),
                    });
                }
            }
        }

        let confirmation = self.book.submit(order, now)?;
        if confirmation.order.is_pegged() && !confirmation.order.status.is_live() {
            self.pegged.remove(&id);
        }
        self.after_matching(&confirmation);
        Ok(confirmation)
    }

    pub fn cancel_order(&mut self, party: &PartyId, id: &OrderId) -> Result<Order> {
        self.ensure_trading()?;
        let order = self.cancel_one(party, id)?;
        self.check_for_reference_moves(Vec::new(), false);
        Ok(order)
    }

    /// Cancels every user order of `party` in this market.
    pub fn cancel_all_orders(&mut self, party: &PartyId) -> Result<Vec<Order>> {
        self.ensure_trading()?;
        let mut ids: Vec<OrderId> = self
            .book
            .orders_for_party(party)
            .into_iter()
            .filter(|id| self.book.get(id).is_some_and(|o| !o.is_liquidity()))
            .collect();
        ids.extend(self.pegged.parked_for_party(party));

        let mut cancelled = Vec::with_capacity(ids.len());
        for id in &ids {
            cancelled.push(self.cancel_one(party, id)?);
        }
        if !cancelled.is_empty() {
            self.check_for_reference_moves(Vec::new(), false);
        }
        Ok(cancelled)
    }

    fn cancel_one(&mut self, party: &PartyId, id: &OrderId) -> Result<Order> {
        let order = self.order(id).ok_or(MarketcoreError::OrderNotFound(*id))?;
        self.check_owned(order, party)?;
        let now = self.now;
        let mut cancelled = match self.pegged.remove(id) {
            Some(parked) => parked,
            None => self.book.remove(id, OrderStatus::Cancelled)?,
        };
        cancelled.status = OrderStatus::Cancelled;
        cancelled.updated_at = now;
        tracing::debug!(market = %self.def.id, order = %id, "Order cancelled");
        self.emit(Event::OrderUpdated(cancelled.clone()));
        Ok(cancelled)
    }

    fn check_owned(&self, order: &Order, party: &PartyId) -> Result<()> {
        if order.party != *party {
            return Err(MarketcoreError::OrderNotOwned {
                order: order.id,
                party: party.clone(),
            });
        }
        if order.is_liquidity() {
            return Err(MarketcoreError::InvalidOrder {
                reason: format!("order {} belongs to a liquidity commitment", order.id),
            });
        }
        Ok(())
    }

    /// Publishes a matching outcome and runs follow-up maintenance.
    fn after_matching(&mut self, confirmation: &OrderConfirmation) {
        self.emit(Event::OrderUpdated(confirmation.order.clone()));
        for passive in &confirmation.passive_updates {
            if passive.is_pegged() && !passive.status.is_live() {
                self.pegged.remove(&passive.id);
            }
            self.emit(Event::OrderUpdated(passive.clone()));
        }
        for trade in &confirmation.trades {
            self.emit(Event::Trade(trade.clone()));
        }

        let in_continuous = !self.auction.in_auction();
        if self.record_trades(&confirmation.trades, in_continuous) {
            self.enter_monitoring_auction();
            return;
        }
        let updated = if confirmation.trades.is_empty() {
            Vec::new()
        } else {
            let mut updated = confirmation.passive_updates.clone();
            updated.push(confirmation.order.clone());
            updated
        };
        self.check_for_reference_moves(updated, false);
    }

    // =================================================================
    // Liquidity provision
    // =================================================================

    pub fn submit_liquidity_provision(
        &mut self,
        party: &PartyId,
        commitment: LiquidityCommitment,
    ) -> Result<()> {
        self.ensure_trading()?;
        self.commit_liquidity(party, commitment)
    }

    /// The proposer's commitment, accepted while the market is still
    /// Proposed. Orders follow once there are prices to shape them on.
    pub fn submit_proposal_commitment(
        &mut self,
        party: &PartyId,
        commitment: LiquidityCommitment,
    ) -> Result<()> {
        if self.def.state != MarketState::Proposed {
            self.ensure_trading()?;
        }
        self.commit_liquidity(party, commitment)
    }

    fn commit_liquidity(&mut self, party: &PartyId, commitment: LiquidityCommitment) -> Result<()> {
        if commitment.market_id != self.def.id {
            return Err(MarketcoreError::InvalidLiquidityProvision {
                reason: format!("commitment for market {} sent to {}", commitment.market_id, self.def.id),
            });
        }
        self.liquidity.submit(party, commitment)?;
        self.participants.insert(party.clone());
        self.equity.set_party_stake(party, self.liquidity.stake(party));
        tracing::info!(market = %self.def.id, party = %party, "Liquidity provision submitted");
        self.refresh_liquidity();
        Ok(())
    }

    pub fn amend_liquidity_provision(
        &mut self,
        party: &PartyId,
        amendment: &LiquidityAmendment,
    ) -> Result<()> {
        self.ensure_trading()?;
        self.liquidity.amend(party, amendment)?;
        self.equity.set_party_stake(party, self.liquidity.stake(party));
        tracing::info!(market = %self.def.id, party = %party, "Liquidity provision amended");
        self.refresh_liquidity();
        Ok(())
    }

    pub fn cancel_liquidity_provision(&mut self, party: &PartyId) -> Result<()> {
        self.ensure_trading()?;
        let ids = self.liquidity.cancel(party)?;
        self.remove_liquidity_orders(&ids);
        self.equity.set_party_stake(party, Decimal::ZERO);
        tracing::info!(market = %self.def.id, party = %party, "Liquidity provision cancelled");
        Ok(())
    }

    // =================================================================
    // Reporting
    // =================================================================

    #[must_use]
    pub fn market_data(&self) -> MarketData {
        let best_static_bid = self.book.best_static_bid();
        let best_static_ask = self.book.best_static_ask();
        let mid_price = match (best_static_bid, best_static_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        };
        MarketData {
            market_id: self.def.id.clone(),
            state: self.def.state,
            trading_mode: self.def.trading_mode,
            best_bid: self.book.best_bid(),
            best_ask: self.book.best_ask(),
            best_static_bid,
            best_static_ask,
            mid_price,
            last_traded_price: self.last_traded_price,
            indicative_price: self
                .auction
                .in_auction()
                .then(|| self.book.indicative_price())
                .flatten(),
            auction_end: self.auction.in_auction().then(|| self.auction.end()).flatten(),
            timestamp: self.now,
        }
    }

    #[must_use]
    pub fn counters(&self) -> MarketCounters {
        let liquidity_providers = self.liquidity.providers();
        let liquidity_orders = liquidity_providers
            .iter()
            .flat_map(|p| self.book.orders_for_party(p))
            .filter(|id| self.book.get(id).is_some_and(Order::is_liquidity))
            .count();
        MarketCounters {
            order_count: self.book.order_count(),
            pegged_orders: self.pegged.len(),
            parked_orders: self.pegged.parked_len(),
            liquidity_orders,
            liquidity_providers: liquidity_providers.len(),
        }
    }

    /// Deterministic digest of the market's state.
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"marketcore:market:v1:");
        hasher.update((self.def.id.as_str().len() as u64).to_le_bytes());
        hasher.update(self.def.id.as_str().as_bytes());
        hasher.update(self.def.state.to_string().as_bytes());
        hasher.update(self.def.trading_mode.to_string().as_bytes());
        hasher.update([u8::from(self.succeeded)]);
        hasher.update(self.book.hash());
        hasher.update(self.liquidity.hash());
        self.pegged.hash_into(&mut hasher);
        self.equity.hash_into(&mut hasher);
        hasher.update(self.last_trade_value.to_string().as_bytes());
        if let Some(price) = self.last_traded_price {
            hasher.update(price.to_string().as_bytes());
        }
        hasher.update(self.order_sequence.to_le_bytes());
        hasher.finalize().into()
    }
}
