//! Shared fixtures for the execution integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use marketcore_execution::{Engine, EventRecorder, ManualClock, MarketActivityTracker};
use marketcore_ledger::InsuranceLedger;
use marketcore_types::{
    AccountId, Collateral, ComponentFactory, EngineConfig, MarketDefinition, MarketId, Order,
    OrderId, OrderSide, OrderSubmission, PartyId, PeggedReference,
};
use rust_decimal::Decimal;

pub const USDT: &str = "USDT";

/// Opening auction length used by `definition`.
pub const OPENING_MS: i64 = 1_000;

pub fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

pub fn id(s: &str) -> MarketId {
    MarketId::new(s)
}

pub fn party(s: &str) -> PartyId {
    PartyId::new(s)
}

pub fn t0() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::days(365)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn definition(market: &str) -> MarketDefinition {
    MarketDefinition::new(market, USDT).with_opening_auction_ms(OPENING_MS.unsigned_abs())
}

pub fn ledger() -> InsuranceLedger {
    let mut ledger = InsuranceLedger::new();
    ledger.register_asset(USDT, Decimal::ONE);
    ledger
}

pub struct Harness {
    pub engine: Engine<InsuranceLedger>,
    pub events: EventRecorder,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::short_windows())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let events = EventRecorder::new();
        let clock = ManualClock::new(t0());
        let engine = Engine::new(
            config,
            ledger(),
            Box::new(events.clone()),
            Box::new(clock.clone()),
            Box::new(MarketActivityTracker::new()),
        );
        Self {
            engine,
            events,
            clock,
        }
    }

    /// A harness whose markets are built from `components`.
    pub fn with_components(components: Box<dyn ComponentFactory>) -> Self {
        let mut h = Self::new();
        h.engine = h.engine.with_components(components);
        h
    }

    pub fn now(&self) -> DateTime<Utc> {
        use marketcore_types::TimeService;
        self.clock.now()
    }

    /// Moves the clock and ticks the engine.
    pub fn tick(&mut self, by: Duration) -> DateTime<Utc> {
        let now = self.clock.advance(by);
        self.engine.on_tick(now);
        now
    }

    /// Submits a market and starts its opening auction at the current time.
    pub fn propose_and_enact(&mut self, def: MarketDefinition) {
        let market = def.id.clone();
        let now = self.now();
        self.engine
            .submit_market(def, &party("proposer"), now)
            .expect("submit market");
        self.engine
            .start_opening_auction(&market)
            .expect("start opening auction");
    }

    /// Submits, enacts and ticks until the opening auction is over.
    pub fn open(&mut self, def: MarketDefinition) {
        self.propose_and_enact(def);
        self.tick(Duration::milliseconds(OPENING_MS));
    }

    pub fn fund_insurance(&mut self, market: &str, amount: i64) {
        self.engine
            .collateral_mut()
            .deposit(AccountId::Insurance(id(market)), USDT, dec(amount))
            .expect("deposit");
    }

    pub fn insurance(&self, market: &str) -> Decimal {
        self.engine.collateral().insurance_balance(&id(market), USDT)
    }

    pub fn global_insurance(&self) -> Decimal {
        self.engine
            .collateral()
            .balance(&AccountId::GlobalInsurance, USDT)
    }

    pub fn limit(
        &mut self,
        market: &str,
        who: &str,
        side: OrderSide,
        price: i64,
        size: i64,
    ) -> OrderId {
        self.engine
            .submit_order(
                &party(who),
                &OrderSubmission::limit(&id(market), side, dec(price), dec(size)),
            )
            .expect("limit order")
            .order
            .id
    }

    pub fn pegged(
        &mut self,
        market: &str,
        who: &str,
        side: OrderSide,
        reference: PeggedReference,
        offset: i64,
        size: i64,
    ) -> Order {
        self.engine
            .submit_order(
                &party(who),
                &OrderSubmission::pegged(&id(market), side, reference, dec(offset), dec(size)),
            )
            .expect("pegged order")
            .order
    }

    /// Current view of an order, on the book or parked.
    pub fn order(&self, market: &str, order: &OrderId) -> Order {
        self.engine
            .market(&id(market))
            .and_then(|m| m.order(order))
            .cloned()
            .expect("order exists")
    }
}
