//! Integration test: order entry points and governance parameters

mod common;

use chrono::Duration;
use common::*;
use marketcore_types::{
    Event, LiquidityCommitment, MarketState, MarketStateUpdate, MarketcoreError, NetworkParameter,
    OrderCancellation, OrderSide, OrderStatus, OrderSubmission, PeggedReference, ShapeEntry,
};
use rust_decimal::Decimal;

fn cancel(market: Option<&str>, order: Option<marketcore_types::OrderId>) -> OrderCancellation {
    OrderCancellation {
        market_id: market.map(id),
        order_id: order,
    }
}

// =========================================================================
// Cancellation
// =========================================================================

#[test]
fn order_id_without_market_is_invalid() {
    let mut h = Harness::new();
    h.open(definition("m"));
    let order = h.limit("m", "a", OrderSide::Buy, 10, 1);
    let err = h
        .engine
        .cancel_order(&party("a"), &cancel(None, Some(order)))
        .unwrap_err();
    assert_eq!(err, MarketcoreError::InvalidOrderCancellation);
}

#[test]
fn cancel_single_order() {
    let mut h = Harness::new();
    h.open(definition("m"));
    let keep = h.limit("m", "a", OrderSide::Buy, 10, 1);
    let gone = h.limit("m", "a", OrderSide::Buy, 9, 1);

    let cancelled = h
        .engine
        .cancel_order(&party("a"), &cancel(Some("m"), Some(gone)))
        .unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, gone);
    assert_eq!(cancelled[0].status, OrderStatus::Cancelled);
    assert!(h.engine.market(&id("m")).unwrap().order(&keep).is_some());

    // Someone else's order is off limits.
    let err = h
        .engine
        .cancel_order(&party("b"), &cancel(Some("m"), Some(keep)))
        .unwrap_err();
    assert!(matches!(err, MarketcoreError::OrderNotOwned { .. }));
}

#[test]
fn cancel_all_in_one_market() {
    let mut h = Harness::new();
    h.open(definition("m"));
    h.open(definition("n"));
    h.limit("m", "a", OrderSide::Buy, 10, 1);
    h.limit("m", "a", OrderSide::Sell, 20, 1);
    h.limit("m", "b", OrderSide::Buy, 9, 1);
    let other = h.limit("n", "a", OrderSide::Buy, 10, 1);

    let cancelled = h
        .engine
        .cancel_order(&party("a"), &cancel(Some("m"), None))
        .unwrap();
    assert_eq!(cancelled.len(), 2);
    assert_eq!(h.engine.market_counters()[&id("m")].order_count, 1);
    assert!(h.engine.market(&id("n")).unwrap().order(&other).is_some());
}

#[test]
fn cancel_all_everywhere_skips_markets_not_trading() {
    let mut h = Harness::new();
    h.open(definition("m"));
    h.open(definition("n"));
    h.engine
        .submit_market(definition("proposed"), &party("p"), h.now())
        .unwrap();
    h.limit("m", "a", OrderSide::Buy, 10, 1);
    h.limit("n", "a", OrderSide::Sell, 20, 1);

    let cancelled = h
        .engine
        .cancel_order(&party("a"), &cancel(None, None))
        .unwrap();
    assert_eq!(cancelled.len(), 2);
    assert!(h
        .engine
        .market_counters()
        .values()
        .all(|c| c.order_count == 0));
}

#[test]
fn cancel_in_unknown_market_fails() {
    let mut h = Harness::new();
    assert!(matches!(
        h.engine.cancel_order(&party("a"), &cancel(Some("nope"), None)),
        Err(MarketcoreError::MarketDoesNotExist(_))
    ));
}

// =========================================================================
// Trading windows
// =========================================================================

#[test]
fn orders_rest_in_opening_auction_and_uncross_on_open() {
    let mut h = Harness::new();
    h.propose_and_enact(definition("m"));
    h.limit("m", "a", OrderSide::Buy, 101, 2);
    h.limit("m", "b", OrderSide::Sell, 99, 2);
    assert_eq!(h.events.of_kind("trade").len(), 0);
    let data = h.engine.get_market_data(&id("m")).unwrap();
    assert_eq!(data.indicative_price, Some(dec(100)));

    h.tick(Duration::milliseconds(OPENING_MS));
    assert_eq!(h.engine.get_market_state(&id("m")).unwrap(), MarketState::Active);
    assert_eq!(h.events.of_kind("trade").len(), 1);
    assert_eq!(h.engine.get_market_data(&id("m")).unwrap().indicative_price, None);
    assert_eq!(h.engine.market(&id("m")).unwrap().last_trade_value(), dec(200));
}

#[test]
fn proposed_market_takes_no_orders() {
    let mut h = Harness::new();
    h.engine
        .submit_market(definition("m"), &party("p"), h.now())
        .unwrap();
    let err = h
        .engine
        .submit_order(
            &party("a"),
            &marketcore_types::OrderSubmission::limit(&id("m"), OrderSide::Buy, dec(10), dec(1)),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        MarketcoreError::TradingNotAllowed { state: MarketState::Proposed, .. }
    ));
}

#[test]
fn opening_auction_runs_at_least_the_minimum_duration() {
    let mut config = marketcore_types::EngineConfig::short_windows();
    config.market_defaults.auction_min_duration_ms = 5_000;
    let mut h = Harness::with_config(config);
    h.propose_and_enact(definition("m"));

    h.tick(Duration::milliseconds(OPENING_MS));
    assert_eq!(h.engine.get_market_state(&id("m")).unwrap(), MarketState::Pending);
    h.tick(Duration::milliseconds(4_000));
    assert_eq!(h.engine.get_market_state(&id("m")).unwrap(), MarketState::Active);
}

// =========================================================================
// Expiry
// =========================================================================

#[test]
fn good_till_time_orders_expire_on_tick() {
    let mut h = Harness::new();
    h.open(definition("m"));
    let expiry = h.now() + Duration::seconds(2);
    let resting = h
        .engine
        .submit_order(
            &party("a"),
            &OrderSubmission::limit(&id("m"), OrderSide::Sell, dec(105), dec(1)).with_expiry(expiry),
        )
        .unwrap()
        .order;
    // No bid to peg to yet.
    let parked = h
        .engine
        .submit_order(
            &party("b"),
            &OrderSubmission::pegged(&id("m"), OrderSide::Buy, PeggedReference::BestBid, dec(1), dec(1))
                .with_expiry(expiry),
        )
        .unwrap()
        .order;
    assert_eq!(parked.status, OrderStatus::Parked);
    let keeper = h.limit("m", "c", OrderSide::Sell, 110, 1);

    h.tick(Duration::seconds(1));
    assert_eq!(h.order("m", &resting.id).status, OrderStatus::Active);
    assert_eq!(h.order("m", &parked.id).status, OrderStatus::Parked);
    h.events.clear();

    h.tick(Duration::seconds(1));
    let market = h.engine.market(&id("m")).unwrap();
    assert!(market.order(&resting.id).is_none());
    assert!(market.order(&parked.id).is_none());
    assert_eq!(market.pegged_count(), 0);
    assert_eq!(h.order("m", &keeper).status, OrderStatus::Active);
    assert_eq!(h.engine.get_market_data(&id("m")).unwrap().best_static_ask, Some(dec(110)));

    let expired: Vec<_> = h
        .events
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::OrderUpdated(o) if o.status == OrderStatus::Expired))
        .collect();
    assert_eq!(expired.len(), 2);
}

#[test]
fn expiry_must_be_in_the_future() {
    let mut h = Harness::new();
    h.open(definition("m"));
    let err = h
        .engine
        .submit_order(
            &party("a"),
            &OrderSubmission::limit(&id("m"), OrderSide::Buy, dec(10), dec(1)).with_expiry(h.now()),
        )
        .unwrap_err();
    assert!(matches!(err, MarketcoreError::InvalidOrder { .. }));
}

// =========================================================================
// Market submission and updates
// =========================================================================

#[test]
fn submit_market_publishes_created_updated_data() {
    let mut h = Harness::new();
    h.engine
        .submit_market(definition("m"), &party("p"), h.now())
        .unwrap();
    let kinds: Vec<&str> = h.events.events().iter().map(Event::kind).collect();
    assert_eq!(kinds, vec!["market_created", "market_updated", "market_data"]);
}

fn proposer_commitment(market: &str) -> LiquidityCommitment {
    LiquidityCommitment {
        market_id: id(market),
        commitment_amount: dec(1_000),
        fee: Decimal::new(1, 3),
        buys: vec![ShapeEntry::new(PeggedReference::BestBid, 1, dec(1))],
        sells: vec![ShapeEntry::new(PeggedReference::BestAsk, 1, dec(1))],
    }
}

#[test]
fn market_with_proposer_commitment() {
    let mut h = Harness::new();
    h.engine
        .submit_market_with_liquidity_provision(
            definition("m"),
            proposer_commitment("m"),
            &party("proposer"),
            h.now(),
        )
        .unwrap();
    assert_eq!(h.engine.get_market_state(&id("m")).unwrap(), MarketState::Proposed);
    assert_eq!(h.engine.market_counters()[&id("m")].liquidity_providers, 1);

    h.engine.start_opening_auction(&id("m")).unwrap();
    h.tick(Duration::milliseconds(OPENING_MS));
    assert_eq!(
        h.engine.get_equity_like_share_for_market_and_party(&id("m"), &party("proposer")),
        Some(Decimal::ONE)
    );
}

#[test]
fn refused_proposer_commitment_removes_the_market() {
    let mut h = Harness::new();
    h.open(definition("parent"));
    let err = h
        .engine
        .submit_market_with_liquidity_provision(
            definition("child").with_parent("parent", Decimal::ONE),
            proposer_commitment("elsewhere"),
            &party("proposer"),
            h.now(),
        )
        .unwrap_err();
    assert!(matches!(err, MarketcoreError::InvalidLiquidityProvision { .. }));
    assert!(!h.engine.market_exists(&id("child")));
    assert!(h.engine.succession().is_empty());

    // The parent is unaffected and can still be succeeded.
    h.propose_and_enact(definition("next").with_parent("parent", Decimal::ONE));
    h.tick(Duration::milliseconds(OPENING_MS));
    assert!(h.engine.is_succeeded(&id("parent")));
}

#[test]
fn invalid_submissions_are_refused() {
    let mut h = Harness::new();
    let now = h.now();
    assert_eq!(
        h.engine.submit_market(definition(""), &party("p"), now),
        Err(MarketcoreError::NoMarketId)
    );
    h.engine.submit_market(definition("m"), &party("p"), now).unwrap();
    assert_eq!(
        h.engine.submit_market(definition("m"), &party("p"), now),
        Err(MarketcoreError::DuplicateMarket(id("m")))
    );
    assert!(matches!(
        h.engine.submit_market(
            marketcore_types::MarketDefinition::new("x", "BTC"),
            &party("p"),
            now
        ),
        Err(MarketcoreError::UnknownAsset(_))
    ));
    assert!(matches!(
        h.engine
            .submit_market(definition("self").with_parent("self", Decimal::ONE), &party("p"), now),
        Err(MarketcoreError::InvalidMarketUpdate { .. })
    ));
    assert!(matches!(
        h.engine
            .submit_market(definition("big").with_parent("m", dec(2)), &party("p"), now),
        Err(MarketcoreError::InvalidMarketUpdate { .. })
    ));
}

#[test]
fn update_market_changes_fraction_only() {
    let mut h = Harness::new();
    h.open(definition("parent"));
    h.propose_and_enact(definition("child").with_parent("parent", Decimal::new(2, 1)));

    let mut update = definition("child").with_parent("parent", Decimal::new(7, 1));
    h.engine.update_market(&update).unwrap();
    assert_eq!(
        h.engine.get_market(&id("child"), false).unwrap().insurance_pool_fraction,
        Decimal::new(7, 1)
    );

    update.settlement_asset = "BTC".into();
    assert!(matches!(
        h.engine.update_market(&update),
        Err(MarketcoreError::InvalidMarketUpdate { .. })
    ));
}

#[test]
fn settlement_records_the_price() {
    let mut h = Harness::new();
    h.open(definition("m"));
    h.engine
        .update_market_state(
            &id("m"),
            &MarketStateUpdate::Terminate {
                settlement_price: Some(dec(42)),
            },
        )
        .unwrap();
    let data = h.engine.get_market_data(&id("m")).unwrap();
    assert_eq!(data.state, MarketState::Settled);
    assert_eq!(data.last_traded_price, Some(dec(42)));

    let err = h
        .engine
        .update_market_state(&id("m"), &MarketStateUpdate::Suspend)
        .unwrap_err();
    assert!(matches!(err, MarketcoreError::InvalidStateChange { .. }));
}

// =========================================================================
// Network parameters
// =========================================================================

#[test]
fn successor_window_change_shifts_retained_ttls() {
    let mut h = Harness::new();
    h.open(definition("m"));
    let ttl = h.engine.retained_state(&id("m")).unwrap().ttl;

    h.engine
        .update_network_parameter(NetworkParameter::SuccessorWindow(Duration::seconds(90)));
    assert_eq!(
        h.engine.retained_state(&id("m")).unwrap().ttl,
        ttl + Duration::seconds(30)
    );
    assert_eq!(h.engine.config().successor_window(), Duration::seconds(90));

    h.engine
        .update_network_parameter(NetworkParameter::SuccessorWindow(Duration::seconds(10)));
    assert_eq!(
        h.engine.retained_state(&id("m")).unwrap().ttl,
        ttl - Duration::seconds(50)
    );
}

#[test]
fn market_parameters_reach_existing_and_new_markets() {
    let mut h = Harness::new();
    h.open(definition("old"));
    let fee = Decimal::new(25, 4);
    h.engine
        .update_network_parameter(NetworkParameter::MakerFee(fee));
    h.open(definition("new"));

    for market in ["old", "new"] {
        assert_eq!(h.engine.market(&id(market)).unwrap().params().maker_fee, fee);
    }
    assert_eq!(h.engine.config().market_defaults.maker_fee, fee);
}

#[test]
fn proposer_bonus_needs_value_above_quantum_multiple() {
    let mut h = Harness::new();
    h.open(definition("m"));
    assert!(!h.engine.is_eligible_for_proposer_bonus(&id("m"), dec(1_000_000)));
    assert!(h.engine.is_eligible_for_proposer_bonus(&id("m"), dec(1_000_001)));

    h.engine
        .update_network_parameter(NetworkParameter::MarketCreationQuantumMultiple(dec(10)));
    assert!(h.engine.is_eligible_for_proposer_bonus(&id("m"), dec(11)));
    assert!(!h.engine.is_eligible_for_proposer_bonus(&id("unknown"), dec(11)));
}
