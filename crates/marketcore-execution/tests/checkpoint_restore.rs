//! Integration test: checkpoint → load → restore
//!
//! Retained market state must survive a restart bit for bit, and successor
//! bookkeeping must come back consistent with it.

mod common;

use chrono::Duration;
use common::*;
use marketcore_types::{
    CheckpointPayload, LiquidityCommitment, MarketState, MarketStateUpdate, MarketcoreError,
    OrderSide, PeggedReference, ShapeEntry,
};
use rust_decimal::Decimal;

fn commitment(market: &str, amount: i64) -> LiquidityCommitment {
    LiquidityCommitment {
        market_id: id(market),
        commitment_amount: dec(amount),
        fee: Decimal::new(1, 3),
        buys: vec![ShapeEntry::new(PeggedReference::BestBid, 1, dec(1))],
        sells: vec![ShapeEntry::new(PeggedReference::BestAsk, 1, dec(1))],
    }
}

/// An active market with two providers, one trade and a funded pool.
fn populated() -> Harness {
    let mut h = Harness::new();
    h.propose_and_enact(definition("m"));
    h.engine
        .submit_liquidity_provision(&party("lp1"), commitment("m", 1_000))
        .unwrap();
    h.engine
        .submit_liquidity_provision(&party("lp2"), commitment("m", 500))
        .unwrap();
    h.tick(Duration::milliseconds(OPENING_MS));

    h.limit("m", "buyer", OrderSide::Buy, 100, 10);
    h.limit("m", "seller", OrderSide::Sell, 100, 10);
    h.fund_insurance("m", 250);
    h.tick(Duration::milliseconds(1));
    h
}

#[test]
fn restore_reproduces_retained_state_exactly() {
    // =====================================================================
    // BEFORE: capture a checkpoint
    // =====================================================================
    let a = populated();
    let market = a.engine.market(&id("m")).unwrap();
    let shares = market.equity().shares().clone();
    assert_eq!(shares.len(), 2);
    assert_eq!(market.last_trade_value(), dec(1_000));
    let bytes = a.engine.checkpoint().unwrap();

    // =====================================================================
    // AFTER: a fresh engine loads it and restores the market
    // =====================================================================
    let mut b = Harness::new();
    b.engine.load(&bytes).unwrap();
    b.engine.restore_market(definition("m")).unwrap();

    let restored = b.engine.market(&id("m")).unwrap();
    assert_eq!(restored.equity().shares(), &shares);
    assert_eq!(restored.last_trade_value(), dec(1_000));
    assert_eq!(b.insurance("m"), dec(250));
    assert_eq!(
        b.engine.get_equity_like_share_for_market_and_party(&id("m"), &party("lp1")),
        a.engine.get_equity_like_share_for_market_and_party(&id("m"), &party("lp1")),
    );
}

#[test]
fn checkpoint_bytes_are_deterministic() {
    let a = populated();
    let b = populated();
    assert_eq!(a.engine.checkpoint().unwrap(), b.engine.checkpoint().unwrap());
    assert_eq!(a.engine.checkpoint().unwrap(), a.engine.checkpoint().unwrap());
}

#[test]
fn checkpoint_is_ordered_by_market_id() {
    let mut h = Harness::new();
    for market in ["delta", "alpha", "charlie", "bravo"] {
        h.propose_and_enact(definition(market));
    }
    let payload: CheckpointPayload =
        serde_json::from_slice(&h.engine.checkpoint().unwrap()).unwrap();
    let ids: Vec<&str> = payload.markets.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "bravo", "charlie", "delta"]);
}

#[test]
fn checkpoint_carries_closed_markets_with_definition() {
    let mut h = Harness::new();
    h.open(definition("closed"));
    h.open(definition("live"));
    h.engine
        .update_market_state(&id("closed"), &MarketStateUpdate::Terminate { settlement_price: None })
        .unwrap();
    h.tick(Duration::milliseconds(1));

    let payload: CheckpointPayload =
        serde_json::from_slice(&h.engine.checkpoint().unwrap()).unwrap();
    assert_eq!(payload.markets.len(), 2);
    let closed = &payload.markets[0];
    assert_eq!(closed.id, id("closed"));
    assert_eq!(closed.market.as_ref().map(|m| m.state), Some(MarketState::Closed));
    assert!(payload.markets[1].market.is_none());

    // The frozen definition is visible to successor proposals after a restart.
    let mut b = Harness::new();
    b.engine.load(&h.engine.checkpoint().unwrap()).unwrap();
    assert!(b.engine.get_market(&id("closed"), true).is_some());
    assert!(b.engine.get_market(&id("live"), true).is_none());
}

#[test]
fn unsettled_successors_are_left_out_of_checkpoint() {
    // =====================================================================
    // BEFORE: one successor proposed, one in its opening auction
    // =====================================================================
    let mut a = Harness::new();
    a.open(definition("parent"));
    a.fund_insurance("parent", 100);
    a.engine
        .submit_market(
            definition("child").with_parent("parent", Decimal::ONE),
            &party("p"),
            a.now(),
        )
        .unwrap();
    a.propose_and_enact(definition("opening").with_parent("parent", Decimal::ONE));
    a.tick(Duration::milliseconds(1));
    assert!(a.engine.retained_state(&id("opening")).is_some());

    let bytes = a.engine.checkpoint().unwrap();
    let payload: CheckpointPayload = serde_json::from_slice(&bytes).unwrap();
    let ids: Vec<&str> = payload.markets.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["parent"]);

    // =====================================================================
    // AFTER: restoring the successors does not retire the parent
    // =====================================================================
    let mut b = Harness::new();
    b.engine.load(&bytes).unwrap();
    b.engine.restore_market(definition("parent")).unwrap();
    b.engine
        .restore_market(definition("child").with_parent("parent", Decimal::ONE))
        .unwrap();
    b.engine
        .restore_market(definition("opening").with_parent("parent", Decimal::ONE))
        .unwrap();

    assert!(!b.engine.is_succeeded(&id("parent")));
    assert_ne!(b.engine.get_market_state(&id("parent")).unwrap(), MarketState::Succeeded);
    assert!(b.engine.market_exists(&id("child")));
    assert!(b.engine.market_exists(&id("opening")));
    assert_eq!(b.engine.succession().successors_of(&id("parent")).len(), 2);
    assert_eq!(b.insurance("parent"), dec(100));
}

#[test]
fn loaded_state_expires_one_window_after_load() {
    let a = populated();
    let bytes = a.engine.checkpoint().unwrap();

    let mut b = Harness::new();
    b.clock.advance(Duration::seconds(5));
    let loaded_at = b.now();
    b.engine.load(&bytes).unwrap();
    assert_eq!(
        b.engine.retained_state(&id("m")).unwrap().ttl,
        loaded_at + Duration::seconds(60)
    );

    b.tick(Duration::seconds(60));
    assert!(b.engine.retained_state(&id("m")).is_none());
}

#[test]
fn empty_input_clears_retained_state() {
    let mut h = populated();
    assert!(h.engine.retained_state(&id("m")).is_some());
    h.engine.load(&[]).unwrap();
    assert!(h.engine.retained_state(&id("m")).is_none());
}

#[test]
fn malformed_checkpoint_leaves_state_untouched() {
    let mut h = populated();
    let before = h.engine.retained_state(&id("m")).cloned();

    let err = h.engine.load(b"{\"version\":1,\"markets\":[{\"id\":").unwrap_err();
    assert!(matches!(err, MarketcoreError::CheckpointDecode { .. }));
    let err = h.engine.load(b"{\"version\":99,\"markets\":[]}").unwrap_err();
    assert_eq!(err, MarketcoreError::UnsupportedCheckpointVersion(99));

    assert_eq!(h.engine.retained_state(&id("m")).cloned(), before);
}

#[test]
fn restored_successor_blocks_its_siblings() {
    // =====================================================================
    // BEFORE: child succeeded parent and left its opening auction
    // =====================================================================
    let mut a = Harness::new();
    a.open(definition("parent"));
    a.fund_insurance("parent", 100);
    a.propose_and_enact(definition("child").with_parent("parent", Decimal::new(5, 1)));
    a.tick(Duration::milliseconds(OPENING_MS));
    assert_eq!(a.insurance("child"), dec(50));
    let bytes = a.engine.checkpoint().unwrap();

    // =====================================================================
    // AFTER: the child comes back with state, a stale rival does not
    // =====================================================================
    let mut b = Harness::new();
    b.engine.load(&bytes).unwrap();
    b.engine
        .restore_market(definition("child").with_parent("parent", Decimal::new(5, 1)))
        .unwrap();
    assert_eq!(b.insurance("child"), dec(50));

    b.engine
        .restore_market(definition("rival").with_parent("parent", Decimal::ONE))
        .unwrap();
    assert!(!b.engine.market_exists(&id("rival")));
    assert!(b.engine.market_exists(&id("child")));
    assert!(b.engine.succession().is_empty());
}

#[test]
fn restored_successor_without_any_parent_state_is_reset() {
    let mut h = Harness::new();
    h.engine
        .restore_market(definition("orphan").with_parent("ghost", Decimal::new(3, 1)))
        .unwrap();
    let orphan = h.engine.get_market(&id("orphan"), false).unwrap();
    assert!(orphan.parent_market_id.is_none());
    assert_eq!(orphan.insurance_pool_fraction, Decimal::ZERO);
    assert!(h.engine.succession().is_empty());
}

#[test]
fn restored_successor_keeps_link_to_retained_parent() {
    let mut a = Harness::new();
    a.open(definition("parent"));
    a.tick(Duration::milliseconds(1));
    let bytes = a.engine.checkpoint().unwrap();

    let mut b = Harness::new();
    b.engine.load(&bytes).unwrap();
    b.engine
        .restore_market(definition("child").with_parent("parent", Decimal::ONE))
        .unwrap();
    assert_eq!(
        b.engine.succession().parent_of(&id("child")),
        Some(&id("parent"))
    );
}
