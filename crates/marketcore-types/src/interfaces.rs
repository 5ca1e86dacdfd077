//! Collaborator traits consumed by the execution engine.
//!
//! The engine never reaches for global state: everything it needs from the
//! ledger, the clock, the event bus or a market's book goes through one of
//! these traits. Default implementations live in `marketcore-book` and
//! `marketcore-ledger`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    Event, LedgerMovement, LiquidityAmendment, LiquidityCommitment, LiquidityUpdate, MarketId,
    MarketcoreError, Order, OrderConfirmation, OrderId, OrderStatus, PartyId, ReferencePrices,
    Result, Trade,
};

// ---------------------------------------------------------------------------
// Engine-level collaborators
// ---------------------------------------------------------------------------

/// Collateral ledger: accounts, insurance pools and the ledger hash.
pub trait Collateral {
    fn asset_exists(&self, asset: &str) -> bool;

    /// Quantum (smallest meaningful amount) of an asset.
    fn asset_quantum(&self, asset: &str) -> Result<Decimal>;

    /// Creates the per-market accounts (insurance pool, fee pool).
    fn create_market_accounts(&mut self, market: &MarketId, asset: &str) -> Result<()>;

    /// Current insurance pool balance; zero when the pool does not exist.
    fn insurance_balance(&self, market: &MarketId, asset: &str) -> Decimal;

    /// Reinstates an insurance balance captured in a checkpoint.
    fn restore_insurance_balance(
        &mut self,
        market: &MarketId,
        asset: &str,
        balance: Decimal,
    ) -> Result<()>;

    /// Moves `fraction` of the parent's insurance pool to the successor.
    /// Returns `None` when nothing moved.
    fn successor_insurance_fraction(
        &mut self,
        successor: &MarketId,
        parent: &MarketId,
        asset: &str,
        fraction: Decimal,
    ) -> Option<LedgerMovement>;

    /// Empties a market's insurance pool into the global pool, optionally
    /// sweeping its liquidity fee pool along with it.
    fn clear_insurance_pool(
        &mut self,
        market: &MarketId,
        asset: &str,
        clear_fees: bool,
    ) -> Result<Vec<LedgerMovement>>;

    /// Credits liquidity fees to a market's fee pool.
    fn accrue_liquidity_fees(&mut self, market: &MarketId, asset: &str, amount: Decimal);

    /// Pays the fee pool out to providers; amounts must not exceed the pool.
    fn distribute_liquidity_fees(
        &mut self,
        market: &MarketId,
        asset: &str,
        amounts: &[(PartyId, Decimal)],
    ) -> Result<Vec<LedgerMovement>>;

    /// Current fee pool balance.
    fn liquidity_fee_balance(&self, market: &MarketId, asset: &str) -> Decimal;

    /// Deterministic digest of the whole ledger.
    fn hash(&self) -> [u8; 32];
}

/// Fire-and-forget event sink. Batch order is preserved.
pub trait EventSink {
    fn send(&mut self, event: Event);

    fn send_batch(&mut self, events: Vec<Event>) {
        for event in events {
            self.send(event);
        }
    }
}

/// Source of logical (chain) time.
pub trait TimeService {
    fn now(&self) -> DateTime<Utc>;
}

/// Governance activity tracking: who proposed which market.
pub trait ActivityTracker {
    fn market_proposed(&mut self, asset: &str, market: &MarketId, proposer: &PartyId);
    fn remove_market(&mut self, asset: &str, market: &MarketId);
    fn proposer(&self, market: &MarketId) -> Option<PartyId>;
}

// ---------------------------------------------------------------------------
// Per-market components
// ---------------------------------------------------------------------------

/// Why a passive placement did not rest on the book.
///
/// A passive placement can never produce trades: an order that would cross
/// is reported as [`PlacementError::WouldCross`] before any matching, so the
/// caller decides how to treat it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// The order would have traded against the opposite side.
    WouldCross { order: OrderId, touch: Decimal },
    /// The order is not acceptable to the book.
    Rejected(MarketcoreError),
}

/// Order book / matching for a single market.
pub trait Book {
    /// Submits an order, matching it in continuous trading or resting it
    /// during an auction.
    fn submit(&mut self, order: Order, now: DateTime<Utc>) -> Result<OrderConfirmation>;

    /// Rests an order without matching. Returns the order as placed.
    fn place_passive(
        &mut self,
        order: Order,
    ) -> std::result::Result<Order, PlacementError>;

    /// Removes an order, returning it with `status` applied.
    fn remove(&mut self, id: &OrderId, status: OrderStatus) -> Result<Order>;

    fn get(&self, id: &OrderId) -> Option<&Order>;

    /// IDs of a party's orders on the book, in arrival order.
    fn orders_for_party(&self, party: &PartyId) -> Vec<OrderId>;

    fn best_bid(&self) -> Option<Decimal>;
    fn best_ask(&self) -> Option<Decimal>;

    /// Best bid among static orders (neither pegged nor liquidity).
    fn best_static_bid(&self) -> Option<Decimal>;
    fn best_static_ask(&self) -> Option<Decimal>;

    fn in_auction(&self) -> bool;
    fn enter_auction(&mut self);

    /// Uncrosses the auction book and resumes continuous matching.
    fn leave_auction(&mut self, now: DateTime<Utc>) -> Vec<Trade>;

    /// Price the auction would uncross at right now.
    fn indicative_price(&self) -> Option<Decimal>;

    fn order_count(&self) -> usize;

    /// Deterministic digest of the book contents.
    fn hash(&self) -> [u8; 32];
}

/// Liquidity-shape component: turns commitments into concrete orders.
pub trait LiquidityShape {
    fn submit(&mut self, party: &PartyId, commitment: LiquidityCommitment) -> Result<()>;
    fn amend(&mut self, party: &PartyId, amendment: &LiquidityAmendment) -> Result<()>;

    /// Cancels a commitment, returning the IDs of its live orders.
    fn cancel(&mut self, party: &PartyId) -> Result<Vec<OrderId>>;

    fn commitment(&self, party: &PartyId) -> Option<&LiquidityCommitment>;

    /// Committed stake of a party; zero when it has none.
    fn stake(&self, party: &PartyId) -> Decimal;

    /// Providers in party-ID order.
    fn providers(&self) -> Vec<PartyId>;

    /// Recomputes the shape. When `entering_auction` is set only
    /// cancellations are valid.
    fn update(
        &mut self,
        prices: ReferencePrices,
        updated_orders: &[Order],
        entering_auction: bool,
        now: DateTime<Utc>,
    ) -> Result<LiquidityUpdate>;

    /// Records that a generated order made it onto the book.
    fn set_active(&mut self, party: &PartyId, order: OrderId);

    /// Drops the commitment of a party that can no longer meet it.
    fn cancel_distressed(&mut self, party: &PartyId) -> Vec<OrderId>;

    /// Deterministic digest of commitments and live orders.
    fn hash(&self) -> [u8; 32];
}

/// Price-monitoring collaborator deciding when to enter an auction.
pub trait AuctionTrigger {
    /// Returns `true` if a trade at `price` breaches the bounds.
    fn on_trade(&mut self, price: Decimal) -> bool;

    /// Returns `true` if the current touch breaches the bounds.
    fn on_book_change(&mut self, best_bid: Option<Decimal>, best_ask: Option<Decimal>) -> bool;

    /// Re-anchors the bounds, typically after an auction uncrosses.
    fn reset(&mut self, reference: Option<Decimal>);
}

/// Builds the per-market components when a market is created.
pub trait ComponentFactory {
    fn book(&self, market: &MarketId) -> Box<dyn Book>;
    fn liquidity(&self, market: &MarketId) -> Box<dyn LiquidityShape>;
    fn auction_trigger(&self, market: &MarketId, bound: Decimal) -> Box<dyn AuctionTrigger>;
}
