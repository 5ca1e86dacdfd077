//! Error types for the marketcore execution engine.
//!
//! All errors use the `MC_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Market lifecycle errors
//! - 2xx: Succession errors
//! - 3xx: Order errors
//! - 4xx: Liquidity provision errors
//! - 5xx: Ledger / collateral errors
//! - 6xx: Checkpoint errors
//! - 9xx: General / internal errors
//!
//! Fatal invariant violations are *not* represented here: they abort the
//! process (see `marketcore_execution::fatal`), because a replica that keeps
//! running after one would diverge from its peers.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{MarketId, MarketState, OrderId, PartyId};

/// Central error enum for all marketcore operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarketcoreError {
    // =================================================================
    // Market Errors (1xx)
    // =================================================================
    /// A market submission carried an empty identifier.
    #[error("MC_ERR_100: Market submission has no market ID")]
    NoMarketId,

    /// The market is not in the registry.
    #[error("MC_ERR_101: Market does not exist: {0}")]
    MarketDoesNotExist(MarketId),

    /// A market with this ID is already registered.
    #[error("MC_ERR_102: Market already exists: {0}")]
    DuplicateMarket(MarketId),

    /// The settlement asset is unknown to the collateral ledger.
    #[error("MC_ERR_103: Unknown settlement asset: {0}")]
    UnknownAsset(String),

    /// Rejection is only valid for Proposed markets, or Pending successors.
    #[error("MC_ERR_104: Cannot reject market {market} in state {state}")]
    CannotRejectMarket { market: MarketId, state: MarketState },

    /// The opening auction can only start from the Proposed state.
    #[error("MC_ERR_105: Cannot start opening auction for market {market} in state {state}")]
    CannotStartOpeningAuction { market: MarketId, state: MarketState },

    /// A governance state change is not valid from the current state.
    #[error("MC_ERR_106: Invalid state change for market {market}: {reason}")]
    InvalidStateChange { market: MarketId, reason: String },

    /// The market does not accept orders in its current state.
    #[error("MC_ERR_107: Trading not allowed in market {market} (state {state})")]
    TradingNotAllowed { market: MarketId, state: MarketState },

    /// A market update tried to change an immutable field.
    #[error("MC_ERR_108: Invalid market update: {reason}")]
    InvalidMarketUpdate { reason: String },

    // =================================================================
    // Succession Errors (2xx)
    // =================================================================
    /// The successor named in a succession request is not registered.
    #[error("MC_ERR_200: Successor market does not exist: {0}")]
    SuccessorMarketDoesNotExist(MarketId),

    /// The parent is still Proposed, so a successor cannot be enacted.
    #[error("MC_ERR_201: Parent market {0} has not been enacted yet")]
    ParentMarketNotEnactedYet(MarketId),

    // =================================================================
    // Order Errors (3xx)
    // =================================================================
    /// The requested order was not found in the market.
    #[error("MC_ERR_300: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order failed validation (missing fields, bad values, etc.).
    #[error("MC_ERR_301: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// A cancellation named an order without naming its market.
    #[error("MC_ERR_302: Invalid order cancellation: order ID given without market ID")]
    InvalidOrderCancellation,

    /// An order with this ID already exists.
    #[error("MC_ERR_303: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The engine-wide pegged order limit has been reached.
    #[error("MC_ERR_304: Too many pegged orders (max {max})")]
    TooManyPeggedOrders { max: u64 },

    /// A pegged order's price could not be derived from its reference.
    #[error("MC_ERR_305: Unable to reprice pegged order {0}")]
    UnableToReprice(OrderId),

    /// The order belongs to another party.
    #[error("MC_ERR_306: Order {order} is not owned by party {party}")]
    OrderNotOwned { order: OrderId, party: PartyId },

    // =================================================================
    // Liquidity Provision Errors (4xx)
    // =================================================================
    /// The party has no liquidity commitment in this market.
    #[error("MC_ERR_400: No liquidity provision for party {party} in market {market}")]
    LiquidityProvisionNotFound { market: MarketId, party: PartyId },

    /// The party already has a liquidity commitment in this market.
    #[error("MC_ERR_401: Liquidity provision already exists for party {0}")]
    LiquidityProvisionExists(PartyId),

    /// The commitment or its shape is malformed.
    #[error("MC_ERR_402: Invalid liquidity provision: {reason}")]
    InvalidLiquidityProvision { reason: String },

    /// The party holds no equity-like share in the market.
    #[error("MC_ERR_403: Party {party} has no equity-like share in market {market}")]
    NoEquityLikeShare { market: MarketId, party: PartyId },

    // =================================================================
    // Ledger Errors (5xx)
    // =================================================================
    /// Not enough balance to perform the transfer.
    #[error("MC_ERR_500: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// No quantum is registered for the asset.
    #[error("MC_ERR_501: No quantum registered for asset {0}")]
    AssetQuantumUnavailable(String),

    /// Ledger accounts for this market already exist.
    #[error("MC_ERR_502: Accounts already exist for market {0}")]
    DuplicateAccounts(MarketId),

    /// Supply conservation check failed.
    #[error("MC_ERR_503: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // Checkpoint Errors (6xx)
    // =================================================================
    /// Checkpoint bytes could not be decoded.
    #[error("MC_ERR_600: Checkpoint decode failed: {reason}")]
    CheckpointDecode { reason: String },

    /// Checkpoint state could not be encoded.
    #[error("MC_ERR_601: Checkpoint encode failed: {reason}")]
    CheckpointEncode { reason: String },

    /// The checkpoint was written by an unsupported format version.
    #[error("MC_ERR_602: Unsupported checkpoint version {0}")]
    UnsupportedCheckpointVersion(u32),

    // =================================================================
    // General Errors (9xx)
    // =================================================================
    /// Catch-all for unexpected internal errors.
    #[error("MC_ERR_900: Internal error: {reason}")]
    Internal { reason: String },
}

/// Convenience result alias for marketcore operations.
pub type Result<T> = std::result::Result<T, MarketcoreError>;
