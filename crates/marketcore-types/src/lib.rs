//! # marketcore-types
//!
//! Shared types, collaborator traits, errors, and configuration for the
//! **marketcore** execution engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`MarketId`], [`PartyId`], [`OrderId`], [`TradeId`], [`Asset`]
//! - **Market model**: [`MarketDefinition`], [`MarketState`], [`TradingMode`], [`MarketData`]
//! - **Order model**: [`Order`], [`OrderSubmission`], [`OrderAmendment`], [`OrderCancellation`], [`PeggedOrder`]
//! - **Trade model**: [`Trade`]
//! - **Liquidity model**: [`LiquidityCommitment`], [`ShapeEntry`], [`LiquidityUpdate`]
//! - **Checkpoint model**: [`CpMarketState`], [`CheckpointRecord`], [`CheckpointPayload`]
//! - **Events**: [`Event`], [`LedgerMovement`], [`AccountId`]
//! - **Network parameters**: [`NetworkParameter`]
//! - **Collaborator traits**: [`Collateral`], [`Book`], [`LiquidityShape`], [`AuctionTrigger`], ...
//! - **Configuration**: [`EngineConfig`], [`MarketParams`]
//! - **Errors**: [`MarketcoreError`] with `MC_ERR_` prefix codes
//! - **Constants**: system-wide defaults

pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ids;
pub mod interfaces;
pub mod liquidity;
pub mod market;
pub mod netparams;
pub mod order;
pub mod trade;

pub use checkpoint::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use ids::*;
pub use interfaces::*;
pub use liquidity::*;
pub use market::*;
pub use netparams::*;
pub use order::*;
pub use trade::*;

// Constants are accessed via `marketcore_types::constants::FOO`
// (not re-exported to avoid name collisions).
