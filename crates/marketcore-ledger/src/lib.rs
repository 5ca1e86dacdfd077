//! # marketcore-ledger
//!
//! Default collateral ledger for the marketcore engine: per-market insurance
//! pools, the global insurance pool, liquidity fee pools and an asset
//! registry with quantum, guarded by a supply conservation check.

pub mod ledger;
pub mod supply_conservation;

pub use ledger::InsuranceLedger;
pub use supply_conservation::SupplyConservation;
