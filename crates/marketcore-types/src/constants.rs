//! System-wide constants and defaults for the marketcore engine.

use rust_decimal::Decimal;

/// Default opening auction length in milliseconds.
pub const DEFAULT_OPENING_AUCTION_MS: u64 = 60_000;

/// Default minimum length of any auction in milliseconds.
pub const DEFAULT_AUCTION_MIN_DURATION_MS: u64 = 1_000;

/// Default window during which a market's checkpoint state stays available
/// to successors, in milliseconds (one week).
pub const DEFAULT_SUCCESSOR_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

/// Default interval between liquidity fee distributions, in milliseconds.
pub const DEFAULT_FEE_DISTRIBUTION_STEP_MS: u64 = 60_000;

/// Default engine-wide cap on pegged orders.
pub const DEFAULT_MAX_PEGGED_ORDERS: u64 = 1_500;

/// Default liquidity fee factor (0.1%).
pub const DEFAULT_LIQUIDITY_FEE_FACTOR: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Default multiple of the asset quantum a proposer must reach for a bonus.
pub const DEFAULT_MARKET_CREATION_QUANTUM_MULTIPLE: Decimal =
    Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Decimal places kept on generated liquidity order sizes.
pub const LIQUIDITY_SIZE_PRECISION: u32 = 8;

/// Current checkpoint payload format version.
pub const CHECKPOINT_VERSION: u32 = 1;
