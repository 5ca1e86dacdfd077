//! Order types: user limit/market orders, pegged orders and liquidity orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketId, MarketcoreError, OrderId, PartyId, Result, Trade};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Active,
    PartiallyFilled,
    Filled,
    Cancelled,
    /// Pegged order off the book because no valid price can be derived.
    Parked,
    Rejected,
    /// Stopped by self-trade prevention or an unfillable market order.
    Stopped,
    /// Good-till-time order whose expiry passed.
    Expired,
}

impl OrderStatus {
    /// Statuses of orders that rest on the book.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Parked => write!(f, "PARKED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Reference price a pegged order or liquidity shape tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum PeggedReference {
    Mid,
    BestBid,
    BestAsk,
}

/// Pegging parameters. The offset is a distance applied away from the
/// touch: buys price at `reference - offset`, sells at `reference + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeggedOrder {
    pub reference: PeggedReference,
    pub offset: Decimal,
}

impl PeggedOrder {
    #[must_use]
    pub fn new(reference: PeggedReference, offset: Decimal) -> Self {
        Self { reference, offset }
    }

    /// Buys may not peg to the best ask and sells may not peg to the best
    /// bid; mid pegs need a non-zero offset. Together these keep a repriced
    /// order strictly on its own side of the static book.
    pub fn validate(&self, side: OrderSide) -> Result<()> {
        let reason = match (side, self.reference) {
            _ if self.offset < Decimal::ZERO => Some("offset cannot be negative"),
            (OrderSide::Buy, PeggedReference::BestAsk) => {
                Some("buy orders cannot reference the best ask")
            }
            (OrderSide::Sell, PeggedReference::BestBid) => {
                Some("sell orders cannot reference the best bid")
            }
            (_, PeggedReference::Mid) if self.offset.is_zero() => {
                Some("mid pegs need an offset greater than zero")
            }
            _ => None,
        };
        match reason {
            Some(reason) => Err(MarketcoreError::InvalidOrder {
                reason: format!("pegged {side} order: {reason}"),
            }),
            None => Ok(()),
        }
    }

    /// Concrete price for `side` given the reference price, or `None` when
    /// the result would not be positive.
    #[must_use]
    pub fn price_from(&self, side: OrderSide, reference: Decimal) -> Option<Decimal> {
        let price = match side {
            OrderSide::Buy => reference - self.offset,
            OrderSide::Sell => reference + self.offset,
        };
        (price > Decimal::ZERO).then_some(price)
    }
}

/// Who created the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderOrigin {
    User,
    /// Generated from a liquidity provision shape.
    Liquidity,
}

/// Core order struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub market_id: MarketId,
    pub party: PartyId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    /// Limit price. Zero while a pegged order is parked.
    pub price: Decimal,
    pub size: Decimal,
    pub remaining: Decimal,
    pub pegged: Option<PeggedOrder>,
    pub origin: OrderOrigin,
    /// Per-market arrival sequence (time priority).
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Good-till-time expiry; `None` is good till cancelled.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Order {
    #[must_use]
    pub fn is_pegged(&self) -> bool {
        self.pegged.is_some()
    }

    #[must_use]
    pub fn is_liquidity(&self) -> bool {
        self.origin == OrderOrigin::Liquidity
    }

    /// Static orders define the reference prices: everything that is neither
    /// pegged nor generated from a liquidity shape.
    #[must_use]
    pub fn is_static(&self) -> bool {
        !self.is_pegged() && !self.is_liquidity()
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.remaining.is_zero()
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    #[must_use]
    pub fn filled(&self) -> Decimal {
        self.size - self.remaining
    }

    /// Price used for matching; market orders take anything on the other side.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        match (self.order_type, self.side) {
            (OrderType::Limit, _) => self.price,
            (OrderType::Market, OrderSide::Buy) => Decimal::MAX,
            (OrderType::Market, OrderSide::Sell) => Decimal::ZERO,
        }
    }

    /// Whether this order would trade against a resting order at `price`.
    #[must_use]
    pub fn crosses(&self, price: Decimal) -> bool {
        match self.side {
            OrderSide::Buy => self.effective_price() >= price,
            OrderSide::Sell => self.effective_price() <= price,
        }
    }

    /// Marks the order parked: off the book with no price.
    pub fn park(&mut self, now: DateTime<Utc>) {
        self.status = OrderStatus::Parked;
        self.price = Decimal::ZERO;
        self.updated_at = now;
    }
}

/// A request to place a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub market_id: MarketId,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Required for non-pegged limit orders; ignored for pegged orders.
    pub price: Option<Decimal>,
    pub size: Decimal,
    pub pegged: Option<PeggedOrder>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OrderSubmission {
    #[must_use]
    pub fn limit(market: &MarketId, side: OrderSide, price: Decimal, size: Decimal) -> Self {
        Self {
            market_id: market.clone(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
            pegged: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn pegged(
        market: &MarketId,
        side: OrderSide,
        reference: PeggedReference,
        offset: Decimal,
        size: Decimal,
    ) -> Self {
        Self {
            market_id: market.clone(),
            side,
            order_type: OrderType::Limit,
            price: None,
            size,
            pegged: Some(PeggedOrder::new(reference, offset)),
            expires_at: None,
        }
    }

    /// Makes the order good till `at`.
    #[must_use]
    pub fn with_expiry(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Structural validation independent of market state.
    pub fn validate(&self) -> Result<()> {
        if self.size <= Decimal::ZERO {
            return Err(MarketcoreError::InvalidOrder {
                reason: format!("size must be positive, got {}", self.size),
            });
        }
        if self.expires_at.is_some() && self.order_type == OrderType::Market {
            return Err(MarketcoreError::InvalidOrder {
                reason: "market orders cannot have an expiry".into(),
            });
        }
        match (&self.pegged, self.order_type, self.price) {
            (Some(_), OrderType::Market, _) => Err(MarketcoreError::InvalidOrder {
                reason: "market orders cannot be pegged".into(),
            }),
            (Some(peg), OrderType::Limit, _) => peg.validate(self.side),
            (None, OrderType::Limit, Some(p)) if p > Decimal::ZERO => Ok(()),
            (None, OrderType::Limit, _) => Err(MarketcoreError::InvalidOrder {
                reason: "limit orders need a positive price".into(),
            }),
            (None, OrderType::Market, _) => Ok(()),
        }
    }
}

/// A request to modify a resting order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAmendment {
    pub order_id: Option<OrderId>,
    pub market_id: MarketId,
    pub price: Option<Decimal>,
    pub size: Option<Decimal>,
    pub pegged_offset: Option<Decimal>,
    pub pegged_reference: Option<PeggedReference>,
}

/// A request to cancel one or many orders.
///
/// - market and order: cancel that order
/// - market only: cancel all the party's orders in that market
/// - neither: cancel all the party's orders everywhere
/// - order only: invalid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancellation {
    pub market_id: Option<MarketId>,
    pub order_id: Option<OrderId>,
}

/// Outcome of a submission or amendment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub order: Order,
    pub trades: Vec<Trade>,
    /// Resting orders touched by the submission (fills).
    pub passive_updates: Vec<Order>,
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(party: &str, side: OrderSide, price: Decimal, size: Decimal) -> Self {
        Self::dummy_with_sequence(party, side, price, size, 0)
    }

    pub fn dummy_with_sequence(
        party: &str,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
        sequence: u64,
    ) -> Self {
        let market = MarketId::new("TEST");
        Self {
            id: OrderId::deterministic(&market, sequence),
            market_id: market,
            party: PartyId::new(party),
            side,
            order_type: OrderType::Limit,
            status: OrderStatus::Active,
            price,
            size,
            remaining: size,
            pegged: None,
            origin: OrderOrigin::User,
            sequence,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            expires_at: None,
        }
    }
}
