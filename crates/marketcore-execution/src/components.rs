//! Default per-market components.

use marketcore_book::{LiquidityEngine, OrderBook, PriceBounds};
use marketcore_types::{AuctionTrigger, Book, ComponentFactory, LiquidityShape, MarketId};
use rust_decimal::Decimal;

/// Builds an [`OrderBook`], a [`LiquidityEngine`] and [`PriceBounds`] for
/// every new market.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComponents;

impl ComponentFactory for DefaultComponents {
    fn book(&self, market: &MarketId) -> Box<dyn Book> {
        Box::new(OrderBook::new(market.clone()))
    }

    fn liquidity(&self, market: &MarketId) -> Box<dyn LiquidityShape> {
        Box::new(LiquidityEngine::new(market.clone()))
    }

    fn auction_trigger(&self, _market: &MarketId, bound: Decimal) -> Box<dyn AuctionTrigger> {
        Box::new(PriceBounds::new(bound))
    }
}
