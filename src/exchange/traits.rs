use async_trait::async_trait;

use super::types::{
    ConditionalOrderRequest, ExchangeOrder, LimitOrderRequest, PositionRecord, SymbolFilters,
    SymbolTradingStatus,
};
use crate::domain::PositionSide;
use crate::error::Result;

/// Trading operations the instrument engine needs from a venue.
///
/// Implementations must be safe to share between engines; each call either
/// returns a well-formed payload or a descriptive error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn ensure_symbol_trading(&self, symbol: &str) -> Result<SymbolTradingStatus>;

    /// Enable hedge (two-way) position mode, failing if the venue refuses
    async fn ensure_hedge_mode(&self, symbol: &str) -> Result<()>;

    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters>;

    /// Returns the exchange order id
    async fn place_conditional_market_order(
        &self,
        request: &ConditionalOrderRequest,
    ) -> Result<String>;

    /// Returns the exchange order id
    async fn place_limit_order(&self, request: &LimitOrderRequest) -> Result<String>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()>;

    /// Market-close one leg; `None` when there is no position to close
    async fn close_position_market(
        &self,
        symbol: &str,
        position_side: PositionSide,
    ) -> Result<Option<String>>;

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>>;

    /// Direct lookup, including orders no longer open; `None` when unknown
    async fn get_order_info(&self, symbol: &str, order_id: &str) -> Result<Option<ExchangeOrder>>;

    async fn get_position_side(
        &self,
        symbol: &str,
        position_side: PositionSide,
    ) -> Result<Option<PositionRecord>>;
}
