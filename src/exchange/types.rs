use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{OrderSide, OrderStatus, PositionSide, TriggerBy, TriggerDirection};

/// Whether a symbol currently accepts orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTradingStatus {
    pub tradable: bool,
    /// Venue status text, e.g. `Trading`, `PreLaunch`, `NotFound`
    pub status: String,
}

/// Price and quantity constraints for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub qty_step: Decimal,
    pub min_qty: Decimal,
    /// Zero when the venue reports no ceiling
    pub max_qty: Decimal,
    pub tick_size: Decimal,
}

/// Conditional market order (entries and stop-losses)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    pub trigger_price: Decimal,
    pub trigger_direction: TriggerDirection,
    pub trigger_by: TriggerBy,
    pub position_side: PositionSide,
    pub reduce_only: bool,
    pub close_on_trigger: bool,
}

/// Good-till-cancelled limit order (take-profits and refills)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    pub price: Decimal,
    pub position_side: PositionSide,
    pub reduce_only: bool,
}

/// Order state as reported by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub order_id: String,
    pub status: OrderStatus,
    pub qty: Option<Decimal>,
    pub cum_exec_qty: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
}

impl ExchangeOrder {
    pub fn new(order_id: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            qty: None,
            cum_exec_qty: None,
            avg_price: None,
            price: None,
            trigger_price: None,
        }
    }

    /// Executed quantity: cumulative fill, else order size
    pub fn filled_qty(&self) -> Option<Decimal> {
        positive(self.cum_exec_qty).or_else(|| positive(self.qty))
    }

    /// Execution price: average fill, else trigger, else limit price
    pub fn fill_price(&self) -> Option<Decimal> {
        positive(self.avg_price)
            .or_else(|| positive(self.trigger_price))
            .or_else(|| positive(self.price))
    }
}

fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}

/// Open position on one hedge leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: String,
    pub position_side: PositionSide,
    pub size: Decimal,
    pub avg_price: Decimal,
    pub unrealised_pnl: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fill_values_fall_back_in_order() {
        let mut order = ExchangeOrder::new("1", OrderStatus::Filled);
        order.qty = Some(dec!(0.01));
        order.cum_exec_qty = Some(dec!(0));
        order.trigger_price = Some(dec!(25000));
        order.avg_price = Some(dec!(0));
        assert_eq!(order.filled_qty(), Some(dec!(0.01)));
        assert_eq!(order.fill_price(), Some(dec!(25000)));

        order.cum_exec_qty = Some(dec!(0.005));
        order.avg_price = Some(dec!(24990.5));
        assert_eq!(order.filled_qty(), Some(dec!(0.005)));
        assert_eq!(order.fill_price(), Some(dec!(24990.5)));
    }
}
