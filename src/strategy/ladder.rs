//! Order planning for entries, the protection ladder and refills.
//!
//! Everything here is pure: it turns settings, a leg's recorded entry and
//! the symbol's quantizer into fully quantized order requests. Placement and
//! bookkeeping stay in the engine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::quantize::Quantizer;
use crate::domain::{
    InstrumentSettings, ManagedOrder, OrderKind, PositionSide, TriggerDirection,
};
use crate::error::Result;
use crate::exchange::{ConditionalOrderRequest, LimitOrderRequest};

const HUNDRED: Decimal = dec!(100);

/// Recorded entry of one filled leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegEntry {
    pub position_side: PositionSide,
    pub entry_price: Decimal,
    pub base_size: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderPlan {
    Limit(LimitOrderRequest),
    Conditional(ConditionalOrderRequest),
}

/// An order ready to submit, with the role it plays once placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOrder {
    pub kind: OrderKind,
    pub level: Option<usize>,
    pub plan: OrderPlan,
}

impl PlannedOrder {
    pub fn position_side(&self) -> PositionSide {
        match &self.plan {
            OrderPlan::Limit(r) => r.position_side,
            OrderPlan::Conditional(r) => r.position_side,
        }
    }

    pub fn quantity(&self) -> Decimal {
        match &self.plan {
            OrderPlan::Limit(r) => r.qty,
            OrderPlan::Conditional(r) => r.qty,
        }
    }

    /// Registry record for this plan once the exchange assigned `order_id`
    pub fn to_managed(&self, order_id: &str) -> ManagedOrder {
        let mut order = match &self.plan {
            OrderPlan::Limit(r) => ManagedOrder::new(
                order_id,
                &r.symbol,
                r.side,
                r.position_side,
                self.kind,
                r.qty,
            )
            .with_price(r.price)
            .reduce_only(r.reduce_only),
            OrderPlan::Conditional(r) => ManagedOrder::new(
                order_id,
                &r.symbol,
                r.side,
                r.position_side,
                self.kind,
                r.qty,
            )
            .with_trigger_price(r.trigger_price)
            .reduce_only(r.reduce_only),
        };
        if let Some(level) = self.level {
            order = order.with_level(level);
        }
        order
    }
}

fn percent_of(value: Decimal, percent: Decimal) -> Decimal {
    value * percent / HUNDRED
}

/// `price` moved by `percent` up (positive sign) or down
fn shifted(price: Decimal, percent: Decimal, up: bool) -> Decimal {
    let factor = percent / HUNDRED;
    if up {
        price * (Decimal::ONE + factor)
    } else {
        price * (Decimal::ONE - factor)
    }
}

/// The two conditional market entries, long first
pub fn entry_orders(
    settings: &InstrumentSettings,
    quantizer: &Quantizer,
) -> Result<[PlannedOrder; 2]> {
    let qty = quantizer.quantity(settings.base_quantity)?;
    let trigger_price = quantizer.price(settings.entry_trigger_price)?;
    let long_direction = settings.entry_trigger_direction;

    let entry = |position_side: PositionSide, direction: TriggerDirection| PlannedOrder {
        kind: OrderKind::Entry,
        level: None,
        plan: OrderPlan::Conditional(ConditionalOrderRequest {
            symbol: settings.symbol.clone(),
            side: position_side.opening_side(),
            qty,
            trigger_price,
            trigger_direction: direction,
            trigger_by: settings.trigger_by,
            position_side,
            reduce_only: false,
            close_on_trigger: false,
        }),
    };

    Ok([
        entry(PositionSide::Long, long_direction),
        entry(PositionSide::Short, long_direction.complement()),
    ])
}

/// Take-profit limits then stop-loss conditionals for one leg
pub fn protection_orders(
    settings: &InstrumentSettings,
    leg: &LegEntry,
    quantizer: &Quantizer,
) -> Result<Vec<PlannedOrder>> {
    let is_long = leg.position_side == PositionSide::Long;
    let mut planned = Vec::with_capacity(settings.take_profits.len() + settings.stop_losses.len());

    let final_tier = settings.take_profits.len();
    for (idx, tier) in settings.take_profits.iter().enumerate() {
        let level = idx + 1;
        let kind = if level == final_tier {
            OrderKind::FinalTakeProfit
        } else {
            OrderKind::TakeProfit
        };
        planned.push(PlannedOrder {
            kind,
            level: Some(level),
            plan: OrderPlan::Limit(LimitOrderRequest {
                symbol: settings.symbol.clone(),
                side: leg.position_side.closing_side(),
                qty: quantizer.quantity(percent_of(leg.base_size, tier.quantity_percent))?,
                price: quantizer.price(shifted(leg.entry_price, tier.offset_percent, is_long))?,
                position_side: leg.position_side,
                reduce_only: true,
            }),
        });
    }

    let stop_direction = if is_long {
        TriggerDirection::Falls
    } else {
        TriggerDirection::Rises
    };
    for (idx, tier) in settings.stop_losses_sorted().iter().enumerate() {
        planned.push(PlannedOrder {
            kind: OrderKind::StopLoss,
            level: Some(idx + 1),
            plan: OrderPlan::Conditional(ConditionalOrderRequest {
                symbol: settings.symbol.clone(),
                side: leg.position_side.closing_side(),
                qty: quantizer.quantity(percent_of(leg.base_size, tier.quantity_percent))?,
                trigger_price: quantizer
                    .price(shifted(leg.entry_price, tier.offset_percent, !is_long))?,
                trigger_direction: stop_direction,
                trigger_by: settings.trigger_by,
                position_side: leg.position_side,
                reduce_only: true,
                close_on_trigger: true,
            }),
        });
    }

    Ok(planned)
}

/// Re-entry after the first take-profit tier, `None` when refills are off
pub fn take_profit_refill(
    settings: &InstrumentSettings,
    leg: &LegEntry,
    filled_qty: Decimal,
    quantizer: &Quantizer,
) -> Result<Option<PlannedOrder>> {
    if !settings.refill.enabled {
        return Ok(None);
    }
    let is_long = leg.position_side == PositionSide::Long;
    let wanted = percent_of(leg.base_size, settings.refill.quantity_percent).min(filled_qty);
    let price = shifted(leg.entry_price, settings.refill.price_offset_percent, !is_long);

    Ok(Some(refill(
        settings,
        leg.position_side,
        quantizer.quantity(wanted)?,
        quantizer.price(price)?,
    )))
}

/// Re-entry at the configured entry trigger price for the stopped quantity
pub fn stop_loss_refill(
    settings: &InstrumentSettings,
    position_side: PositionSide,
    stopped_qty: Decimal,
    quantizer: &Quantizer,
) -> Result<PlannedOrder> {
    Ok(refill(
        settings,
        position_side,
        quantizer.quantity(stopped_qty)?,
        quantizer.price(settings.entry_trigger_price)?,
    ))
}

fn refill(
    settings: &InstrumentSettings,
    position_side: PositionSide,
    qty: Decimal,
    price: Decimal,
) -> PlannedOrder {
    PlannedOrder {
        kind: OrderKind::Refill,
        level: None,
        plan: OrderPlan::Limit(LimitOrderRequest {
            symbol: settings.symbol.clone(),
            side: position_side.opening_side(),
            qty,
            price,
            position_side,
            reduce_only: false,
        }),
    }
}
