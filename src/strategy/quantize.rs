//! Snapping prices and quantities onto exchange increments.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{HedgeError, Result};
use crate::exchange::SymbolFilters;

/// Largest multiple of `step` not above `value`.
///
/// A non-positive step leaves the value untouched.
pub fn quantize_down(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    let steps = (value / step).floor();
    (steps * step).normalize()
}

/// Nearest multiple of `step`, halves rounded away from zero
pub fn quantize_round(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    let steps = (value / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    (steps * step).normalize()
}

/// Per-symbol quantization bound to cached exchange filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantizer {
    filters: SymbolFilters,
}

impl Quantizer {
    pub fn new(filters: SymbolFilters) -> Self {
        Self { filters }
    }

    /// Order quantity floored to the lot step and checked against the lot bounds
    pub fn quantity(&self, raw: Decimal) -> Result<Decimal> {
        let quantity = quantize_down(raw, self.filters.qty_step);
        if quantity <= Decimal::ZERO || quantity < self.filters.min_qty {
            return Err(HedgeError::QuantityBelowMinimum {
                quantity,
                min_qty: self.filters.min_qty,
            });
        }
        if self.filters.max_qty > Decimal::ZERO && quantity > self.filters.max_qty {
            return Err(HedgeError::QuantityAboveMaximum {
                quantity,
                max_qty: self.filters.max_qty,
            });
        }
        Ok(quantity)
    }

    /// Price rounded to the tick; a non-positive result is an error
    pub fn price(&self, raw: Decimal) -> Result<Decimal> {
        let price = quantize_round(raw, self.filters.tick_size);
        if price <= Decimal::ZERO {
            return Err(HedgeError::PriceNotPositive {
                price,
                tick_size: self.filters.tick_size,
            });
        }
        Ok(price)
    }
}
