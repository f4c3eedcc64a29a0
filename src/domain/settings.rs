use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{TriggerBy, TriggerDirection};
use crate::error::{HedgeError, Result};

/// Number of take-profit tiers every instrument carries
pub const TAKE_PROFIT_TIERS: usize = 2;
/// Upper bound on stop-loss tiers
pub const MAX_STOP_LOSS_TIERS: usize = 10;

/// Slack allowed when summing tier percentages
const PERCENT_TOLERANCE: Decimal = dec!(0.000001);
const HUNDRED: Decimal = dec!(100);

/// One TP or SL tier: distance from entry and share of the leg it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLevel {
    /// Distance from the entry price, in percent
    pub offset_percent: Decimal,
    /// Share of the leg's base size, in percent
    pub quantity_percent: Decimal,
}

impl TierLevel {
    pub fn new(offset_percent: Decimal, quantity_percent: Decimal) -> Self {
        Self {
            offset_percent,
            quantity_percent,
        }
    }

    /// Parse a comma separated `offset:qty` list, e.g. `"1:50,2.5:50"`
    pub fn parse_list(raw: &str) -> Result<Vec<TierLevel>> {
        raw.split(',')
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(TierLevel::from_str)
            .collect()
    }
}

impl FromStr for TierLevel {
    type Err = HedgeError;

    fn from_str(raw: &str) -> Result<Self> {
        let (offset, qty) = raw.split_once(':').ok_or_else(|| {
            HedgeError::Validation(format!("tier '{raw}' must look like offset:qty"))
        })?;
        let parse = |value: &str| {
            Decimal::from_str(value.trim())
                .map_err(|e| HedgeError::Validation(format!("invalid number '{value}': {e}")))
        };
        Ok(Self::new(parse(offset)?, parse(qty)?))
    }
}

/// Re-entry policy after the first take-profit tier fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RefillPolicy {
    #[serde(alias = "enabled_after_tp1")]
    pub enabled: bool,
    /// Distance of the refill limit from the entry price, toward the position
    #[serde(default)]
    pub price_offset_percent: Decimal,
    /// Refill size as a share of the leg's base size
    #[serde(default)]
    pub quantity_percent: Decimal,
}

/// Strategy parameters for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSettings {
    pub symbol: String,
    pub base_quantity: Decimal,
    pub entry_trigger_price: Decimal,
    /// Trigger direction of the long entry; the short entry uses the complement
    #[serde(default = "default_entry_direction")]
    pub entry_trigger_direction: TriggerDirection,
    #[serde(default)]
    pub trigger_by: TriggerBy,
    pub take_profits: Vec<TierLevel>,
    pub stop_losses: Vec<TierLevel>,
    #[serde(default)]
    pub refill: RefillPolicy,
}

fn default_entry_direction() -> TriggerDirection {
    TriggerDirection::Falls
}

impl InstrumentSettings {
    /// Settings with a conventional ladder: TP 0.5%/1.0% at 50% each, one full stop at 1%
    pub fn with_defaults(symbol: &str, base_quantity: Decimal, entry_trigger_price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            base_quantity,
            entry_trigger_price,
            entry_trigger_direction: default_entry_direction(),
            trigger_by: TriggerBy::default(),
            take_profits: vec![
                TierLevel::new(dec!(0.5), dec!(50)),
                TierLevel::new(dec!(1.0), dec!(50)),
            ],
            stop_losses: vec![TierLevel::new(dec!(1.0), dec!(100))],
            refill: RefillPolicy::default(),
        }
    }

    /// Copy with the symbol trimmed and uppercased
    pub fn normalized(&self) -> Self {
        let mut settings = self.clone();
        settings.symbol = settings.symbol.trim().to_ascii_uppercase();
        settings
    }

    /// Stop-loss tiers ordered closest-to-entry first
    pub fn stop_losses_sorted(&self) -> Vec<TierLevel> {
        let mut stops = self.stop_losses.clone();
        stops.sort_by(|a, b| a.offset_percent.cmp(&b.offset_percent));
        stops
    }

    /// Every rule the settings break, empty when valid
    pub fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.symbol.is_empty() {
            errors.push("symbol must not be empty".to_string());
        } else if !self
            .symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            errors.push(format!(
                "symbol '{}' must be an uppercase identifier",
                self.symbol
            ));
        }

        if self.base_quantity <= Decimal::ZERO {
            errors.push("base_quantity must be positive".to_string());
        }
        if self.entry_trigger_price <= Decimal::ZERO {
            errors.push("entry_trigger_price must be positive".to_string());
        }

        if self.take_profits.len() != TAKE_PROFIT_TIERS {
            errors.push(format!(
                "exactly {} take-profit tiers are required, got {}",
                TAKE_PROFIT_TIERS,
                self.take_profits.len()
            ));
        }
        check_tiers("take-profit", &self.take_profits, &mut errors);

        if self.stop_losses.is_empty() {
            errors.push("at least one stop-loss tier is required".to_string());
        }
        if self.stop_losses.len() > MAX_STOP_LOSS_TIERS {
            errors.push(format!(
                "at most {} stop-loss tiers are allowed, got {}",
                MAX_STOP_LOSS_TIERS,
                self.stop_losses.len()
            ));
        }
        check_tiers("stop-loss", &self.stop_losses, &mut errors);

        if self.refill.enabled {
            let offset = self.refill.price_offset_percent;
            if offset < Decimal::ZERO || offset >= HUNDRED {
                errors.push("refill price_offset_percent must be in [0, 100)".to_string());
            }
            if !in_percent_range(self.refill.quantity_percent) {
                errors.push("refill quantity_percent must be in (0, 100]".to_string());
            }
        }

        errors
    }

    pub fn validate(&self) -> Result<()> {
        let errors = self.problems();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(HedgeError::Validation(errors.join("; ")))
        }
    }
}

fn in_percent_range(value: Decimal) -> bool {
    value > Decimal::ZERO && value <= HUNDRED
}

fn check_tiers(label: &str, tiers: &[TierLevel], errors: &mut Vec<String>) {
    for (idx, tier) in tiers.iter().enumerate() {
        if tier.offset_percent <= Decimal::ZERO || tier.offset_percent >= HUNDRED {
            errors.push(format!("{label} tier {} offset must be in (0, 100)", idx + 1));
        }
        if !in_percent_range(tier.quantity_percent) {
            errors.push(format!(
                "{label} tier {} quantity must be in (0, 100]",
                idx + 1
            ));
        }
    }

    let total: Decimal = tiers.iter().map(|t| t.quantity_percent).sum();
    if total > HUNDRED + PERCENT_TOLERANCE {
        errors.push(format!(
            "{label} quantities add up to {total}%, more than 100%"
        ));
    }
}
