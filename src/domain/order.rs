use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position leg in hedge mode.
///
/// Not the same as [`OrderSide`]: a `Sell` can open a short leg or close a
/// long one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub const BOTH: [PositionSide; 2] = [PositionSide::Long, PositionSide::Short];

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }

    /// Hedge-mode position index used by the venue (1 = long, 2 = short)
    pub fn position_idx(&self) -> u8 {
        match self {
            PositionSide::Long => 1,
            PositionSide::Short => 2,
        }
    }

    pub fn from_position_idx(idx: i64) -> Option<Self> {
        match idx {
            1 => Some(PositionSide::Long),
            2 => Some(PositionSide::Short),
            _ => None,
        }
    }

    /// Order side that grows this leg
    pub fn opening_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces this leg
    pub fn closing_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction in which the reference price must cross a trigger level.
///
/// Wire codes follow the venue: 1 = rises to/above, 2 = falls to/below.
/// A direction and its complement always sum to 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerDirection {
    /// Trigger when price is at or above the level
    Rises,
    /// Trigger when price is at or below the level
    Falls,
}

impl TriggerDirection {
    pub fn code(&self) -> u8 {
        match self {
            TriggerDirection::Rises => 1,
            TriggerDirection::Falls => 2,
        }
    }

    pub fn complement(&self) -> Self {
        match self {
            TriggerDirection::Rises => TriggerDirection::Falls,
            TriggerDirection::Falls => TriggerDirection::Rises,
        }
    }
}

/// Reference price a trigger is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerBy {
    #[default]
    LastPrice,
    MarkPrice,
    IndexPrice,
}

impl TriggerBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerBy::LastPrice => "LastPrice",
            TriggerBy::MarkPrice => "MarkPrice",
            TriggerBy::IndexPrice => "IndexPrice",
        }
    }
}

/// Role of an order inside the hedge cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Conditional market entry
    Entry,
    /// Non-final take-profit tier
    TakeProfit,
    /// Highest take-profit tier; its fill finalizes the trade
    FinalTakeProfit,
    StopLoss,
    /// Re-entry after a partial exit
    Refill,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Entry => "entry",
            OrderKind::TakeProfit => "take_profit",
            OrderKind::FinalTakeProfit => "final_take_profit",
            OrderKind::StopLoss => "stop_loss",
            OrderKind::Refill => "refill",
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status as understood by the engine.
///
/// Venue strings are mapped onto this closed set at the adapter boundary;
/// nothing downstream ever sees the raw spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted and resting (or waiting for its trigger)
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    /// Unrecognized venue status
    Unknown,
}

impl OrderStatus {
    /// Map a venue status string
    pub fn from_exchange(raw: &str) -> Self {
        match raw.trim() {
            "New" | "Created" | "Untriggered" | "Triggered" | "Active" => OrderStatus::New,
            "PartiallyFilled" => OrderStatus::PartiallyFilled,
            "Filled" => OrderStatus::Filled,
            "Cancelled" | "Deactivated" | "PartiallyFilledCanceled" => OrderStatus::Cancelled,
            "Rejected" => OrderStatus::Rejected,
            _ => OrderStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order tracked by an instrument engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    /// TP/SL tier, 1-based
    pub level: Option<usize>,
    pub status: OrderStatus,
    pub reduce_only: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ManagedOrder {
    pub fn new(
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        position_side: PositionSide,
        kind: OrderKind,
        quantity: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id: order_id.into(),
            symbol: symbol.into(),
            side,
            position_side,
            kind,
            quantity,
            price: None,
            trigger_price: None,
            level: None,
            status: OrderStatus::New,
            reduce_only: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_trigger_price(mut self, trigger_price: Decimal) -> Self {
        self.trigger_price = Some(trigger_price);
        self
    }

    pub fn with_level(mut self, level: usize) -> Self {
        self.level = Some(level);
        self
    }

    pub fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn mark_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
