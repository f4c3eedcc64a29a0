use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the hedge bot
#[derive(Error, Debug)]
pub enum HedgeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Settings validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Start preconditions
    #[error("Symbol {symbol} is not available for trading ({status})")]
    SymbolNotTradable { symbol: String, status: String },

    #[error("Hedge mode could not be enabled for {symbol}: {reason}")]
    HedgeModeRejected { symbol: String, reason: String },

    #[error("Quantity {quantity} is below the exchange minimum {min_qty}")]
    QuantityBelowMinimum { quantity: Decimal, min_qty: Decimal },

    #[error("Quantity {quantity} is above the exchange maximum {max_qty}")]
    QuantityAboveMaximum { quantity: Decimal, max_qty: Decimal },

    #[error("Price {price} is not positive at tick size {tick_size}")]
    PriceNotPositive { price: Decimal, tick_size: Decimal },

    // Exchange errors
    #[error("Exchange error {code}: {message}")]
    Exchange { code: i64, message: String },

    #[error("Invalid exchange response: {0}")]
    InvalidResponse(String),

    // Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    // Lifecycle errors
    #[error("Instrument {symbol} is already running")]
    AlreadyRunning { symbol: String },

    #[error("Settings for {symbol} cannot change while {status}")]
    SettingsLocked { symbol: String, status: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Instrument already registered: {0}")]
    DuplicateInstrument(String),

    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for HedgeError
pub type Result<T> = std::result::Result<T, HedgeError>;

/// How an error relates to the engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed settings or request; rejected before any exchange call
    Validation,
    /// Venue or sizing precondition failed while starting
    Precondition,
    /// Exchange/transport failure or anything else at runtime
    Runtime,
}

impl HedgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            HedgeError::Validation(_)
            | HedgeError::Config(_)
            | HedgeError::AlreadyRunning { .. }
            | HedgeError::SettingsLocked { .. }
            | HedgeError::InvalidState(_)
            | HedgeError::UnknownInstrument(_)
            | HedgeError::DuplicateInstrument(_)
            | HedgeError::UnknownOrder(_) => ErrorCategory::Validation,
            HedgeError::SymbolNotTradable { .. }
            | HedgeError::HedgeModeRejected { .. }
            | HedgeError::QuantityBelowMinimum { .. }
            | HedgeError::QuantityAboveMaximum { .. }
            | HedgeError::PriceNotPositive { .. } => ErrorCategory::Precondition,
            _ => ErrorCategory::Runtime,
        }
    }
}
