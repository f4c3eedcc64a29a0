use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::{InstrumentStatus, ManagedOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Event published by an instrument engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Lifecycle transition
    Status {
        symbol: String,
        status: InstrumentStatus,
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    },

    Log {
        symbol: String,
        level: LogLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Full order registry, in placement order
    Orders {
        symbol: String,
        orders: Vec<ManagedOrder>,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn symbol(&self) -> &str {
        match self {
            EngineEvent::Status { symbol, .. }
            | EngineEvent::Log { symbol, .. }
            | EngineEvent::Orders { symbol, .. } => symbol,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::Status { timestamp, .. }
            | EngineEvent::Log { timestamp, .. }
            | EngineEvent::Orders { timestamp, .. } => *timestamp,
        }
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Producer half of the event channel.
///
/// Sending never blocks and never fails: events published after every
/// consumer went away are dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

impl EventSender {
    pub fn send(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn status(&self, symbol: &str, status: InstrumentStatus, detail: Option<String>) {
        info!(symbol, status = %status, detail = detail.as_deref().unwrap_or(""), "status changed");
        self.send(EngineEvent::Status {
            symbol: symbol.to_string(),
            status,
            detail,
            timestamp: Utc::now(),
        });
    }

    /// Publish a log line and mirror it to tracing at the same level
    pub fn log(&self, symbol: &str, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!(symbol, "{}", message),
            LogLevel::Info => info!(symbol, "{}", message),
            LogLevel::Warn => warn!(symbol, "{}", message),
            LogLevel::Error => error!(symbol, "{}", message),
        }
        self.send(EngineEvent::Log {
            symbol: symbol.to_string(),
            level,
            message,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, symbol: &str, message: impl Into<String>) {
        self.log(symbol, LogLevel::Info, message);
    }

    pub fn warn(&self, symbol: &str, message: impl Into<String>) {
        self.log(symbol, LogLevel::Warn, message);
    }

    pub fn error(&self, symbol: &str, message: impl Into<String>) {
        self.log(symbol, LogLevel::Error, message);
    }

    pub fn orders(&self, symbol: &str, orders: Vec<ManagedOrder>) {
        self.send(EngineEvent::Orders {
            symbol: symbol.to_string(),
            orders,
            timestamp: Utc::now(),
        });
    }
}
