use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentStatus {
    /// Settings accepted, nothing on the exchange
    Configured,
    /// Conditional entries placed, waiting for both legs
    WaitingEntry,
    /// Both legs open, protection ladder deployed
    Active,
    /// Stopped by the operator; positions may still be open
    Stopped,
    /// Trade finished (final TP or manual close)
    Completed,
    /// Reconciliation halted on an error
    Error,
}

impl InstrumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentStatus::Configured => "CONFIGURED",
            InstrumentStatus::WaitingEntry => "WAITING_ENTRY",
            InstrumentStatus::Active => "ACTIVE",
            InstrumentStatus::Stopped => "STOPPED",
            InstrumentStatus::Completed => "COMPLETED",
            InstrumentStatus::Error => "ERROR",
        }
    }

    /// Is the reconciliation loop supposed to be running?
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            InstrumentStatus::WaitingEntry | InstrumentStatus::Active
        )
    }

    pub fn can_start(&self) -> bool {
        !self.is_running()
    }

    /// Anything placed since the last start can be cancelled
    pub fn can_stop(&self) -> bool {
        !matches!(self, InstrumentStatus::Configured)
    }

    pub fn can_close(&self) -> bool {
        !matches!(self, InstrumentStatus::Configured)
    }

    pub fn accepts_settings(&self) -> bool {
        !self.is_running()
    }
}

impl fmt::Display for InstrumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
