//! Hedge strategy core
//!
//! - `quantize` - snapping to exchange increments
//! - `registry` - orders placed by one instrument
//! - `ladder` - entry, protection and refill order planning
//! - `events` - status/log/orders event channel
//! - `engine` - per-instrument state machine and reconciliation loop

pub mod engine;
pub mod events;
pub mod ladder;
pub mod quantize;
pub mod registry;

pub use engine::{EngineSnapshot, InstrumentEngine, DEFAULT_POLL_INTERVAL};
pub use events::{event_channel, EngineEvent, EventReceiver, EventSender, LogLevel};
pub use ladder::{LegEntry, OrderPlan, PlannedOrder};
pub use quantize::{quantize_down, quantize_round, Quantizer};
pub use registry::OrderRegistry;
