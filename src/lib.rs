//! Hedged long/short conditional order engine for Bybit linear perpetuals.
//!
//! Each configured instrument places two opposite conditional market entries
//! at one trigger price. Once both legs are open the engine lays down a
//! take-profit and stop-loss ladder per leg, refills after TP1 or a stop, and
//! closes everything when a final take-profit fills.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod fleet;
pub mod strategy;

pub use config::AppConfig;
pub use domain::{InstrumentSettings, InstrumentStatus};
pub use error::{HedgeError, Result};
pub use fleet::InstrumentFleet;
pub use strategy::{EngineEvent, InstrumentEngine};
