use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::domain::InstrumentSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Instruments managed by `hedgebot run`
    #[serde(default)]
    pub instruments: Vec<InstrumentSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// REST endpoint override; defaults to Bybit mainnet or testnet
    #[serde(default)]
    pub rest_url: Option<String>,
    #[serde(default)]
    pub testnet: bool,
    /// Signature validity window in milliseconds
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// Timeout applied to every REST call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_recv_window() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    10_000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: None,
            testnet: false,
            recv_window_ms: default_recv_window(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reconciliation interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    3000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rotated log files
    #[serde(default = "default_log_dir")]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> Option<String> {
    Some("./logs".to_string())
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: default_log_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `./config` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("engine.poll_interval_ms", default_poll_interval())?
            .set_default("exchange.testnet", false)?
            .set_default("exchange.recv_window_ms", default_recv_window())?
            .set_default("exchange.request_timeout_ms", default_request_timeout())?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("HEDGEBOT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (HEDGEBOT_ENGINE__POLL_INTERVAL_MS, etc.)
            .add_source(
                Environment::with_prefix("HEDGEBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn instrument(&self, symbol: &str) -> Option<&InstrumentSettings> {
        let symbol = symbol.trim().to_ascii_uppercase();
        self.instruments
            .iter()
            .find(|i| i.symbol.trim().eq_ignore_ascii_case(&symbol))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.engine.poll_interval_ms == 0 {
            errors.push("engine.poll_interval_ms must be positive".to_string());
        }
        if self.exchange.recv_window_ms == 0 {
            errors.push("exchange.recv_window_ms must be positive".to_string());
        }
        if self.exchange.request_timeout_ms == 0 {
            errors.push("exchange.request_timeout_ms must be positive".to_string());
        }

        let mut seen = HashSet::new();
        for (idx, instrument) in self.instruments.iter().enumerate() {
            let instrument = instrument.normalized();
            if !seen.insert(instrument.symbol.clone()) {
                errors.push(format!(
                    "instruments[{idx}]: duplicate symbol {}",
                    instrument.symbol
                ));
            }
            for problem in instrument.problems() {
                errors.push(format!(
                    "instruments[{idx}] ({}): {problem}",
                    instrument.symbol
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.engine.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.exchange.request_timeout_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_instrument_problems() {
        let mut config = AppConfig::default();
        let good = InstrumentSettings::with_defaults("BTCUSDT", dec!(0.01), dec!(25000));
        let mut bad = InstrumentSettings::with_defaults("ETHUSDT", dec!(0), dec!(1800));
        bad.stop_losses.clear();
        config.instruments = vec![good.clone(), bad, good];
        config.engine.poll_interval_ms = 0;

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("poll_interval_ms")));
        assert!(errors.iter().any(|e| e.contains("duplicate symbol BTCUSDT")));
        assert!(errors
            .iter()
            .any(|e| e.starts_with("instruments[1] (ETHUSDT): base_quantity")));
        assert!(errors.iter().any(|e| e.contains("stop-loss tier is required")));
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("hedgebot-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            r#"
[engine]
poll_interval_ms = 1500

[[instruments]]
symbol = "BTCUSDT"
base_quantity = "0.01"
entry_trigger_price = "25000"
entry_trigger_direction = "falls"
trigger_by = "MarkPrice"
take_profits = [
    { offset_percent = "0.5", quantity_percent = "50" },
    { offset_percent = "1.0", quantity_percent = "50" },
]
stop_losses = [{ offset_percent = "1.0", quantity_percent = "100" }]
refill = { enabled_after_tp1 = true, price_offset_percent = "0.2", quantity_percent = "50" }
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&dir).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(config.engine.poll_interval_ms, 1500);
        assert_eq!(config.exchange.recv_window_ms, 5000);
        let btc = config.instrument("btcusdt").unwrap();
        assert_eq!(btc.base_quantity, dec!(0.01));
        assert!(btc.refill.enabled);
        assert_eq!(btc.trigger_by, crate::domain::TriggerBy::MarkPrice);
        assert!(config.validate().is_ok());
    }
}
