//! Command line interface
//!
//! `run` drives the configured instruments until Ctrl-C, the other
//! commands are one-shot operator tools against the exchange.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use crate::adapters::BybitClient;
use crate::config::AppConfig;
use crate::domain::{InstrumentSettings, PositionSide, TierLevel};
use crate::error::{HedgeError, Result};
use crate::exchange::ExchangeClient;
use crate::fleet::InstrumentFleet;
use crate::strategy::{event_channel, EngineEvent, EventReceiver, LogLevel};

/// How often `run` checks whether every instrument has finished
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "hedgebot")]
#[command(about = "Hedged long/short conditional order engine for Bybit linear perpetuals")]
#[command(version)]
pub struct Cli {
    /// Directory holding default.toml and environment overrides
    #[arg(short, long, global = true, default_value = "config")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the configured instruments and manage them until Ctrl-C
    Run {
        /// Only run these symbols (default: every configured instrument)
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,
        /// Override every stop-loss ladder, e.g. "1:50,2:50"
        #[arg(long)]
        stop_losses: Option<String>,
    },
    /// Show tradability, filters and hedge positions of a symbol
    Check {
        #[arg(short, long)]
        symbol: String,
    },
    /// Cancel every order and market-close both legs of a symbol
    Close {
        #[arg(short, long)]
        symbol: String,
    },
    /// Validate the configuration and exit
    Validate,
}

pub fn load_config(dir: &Path) -> Result<AppConfig> {
    Ok(AppConfig::load_from(dir)?)
}

fn exchange_client(config: &AppConfig) -> Result<Arc<dyn ExchangeClient>> {
    let client = BybitClient::from_env(&config.exchange)?;
    info!("Using Bybit REST endpoint {}", client.base_url());
    Ok(Arc::new(client))
}

/// Configured instruments matching `symbols`, all of them when empty
pub fn select_instruments(
    config: &AppConfig,
    symbols: &[String],
    stop_losses: Option<&str>,
) -> Result<Vec<InstrumentSettings>> {
    let mut selected = if symbols.is_empty() {
        config.instruments.iter().map(|i| i.normalized()).collect()
    } else {
        symbols
            .iter()
            .map(|symbol| {
                config
                    .instrument(symbol)
                    .map(|i| i.normalized())
                    .ok_or_else(|| HedgeError::UnknownInstrument(symbol.to_ascii_uppercase()))
            })
            .collect::<Result<Vec<_>>>()?
    };

    if selected.is_empty() {
        return Err(HedgeError::Validation(
            "no instruments configured".to_string(),
        ));
    }

    if let Some(raw) = stop_losses {
        let tiers = TierLevel::parse_list(raw)?;
        for settings in &mut selected {
            settings.stop_losses = tiers.clone();
        }
    }
    Ok(selected)
}

/// One line per event for the operator console
pub fn render_event(event: &EngineEvent) -> Option<String> {
    let body = match event {
        EngineEvent::Status { status, detail, .. } => format!(
            "{}{}",
            status,
            detail
                .as_deref()
                .map(|d| format!(" - {}", d))
                .unwrap_or_default()
        ),
        EngineEvent::Log { level, message, .. } if *level != LogLevel::Debug => {
            format!("[{}] {}", level.as_str(), message)
        }
        EngineEvent::Log { .. } => return None,
        EngineEvent::Orders { orders, .. } => {
            let pending = orders.iter().filter(|o| !o.status.is_terminal()).count();
            format!("orders: {} tracked, {} pending", orders.len(), pending)
        }
    };
    Some(format!(
        "{} {:<12} {}",
        event.timestamp().format("%H:%M:%S"),
        event.symbol(),
        body
    ))
}

async fn render_events(mut rx: EventReceiver) {
    let mut last_orders: HashMap<String, String> = HashMap::new();
    while let Some(event) = rx.recv().await {
        let Some(line) = render_event(&event) else {
            continue;
        };
        if let EngineEvent::Orders { symbol, .. } = &event {
            // snapshots repeat on every poll; only print changes
            let summary = line.split_once(' ').map(|(_, rest)| rest).unwrap_or(&line);
            if last_orders.get(symbol).map(String::as_str) == Some(summary) {
                continue;
            }
            last_orders.insert(symbol.clone(), summary.to_string());
        }
        println!("{}", line);
    }
}

/// `hedgebot run`
pub async fn run(config: &AppConfig, symbols: &[String], stop_losses: Option<&str>) -> Result<()> {
    let instruments = select_instruments(config, symbols, stop_losses)?;
    let exchange = exchange_client(config)?;

    let (events, rx) = event_channel();
    let renderer = tokio::spawn(render_events(rx));
    let fleet = InstrumentFleet::new(exchange, events, config.engine.poll_interval());
    for settings in instruments {
        fleet.add_instrument(settings).await?;
    }

    let mut started = 0usize;
    for (symbol, result) in fleet.start_all().await {
        match result {
            Ok(()) => {
                info!(symbol = %symbol, "instrument started");
                started += 1;
            }
            Err(e) => error!(symbol = %symbol, "failed to start: {}", e),
        }
    }

    if started == 0 {
        warn!("No instrument could be started");
    } else {
        info!("{} instrument(s) running, press Ctrl-C to stop", started);
        loop {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, stopping instruments...");
                    break;
                }
                _ = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {
                    let snapshots = fleet.snapshot().await;
                    if snapshots.iter().all(|s| !s.status.is_running()) {
                        info!("All instruments finished");
                        break;
                    }
                }
            }
        }
    }

    for (symbol, result) in fleet.stop_all().await {
        if let Err(e) = result {
            error!(symbol = %symbol, "stop failed: {}", e);
        }
    }
    for snapshot in fleet.snapshot().await {
        info!(
            symbol = %snapshot.symbol,
            status = %snapshot.status,
            orders = snapshot.order_count,
            "final state"
        );
    }

    drop(fleet);
    if tokio::time::timeout(Duration::from_secs(2), renderer)
        .await
        .is_err()
    {
        warn!("event renderer did not drain in time");
    }
    Ok(())
}

/// `hedgebot check`
pub async fn check(config: &AppConfig, symbol: &str) -> Result<()> {
    let symbol = symbol.trim().to_ascii_uppercase();
    let exchange = exchange_client(config)?;

    let trading = exchange.ensure_symbol_trading(&symbol).await?;
    println!("Symbol:       {}", symbol);
    println!(
        "Tradable:     {} ({})",
        if trading.tradable { "yes" } else { "no" },
        trading.status
    );

    let filters = exchange.get_symbol_filters(&symbol).await?;
    println!("Qty step:     {}", filters.qty_step);
    println!("Min qty:      {}", filters.min_qty);
    println!("Max qty:      {}", filters.max_qty);
    println!("Tick size:    {}", filters.tick_size);

    for side in PositionSide::BOTH {
        match exchange.get_position_side(&symbol, side).await? {
            Some(position) => println!(
                "{:<13} size {} @ {} (uPnL {})",
                format!("{}:", side),
                position.size,
                position.avg_price,
                position
                    .unrealised_pnl
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string())
            ),
            None => println!("{:<13} flat", format!("{}:", side)),
        }
    }

    if let Some(settings) = config.instrument(&symbol) {
        let problems = settings.problems();
        if problems.is_empty() {
            println!("Config:       ok");
        } else {
            for problem in problems {
                println!("Config:       {}", problem);
            }
        }
    } else {
        println!("Config:       not configured");
    }
    Ok(())
}

/// `hedgebot close`: every step is attempted, the first error is returned
pub async fn close(config: &AppConfig, symbol: &str) -> Result<()> {
    let symbol = symbol.trim().to_ascii_uppercase();
    let exchange = exchange_client(config)?;
    let mut first_error: Option<HedgeError> = None;

    match exchange.cancel_all_orders(&symbol).await {
        Ok(()) => println!("Cancelled all open orders on {}", symbol),
        Err(e) => {
            error!(symbol = %symbol, "cancel all orders failed: {}", e);
            first_error.get_or_insert(e);
        }
    }

    for side in PositionSide::BOTH {
        match exchange.close_position_market(&symbol, side).await {
            Ok(Some(order_id)) => println!("Closed {} leg at market ({})", side, order_id),
            Ok(None) => println!("No {} position", side),
            Err(e) => {
                error!(symbol = %symbol, "close {} failed: {}", side, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// `hedgebot validate`
pub fn validate(dir: &Path) -> Result<()> {
    let config = load_config(dir)?;
    match config.validate() {
        Ok(()) => {
            println!(
                "Configuration OK: {} instrument(s), poll interval {}ms",
                config.instruments.len(),
                config.engine.poll_interval_ms
            );
            Ok(())
        }
        Err(problems) => {
            for problem in &problems {
                println!("  - {}", problem);
            }
            Err(HedgeError::Validation(format!(
                "{} configuration problem(s)",
                problems.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InstrumentStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.instruments = vec![
            InstrumentSettings::with_defaults("BTCUSDT", dec!(0.01), dec!(25000)),
            InstrumentSettings::with_defaults("ethusdt", dec!(0.1), dec!(1800)),
        ];
        config
    }

    #[test]
    fn test_cli_parses_run_with_symbols() {
        let cli = Cli::try_parse_from([
            "hedgebot",
            "--config",
            "/etc/hedgebot",
            "run",
            "-s",
            "BTCUSDT",
            "--symbol",
            "ETHUSDT",
            "--stop-losses",
            "1:50,2:50",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/hedgebot"));
        match cli.command {
            Commands::Run {
                symbols,
                stop_losses,
            } => {
                assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
                assert_eq!(stop_losses.as_deref(), Some("1:50,2:50"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_symbol_for_close() {
        assert!(Cli::try_parse_from(["hedgebot", "close"]).is_err());
        let cli = Cli::try_parse_from(["hedgebot", "validate"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config"));
    }

    #[test]
    fn test_select_instruments() {
        let config = config();
        assert_eq!(select_instruments(&config, &[], None).unwrap().len(), 2);

        let eth = select_instruments(&config, &["EthUsdt".to_string()], None).unwrap();
        assert_eq!(eth.len(), 1);
        assert_eq!(eth[0].symbol, "ETHUSDT");

        assert!(matches!(
            select_instruments(&config, &["XRPUSDT".to_string()], None),
            Err(HedgeError::UnknownInstrument(_))
        ));
        assert!(select_instruments(&AppConfig::default(), &[], None).is_err());
    }

    #[test]
    fn test_stop_loss_override_applies_to_selection() {
        let selected = select_instruments(&config(), &[], Some("1:50, 2:50")).unwrap();
        for settings in selected {
            assert_eq!(
                settings.stop_losses,
                vec![
                    TierLevel::new(dec!(1), dec!(50)),
                    TierLevel::new(dec!(2), dec!(50)),
                ]
            );
        }
        assert!(select_instruments(&config(), &[], Some("1-50")).is_err());
    }

    #[test]
    fn test_render_event_skips_debug_logs() {
        let status = EngineEvent::Status {
            symbol: "BTCUSDT".into(),
            status: InstrumentStatus::Active,
            detail: Some("both legs open".into()),
            timestamp: Utc::now(),
        };
        let line = render_event(&status).unwrap();
        assert!(line.contains("BTCUSDT"));
        assert!(line.ends_with("ACTIVE - both legs open"));

        let debug = EngineEvent::Log {
            symbol: "BTCUSDT".into(),
            level: LogLevel::Debug,
            message: "noise".into(),
            timestamp: Utc::now(),
        };
        assert!(render_event(&debug).is_none());
    }
}
