//! Registry of instrument engines sharing one exchange client.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::InstrumentSettings;
use crate::error::{HedgeError, Result};
use crate::exchange::ExchangeClient;
use crate::strategy::{EngineSnapshot, EventSender, InstrumentEngine};

pub struct InstrumentFleet {
    exchange: Arc<dyn ExchangeClient>,
    events: EventSender,
    poll_interval: Duration,
    engines: RwLock<HashMap<String, Arc<InstrumentEngine>>>,
}

fn key(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

impl InstrumentFleet {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        events: EventSender,
        poll_interval: Duration,
    ) -> Self {
        Self {
            exchange,
            events,
            poll_interval,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new instrument in CONFIGURED state.
    ///
    /// # Errors
    /// Rejects invalid settings and symbols that are already registered.
    pub async fn add_instrument(
        &self,
        settings: InstrumentSettings,
    ) -> Result<Arc<InstrumentEngine>> {
        let settings = settings.normalized();
        settings.validate()?;

        let mut engines = self.engines.write().await;
        if engines.contains_key(&settings.symbol) {
            return Err(HedgeError::DuplicateInstrument(settings.symbol));
        }

        let symbol = settings.symbol.clone();
        let engine = Arc::new(InstrumentEngine::new(
            settings,
            Arc::clone(&self.exchange),
            self.events.clone(),
            self.poll_interval,
        ));
        engines.insert(symbol.clone(), Arc::clone(&engine));
        info!(symbol = %symbol, "instrument added");
        Ok(engine)
    }

    /// Forget an instrument that is not running
    pub async fn remove_instrument(&self, symbol: &str) -> Result<()> {
        let symbol = key(symbol);
        let mut engines = self.engines.write().await;
        let engine = engines
            .get(&symbol)
            .ok_or_else(|| HedgeError::UnknownInstrument(symbol.clone()))?;

        let status = engine.status().await;
        if status.is_running() {
            return Err(HedgeError::InvalidState(format!(
                "{} cannot be removed while {}",
                symbol, status
            )));
        }
        engines.remove(&symbol);
        info!(symbol = %symbol, "instrument removed");
        Ok(())
    }

    /// Registered symbols, sorted
    pub async fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.engines.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub async fn engine(&self, symbol: &str) -> Result<Arc<InstrumentEngine>> {
        let symbol = key(symbol);
        self.engines
            .read()
            .await
            .get(&symbol)
            .cloned()
            .ok_or(HedgeError::UnknownInstrument(symbol))
    }

    pub async fn start(&self, symbol: &str) -> Result<()> {
        self.engine(symbol).await?.start().await
    }

    pub async fn stop(&self, symbol: &str) -> Result<()> {
        self.engine(symbol).await?.stop().await
    }

    pub async fn close_all(&self, symbol: &str) -> Result<()> {
        self.engine(symbol).await?.close_all().await
    }

    pub async fn update_settings(&self, symbol: &str, settings: InstrumentSettings) -> Result<()> {
        self.engine(symbol).await?.update_settings(settings).await
    }

    async fn engines_sorted(&self) -> Vec<Arc<InstrumentEngine>> {
        let mut engines: Vec<Arc<InstrumentEngine>> =
            self.engines.read().await.values().cloned().collect();
        engines.sort_by(|a, b| a.symbol().cmp(b.symbol()));
        engines
    }

    /// Start every instrument whose status allows it, concurrently
    pub async fn start_all(&self) -> Vec<(String, Result<()>)> {
        let mut startable = Vec::new();
        for engine in self.engines_sorted().await {
            if engine.status().await.can_start() {
                startable.push(engine);
            }
        }

        join_all(startable.into_iter().map(|engine| async move {
            let result = engine.start().await;
            (engine.symbol().to_string(), result)
        }))
        .await
    }

    /// Stop every running instrument, one after another
    pub async fn stop_all(&self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::new();
        for engine in self.engines_sorted().await {
            if engine.status().await.is_running() {
                let result = engine.stop().await;
                results.push((engine.symbol().to_string(), result));
            }
        }
        results
    }

    pub async fn snapshot(&self) -> Vec<EngineSnapshot> {
        let mut snapshots = Vec::new();
        for engine in self.engines_sorted().await {
            snapshots.push(engine.snapshot().await);
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InstrumentStatus;
    use crate::exchange::MockExchangeClient;
    use crate::strategy::event_channel;
    use rust_decimal_macros::dec;

    fn fleet() -> InstrumentFleet {
        let (tx, _rx) = event_channel();
        InstrumentFleet::new(
            Arc::new(MockExchangeClient::new()),
            tx,
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates_and_invalid_settings() {
        let fleet = fleet();
        fleet
            .add_instrument(InstrumentSettings::with_defaults(
                "btcusdt",
                dec!(0.01),
                dec!(25000),
            ))
            .await
            .unwrap();

        let dup = fleet
            .add_instrument(InstrumentSettings::with_defaults(
                "BTCUSDT",
                dec!(0.02),
                dec!(26000),
            ))
            .await;
        assert!(matches!(dup, Err(HedgeError::DuplicateInstrument(_))));

        let bad = fleet
            .add_instrument(InstrumentSettings::with_defaults(
                "ETHUSDT",
                dec!(-1),
                dec!(1800),
            ))
            .await;
        assert!(matches!(bad, Err(HedgeError::Validation(_))));
        assert_eq!(fleet.symbols().await, vec!["BTCUSDT".to_string()]);
    }

    #[tokio::test]
    async fn test_lookup_and_remove() {
        let fleet = fleet();
        for symbol in ["SOLUSDT", "ETHUSDT"] {
            fleet
                .add_instrument(InstrumentSettings::with_defaults(symbol, dec!(1), dec!(100)))
                .await
                .unwrap();
        }
        assert_eq!(fleet.symbols().await, vec!["ETHUSDT", "SOLUSDT"]);
        assert!(matches!(
            fleet.engine("XRPUSDT").await,
            Err(HedgeError::UnknownInstrument(_))
        ));

        let snapshots = fleet.snapshot().await;
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots
            .iter()
            .all(|s| s.status == InstrumentStatus::Configured));

        fleet.remove_instrument("ethusdt").await.unwrap();
        assert_eq!(fleet.symbols().await, vec!["SOLUSDT"]);
        assert!(fleet.remove_instrument("ETHUSDT").await.is_err());
    }

    #[tokio::test]
    async fn test_stop_all_skips_idle_instruments() {
        let fleet = fleet();
        fleet
            .add_instrument(InstrumentSettings::with_defaults("BTCUSDT", dec!(0.01), dec!(25000)))
            .await
            .unwrap();
        assert!(fleet.stop_all().await.is_empty());
    }
}
