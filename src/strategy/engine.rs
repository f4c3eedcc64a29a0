//! Per-instrument hedge engine.
//!
//! One [`InstrumentEngine`] owns the settings, order registry and leg
//! bookkeeping of a single symbol. Public operations and the background
//! reconciliation loop all go through the same `EngineCore` mutex, so the
//! registry only ever has one writer at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::events::{EventSender, LogLevel};
use super::ladder::{self, LegEntry, OrderPlan, PlannedOrder};
use super::quantize::Quantizer;
use super::registry::OrderRegistry;
use crate::domain::{
    InstrumentSettings, InstrumentStatus, ManagedOrder, OrderKind, OrderStatus, PositionSide,
};
use crate::error::{HedgeError, Result};
use crate::exchange::{ExchangeClient, ExchangeOrder, PositionRecord};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Point-in-time view of an engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub symbol: String,
    pub status: InstrumentStatus,
    pub detail: Option<String>,
    pub long: Option<LegEntry>,
    pub short: Option<LegEntry>,
    pub protection_deployed: bool,
    pub finalized: bool,
    pub order_count: usize,
    pub pending_order_count: usize,
}

struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    async fn halt(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!("reconciliation task panicked: {}", e);
            }
        }
    }
}

#[derive(Default)]
struct TeardownOutcome {
    failed: Vec<&'static str>,
    first_error: Option<HedgeError>,
}

impl TeardownOutcome {
    fn record(&mut self, step: &'static str, err: HedgeError) {
        self.failed.push(step);
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

struct EngineCore {
    symbol: String,
    settings: InstrumentSettings,
    status: InstrumentStatus,
    detail: Option<String>,
    registry: OrderRegistry,
    quantizer: Option<Quantizer>,
    legs: HashMap<PositionSide, LegEntry>,
    protection_deployed: bool,
    finalized: bool,
    exchange: Arc<dyn ExchangeClient>,
    events: EventSender,
}

impl EngineCore {
    fn set_status(&mut self, status: InstrumentStatus, detail: impl Into<String>) {
        let detail = detail.into();
        self.status = status;
        self.detail = Some(detail.clone());
        self.events.status(&self.symbol, status, Some(detail));
    }

    fn emit_orders(&self) {
        self.events.orders(&self.symbol, self.registry.snapshot());
    }

    fn quantizer(&self) -> Result<Quantizer> {
        self.quantizer
            .ok_or_else(|| HedgeError::InvalidState("symbol filters are not loaded".to_string()))
    }

    fn reset(&mut self, quantizer: Quantizer) {
        self.registry.clear();
        self.legs.clear();
        self.quantizer = Some(quantizer);
        self.protection_deployed = false;
        self.finalized = false;
    }

    /// Leg bookkeeping, falling back to the configured entry when the fill
    /// was never observed
    fn leg(&self, position_side: PositionSide) -> LegEntry {
        self.legs.get(&position_side).copied().unwrap_or(LegEntry {
            position_side,
            entry_price: self.settings.entry_trigger_price,
            base_size: self.settings.base_quantity,
        })
    }

    async fn place(&mut self, planned: &PlannedOrder) -> Result<String> {
        let qty = planned.quantity();
        let (order_id, describe) = match &planned.plan {
            OrderPlan::Limit(req) => (
                self.exchange.place_limit_order(req).await?,
                format!("{} {} @ {}", req.side, qty, req.price),
            ),
            OrderPlan::Conditional(req) => (
                self.exchange.place_conditional_market_order(req).await?,
                format!("{} {} trigger {}", req.side, qty, req.trigger_price),
            ),
        };

        let label = match planned.level {
            Some(level) => format!("{} #{}", planned.kind, level),
            None => planned.kind.to_string(),
        };
        self.registry.insert(planned.to_managed(&order_id));
        self.events.info(
            &self.symbol,
            format!(
                "{} {} placed: {} ({})",
                label,
                planned.position_side(),
                describe,
                order_id
            ),
        );
        self.emit_orders();
        Ok(order_id)
    }

    async fn reconcile(&mut self) -> Result<()> {
        let open = self.exchange.get_open_orders(&self.symbol).await?;
        let open: HashMap<&str, &ExchangeOrder> =
            open.iter().map(|o| (o.order_id.as_str(), o)).collect();

        for order_id in self.registry.pending_ids() {
            if !self.status.is_running() {
                break;
            }
            let report = match open.get(order_id.as_str()) {
                Some(order) => Some((*order).clone()),
                None => {
                    self.exchange
                        .get_order_info(&self.symbol, &order_id)
                        .await?
                }
            };
            if let Some(report) = report {
                self.apply_report(&order_id, report).await?;
            }
        }

        self.emit_orders();
        Ok(())
    }

    async fn apply_report(&mut self, order_id: &str, report: ExchangeOrder) -> Result<()> {
        let Some(order) = self.registry.get_mut(order_id) else {
            return Ok(());
        };
        if report.status == order.status {
            return Ok(());
        }
        if report.status == OrderStatus::Unknown {
            let message = format!(
                "order {} reported an unrecognized status, keeping {}",
                order_id, order.status
            );
            self.events.warn(&self.symbol, message);
            return Ok(());
        }

        order.mark_status(report.status);
        if let Some(price) = report.price.filter(|p| *p > Decimal::ZERO) {
            order.price = Some(price);
        }
        if let Some(trigger) = report.trigger_price.filter(|p| *p > Decimal::ZERO) {
            order.trigger_price = Some(trigger);
        }
        let order = order.clone();

        match report.status {
            OrderStatus::Filled => self.on_filled(order, &report).await?,
            OrderStatus::Cancelled | OrderStatus::Rejected => self.events.warn(
                &self.symbol,
                format!("order {} ({}) {}", order.order_id, order.kind, report.status),
            ),
            OrderStatus::PartiallyFilled => self.events.info(
                &self.symbol,
                format!(
                    "order {} ({}) partially filled: {}",
                    order.order_id,
                    order.kind,
                    report.cum_exec_qty.unwrap_or_default()
                ),
            ),
            OrderStatus::New | OrderStatus::Unknown => self.events.log(
                &self.symbol,
                LogLevel::Debug,
                format!("order {} accepted by the exchange", order.order_id),
            ),
        }
        Ok(())
    }

    async fn on_filled(&mut self, order: ManagedOrder, report: &ExchangeOrder) -> Result<()> {
        let qty = report.filled_qty().unwrap_or(order.quantity);
        let price = report.fill_price().or(order.price);
        let side = order.position_side;
        self.events.info(
            &self.symbol,
            format!(
                "order {} ({} {}) filled for {}",
                order.order_id, order.kind, side, qty
            ),
        );

        match order.kind {
            OrderKind::Entry => {
                let entry_price = price.unwrap_or(self.settings.entry_trigger_price);
                self.legs.insert(
                    side,
                    LegEntry {
                        position_side: side,
                        entry_price,
                        base_size: qty,
                    },
                );
                let both = PositionSide::BOTH
                    .iter()
                    .all(|s| self.legs.contains_key(s));
                if both && !self.protection_deployed {
                    self.deploy_protection().await?;
                }
            }
            OrderKind::TakeProfit => {
                if order.level == Some(1) {
                    let quantizer = self.quantizer()?;
                    let leg = self.leg(side);
                    if let Some(refill) =
                        ladder::take_profit_refill(&self.settings, &leg, qty, &quantizer)?
                    {
                        self.place(&refill).await?;
                    }
                }
            }
            OrderKind::FinalTakeProfit => {
                self.finalize(format!("final take-profit reached on {}", side))
                    .await?;
            }
            OrderKind::StopLoss => {
                let quantizer = self.quantizer()?;
                let refill = ladder::stop_loss_refill(&self.settings, side, qty, &quantizer)?;
                self.place(&refill).await?;
            }
            OrderKind::Refill => {
                self.events
                    .info(&self.symbol, format!("refill on {} completed for {}", side, qty));
            }
        }
        Ok(())
    }

    async fn deploy_protection(&mut self) -> Result<()> {
        if self.protection_deployed {
            return Ok(());
        }
        self.protection_deployed = true;
        let quantizer = self.quantizer()?;

        for side in PositionSide::BOTH {
            let leg = self.leg(side);
            for planned in ladder::protection_orders(&self.settings, &leg, &quantizer)? {
                self.place(&planned).await?;
            }
        }

        self.set_status(
            InstrumentStatus::Active,
            "both legs open, protection orders placed",
        );
        Ok(())
    }

    async fn finalize(&mut self, reason: String) -> Result<()> {
        if self.finalized {
            debug!(symbol = %self.symbol, "finalize already done");
            return Ok(());
        }
        self.finalized = true;
        let outcome = self.teardown(true).await;
        self.finish_teardown(outcome, InstrumentStatus::Completed, reason)
    }

    /// Cancel everything, then optionally market-close both legs.
    ///
    /// Every step runs even when an earlier one failed.
    async fn teardown(&mut self, close_positions: bool) -> TeardownOutcome {
        let mut outcome = TeardownOutcome::default();

        if let Err(e) = self.exchange.cancel_all_orders(&self.symbol).await {
            self.events
                .error(&self.symbol, format!("cancel all orders failed: {}", e));
            outcome.record("cancel all orders", e);
        }

        if close_positions {
            for side in PositionSide::BOTH {
                let step = match side {
                    PositionSide::Long => "close long",
                    PositionSide::Short => "close short",
                };
                match self.exchange.close_position_market(&self.symbol, side).await {
                    Ok(Some(order_id)) => self
                        .events
                        .info(&self.symbol, format!("{} leg closed at market ({})", side, order_id)),
                    Ok(None) => self
                        .events
                        .info(&self.symbol, format!("no {} position to close", side)),
                    Err(e) => {
                        self.events
                            .error(&self.symbol, format!("{} failed: {}", step, e));
                        outcome.record(step, e);
                    }
                }
            }
        }

        self.emit_orders();
        outcome
    }

    fn finish_teardown(
        &mut self,
        outcome: TeardownOutcome,
        status: InstrumentStatus,
        detail: String,
    ) -> Result<()> {
        match outcome.first_error {
            None => {
                self.set_status(status, detail);
                Ok(())
            }
            Some(err) => {
                self.set_status(
                    InstrumentStatus::Error,
                    format!(
                        "teardown incomplete ({} failed), manual check required",
                        outcome.failed.join(", ")
                    ),
                );
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: &HedgeError) {
        self.events
            .error(&self.symbol, format!("reconciliation failed: {}", err));
        self.set_status(InstrumentStatus::Error, err.to_string());
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            symbol: self.symbol.clone(),
            status: self.status,
            detail: self.detail.clone(),
            long: self.legs.get(&PositionSide::Long).copied(),
            short: self.legs.get(&PositionSide::Short).copied(),
            protection_deployed: self.protection_deployed,
            finalized: self.finalized,
            order_count: self.registry.len(),
            pending_order_count: self.registry.pending_ids().len(),
        }
    }
}

async fn run_loop(
    core: Arc<Mutex<EngineCore>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if *shutdown.borrow() {
            break;
        }

        let mut core = core.lock().await;
        if !core.status.is_running() {
            break;
        }
        if let Err(e) = core.reconcile().await {
            if core.status != InstrumentStatus::Error {
                core.fail(&e);
            }
            break;
        }
        if !core.status.is_running() {
            break;
        }
    }
}

/// Hedged long/short engine for one symbol
pub struct InstrumentEngine {
    symbol: String,
    exchange: Arc<dyn ExchangeClient>,
    events: EventSender,
    poll_interval: Duration,
    core: Arc<Mutex<EngineCore>>,
    runner: Mutex<Option<LoopHandle>>,
}

impl InstrumentEngine {
    pub fn new(
        settings: InstrumentSettings,
        exchange: Arc<dyn ExchangeClient>,
        events: EventSender,
        poll_interval: Duration,
    ) -> Self {
        let settings = settings.normalized();
        let symbol = settings.symbol.clone();
        let core = EngineCore {
            symbol: symbol.clone(),
            settings,
            status: InstrumentStatus::Configured,
            detail: None,
            registry: OrderRegistry::new(),
            quantizer: None,
            legs: HashMap::new(),
            protection_deployed: false,
            finalized: false,
            exchange: Arc::clone(&exchange),
            events: events.clone(),
        };

        Self {
            symbol,
            exchange,
            events,
            poll_interval,
            core: Arc::new(Mutex::new(core)),
            runner: Mutex::new(None),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub async fn status(&self) -> InstrumentStatus {
        self.core.lock().await.status
    }

    pub async fn settings(&self) -> InstrumentSettings {
        self.core.lock().await.settings.clone()
    }

    /// Every order placed since the last start, in placement order
    pub async fn orders(&self) -> Vec<ManagedOrder> {
        self.core.lock().await.registry.snapshot()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.core.lock().await.snapshot()
    }

    /// Live positions of both legs as reported by the exchange
    pub async fn positions(&self) -> Result<Vec<PositionRecord>> {
        let mut positions = Vec::with_capacity(2);
        for side in PositionSide::BOTH {
            if let Some(position) = self.exchange.get_position_side(&self.symbol, side).await? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    fn report<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.events
                .error(&self.symbol, format!("{} failed: {}", operation, e));
        }
        result
    }

    /// Replace the settings; only allowed while the engine is not running
    pub async fn update_settings(&self, settings: InstrumentSettings) -> Result<()> {
        let result = self.update_settings_inner(settings).await;
        self.report("update settings", result)
    }

    async fn update_settings_inner(&self, settings: InstrumentSettings) -> Result<()> {
        let settings = settings.normalized();
        let mut core = self.core.lock().await;
        if !core.status.accepts_settings() {
            return Err(HedgeError::SettingsLocked {
                symbol: self.symbol.clone(),
                status: core.status.to_string(),
            });
        }
        if settings.symbol != self.symbol {
            return Err(HedgeError::Validation(format!(
                "symbol cannot change from {} to {}",
                self.symbol, settings.symbol
            )));
        }
        settings.validate()?;

        core.settings = settings;
        core.set_status(InstrumentStatus::Configured, "settings updated");
        Ok(())
    }

    /// Check preconditions, place both conditional entries and start polling
    pub async fn start(&self) -> Result<()> {
        let result = self.start_inner().await;
        self.report("start", result)
    }

    async fn start_inner(&self) -> Result<()> {
        let mut runner = self.runner.lock().await;
        if self.core.lock().await.status.is_running() {
            return Err(HedgeError::AlreadyRunning {
                symbol: self.symbol.clone(),
            });
        }
        if let Some(stale) = runner.take() {
            stale.halt().await;
        }

        let mut core = self.core.lock().await;
        core.settings.validate()?;

        let symbol = self.symbol.as_str();
        let trading = self.exchange.ensure_symbol_trading(symbol).await?;
        if !trading.tradable {
            return Err(HedgeError::SymbolNotTradable {
                symbol: symbol.to_string(),
                status: trading.status,
            });
        }
        self.exchange.ensure_hedge_mode(symbol).await?;
        let quantizer = Quantizer::new(self.exchange.get_symbol_filters(symbol).await?);
        let entries = ladder::entry_orders(&core.settings, &quantizer)?;

        core.reset(quantizer);
        core.set_status(
            InstrumentStatus::WaitingEntry,
            "placing conditional entry orders",
        );
        for entry in &entries {
            if let Err(err) = core.place(entry).await {
                if !core.registry.is_empty() {
                    if let Err(cancel_err) = self.exchange.cancel_all_orders(symbol).await {
                        self.events.error(
                            symbol,
                            format!("cleanup after failed entry failed: {}", cancel_err),
                        );
                    }
                }
                core.set_status(
                    InstrumentStatus::Error,
                    format!("entry placement failed: {}", err),
                );
                return Err(err);
            }
        }

        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(Arc::clone(&self.core), self.poll_interval, rx));
        *runner = Some(LoopHandle { shutdown, task });
        Ok(())
    }

    /// Halt polling and cancel open orders; positions stay open
    pub async fn stop(&self) -> Result<()> {
        let result = self.stop_inner().await;
        self.report("stop", result)
    }

    async fn stop_inner(&self) -> Result<()> {
        let mut runner = self.runner.lock().await;
        if let Some(handle) = runner.take() {
            handle.halt().await;
        }

        let mut core = self.core.lock().await;
        if !core.status.can_stop() {
            return Err(HedgeError::InvalidState(format!(
                "{} cannot be stopped while {}",
                self.symbol, core.status
            )));
        }
        let outcome = core.teardown(false).await;
        core.finish_teardown(
            outcome,
            InstrumentStatus::Stopped,
            "stopped by operator".to_string(),
        )
    }

    /// Halt polling, cancel open orders and market-close both legs
    pub async fn close_all(&self) -> Result<()> {
        let result = self.close_all_inner().await;
        self.report("close all", result)
    }

    async fn close_all_inner(&self) -> Result<()> {
        let mut runner = self.runner.lock().await;
        if let Some(handle) = runner.take() {
            handle.halt().await;
        }

        let mut core = self.core.lock().await;
        if !core.status.can_close() {
            return Err(HedgeError::InvalidState(format!(
                "{} has nothing to close while {}",
                self.symbol, core.status
            )));
        }
        core.finalized = true;
        let outcome = core.teardown(true).await;
        core.finish_teardown(
            outcome,
            InstrumentStatus::Completed,
            "positions closed manually".to_string(),
        )
    }

    /// Cancel one tracked order; the loop picks up the cancellation
    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let result = self.cancel_order_inner(order_id).await;
        self.report("cancel order", result)
    }

    async fn cancel_order_inner(&self, order_id: &str) -> Result<()> {
        let core = self.core.lock().await;
        if !core.registry.contains(order_id) {
            return Err(HedgeError::UnknownOrder(order_id.to_string()));
        }
        self.exchange.cancel_order(&self.symbol, order_id).await?;
        self.events
            .info(&self.symbol, format!("cancel requested for order {}", order_id));
        Ok(())
    }

    /// Run one reconciliation pass now
    pub async fn reconcile_once(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        if !core.status.is_running() {
            return Err(HedgeError::InvalidState(format!(
                "{} is not running ({})",
                self.symbol, core.status
            )));
        }
        let result = core.reconcile().await;
        if let Err(e) = &result {
            if core.status != InstrumentStatus::Error {
                core.fail(e);
            }
        }
        result
    }

    /// Has the background loop exited (or never started)?
    pub async fn is_loop_finished(&self) -> bool {
        match self.runner.lock().await.as_ref() {
            Some(handle) => handle.task.is_finished(),
            None => true,
        }
    }
}
