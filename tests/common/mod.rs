//! Scripted in-memory exchange for driving engines in tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hedgebot::domain::{InstrumentSettings, OrderStatus, PositionSide};
use hedgebot::error::{HedgeError, Result};
use hedgebot::exchange::{
    ConditionalOrderRequest, ExchangeClient, ExchangeOrder, LimitOrderRequest, PositionRecord,
    SymbolFilters, SymbolTradingStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub enum Placed {
    Conditional(ConditionalOrderRequest),
    Limit(LimitOrderRequest),
}

impl Placed {
    pub fn conditional(&self) -> &ConditionalOrderRequest {
        match self {
            Placed::Conditional(req) => req,
            Placed::Limit(req) => panic!("expected a conditional order, got {:?}", req),
        }
    }

    pub fn limit(&self) -> &LimitOrderRequest {
        match self {
            Placed::Limit(req) => req,
            Placed::Conditional(req) => panic!("expected a limit order, got {:?}", req),
        }
    }
}

#[derive(Default)]
struct State {
    next_id: usize,
    placed: Vec<(String, Placed)>,
    open: Vec<ExchangeOrder>,
    history: HashMap<String, ExchangeOrder>,
    info_calls: HashMap<String, usize>,
    cancelled: Vec<String>,
    cancel_all_calls: usize,
    close_calls: HashMap<PositionSide, usize>,
    fail_placement_at: Option<usize>,
    fail_cancel_all: bool,
    fail_reads: bool,
}

/// Every placed order rests in the open list until a test fills or cancels it
pub struct FakeExchange {
    pub filters: SymbolFilters,
    pub tradable: bool,
    pub hedge_mode_ok: bool,
    state: Mutex<State>,
}

impl FakeExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_filters(SymbolFilters {
            qty_step: dec!(0.001),
            min_qty: dec!(0.001),
            max_qty: dec!(100),
            tick_size: dec!(0.1),
        }))
    }

    pub fn with_filters(filters: SymbolFilters) -> Self {
        Self {
            filters,
            tradable: true,
            hedge_mode_ok: true,
            state: Mutex::new(State::default()),
        }
    }

    /// The n-th placement (1-based) is rejected by the venue
    pub fn fail_placement_at(&self, n: usize) {
        self.state.lock().unwrap().fail_placement_at = Some(n);
    }

    pub fn fail_cancel_all(&self, fail: bool) {
        self.state.lock().unwrap().fail_cancel_all = fail;
    }

    /// Open-order and order-info lookups time out while set
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    pub fn placed(&self) -> Vec<(String, Placed)> {
        self.state.lock().unwrap().placed.clone()
    }

    pub fn placed_count(&self) -> usize {
        self.state.lock().unwrap().placed.len()
    }

    pub fn open_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .open
            .iter()
            .map(|o| o.order_id.clone())
            .collect()
    }

    /// Fill an order: it leaves the open list and is only visible by lookup
    pub fn fill(&self, order_id: &str, qty: Decimal, price: Decimal) {
        let mut state = self.state.lock().unwrap();
        let idx = state
            .open
            .iter()
            .position(|o| o.order_id == order_id)
            .unwrap_or_else(|| panic!("order {} is not open", order_id));
        let mut order = state.open.remove(idx);
        order.status = OrderStatus::Filled;
        order.cum_exec_qty = Some(qty);
        order.avg_price = Some(price);
        state.history.insert(order_id.to_string(), order);
    }

    /// Change the status of an order that stays in the open list
    pub fn set_open_status(&self, order_id: &str, status: OrderStatus) {
        let mut state = self.state.lock().unwrap();
        let order = state
            .open
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .unwrap_or_else(|| panic!("order {} is not open", order_id));
        order.status = status;
    }

    pub fn info_calls(&self, order_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .info_calls
            .get(order_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn cancel_all_calls(&self) -> usize {
        self.state.lock().unwrap().cancel_all_calls
    }

    pub fn close_calls(&self, side: PositionSide) -> usize {
        self.state
            .lock()
            .unwrap()
            .close_calls
            .get(&side)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, placed: Placed, qty: Decimal) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let attempt = state.placed.len() + 1;
        if state.fail_placement_at == Some(attempt) {
            return Err(HedgeError::Exchange {
                code: 10001,
                message: "order rejected".to_string(),
            });
        }
        state.next_id += 1;
        let order_id = format!("ord-{}", state.next_id);
        let mut order = ExchangeOrder::new(order_id.clone(), OrderStatus::New);
        order.qty = Some(qty);
        state.open.push(order);
        state.placed.push((order_id.clone(), placed));
        Ok(order_id)
    }

    fn cancel_open(state: &mut State, idx: usize) {
        let mut order = state.open.remove(idx);
        order.status = OrderStatus::Cancelled;
        state.cancelled.push(order.order_id.clone());
        state.history.insert(order.order_id.clone(), order);
    }
}

#[async_trait]
impl ExchangeClient for FakeExchange {
    async fn ensure_symbol_trading(&self, _symbol: &str) -> Result<SymbolTradingStatus> {
        Ok(SymbolTradingStatus {
            tradable: self.tradable,
            status: if self.tradable { "Trading" } else { "Settling" }.to_string(),
        })
    }

    async fn ensure_hedge_mode(&self, symbol: &str) -> Result<()> {
        if self.hedge_mode_ok {
            Ok(())
        } else {
            Err(HedgeError::HedgeModeRejected {
                symbol: symbol.to_string(),
                reason: "open positions in one-way mode".to_string(),
            })
        }
    }

    async fn get_symbol_filters(&self, _symbol: &str) -> Result<SymbolFilters> {
        Ok(self.filters)
    }

    async fn place_conditional_market_order(
        &self,
        request: &ConditionalOrderRequest,
    ) -> Result<String> {
        self.record(Placed::Conditional(request.clone()), request.qty)
    }

    async fn place_limit_order(&self, request: &LimitOrderRequest) -> Result<String> {
        self.record(Placed::Limit(request.clone()), request.qty)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(idx) = state.open.iter().position(|o| o.order_id == order_id) {
            Self::cancel_open(&mut state, idx);
        }
        Ok(())
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.cancel_all_calls += 1;
        if state.fail_cancel_all {
            return Err(HedgeError::Exchange {
                code: 10016,
                message: "service unavailable".to_string(),
            });
        }
        while !state.open.is_empty() {
            Self::cancel_open(&mut state, 0);
        }
        Ok(())
    }

    async fn close_position_market(
        &self,
        _symbol: &str,
        position_side: PositionSide,
    ) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        *state.close_calls.entry(position_side).or_insert(0) += 1;
        Ok(Some(format!("close-{}", position_side)))
    }

    async fn get_open_orders(&self, _symbol: &str) -> Result<Vec<ExchangeOrder>> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(read_timeout());
        }
        Ok(state.open.clone())
    }

    async fn get_order_info(&self, _symbol: &str, order_id: &str) -> Result<Option<ExchangeOrder>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(read_timeout());
        }
        *state.info_calls.entry(order_id.to_string()).or_insert(0) += 1;
        if let Some(order) = state.open.iter().find(|o| o.order_id == order_id) {
            return Ok(Some(order.clone()));
        }
        Ok(state.history.get(order_id).cloned())
    }

    async fn get_position_side(
        &self,
        symbol: &str,
        position_side: PositionSide,
    ) -> Result<Option<PositionRecord>> {
        Ok(Some(PositionRecord {
            symbol: symbol.to_string(),
            position_side,
            size: dec!(0.01),
            avg_price: dec!(25000),
            unrealised_pnl: None,
        }))
    }
}

fn read_timeout() -> HedgeError {
    HedgeError::Exchange {
        code: 10002,
        message: "request timed out".to_string(),
    }
}

pub fn btc_settings() -> InstrumentSettings {
    InstrumentSettings::with_defaults("BTCUSDT", dec!(0.01), dec!(25000))
}
