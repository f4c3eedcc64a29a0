//! Bybit V5 REST adapter for linear (USDT) perpetuals in hedge mode.
//!
//! All calls of one client go through a single async mutex so that order
//! placement and the read-back that follows never interleave with another
//! engine's requests under the same API key.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ExchangeConfig;
use crate::domain::{OrderStatus, PositionSide};
use crate::error::{HedgeError, Result};
use crate::exchange::{
    ConditionalOrderRequest, ExchangeClient, ExchangeOrder, LimitOrderRequest, PositionRecord,
    SymbolFilters, SymbolTradingStatus,
};

pub const MAINNET_REST_URL: &str = "https://api.bybit.com";
pub const TESTNET_REST_URL: &str = "https://api-testnet.bybit.com";

const CATEGORY: &str = "linear";
/// Order does not exist or is already finished
const RET_ORDER_NOT_EXISTS: i64 = 110001;
/// Position mode is already the requested one
const RET_MODE_NOT_MODIFIED: i64 = 110025;
const HEDGE_MODE: i64 = 3;
/// Page size for open-order lookups
const OPEN_ORDERS_LIMIT: u32 = 50;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

impl Envelope {
    fn into_result(self, tolerated: &[i64]) -> Result<Value> {
        if self.ret_code == 0 || tolerated.contains(&self.ret_code) {
            Ok(self.result)
        } else {
            Err(HedgeError::Exchange {
                code: self.ret_code,
                message: self.ret_msg,
            })
        }
    }
}

pub struct BybitClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    lock: Mutex<()>,
}

impl BybitClient {
    pub fn new(config: &ExchangeConfig, api_key: String, api_secret: String) -> Result<Self> {
        let base_url = config
            .rest_url
            .clone()
            .unwrap_or_else(|| {
                if config.testnet {
                    TESTNET_REST_URL.to_string()
                } else {
                    MAINNET_REST_URL.to_string()
                }
            })
            .trim_end_matches('/')
            .to_string();

        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent("hedgebot/0.1")
            .build()
            .map_err(|e| HedgeError::Internal(format!("failed to build Bybit HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
            recv_window_ms: config.recv_window_ms,
            lock: Mutex::new(()),
        })
    }

    /// Build a client from `BYBIT_API_KEY` / `BYBIT_API_SECRET`.
    ///
    /// `BYBIT_TESTNET`, when set, overrides the configured network.
    pub fn from_env(config: &ExchangeConfig) -> Result<Self> {
        let api_key = non_empty_env("BYBIT_API_KEY")
            .ok_or_else(|| HedgeError::Auth("BYBIT_API_KEY is required".to_string()))?;
        let api_secret = non_empty_env("BYBIT_API_SECRET")
            .ok_or_else(|| HedgeError::Auth("BYBIT_API_SECRET is required".to_string()))?;

        let mut config = config.clone();
        if let Some(flag) = non_empty_env("BYBIT_TESTNET") {
            config.testnet = parse_flag(&flag);
        }

        Self::new(&config, api_key, api_secret)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_headers(&self, payload: &str) -> Result<HeaderMap> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let recv_window = self.recv_window_ms.to_string();
        let signature = sign(
            &self.api_secret,
            &timestamp,
            &self.api_key,
            &recv_window,
            payload,
        )?;

        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("x-bapi-api-key", self.api_key.as_str()),
            ("x-bapi-sign", signature.as_str()),
            ("x-bapi-timestamp", timestamp.as_str()),
            ("x-bapi-recv-window", recv_window.as_str()),
            ("x-bapi-sign-type", "2"),
        ] {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value)
                    .map_err(|e| HedgeError::Auth(format!("invalid {} header: {}", name, e)))?,
            );
        }
        Ok(headers)
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Envelope> {
        let query_string = encode_query(query);
        let url = if query_string.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query_string)
        };
        let body_text = body.map(|b| b.to_string()).unwrap_or_default();
        let payload = if method == Method::GET {
            query_string.as_str()
        } else {
            body_text.as_str()
        };

        let mut req = self
            .http
            .request(method.clone(), &url)
            .headers(self.auth_headers(payload)?);
        if method != Method::GET {
            req = req
                .header(CONTENT_TYPE, "application/json")
                .body(body_text.clone());
        }

        debug!(%method, path, "bybit request");
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status.as_u16() == 429 {
            return Err(HedgeError::RateLimited(format!(
                "Bybit API rate limited for {} {}",
                method, path
            )));
        }
        if !status.is_success() {
            return Err(HedgeError::InvalidResponse(format!(
                "Bybit API {} {} failed: status={} body={}",
                method, path, status, text
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| HedgeError::InvalidResponse(format!("invalid Bybit JSON response: {}", e)))
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.request_json(Method::GET, path, query, None)
            .await?
            .into_result(&[])
    }

    async fn post(&self, path: &str, body: Value, tolerated: &[i64]) -> Result<Value> {
        self.request_json(Method::POST, path, &[], Some(body))
            .await?
            .into_result(tolerated)
    }

    async fn fetch_instrument(&self, symbol: &str) -> Result<Option<Value>> {
        let result = self
            .get("/v5/market/instruments-info", &symbol_query(symbol))
            .await?;
        Ok(result_list(&result).first().cloned())
    }

    async fn fetch_positions(&self, symbol: &str) -> Result<Vec<Value>> {
        let result = self.get("/v5/position/list", &symbol_query(symbol)).await?;
        Ok(result_list(&result).to_vec())
    }

    async fn hedge_mode_enabled(&self, symbol: &str) -> Result<bool> {
        Ok(is_hedge_mode(&self.fetch_positions(symbol).await?))
    }

    async fn submit_order(&self, body: Value) -> Result<String> {
        let result = self.post("/v5/order/create", body, &[]).await?;
        pick_str(&result, &["orderId"])
            .map(ToString::to_string)
            .ok_or_else(|| HedgeError::InvalidResponse("order/create returned no orderId".into()))
    }

    async fn find_order(
        &self,
        path: &str,
        symbol: &str,
        order_id: &str,
    ) -> Result<Option<ExchangeOrder>> {
        let mut query = symbol_query(symbol);
        query.push(("orderId", order_id.to_string()));
        let result = self.get(path, &query).await?;
        Ok(result_list(&result)
            .iter()
            .filter(|o| pick_str(o, &["orderId"]) == Some(order_id))
            .find_map(parse_order))
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn ensure_symbol_trading(&self, symbol: &str) -> Result<SymbolTradingStatus> {
        let _guard = self.lock.lock().await;
        Ok(trading_status(self.fetch_instrument(symbol).await?.as_ref()))
    }

    async fn ensure_hedge_mode(&self, symbol: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.hedge_mode_enabled(symbol).await? {
            return Ok(());
        }

        let body = json!({
            "category": CATEGORY,
            "symbol": symbol,
            "mode": HEDGE_MODE,
        });
        self.post("/v5/position/switch-mode", body, &[RET_MODE_NOT_MODIFIED])
            .await
            .map_err(|e| HedgeError::HedgeModeRejected {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;

        if self.hedge_mode_enabled(symbol).await? {
            Ok(())
        } else {
            Err(HedgeError::HedgeModeRejected {
                symbol: symbol.to_string(),
                reason: "both position indices still missing after switch".to_string(),
            })
        }
    }

    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters> {
        let _guard = self.lock.lock().await;
        let instrument = self
            .fetch_instrument(symbol)
            .await?
            .ok_or_else(|| HedgeError::InvalidResponse(format!("symbol {} not found", symbol)))?;
        Ok(parse_filters(&instrument))
    }

    async fn place_conditional_market_order(
        &self,
        request: &ConditionalOrderRequest,
    ) -> Result<String> {
        let _guard = self.lock.lock().await;
        self.submit_order(conditional_order_body(request, &order_link_id("cond")))
            .await
    }

    async fn place_limit_order(&self, request: &LimitOrderRequest) -> Result<String> {
        let _guard = self.lock.lock().await;
        self.submit_order(limit_order_body(request, &order_link_id("limit")))
            .await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let body = json!({
            "category": CATEGORY,
            "symbol": symbol,
            "orderId": order_id,
        });
        self.post("/v5/order/cancel", body, &[RET_ORDER_NOT_EXISTS])
            .await
            .map(|_| ())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let body = json!({
            "category": CATEGORY,
            "symbol": symbol,
        });
        self.post("/v5/order/cancel-all", body, &[RET_ORDER_NOT_EXISTS])
            .await
            .map(|_| ())
    }

    async fn close_position_market(
        &self,
        symbol: &str,
        position_side: PositionSide,
    ) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let positions = self.fetch_positions(symbol).await?;
        let Some(position) = positions
            .iter()
            .filter_map(|p| parse_position(p, symbol))
            .find(|p| p.position_side == position_side)
        else {
            return Ok(None);
        };

        let body = json!({
            "category": CATEGORY,
            "symbol": symbol,
            "side": position_side.closing_side().as_str(),
            "orderType": "Market",
            "qty": format_decimal(position.size),
            "timeInForce": "IOC",
            "reduceOnly": true,
            "positionIdx": position_side.position_idx(),
            "orderLinkId": order_link_id("close"),
        });
        self.submit_order(body).await.map(Some)
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>> {
        let _guard = self.lock.lock().await;
        let result = self.get("/v5/order/realtime", &open_orders_query(symbol)).await?;
        Ok(result_list(&result).iter().filter_map(parse_order).collect())
    }

    async fn get_order_info(&self, symbol: &str, order_id: &str) -> Result<Option<ExchangeOrder>> {
        let _guard = self.lock.lock().await;
        if let Some(order) = self.find_order("/v5/order/realtime", symbol, order_id).await? {
            return Ok(Some(order));
        }
        self.find_order("/v5/order/history", symbol, order_id).await
    }

    async fn get_position_side(
        &self,
        symbol: &str,
        position_side: PositionSide,
    ) -> Result<Option<PositionRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .fetch_positions(symbol)
            .await?
            .iter()
            .filter_map(|p| parse_position(p, symbol))
            .find(|p| p.position_side == position_side))
    }
}

/// Hex HMAC-SHA256 over `timestamp + api_key + recv_window + payload`
pub fn sign(
    secret: &str,
    timestamp: &str,
    api_key: &str,
    recv_window: &str,
    payload: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| HedgeError::Auth(format!("invalid Bybit secret: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(api_key.as_bytes());
    mac.update(recv_window.as_bytes());
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn symbol_query(symbol: &str) -> Vec<(&'static str, String)> {
    vec![("category", CATEGORY.to_string()), ("symbol", symbol.to_string())]
}

fn open_orders_query(symbol: &str) -> Vec<(&'static str, String)> {
    let mut query = symbol_query(symbol);
    query.push(("limit", OPEN_ORDERS_LIMIT.to_string()));
    query
}

fn order_link_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..12])
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

fn conditional_order_body(request: &ConditionalOrderRequest, link_id: &str) -> Value {
    json!({
        "category": CATEGORY,
        "symbol": request.symbol,
        "side": request.side.as_str(),
        "orderType": "Market",
        "qty": format_decimal(request.qty),
        "triggerPrice": format_decimal(request.trigger_price),
        "triggerDirection": request.trigger_direction.code(),
        "triggerBy": request.trigger_by.as_str(),
        "timeInForce": "IOC",
        "reduceOnly": request.reduce_only,
        "closeOnTrigger": request.close_on_trigger,
        "positionIdx": request.position_side.position_idx(),
        "orderLinkId": link_id,
    })
}

fn limit_order_body(request: &LimitOrderRequest, link_id: &str) -> Value {
    json!({
        "category": CATEGORY,
        "symbol": request.symbol,
        "side": request.side.as_str(),
        "orderType": "Limit",
        "qty": format_decimal(request.qty),
        "price": format_decimal(request.price),
        "timeInForce": "GTC",
        "reduceOnly": request.reduce_only,
        "positionIdx": request.position_side.position_idx(),
        "orderLinkId": link_id,
    })
}

fn result_list(result: &Value) -> &[Value] {
    result
        .get("list")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn pick_obj<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| root.get(*key))
}

fn pick_str<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| {
        root.get(*key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    })
}

fn pick_decimal(root: &Value, keys: &[&str]) -> Option<Decimal> {
    pick_obj(root, keys).and_then(parse_decimalish)
}

fn parse_decimalish(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Decimal::from_str_exact(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str_exact(&n.to_string()).ok(),
        _ => None,
    }
}

fn trading_status(instrument: Option<&Value>) -> SymbolTradingStatus {
    match instrument {
        None => SymbolTradingStatus {
            tradable: false,
            status: "NotFound".to_string(),
        },
        Some(inst) => {
            let status = pick_str(inst, &["status"]).unwrap_or("Unknown").to_string();
            SymbolTradingStatus {
                tradable: status == "Trading",
                status,
            }
        }
    }
}

fn parse_filters(instrument: &Value) -> SymbolFilters {
    let lot = instrument.get("lotSizeFilter").unwrap_or(&Value::Null);
    let price = instrument.get("priceFilter").unwrap_or(&Value::Null);
    SymbolFilters {
        qty_step: pick_decimal(lot, &["qtyStep"]).unwrap_or_default(),
        min_qty: pick_decimal(lot, &["minOrderQty"]).unwrap_or_default(),
        max_qty: pick_decimal(lot, &["maxOrderQty"]).unwrap_or_default(),
        tick_size: pick_decimal(price, &["tickSize"]).unwrap_or_default(),
    }
}

fn position_idx(position: &Value) -> Option<i64> {
    pick_obj(position, &["positionIdx"]).and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

/// Hedge mode is on when the venue reports both a long and a short slot
fn is_hedge_mode(positions: &[Value]) -> bool {
    let indices: Vec<i64> = positions.iter().filter_map(position_idx).collect();
    indices.contains(&1) && indices.contains(&2)
}

/// Non-empty position on a hedge slot
fn parse_position(position: &Value, symbol: &str) -> Option<PositionRecord> {
    let size = pick_decimal(position, &["size"])?;
    if size.is_zero() {
        return None;
    }
    let position_side = position_idx(position)
        .and_then(PositionSide::from_position_idx)
        .or_else(|| match pick_str(position, &["side"]) {
            Some("Buy") => Some(PositionSide::Long),
            Some("Sell") => Some(PositionSide::Short),
            _ => None,
        })?;

    Some(PositionRecord {
        symbol: pick_str(position, &["symbol"]).unwrap_or(symbol).to_string(),
        position_side,
        size: size.abs(),
        avg_price: pick_decimal(position, &["avgPrice", "entryPrice"]).unwrap_or_default(),
        unrealised_pnl: pick_decimal(position, &["unrealisedPnl"]),
    })
}

fn parse_order(order: &Value) -> Option<ExchangeOrder> {
    let order_id = pick_str(order, &["orderId"])?;
    let raw_status = pick_str(order, &["orderStatus", "stopOrderStatus", "triggerStatus"])
        .unwrap_or_default();
    let status = OrderStatus::from_exchange(raw_status);
    if status == OrderStatus::Unknown {
        warn!(order_id, raw_status, "unrecognized Bybit order status");
    }

    Some(ExchangeOrder {
        order_id: order_id.to_string(),
        status,
        qty: pick_decimal(order, &["qty"]),
        cum_exec_qty: pick_decimal(order, &["cumExecQty"]),
        avg_price: pick_decimal(order, &["avgPrice"]),
        price: pick_decimal(order, &["price"]),
        trigger_price: pick_decimal(order, &["triggerPrice"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderSide, TriggerBy, TriggerDirection};
    use rust_decimal_macros::dec;

    #[test]
    fn test_signature_matches_reference_vector() {
        let sig = sign(
            "test-secret",
            "1700000000000",
            "test-key",
            "5000",
            "category=linear&symbol=BTCUSDT",
        )
        .unwrap();
        assert_eq!(
            sig,
            "9a7c8cfd6ba1a7c498aa4dd5a7f9cfbba01fcb6eebae734ffe0d775870a1a3fb"
        );
    }

    #[test]
    fn test_query_is_encoded_in_given_order() {
        let query = vec![
            ("category", "linear".to_string()),
            ("symbol", "BTCUSDT".to_string()),
            ("cursor", "a b&c".to_string()),
        ];
        assert_eq!(
            encode_query(&query),
            "category=linear&symbol=BTCUSDT&cursor=a%20b%26c"
        );
        assert_eq!(encode_query(&[]), "");
    }

    #[test]
    fn test_open_orders_query_requests_a_full_page() {
        assert_eq!(
            encode_query(&open_orders_query("ETHUSDT")),
            "category=linear&symbol=ETHUSDT&limit=50"
        );
    }

    #[test]
    fn test_tolerated_ret_codes_pass_through() {
        let env = Envelope {
            ret_code: RET_ORDER_NOT_EXISTS,
            ret_msg: "order not exists or too late to cancel".into(),
            result: Value::Null,
        };
        assert!(env.into_result(&[RET_ORDER_NOT_EXISTS]).is_ok());

        let env = Envelope {
            ret_code: 10001,
            ret_msg: "params error".into(),
            result: Value::Null,
        };
        match env.into_result(&[RET_ORDER_NOT_EXISTS]) {
            Err(HedgeError::Exchange { code, .. }) => assert_eq!(code, 10001),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parses_instrument_status_and_filters() {
        let inst = json!({
            "symbol": "BTCUSDT",
            "status": "Trading",
            "lotSizeFilter": {"qtyStep": "0.001", "minOrderQty": "0.001", "maxOrderQty": "100"},
            "priceFilter": {"tickSize": "0.10"}
        });
        let status = trading_status(Some(&inst));
        assert!(status.tradable);
        assert_eq!(status.status, "Trading");

        let filters = parse_filters(&inst);
        assert_eq!(filters.qty_step, dec!(0.001));
        assert_eq!(filters.min_qty, dec!(0.001));
        assert_eq!(filters.max_qty, dec!(100));
        assert_eq!(filters.tick_size, dec!(0.10));

        let missing = trading_status(None);
        assert!(!missing.tradable);
        assert_eq!(missing.status, "NotFound");

        let prelaunch = json!({"status": "PreLaunch"});
        assert!(!trading_status(Some(&prelaunch)).tradable);
    }

    #[test]
    fn test_parses_order_status_with_fallback_keys() {
        let order = json!({
            "orderId": "abc",
            "orderStatus": "",
            "stopOrderStatus": "Untriggered",
            "qty": "0.01",
            "cumExecQty": "0",
            "avgPrice": "",
            "triggerPrice": "25000"
        });
        let parsed = parse_order(&order).unwrap();
        assert_eq!(parsed.status, OrderStatus::New);
        assert_eq!(parsed.qty, Some(dec!(0.01)));
        assert_eq!(parsed.avg_price, None);
        assert_eq!(parsed.trigger_price, Some(dec!(25000)));

        let filled = json!({"orderId": "x", "orderStatus": "Filled", "cumExecQty": "0.005"});
        assert_eq!(parse_order(&filled).unwrap().status, OrderStatus::Filled);

        let odd = json!({"orderId": "y", "orderStatus": "Weird"});
        assert_eq!(parse_order(&odd).unwrap().status, OrderStatus::Unknown);

        assert!(parse_order(&json!({"orderStatus": "New"})).is_none());
    }

    #[test]
    fn test_detects_hedge_mode_and_positions() {
        let positions = vec![
            json!({"symbol": "BTCUSDT", "positionIdx": 1, "side": "Buy", "size": "0.01", "avgPrice": "25000"}),
            json!({"symbol": "BTCUSDT", "positionIdx": 2, "side": "", "size": "0", "avgPrice": "0"}),
        ];
        assert!(is_hedge_mode(&positions));
        assert!(!is_hedge_mode(&positions[..1]));

        let long = parse_position(&positions[0], "BTCUSDT").unwrap();
        assert_eq!(long.position_side, PositionSide::Long);
        assert_eq!(long.size, dec!(0.01));
        assert!(parse_position(&positions[1], "BTCUSDT").is_none());

        let one_way = json!({"positionIdx": 0, "side": "Sell", "size": "2"});
        assert_eq!(
            parse_position(&one_way, "BTCUSDT").unwrap().position_side,
            PositionSide::Short
        );
    }

    #[test]
    fn test_order_bodies_carry_hedge_slot_and_flags() {
        let request = ConditionalOrderRequest {
            symbol: "BTCUSDT".into(),
            side: OrderSide::Sell,
            qty: dec!(0.010),
            trigger_price: dec!(25000.0),
            trigger_direction: TriggerDirection::Rises,
            trigger_by: TriggerBy::MarkPrice,
            position_side: PositionSide::Short,
            reduce_only: false,
            close_on_trigger: false,
        };
        let body = conditional_order_body(&request, "cond-1");
        assert_eq!(body["side"], "Sell");
        assert_eq!(body["qty"], "0.01");
        assert_eq!(body["triggerPrice"], "25000");
        assert_eq!(body["triggerDirection"], 1);
        assert_eq!(body["triggerBy"], "MarkPrice");
        assert_eq!(body["positionIdx"], 2);

        let limit = LimitOrderRequest {
            symbol: "BTCUSDT".into(),
            side: OrderSide::Sell,
            qty: dec!(0.005),
            price: dec!(25125),
            position_side: PositionSide::Long,
            reduce_only: true,
        };
        let body = limit_order_body(&limit, "limit-1");
        assert_eq!(body["orderType"], "Limit");
        assert_eq!(body["timeInForce"], "GTC");
        assert_eq!(body["reduceOnly"], true);
        assert_eq!(body["positionIdx"], 1);
    }

    #[test]
    fn test_link_ids_are_prefixed_and_unique() {
        let a = order_link_id("cond");
        let b = order_link_id("cond");
        assert!(a.starts_with("cond-"));
        assert_eq!(a.len(), "cond-".len() + 12);
        assert_ne!(a, b);
    }

    #[test]
    fn test_testnet_flag_parsing() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(!parse_flag("0"));
    }
}
