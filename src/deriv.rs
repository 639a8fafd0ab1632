// ============================================================
// deriv.rs — Deriv websocket API client
// ticks_history candles, authorize, buy + contract settlement
// ============================================================

use crate::broker::{Broker, BrokerError, TradeOutcome};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use serde_json::{json, Value};
use signal_math::{Candle, Direction};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// Extra wait on top of the contract duration before giving up on settlement.
const SETTLEMENT_GRACE: Duration = Duration::from_secs(60);

/// Opens a fresh connection per call; the API is request/response and the
/// trading loop calls it at most a few times per second.
pub struct DerivBroker {
    endpoint: Url,
    api_token: Option<String>,
    request_timeout: Duration,
}

impl DerivBroker {
    pub fn new(endpoint: Url, api_token: Option<String>, request_timeout: Duration) -> Self {
        Self {
            endpoint,
            api_token,
            request_timeout,
        }
    }

    async fn connect(&self) -> Result<DerivSession, BrokerError> {
        let (ws, _) = connect_async(self.endpoint.as_str()).await?;
        Ok(DerivSession {
            ws,
            read_timeout: self.request_timeout,
        })
    }

    /// Connects and authorizes, returning the session and the authorize payload.
    async fn authorized(&self) -> Result<(DerivSession, Value), BrokerError> {
        let token = self.api_token.as_deref().ok_or(BrokerError::MissingToken)?;
        let mut session = self.connect().await?;
        let auth = session
            .request(json!({ "authorize": token }), "authorize")
            .await?;
        Ok((session, auth))
    }
}

struct DerivSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    read_timeout: Duration,
}

impl DerivSession {
    async fn send(&mut self, payload: Value) -> Result<(), BrokerError> {
        self.ws.send(Message::Text(payload.to_string())).await?;
        Ok(())
    }

    async fn request(&mut self, payload: Value, msg_type: &str) -> Result<Value, BrokerError> {
        self.send(payload).await?;
        self.wait_for(msg_type).await
    }

    /// Next message of `msg_type`, skipping anything else. API errors in
    /// any message abort the wait.
    async fn wait_for(&mut self, msg_type: &str) -> Result<Value, BrokerError> {
        loop {
            let msg = timeout(self.read_timeout, self.ws.next())
                .await
                .map_err(|_| BrokerError::Timeout(msg_type.to_string()))?
                .ok_or(BrokerError::ConnectionClosed)??;

            match msg {
                Message::Text(text) => {
                    let v: Value = serde_json::from_str(&text)?;
                    check_error(&v)?;
                    if v.get("msg_type").and_then(Value::as_str) == Some(msg_type) {
                        return Ok(v);
                    }
                    debug!("Skipping {:?} while waiting for {}", v.get("msg_type"), msg_type);
                }
                Message::Close(_) => return Err(BrokerError::ConnectionClosed),
                _ => {}
            }
        }
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

impl Broker for DerivBroker {
    async fn candles(
        &self,
        asset: &str,
        granularity: u64,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let mut session = self.connect().await?;
        let response = session
            .request(candles_request(asset, granularity, count), "candles")
            .await;
        session.close().await;
        parse_candles(&response?)
    }

    async fn balance(&self) -> Result<f64, BrokerError> {
        let (session, auth) = self.authorized().await?;
        session.close().await;
        auth.get("authorize")
            .and_then(|a| number(a.get("balance")))
            .ok_or(BrokerError::MissingField("authorize.balance"))
    }

    async fn buy_and_check_win(
        &self,
        asset: &str,
        direction: Direction,
        stake: f64,
        duration_secs: u64,
    ) -> Result<TradeOutcome, BrokerError> {
        let (mut session, auth) = self.authorized().await?;

        if let Some(balance) = auth.get("authorize").and_then(|a| number(a.get("balance"))) {
            if balance < stake {
                session.close().await;
                return Err(BrokerError::InsufficientBalance { balance, stake });
            }
        }

        let bought = session
            .request(buy_request(asset, direction, stake, duration_secs), "buy")
            .await?;
        let contract_id = bought
            .get("buy")
            .and_then(|b| contract_id(b.get("contract_id")))
            .ok_or(BrokerError::MissingField("buy.contract_id"))?;
        info!(
            "Contract opened: {} {} on {} @ {:.2}",
            contract_id,
            contract_type(direction),
            asset,
            stake
        );

        session
            .send(json!({
                "proposal_open_contract": 1,
                "contract_id": contract_id,
                "subscribe": 1
            }))
            .await?;

        session.read_timeout = Duration::from_secs(duration_secs) + SETTLEMENT_GRACE;
        let outcome = loop {
            let update = session.wait_for("proposal_open_contract").await?;
            if let Some(outcome) = settlement(&update, &contract_id) {
                break outcome;
            }
        };
        session.close().await;
        Ok(outcome)
    }
}

// ============================================================
// Protocol helpers
// ============================================================

fn check_error(v: &Value) -> Result<(), BrokerError> {
    match v.get("error") {
        Some(err) => Err(BrokerError::Api {
            code: err
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        None => Ok(()),
    }
}

/// Accepts both numbers and numeric strings.
fn number(v: Option<&Value>) -> Option<f64> {
    let val = v?;
    val.as_f64().or_else(|| val.as_str()?.parse().ok())
}

/// Contract ids arrive as either strings or integers.
fn contract_id(v: Option<&Value>) -> Option<String> {
    let val = v?;
    val.as_str()
        .map(|s| s.to_string())
        .or_else(|| val.as_u64().map(|n| n.to_string()))
}

pub fn contract_type(direction: Direction) -> &'static str {
    match direction {
        Direction::Call => "CALL",
        Direction::Put => "PUT",
    }
}

fn candles_request(asset: &str, granularity: u64, count: usize) -> Value {
    json!({
        "ticks_history": asset,
        "adjust_start_time": 1,
        "count": count,
        "end": "latest",
        "start": 1,
        "style": "candles",
        "granularity": granularity
    })
}

fn buy_request(asset: &str, direction: Direction, stake: f64, duration_secs: u64) -> Value {
    json!({
        "buy": "1",
        "price": stake,
        "parameters": {
            "contract_type": contract_type(direction),
            "symbol": asset,
            "duration": duration_secs,
            "duration_unit": "s",
            "basis": "stake",
            "amount": stake,
            "currency": "USD"
        }
    })
}

/// Deriv candle: `{ epoch, open, high, low, close }`.
fn parse_candles(v: &Value) -> Result<Vec<Candle>, BrokerError> {
    let list = v
        .get("candles")
        .and_then(Value::as_array)
        .ok_or(BrokerError::MissingField("candles"))?;

    list.iter()
        .map(|c| -> Result<Candle, BrokerError> {
            let time = c
                .get("epoch")
                .and_then(Value::as_i64)
                .ok_or(BrokerError::MissingField("epoch"))?;
            let field = |name: &'static str| number(c.get(name)).ok_or(BrokerError::MissingField(name));
            Ok(Candle::new(
                time,
                field("open")?,
                field("high")?,
                field("low")?,
                field("close")?,
            ))
        })
        .collect()
}

/// Final result once the contract status is won, lost or sold.
fn settlement(v: &Value, contract_id: &str) -> Option<TradeOutcome> {
    let poc = v.get("proposal_open_contract")?;
    let status = poc.get("status").and_then(Value::as_str).unwrap_or("open");
    if !matches!(status, "won" | "lost" | "sold") {
        return None;
    }
    let profit = number(poc.get("profit")).unwrap_or(0.0);
    Some(TradeOutcome {
        contract_id: contract_id.to_string(),
        win: profit > 0.0,
        profit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candles_maps_epoch_and_strings() {
        let v = json!({
            "msg_type": "candles",
            "candles": [
                { "epoch": 1700000000, "open": 1.0, "high": 1.5, "low": 0.9, "close": 1.2 },
                { "epoch": 1700000060, "open": "1.2", "high": "1.3", "low": "1.1", "close": "1.25" }
            ]
        });
        let candles = parse_candles(&v).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0], Candle::new(1_700_000_000, 1.0, 1.5, 0.9, 1.2));
        assert_eq!(candles[1].close, 1.25);
    }

    #[test]
    fn test_parse_candles_missing_field() {
        let v = json!({ "candles": [ { "epoch": 1, "open": 1.0, "high": 1.0, "low": 1.0 } ] });
        assert!(matches!(
            parse_candles(&v),
            Err(BrokerError::MissingField("close"))
        ));
        assert!(matches!(
            parse_candles(&json!({})),
            Err(BrokerError::MissingField("candles"))
        ));
    }

    #[test]
    fn test_api_error_is_surfaced() {
        let v = json!({
            "error": { "code": "InvalidToken", "message": "The token is invalid." },
            "msg_type": "authorize"
        });
        match check_error(&v) {
            Err(BrokerError::Api { code, message }) => {
                assert_eq!(code, "InvalidToken");
                assert_eq!(message, "The token is invalid.");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_buy_request_shape() {
        let v = buy_request("R_10", Direction::Put, 2.5, 60);
        assert_eq!(v["buy"], "1");
        assert_eq!(v["price"], 2.5);
        assert_eq!(v["parameters"]["contract_type"], "PUT");
        assert_eq!(v["parameters"]["symbol"], "R_10");
        assert_eq!(v["parameters"]["duration"], 60);
        assert_eq!(v["parameters"]["duration_unit"], "s");
        assert_eq!(v["parameters"]["basis"], "stake");
    }

    #[test]
    fn test_candles_request_shape() {
        let v = candles_request("R_50", 60, 120);
        assert_eq!(v["ticks_history"], "R_50");
        assert_eq!(v["style"], "candles");
        assert_eq!(v["count"], 120);
        assert_eq!(v["granularity"], 60);
    }

    #[test]
    fn test_settlement_waits_for_final_status() {
        let open = json!({ "proposal_open_contract": { "status": "open", "profit": 0.4 } });
        assert_eq!(settlement(&open, "1"), None);

        let won = json!({ "proposal_open_contract": { "status": "won", "profit": "0.95" } });
        let outcome = settlement(&won, "42").unwrap();
        assert!(outcome.win);
        assert_eq!(outcome.profit, 0.95);
        assert_eq!(outcome.contract_id, "42");

        let lost = json!({ "proposal_open_contract": { "status": "lost", "profit": -1.0 } });
        assert!(!settlement(&lost, "42").unwrap().win);
    }

    #[test]
    fn test_contract_id_string_or_number() {
        assert_eq!(contract_id(Some(&json!(123))), Some("123".to_string()));
        assert_eq!(contract_id(Some(&json!("abc"))), Some("abc".to_string()));
        assert_eq!(contract_id(None), None);
    }
}
