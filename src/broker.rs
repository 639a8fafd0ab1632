// ============================================================
// broker.rs — Brokerage seam used by the scanner and session
// ============================================================

use signal_math::{Candle, Direction};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("response is missing field '{0}'")]
    MissingField(&'static str),

    #[error("insufficient balance: {balance:.2} < stake {stake:.2}")]
    InsufficientBalance { balance: f64, stake: f64 },

    #[error("no API token configured")]
    MissingToken,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settled contract.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOutcome {
    pub contract_id: String,
    pub win: bool,
    /// Net result: positive on a win, minus the stake on a loss.
    pub profit: f64,
}

/// Everything the trading loop needs from a brokerage session.
#[allow(async_fn_in_trait)]
pub trait Broker {
    /// Most recent `count` closed candles of `granularity` seconds, oldest first.
    async fn candles(
        &self,
        asset: &str,
        granularity: u64,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError>;

    async fn balance(&self) -> Result<f64, BrokerError>;

    /// Places the contract and waits until it settles.
    async fn buy_and_check_win(
        &self,
        asset: &str,
        direction: Direction,
        stake: f64,
        duration_secs: u64,
    ) -> Result<TradeOutcome, BrokerError>;
}

// ============================================================
// Paper broker
// ============================================================

/// Reads market data from `source` but settles trades locally: the close
/// of the latest candle after the contract duration against the close at
/// entry. A flat finish counts as a loss.
pub struct PaperBroker<B> {
    source: B,
    granularity: u64,
    payout: f64,
    settle_delay: Option<Duration>,
    balance: Mutex<f64>,
    contracts: AtomicU64,
}

impl<B: Broker> PaperBroker<B> {
    pub fn new(source: B, granularity: u64, payout: f64, starting_balance: f64) -> Self {
        Self {
            source,
            granularity,
            payout,
            settle_delay: None,
            balance: Mutex::new(starting_balance),
            contracts: AtomicU64::new(0),
        }
    }

    /// Overrides the wait between entry and exit (defaults to the contract
    /// duration).
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    async fn latest_close(&self, asset: &str) -> Result<f64, BrokerError> {
        let candles = self.source.candles(asset, self.granularity, 1).await?;
        candles
            .last()
            .map(|c| c.close)
            .ok_or(BrokerError::MissingField("candles"))
    }

    fn current_balance(&self) -> f64 {
        *self.balance.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, profit: f64) {
        let mut balance = self.balance.lock().unwrap_or_else(|e| e.into_inner());
        *balance += profit;
    }
}

impl<B: Broker> Broker for PaperBroker<B> {
    async fn candles(
        &self,
        asset: &str,
        granularity: u64,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        self.source.candles(asset, granularity, count).await
    }

    async fn balance(&self) -> Result<f64, BrokerError> {
        Ok(self.current_balance())
    }

    async fn buy_and_check_win(
        &self,
        asset: &str,
        direction: Direction,
        stake: f64,
        duration_secs: u64,
    ) -> Result<TradeOutcome, BrokerError> {
        let balance = self.current_balance();
        if balance < stake {
            return Err(BrokerError::InsufficientBalance { balance, stake });
        }

        let entry = self.latest_close(asset).await?;
        let delay = self
            .settle_delay
            .unwrap_or_else(|| Duration::from_secs(duration_secs));
        tokio::time::sleep(delay).await;
        let exit = self.latest_close(asset).await?;

        let win = match direction {
            Direction::Call => exit > entry,
            Direction::Put => exit < entry,
        };
        let profit = if win { stake * self.payout } else { -stake };
        self.apply(profit);

        let id = self.contracts.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(TradeOutcome {
            contract_id: format!("paper-{}", id),
            win,
            profit,
        })
    }
}

// ============================================================
// Scripted broker for tests
// ============================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    /// Strictly rising series, each candle opening at the previous close.
    pub fn rising(len: usize, start: f64) -> Vec<Candle> {
        (0..len)
            .map(|i| {
                let open = start + i as f64;
                let close = open + 1.0;
                Candle::new(60 * i as i64, open, close + 0.2, open - 0.2, close)
            })
            .collect()
    }

    pub fn flat(len: usize, price: f64) -> Vec<Candle> {
        (0..len)
            .map(|i| Candle::new(60 * i as i64, price, price, price, price))
            .collect()
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct PlacedTrade {
        pub asset: String,
        pub direction: Direction,
        pub stake: f64,
    }

    /// In-memory broker. Each asset holds a queue of candle series; the
    /// front series is served and popped while more than one remains.
    /// Trade results are taken from `outcomes` in order.
    #[derive(Default)]
    pub struct ScriptedBroker {
        series: Mutex<HashMap<String, VecDeque<Vec<Candle>>>>,
        failing: Mutex<Vec<String>>,
        outcomes: Mutex<VecDeque<bool>>,
        balance: Mutex<f64>,
        pub trades: Mutex<Vec<PlacedTrade>>,
        pub candle_requests: AtomicU64,
    }

    impl ScriptedBroker {
        pub fn new(balance: f64) -> Self {
            Self {
                balance: Mutex::new(balance),
                ..Default::default()
            }
        }

        pub fn with_series(self, asset: &str, candles: Vec<Candle>) -> Self {
            self.series
                .lock()
                .unwrap()
                .entry(asset.to_string())
                .or_default()
                .push_back(candles);
            self
        }

        pub fn with_failure(self, asset: &str) -> Self {
            self.failing.lock().unwrap().push(asset.to_string());
            self
        }

        pub fn with_outcomes(self, outcomes: &[bool]) -> Self {
            self.outcomes.lock().unwrap().extend(outcomes.iter().copied());
            self
        }

        pub fn placed(&self) -> Vec<PlacedTrade> {
            self.trades.lock().unwrap().clone()
        }
    }

    impl Broker for ScriptedBroker {
        async fn candles(
            &self,
            asset: &str,
            _granularity: u64,
            count: usize,
        ) -> Result<Vec<Candle>, BrokerError> {
            self.candle_requests.fetch_add(1, Ordering::Relaxed);
            if self.failing.lock().unwrap().iter().any(|a| a == asset) {
                return Err(BrokerError::Api {
                    code: "MarketIsClosed".to_string(),
                    message: format!("{} is closed", asset),
                });
            }
            let mut series = self.series.lock().unwrap();
            let queue = series
                .get_mut(asset)
                .ok_or(BrokerError::MissingField("candles"))?;
            let candles = if queue.len() > 1 {
                queue.pop_front().unwrap_or_default()
            } else {
                queue.front().cloned().unwrap_or_default()
            };
            let start = candles.len().saturating_sub(count);
            Ok(candles[start..].to_vec())
        }

        async fn balance(&self) -> Result<f64, BrokerError> {
            Ok(*self.balance.lock().unwrap())
        }

        async fn buy_and_check_win(
            &self,
            asset: &str,
            direction: Direction,
            stake: f64,
            _duration_secs: u64,
        ) -> Result<TradeOutcome, BrokerError> {
            self.trades.lock().unwrap().push(PlacedTrade {
                asset: asset.to_string(),
                direction,
                stake,
            });
            let win = self.outcomes.lock().unwrap().pop_front().unwrap_or(false);
            let profit = if win { stake * 0.8 } else { -stake };
            *self.balance.lock().unwrap() += profit;
            Ok(TradeOutcome {
                contract_id: format!("scripted-{}", self.trades.lock().unwrap().len()),
                win,
                profit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{flat, ScriptedBroker};
    use super::*;

    fn paper(source: ScriptedBroker) -> PaperBroker<ScriptedBroker> {
        PaperBroker::new(source, 60, 0.85, 100.0).with_settle_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_paper_call_wins_when_price_rises() {
        let source = ScriptedBroker::new(0.0)
            .with_series("R_10", flat(5, 10.0))
            .with_series("R_10", flat(5, 11.0));
        let broker = paper(source);

        let outcome = broker
            .buy_and_check_win("R_10", Direction::Call, 10.0, 60)
            .await
            .unwrap();
        assert!(outcome.win);
        assert!((outcome.profit - 8.5).abs() < 1e-9);
        assert_eq!(outcome.contract_id, "paper-1");
        assert!((broker.balance().await.unwrap() - 108.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_paper_flat_finish_is_a_loss() {
        let broker = paper(ScriptedBroker::new(0.0).with_series("R_10", flat(5, 10.0)));
        let outcome = broker
            .buy_and_check_win("R_10", Direction::Put, 5.0, 60)
            .await
            .unwrap();
        assert!(!outcome.win);
        assert_eq!(outcome.profit, -5.0);
        assert_eq!(broker.balance().await.unwrap(), 95.0);
    }

    #[tokio::test]
    async fn test_paper_rejects_stake_above_balance() {
        let broker = paper(ScriptedBroker::new(0.0).with_series("R_10", flat(5, 10.0)));
        let err = broker
            .buy_and_check_win("R_10", Direction::Call, 500.0, 60)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_paper_passes_candles_through() {
        let broker = paper(ScriptedBroker::new(0.0).with_series("R_10", flat(80, 10.0)));
        let candles = broker.candles("R_10", 60, 50).await.unwrap();
        assert_eq!(candles.len(), 50);
    }
}
