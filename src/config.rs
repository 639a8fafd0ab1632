// Runtime configuration: config.toml sections plus secrets from the environment.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use signal_math::AnalysisOptions;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Real market data, simulated settlement and balance.
    Paper,
    Live,
}

impl FromStr for TradingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            other => bail!("unknown trading mode '{}', expected paper or live", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub analysis: AnalysisOptions,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub trading: TradingSection,
    /// Deriv API token, only ever read from the environment.
    #[serde(skip)]
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSection {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    /// Candle size in seconds.
    #[serde(default = "default_granularity")]
    pub granularity: u64,
    #[serde(default = "default_candle_count")]
    pub candle_count: usize,
    /// Contract length in seconds.
    #[serde(default = "default_trade_duration")]
    pub trade_duration: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_paper_payout")]
    pub paper_payout: f64,
    #[serde(default = "default_paper_balance")]
    pub paper_balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSection {
    #[serde(default = "default_mode")]
    pub mode: TradingMode,
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
    #[serde(default = "default_base_bet")]
    pub base_bet: f64,
    #[serde(default = "default_martingale")]
    pub martingale: f64,
    #[serde(default = "default_stop_loss")]
    pub stop_loss: f64,
    #[serde(default = "default_stop_profit")]
    pub stop_profit: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,
    #[serde(default = "default_fallback_secs")]
    pub fallback_secs: u64,
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// 0 runs until a stop condition.
    #[serde(default)]
    pub max_cycles: u64,
}

fn default_ws_url() -> String {
    "wss://ws.derivws.com/websockets/v3".to_string()
}
fn default_app_id() -> String {
    "1089".to_string()
}
fn default_granularity() -> u64 {
    60
}
fn default_candle_count() -> usize {
    120
}
fn default_trade_duration() -> u64 {
    60
}
fn default_request_timeout() -> u64 {
    10
}
fn default_paper_payout() -> f64 {
    0.85
}
fn default_paper_balance() -> f64 {
    1000.0
}
fn default_mode() -> TradingMode {
    TradingMode::Paper
}
fn default_assets() -> Vec<String> {
    ["R_10", "R_25", "R_50", "R_75", "R_100"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_base_bet() -> f64 {
    1.0
}
fn default_martingale() -> f64 {
    2.0
}
fn default_stop_loss() -> f64 {
    10.0
}
fn default_stop_profit() -> f64 {
    10.0
}
fn default_max_attempts() -> u32 {
    3
}
fn default_min_confidence() -> f64 {
    90.0
}
fn default_cycle_secs() -> u64 {
    180
}
fn default_fallback_secs() -> u64 {
    150
}
fn default_poll_secs() -> u64 {
    1
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            app_id: default_app_id(),
            granularity: default_granularity(),
            candle_count: default_candle_count(),
            trade_duration: default_trade_duration(),
            request_timeout_secs: default_request_timeout(),
            paper_payout: default_paper_payout(),
            paper_balance: default_paper_balance(),
        }
    }
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            assets: default_assets(),
            base_bet: default_base_bet(),
            martingale: default_martingale(),
            stop_loss: default_stop_loss(),
            stop_profit: default_stop_profit(),
            max_attempts: default_max_attempts(),
            min_confidence: default_min_confidence(),
            cycle_secs: default_cycle_secs(),
            fallback_secs: default_fallback_secs(),
            poll_secs: default_poll_secs(),
            max_cycles: 0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisOptions::default(),
            broker: BrokerSection::default(),
            trading: TradingSection::default(),
            api_token: None,
        }
    }
}

impl TradingSection {
    pub fn cycle(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }

    pub fn fallback_after(&self) -> Duration {
        Duration::from_secs(self.fallback_secs)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
}

impl AppConfig {
    /// Reads the TOML file, falling back to defaults when it is missing or
    /// does not parse.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(config) => {
                    info!(
                        "Loaded {}: {} assets, lookback {}, mode {:?}",
                        path.display(),
                        config.trading.assets.len(),
                        config.analysis.lookback,
                        config.trading.mode
                    );
                    config
                }
                Err(e) => {
                    warn!("Config parse error in {}, using defaults: {}", path.display(), e);
                    AppConfig::default()
                }
            },
            Err(_) => {
                warn!("{} not found, using defaults", path.display());
                AppConfig::default()
            }
        }
    }

    /// Applies `DERIV_API_TOKEN`, `DERIV_APP_ID` and `QUOTEX_MODE`.
    pub fn with_env(mut self) -> Result<Self> {
        self.api_token = env::var("DERIV_API_TOKEN").ok().filter(|t| !t.is_empty());
        if let Ok(app_id) = env::var("DERIV_APP_ID") {
            if !app_id.is_empty() {
                self.broker.app_id = app_id;
            }
        }
        if let Ok(mode) = env::var("QUOTEX_MODE") {
            self.trading.mode = mode.parse().context("QUOTEX_MODE")?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis
            .validate()
            .context("invalid [analysis] section")?;
        self.endpoint()?;

        let b = &self.broker;
        if b.candle_count < self.analysis.lookback {
            bail!(
                "broker.candle_count {} is below analysis.lookback {}",
                b.candle_count,
                self.analysis.lookback
            );
        }
        if b.granularity == 0 || b.trade_duration == 0 {
            bail!("broker.granularity and broker.trade_duration must be positive");
        }
        if !(b.paper_payout > 0.0) {
            bail!("broker.paper_payout must be positive");
        }

        let t = &self.trading;
        if t.assets.is_empty() {
            bail!("trading.assets is empty");
        }
        if !(t.base_bet > 0.0) {
            bail!("trading.base_bet must be positive");
        }
        if !(t.martingale >= 1.0) {
            bail!("trading.martingale must be at least 1.0");
        }
        if t.max_attempts == 0 {
            bail!("trading.max_attempts must be at least 1");
        }
        if t.fallback_secs > t.cycle_secs {
            bail!("trading.fallback_secs must not exceed trading.cycle_secs");
        }
        if !(0.0..=100.0).contains(&t.min_confidence) {
            bail!("trading.min_confidence must be within 0..=100");
        }
        if t.mode == TradingMode::Live && self.api_token.is_none() {
            bail!("live mode needs DERIV_API_TOKEN");
        }
        Ok(())
    }

    /// Websocket endpoint with the app id attached.
    pub fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(&self.broker.ws_url)
            .with_context(|| format!("invalid broker.ws_url '{}'", self.broker.ws_url))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            bail!("broker.ws_url must use ws:// or wss://");
        }
        url.query_pairs_mut().append_pair("app_id", &self.broker.app_id);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [analysis]
            lookback = 60

            [trading]
            assets = ["R_50"]
            base_bet = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.lookback, 60);
        assert_eq!(config.analysis.rsi_period, 14);
        assert_eq!(config.trading.assets, vec!["R_50".to_string()]);
        assert_eq!(config.trading.base_bet, 2.5);
        assert_eq!(config.trading.max_attempts, 3);
        assert_eq!(config.trading.cycle_secs, 180);
        assert_eq!(config.broker.granularity, 60);
        assert_eq!(config.trading.mode, TradingMode::Paper);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_endpoint_carries_app_id() {
        let config = AppConfig::default();
        let url = config.endpoint().unwrap();
        assert_eq!(url.host_str(), Some("ws.derivws.com"));
        assert_eq!(url.query(), Some("app_id=1089"));
    }

    #[test]
    fn test_rejects_http_url() {
        let mut config = AppConfig::default();
        config.broker.ws_url = "https://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_live_mode_needs_token() {
        let mut config = AppConfig::default();
        config.trading.mode = TradingMode::Live;
        assert!(config.validate().is_err());
        config.api_token = Some("token".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fallback_after_cycle_rejected() {
        let mut config = AppConfig::default();
        config.trading.fallback_secs = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("LIVE".parse::<TradingMode>().unwrap(), TradingMode::Live);
        assert!("demo".parse::<TradingMode>().is_err());
    }
}
