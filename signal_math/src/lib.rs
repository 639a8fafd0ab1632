// ============================================================
// lib.rs — Composite Signal Scoring Library
// ============================================================

// ------------------------------------------------------------
// Modules
// ------------------------------------------------------------

pub mod aggregator;
pub mod error;
pub mod ict;
pub mod indicators;
pub mod options;
pub mod patterns;
pub mod price_action;
pub mod psychology;
pub mod smc;

mod stats;

// Re-exports for convenience
pub use aggregator::{evaluate, Contribution, Direction, ScoreRule, Signal, SignalEngine, Weight};
pub use error::SignalError;
pub use ict::{analyze_ict, IctAnalysis, KillZone, Session};
pub use indicators::{adx, atr, bollinger_bands, ema, macd, rsi, BollingerBands, Macd};
pub use options::AnalysisOptions;
pub use patterns::{detect_pattern, PatternKind, PatternMatch};
pub use price_action::{analyze_price_action, PriceActionAnalysis};
pub use psychology::{analyze_candle_psychology, CandlePsychology, Sentiment};
pub use smc::{analyze_smc, SmcAnalysis};

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------
// Structs
// ------------------------------------------------------------

/// One OHLC bar. `time` is epoch seconds.
///
/// Analyzers assume `high >= max(open, close)` and `low <= min(open, close)`;
/// validating that is the job of whoever builds the series.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
        }
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Upper plus lower wick.
    pub fn total_wick(&self) -> f64 {
        self.upper_wick() + self.lower_wick()
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Structural direction reported by the SMC / ICT / price-action analyzers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Bullish => "bullish",
            Trend::Bearish => "bearish",
        }
    }
}

// ============================================================
// Helper Functions
// ============================================================

/// Trailing `len` candles, or the whole slice when it is shorter.
pub(crate) fn tail(candles: &[Candle], len: usize) -> &[Candle] {
    &candles[candles.len().saturating_sub(len)..]
}

pub(crate) fn extract_close(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

pub(crate) fn extract_high(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.high).collect()
}

pub(crate) fn extract_low(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.low).collect()
}
