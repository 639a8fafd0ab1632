// ============================================================
// psychology.rs — Candle Psychology
// Aggregate behavioural statistics over the lookback window
// ============================================================

use crate::stats::{
    histogram, last, mean, pct_returns, pearson, sign_flips, std_dev,
};
use crate::{extract_close, tail, Candle};
use serde::{Deserialize, Serialize};

/// Windows for fractal momentum.
const MOMENTUM_SHORT: usize = 5;
const MOMENTUM_LONG: usize = 20;
/// Candles per bar of the simulated higher timeframe.
const MTF_STEP: usize = 5;
const EXHAUSTION_WINDOW: usize = 5;
const PRESSURE_WINDOW: usize = 10;
const ENTROPY_BINS: usize = 10;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl Sentiment {
    fn from_persistence(persistence: f64) -> Self {
        if persistence > 20.0 {
            Sentiment::Bullish
        } else if persistence < -20.0 {
            Sentiment::Bearish
        } else {
            Sentiment::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
        }
    }
}

/// All metrics are zero and sentiment neutral when the window is short.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct CandlePsychology {
    /// -100..100, share of up returns minus share of down returns.
    pub trend_persistence: f64,
    pub reversal_strength: f64,
    pub volatility_clustering: f64,
    pub exhaustion_signal: f64,
    pub sentiment: Sentiment,
    pub sentiment_polarity: f64,
    pub fractal_momentum: f64,
    pub mtf_correlation: f64,
    /// 0..100
    pub psychological_pressure: f64,
    /// 0..100
    pub candle_entropy: f64,
}

pub fn analyze_candle_psychology(candles: &[Candle], lookback: usize) -> CandlePsychology {
    if lookback < 2 || candles.len() < lookback {
        return CandlePsychology::default();
    }

    let window = tail(candles, lookback);
    let closes = extract_close(window);
    let bodies: Vec<f64> = window.iter().map(|c| c.body()).collect();
    let returns = pct_returns(&closes);

    let trend_persistence = trend_persistence(&returns);

    CandlePsychology {
        trend_persistence,
        reversal_strength: reversal_strength(&returns, &bodies),
        volatility_clustering: volatility_clustering(&returns, lookback),
        exhaustion_signal: exhaustion_signal(window, &bodies, trend_persistence),
        sentiment: Sentiment::from_persistence(trend_persistence),
        sentiment_polarity: trend_persistence,
        fractal_momentum: fractal_momentum(&returns),
        mtf_correlation: mtf_correlation(&closes, &returns),
        psychological_pressure: psychological_pressure(window),
        candle_entropy: candle_entropy(&returns),
    }
}

/// Up returns minus down returns, as a percentage of all returns.
fn trend_persistence(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let bullish = returns.iter().filter(|r| **r > 0.0).count() as f64;
    let bearish = returns.iter().filter(|r| **r < 0.0).count() as f64;
    (bullish - bearish) / returns.len() as f64 * 100.0
}

/// Mean body at direction flips relative to the mean body, ×100.
fn reversal_strength(returns: &[f64], bodies: &[f64]) -> f64 {
    let flips = sign_flips(returns);
    let mean_body = mean(bodies);
    if flips.is_empty() || mean_body == 0.0 {
        return 0.0;
    }
    let flip_bodies: Vec<f64> = flips.iter().map(|&j| bodies[j]).collect();
    mean(&flip_bodies) / mean_body * 100.0
}

/// Back-to-back large moves per lookback candle, ×100. A move is large
/// when it exceeds the return stddev scaled by √lookback.
fn volatility_clustering(returns: &[f64], lookback: usize) -> f64 {
    let threshold = std_dev(returns) * (lookback as f64).sqrt();
    let large: Vec<usize> = returns
        .iter()
        .enumerate()
        .filter(|(_, r)| r.abs() > threshold)
        .map(|(i, _)| i)
        .collect();
    if large.is_empty() {
        return 0.0;
    }
    let adjacent = large.windows(2).filter(|w| w[1] - w[0] == 1).count();
    adjacent as f64 / lookback as f64 * 100.0
}

/// Recent wick-to-body ratio, only once the trend is strongly bullish.
fn exhaustion_signal(window: &[Candle], bodies: &[f64], trend_persistence: f64) -> f64 {
    if trend_persistence <= 50.0 {
        return 0.0;
    }
    let recent = tail(window, EXHAUSTION_WINDOW);
    let wicks: Vec<f64> = recent.iter().map(|c| c.total_wick()).collect();
    let body_mean = mean(last(bodies, EXHAUSTION_WINDOW));
    if body_mean == 0.0 {
        return 0.0;
    }
    mean(&wicks) / body_mean * 100.0
}

/// Short mean return over long mean return; above 1 means acceleration.
fn fractal_momentum(returns: &[f64]) -> f64 {
    let short = mean(last(returns, MOMENTUM_SHORT)) * 100.0;
    let long = mean(last(returns, MOMENTUM_LONG)) * 100.0;
    if long == 0.0 {
        return 0.0;
    }
    short / long
}

/// Correlation of the trailing returns with every-5th-candle returns, ×100.
fn mtf_correlation(closes: &[f64], returns: &[f64]) -> f64 {
    let sampled: Vec<f64> = closes.iter().step_by(MTF_STEP).copied().collect();
    let mtf_returns = pct_returns(&sampled);
    if mtf_returns.len() < 2 {
        return 0.0;
    }
    pearson(last(returns, mtf_returns.len()), &mtf_returns) * 100.0
}

/// Upper-wick share of range over the last 10 candles, doubled and capped.
fn psychological_pressure(window: &[Candle]) -> f64 {
    let recent = tail(window, PRESSURE_WINDOW);
    let ranges: Vec<f64> = recent.iter().map(|c| c.range()).collect();
    if mean(&ranges) == 0.0 {
        return 0.0;
    }
    let ratios: Vec<f64> = recent
        .iter()
        .map(|c| {
            if c.range() != 0.0 {
                c.upper_wick() / c.range()
            } else {
                0.0
            }
        })
        .collect();
    (mean(&ratios) * 100.0 * 2.0).min(100.0)
}

/// Shannon entropy of a 10-bin return histogram, normalised to 0..100.
fn candle_entropy(returns: &[f64]) -> f64 {
    let counts = histogram(returns, ENTROPY_BINS);
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    // empty bins contribute nothing
    let entropy: f64 = counts
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = n as f64 / total as f64;
            -p * p.log2()
        })
        .sum();
    entropy / (ENTROPY_BINS as f64).log2() * 100.0
}
