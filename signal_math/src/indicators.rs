// ============================================================
// indicators.rs — Point-in-time Technical Indicators
// EMA, RSI, MACD, Bollinger Bands, ATR, ADX
// ============================================================
//
// Every function reads the trailing part of the window it needs and
// returns the latest value only. Short windows give the documented
// neutral value instead of NaN.

use crate::stats::{mean, std_dev};
use crate::{extract_close, tail, Candle};
use serde::{Deserialize, Serialize};

// ============================================================
// EMA (Exponential Moving Average)
// ============================================================

/// EMA over the trailing `period` closes, seeded with the oldest of them.
/// Returns 0.0 when fewer than `period` candles are available.
pub fn ema(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period {
        return 0.0;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let window = tail(candles, period);

    let mut value = window[0].close;
    for c in &window[1..] {
        value = alpha * c.close + (1.0 - alpha) * value;
    }
    value
}

// ============================================================
// RSI (Relative Strength Index)
// ============================================================

/// RSI from the last `period` close deltas, averaging all but the oldest
/// delta. 50 when data is short or the window is flat, 100 when there
/// were gains and no losses.
pub fn rsi(candles: &[Candle], period: usize) -> f64 {
    if period < 2 || candles.len() < period + 1 {
        return 50.0;
    }

    let closes = extract_close(tail(candles, period + 1));
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let gains: Vec<f64> = deltas[1..].iter().map(|d| d.max(0.0)).collect();
    let losses: Vec<f64> = deltas[1..].iter().map(|d| (-d).max(0.0)).collect();

    let avg_gain = mean(&gains);
    let avg_loss = mean(&losses);

    if avg_loss == 0.0 {
        return if avg_gain > 0.0 { 100.0 } else { 50.0 };
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

// ============================================================
// MACD
// ============================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD line is `ema(fast) - ema(slow)` at the latest candle.
///
/// The signal line is an EMA over `signal` historical MACD values taken
/// at the series prefixes ending at indices `slow-1 ..= slow+signal-2`;
/// it stays 0 when the series is too short for those prefixes.
pub fn macd(candles: &[Candle], fast: usize, slow: usize, signal: usize) -> Macd {
    if slow == 0 || candles.len() < slow {
        return Macd::default();
    }

    let line = ema(candles, fast) - ema(candles, slow);

    let mut signal_line = 0.0;
    if signal > 0 && candles.len() >= slow + signal - 1 {
        let history: Vec<f64> = (slow - 1..slow - 1 + signal)
            .map(|i| {
                let prefix = &candles[..=i];
                ema(prefix, fast) - ema(prefix, slow)
            })
            .collect();

        let alpha = 2.0 / (signal as f64 + 1.0);
        signal_line = history[0];
        for v in &history[1..] {
            signal_line = alpha * v + (1.0 - alpha) * signal_line;
        }
    }

    Macd {
        line,
        signal: signal_line,
        histogram: line - signal_line,
    }
}

// ============================================================
// Bollinger Bands
// ============================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle
    pub bandwidth: f64,
}

/// SMA ± `multiplier` population standard deviations over `period` closes.
/// All zero when the window is short.
pub fn bollinger_bands(candles: &[Candle], period: usize, multiplier: f64) -> BollingerBands {
    if period == 0 || candles.len() < period {
        return BollingerBands::default();
    }

    let closes = extract_close(tail(candles, period));
    let sma = mean(&closes);
    let std = std_dev(&closes);

    let upper = sma + multiplier * std;
    let lower = sma - multiplier * std;
    let bandwidth = if sma != 0.0 { (upper - lower) / sma } else { 0.0 };

    BollingerBands {
        upper,
        middle: sma,
        lower,
        bandwidth,
    }
}

// ============================================================
// ATR (Average True Range)
// ============================================================

/// True range of `current` against the previous close.
pub(crate) fn true_range(current: &Candle, prev_close: f64) -> f64 {
    let hl = current.high - current.low;
    let hc = (current.high - prev_close).abs();
    let lc = (current.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// True ranges for each adjacent pair in `candles`.
pub(crate) fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect()
}

/// Plain mean of the last `period` true ranges. 0 when fewer than
/// `period + 1` candles are available.
pub fn atr(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period + 1 {
        return 0.0;
    }
    mean(&true_ranges(tail(candles, period + 1)))
}

// ============================================================
// ADX (Average Directional Index)
// ============================================================

/// Directional index over the last `period` candle pairs: mean +DM and
/// -DM are normalised by mean true range, then combined into DX.
/// 0 when data is short or the true range is zero.
pub fn adx(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period + 1 {
        return 0.0;
    }

    let window = tail(candles, period + 1);
    let mut dm_plus = Vec::with_capacity(period);
    let mut dm_minus = Vec::with_capacity(period);

    for w in window.windows(2) {
        let up_move = w[1].high - w[0].high;
        let down_move = w[0].low - w[1].low;

        dm_plus.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        dm_minus.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    let atr = mean(&true_ranges(window));
    if atr == 0.0 {
        return 0.0;
    }

    let di_plus = 100.0 * mean(&dm_plus) / atr;
    let di_minus = 100.0 * mean(&dm_minus) / atr;

    if di_plus + di_minus != 0.0 {
        100.0 * (di_plus - di_minus).abs() / (di_plus + di_minus)
    } else {
        0.0
    }
}
