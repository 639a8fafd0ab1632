// ============================================================
// smc.rs — Smart Money Concepts
// Order blocks, liquidity grabs, imbalances
// ============================================================

use crate::stats::{last, max, mean, min};
use crate::{extract_close, extract_high, extract_low, tail, Candle, Trend};
use serde::{Deserialize, Serialize};

/// Closes used for the order-block trend (`closes[-20:-1]`).
const TREND_WINDOW: usize = 20;
/// Candles searched for the order-block extreme.
const ORDER_BLOCK_WINDOW: usize = 5;
/// Candles scanned for liquidity grabs and imbalances.
const SCAN_WINDOW: usize = 10;

/// Rule → confidence table.
pub const ORDER_BLOCK_BASE_CONFIDENCE: f64 = 75.0;
pub const ORDER_BLOCK_TREND_SCALE: f64 = 1000.0;
pub const LIQUIDITY_GRAB_CONFIDENCE: f64 = 80.0;
pub const IMBALANCE_CONFIDENCE: f64 = 85.0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct OrderBlock {
    pub level: Option<f64>,
    pub kind: Option<Trend>,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct LiquidityGrab {
    pub direction: Option<Trend>,
    pub confidence: f64,
}

/// A three-candle gap: candle `i`'s high below candle `i+2`'s low (bullish)
/// or its low above candle `i+2`'s high (bearish). `level` is the gap midpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Gap {
    pub direction: Trend,
    pub level: f64,
    /// Index of the first gap candle inside the scanned window.
    pub index: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Imbalance {
    pub direction: Option<Trend>,
    pub level: Option<f64>,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct SmcAnalysis {
    pub order_block: OrderBlock,
    pub liquidity_grab: LiquidityGrab,
    pub imbalance: Imbalance,
}

pub fn analyze_smc(candles: &[Candle], lookback: usize) -> SmcAnalysis {
    if lookback < TREND_WINDOW || candles.len() < lookback {
        return SmcAnalysis::default();
    }

    let window = tail(candles, lookback);

    SmcAnalysis {
        order_block: order_block(window),
        liquidity_grab: liquidity_grab(tail(window, SCAN_WINDOW)),
        imbalance: match first_gap(tail(window, SCAN_WINDOW), |_, _, _| true) {
            Some(gap) => Imbalance {
                direction: Some(gap.direction),
                level: Some(gap.level),
                confidence: IMBALANCE_CONFIDENCE,
            },
            None => Imbalance::default(),
        },
    }
}

/// Mean close step over `closes[-20:-1]` picks the side; the 5-candle
/// extreme on that side is the block while price is still beyond it.
fn order_block(window: &[Candle]) -> OrderBlock {
    let closes = extract_close(window);
    let n = closes.len();
    let trend_closes = &closes[n - TREND_WINDOW..n - 1];
    let steps: Vec<f64> = trend_closes.windows(2).map(|w| w[1] - w[0]).collect();
    let trend = mean(&steps);
    let latest_close = closes[n - 1];

    let confidence =
        (ORDER_BLOCK_BASE_CONFIDENCE + trend.abs() * ORDER_BLOCK_TREND_SCALE).min(100.0);

    if trend > 0.0 {
        let support = min(last(&extract_low(window), ORDER_BLOCK_WINDOW));
        if latest_close > support {
            return OrderBlock {
                level: Some(support),
                kind: Some(Trend::Bullish),
                confidence,
            };
        }
    } else if trend < 0.0 {
        let resistance = max(last(&extract_high(window), ORDER_BLOCK_WINDOW));
        if latest_close < resistance {
            return OrderBlock {
                level: Some(resistance),
                kind: Some(Trend::Bearish),
                confidence,
            };
        }
    }
    OrderBlock::default()
}

/// Latest candle takes out the prior extreme of the scan window and closes
/// back against it.
fn liquidity_grab(scan: &[Candle]) -> LiquidityGrab {
    let n = scan.len();
    if n < 2 {
        return LiquidityGrab::default();
    }
    let (prior, latest) = (&scan[..n - 1], &scan[n - 1]);
    let prev_close = scan[n - 2].close;

    let prior_high = max(&extract_high(prior));
    let prior_low = min(&extract_low(prior));

    let direction = if latest.high > prior_high && latest.close < prev_close {
        Some(Trend::Bearish)
    } else if latest.low < prior_low && latest.close > prev_close {
        Some(Trend::Bullish)
    } else {
        None
    };

    LiquidityGrab {
        direction,
        confidence: if direction.is_some() {
            LIQUIDITY_GRAB_CONFIDENCE
        } else {
            0.0
        },
    }
}

/// First three-candle gap in `scan`, scanning forward from the oldest
/// candle. Start positions run over `0..len-3`, so the newest three-candle
/// group is never tested. `accept` adds a per-direction condition on
/// `(direction, first, third)`.
pub(crate) fn first_gap<F>(scan: &[Candle], accept: F) -> Option<Gap>
where
    F: Fn(Trend, &Candle, &Candle) -> bool,
{
    let starts = scan.len().saturating_sub(3);
    (0..starts).find_map(|i| {
        let (first, third) = (&scan[i], &scan[i + 2]);
        if first.high < third.low && accept(Trend::Bullish, first, third) {
            Some(Gap {
                direction: Trend::Bullish,
                level: (first.high + third.low) / 2.0,
                index: i,
            })
        } else if first.low > third.high && accept(Trend::Bearish, first, third) {
            Some(Gap {
                direction: Trend::Bearish,
                level: (first.low + third.high) / 2.0,
                index: i,
            })
        } else {
            None
        }
    })
}
