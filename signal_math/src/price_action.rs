// ============================================================
// price_action.rs — Price Action Geometry
// Zones, breakouts, trendlines, sweeps, fibonacci, divergence
// ============================================================

use crate::indicators::true_ranges;
use crate::stats::{last, linear_fit, max, mean, min, pct_returns, sign, sign_flips, std_dev};
use crate::{extract_close, extract_high, extract_low, tail, Candle, Trend};
use serde::{Deserialize, Serialize};

const SLOPE_SCALE: f64 = 1000.0;
const SWEEP_SIGMA: f64 = 2.5;
const SWEEP_CONFIDENCE_SCALE: f64 = 300.0;
const RECENT_WINDOW: usize = 5;
const SPIKE_WINDOW: usize = 3;
const IMPULSIVE_SIGMA: f64 = 1.5;
const IMPULSIVE_BOOST: f64 = 1.5;

pub const FIBONACCI_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Zone {
    pub level: f64,
    /// Share of the window's candles that confirmed the zone, ×100.
    pub strength: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Trendline {
    /// Regression slope of closes ×1000.
    pub slope: f64,
    pub strength: f64,
    /// Short-window slope minus full-window slope, ×1000.
    pub acceleration: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct LiquiditySweep {
    pub level: f64,
    pub direction: Option<Trend>,
    pub confidence: f64,
}

impl LiquiditySweep {
    pub fn label(&self) -> &'static str {
        self.direction.map_or("none", |d| d.as_str())
    }
}

/// Every field is zero (sweep direction none) when the window is short.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct PriceActionAnalysis {
    pub supply_zone: Zone,
    pub demand_zone: Zone,
    pub breakout_power: f64,
    pub trendline: Trendline,
    pub liquidity_sweep: LiquiditySweep,
    pub rejection_intensity: f64,
    pub consolidation_breakout_potential: f64,
    pub impulse_wave_strength: f64,
    pub fibonacci_confluence: f64,
    pub volatility_adjusted_pivot: f64,
    pub momentum_divergence: f64,
}

pub fn analyze_price_action(
    candles: &[Candle],
    lookback: usize,
    short_lookback: usize,
) -> PriceActionAnalysis {
    if lookback < 3 || short_lookback < 2 || short_lookback > lookback || candles.len() < lookback
    {
        return PriceActionAnalysis::default();
    }

    let window = tail(candles, lookback);
    let closes = extract_close(window);
    let highs = extract_high(window);
    let lows = extract_low(window);
    let ranges: Vec<f64> = window.iter().map(|c| c.range()).collect();
    let returns = pct_returns(&closes);
    let latest_close = closes[closes.len() - 1];

    let (supply_zone, demand_zone) = zones(window, &returns, lookback);

    PriceActionAnalysis {
        supply_zone,
        demand_zone,
        breakout_power: breakout_power(latest_close, &supply_zone, &demand_zone, &ranges),
        trendline: trendline(&closes, short_lookback),
        liquidity_sweep: liquidity_sweep(window, latest_close, lookback),
        rejection_intensity: rejection_intensity(window, &returns),
        consolidation_breakout_potential: consolidation_breakout_potential(&ranges, short_lookback),
        impulse_wave_strength: impulse_wave_strength(&returns, short_lookback),
        fibonacci_confluence: fibonacci_confluence(latest_close, &highs, &lows),
        volatility_adjusted_pivot: volatility_adjusted_pivot(window, &closes, short_lookback),
        momentum_divergence: momentum_divergence(&closes, short_lookback),
    }
}

// ============================================================
// Zones & Breakouts
// ============================================================

/// Supply and demand from the candles where the return direction flipped.
/// Without a qualifying flip the zone falls back to the window extreme.
fn zones(window: &[Candle], returns: &[f64], lookback: usize) -> (Zone, Zone) {
    let reversals: Vec<&Candle> = sign_flips(returns)
        .into_iter()
        .map(|j| &window[j + 1])
        .collect();

    let supply_highs: Vec<f64> = reversals
        .iter()
        .filter(|c| c.high > c.close)
        .map(|c| c.high)
        .collect();
    let demand_lows: Vec<f64> = reversals
        .iter()
        .filter(|c| c.low < c.close)
        .map(|c| c.low)
        .collect();

    let supply = Zone {
        level: if supply_highs.is_empty() {
            max(&extract_high(window))
        } else {
            mean(&supply_highs)
        },
        strength: supply_highs.len() as f64 / lookback as f64 * 100.0,
    };
    let demand = Zone {
        level: if demand_lows.is_empty() {
            min(&extract_low(window))
        } else {
            mean(&demand_lows)
        },
        strength: demand_lows.len() as f64 / lookback as f64 * 100.0,
    };
    (supply, demand)
}

/// Percent distance beyond the broken zone, scaled by recent range expansion.
fn breakout_power(latest_close: f64, supply: &Zone, demand: &Zone, ranges: &[f64]) -> f64 {
    let mean_range = mean(ranges);
    let expansion = if mean_range != 0.0 {
        mean(last(ranges, RECENT_WINDOW)) / mean_range
    } else {
        1.0
    };

    if latest_close > supply.level && supply.level != 0.0 {
        (latest_close - supply.level) / supply.level * 100.0 * expansion
    } else if latest_close < demand.level && demand.level != 0.0 {
        (demand.level - latest_close) / demand.level * 100.0 * expansion
    } else {
        0.0
    }
}

// ============================================================
// Trendline
// ============================================================

fn trendline(closes: &[f64], short_lookback: usize) -> Trendline {
    let (slope, intercept) = linear_fit(closes);
    let residuals: Vec<f64> = closes
        .iter()
        .enumerate()
        .map(|(i, y)| y - (slope * i as f64 + intercept))
        .collect();

    let mean_close = mean(closes);
    let strength = if mean_close != 0.0 {
        100.0 - std_dev(&residuals) / mean_close * 100.0
    } else {
        0.0
    };

    let (short_slope, _) = linear_fit(last(closes, short_lookback));

    Trendline {
        slope: slope * SLOPE_SCALE,
        strength,
        acceleration: (short_slope - slope) * SLOPE_SCALE,
    }
}

// ============================================================
// Wicks: sweeps and rejection
// ============================================================

/// Candles whose combined wick is a `mean + 2.5σ` outlier mark the sweep.
fn liquidity_sweep(window: &[Candle], latest_close: f64, lookback: usize) -> LiquiditySweep {
    let wicks: Vec<f64> = window.iter().map(|c| c.total_wick()).collect();
    let threshold = mean(&wicks) + SWEEP_SIGMA * std_dev(&wicks);

    let swept: Vec<f64> = window
        .iter()
        .zip(&wicks)
        .filter(|(_, w)| **w > threshold)
        .map(|(c, _)| (c.high + c.low) / 2.0)
        .collect();

    if swept.is_empty() {
        return LiquiditySweep::default();
    }

    let level = mean(&swept);
    LiquiditySweep {
        level,
        direction: Some(if latest_close > level {
            Trend::Bullish
        } else {
            Trend::Bearish
        }),
        confidence: (swept.len() as f64 / lookback as f64 * SWEEP_CONFIDENCE_SCALE).min(100.0),
    }
}

/// Recent wick-to-range ratio ×100, boosted when the last move was impulsive.
fn rejection_intensity(window: &[Candle], returns: &[f64]) -> f64 {
    let recent = tail(window, RECENT_WINDOW);
    let ranges: Vec<f64> = recent.iter().map(|c| c.range()).collect();
    if mean(&ranges) == 0.0 {
        return 0.0;
    }

    let ratios: Vec<f64> = recent
        .iter()
        .map(|c| {
            if c.range() != 0.0 {
                c.total_wick() / c.range()
            } else {
                0.0
            }
        })
        .collect();
    let mut intensity = mean(&ratios) * 100.0;

    if let Some(latest) = returns.last() {
        if latest.abs() > std_dev(returns) * IMPULSIVE_SIGMA {
            intensity *= IMPULSIVE_BOOST;
        }
    }
    intensity
}

// ============================================================
// Consolidation & Impulse
// ============================================================

/// Low range dispersion in the short window plus a spike in the last
/// three ranges.
fn consolidation_breakout_potential(ranges: &[f64], short_lookback: usize) -> f64 {
    let short = last(ranges, short_lookback);
    let short_mean = mean(short);
    let dispersion = if short_mean != 0.0 {
        std_dev(short) / short_mean
    } else {
        0.0
    };

    let mean_range = mean(ranges);
    let spike = if mean_range != 0.0 {
        max(last(ranges, SPIKE_WINDOW)) / mean_range * 50.0
    } else {
        0.0
    };

    100.0 - dispersion * 100.0 + spike
}

/// Running sum of returns that continue the previous return's direction.
/// The first return is compared with the last one (wrap-around).
fn impulse_wave_strength(returns: &[f64], short_lookback: usize) -> f64 {
    let n = returns.len();
    if n < short_lookback || n == 0 {
        return 0.0;
    }

    let mut running = 0.0;
    let cumulative: Vec<f64> = (0..n)
        .map(|i| {
            let prev = returns[(i + n - 1) % n];
            if sign(returns[i]) == sign(prev) {
                running += returns[i];
            }
            running
        })
        .collect();

    last(&cumulative, short_lookback)
        .iter()
        .fold(0.0, |acc: f64, v| acc.max(v.abs()))
}

// ============================================================
// Levels
// ============================================================

/// 100 when the close sits exactly on a retracement level of the window's
/// high-low range, falling linearly with distance.
fn fibonacci_confluence(latest_close: f64, highs: &[f64], lows: &[f64]) -> f64 {
    let low = min(lows);
    let range = max(highs) - low;
    if range == 0.0 {
        return 0.0;
    }

    let nearest = FIBONACCI_RATIOS
        .iter()
        .map(|ratio| (latest_close - (low + range * ratio)).abs())
        .fold(f64::INFINITY, f64::min);

    100.0 - nearest / range * 100.0
}

/// Mean typical price of the short window, scaled up by ATR relative to
/// the mean close.
fn volatility_adjusted_pivot(window: &[Candle], closes: &[f64], short_lookback: usize) -> f64 {
    let atr = mean(&true_ranges(window));
    let mean_close = mean(closes);
    let scale = if mean_close != 0.0 {
        1.0 + atr / mean_close
    } else {
        1.0
    };

    let pivots: Vec<f64> = tail(window, short_lookback)
        .iter()
        .map(|c| c.typical_price())
        .collect();
    mean(&pivots) * scale
}

/// Raw short-window price change against summed step momentum, in units of
/// the window's close stddev ×100.
fn momentum_divergence(closes: &[f64], short_lookback: usize) -> f64 {
    let std = std_dev(closes);
    if std == 0.0 {
        return 0.0;
    }

    let short = last(closes, short_lookback);
    let price_trend = short[short.len() - 1] - short[0];
    let momentum_trend: f64 = pct_returns(short).iter().sum();

    (price_trend - momentum_trend).abs() / std * 100.0
}
