//! Candlestick reversal patterns over the last three candles.
//!
//! Checks run in a fixed priority order and the first pattern whose
//! geometry matches wins. The geometric thresholds are the pattern
//! definitions themselves, not tuning knobs.

use crate::{Candle, Trend};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    BullishHammer,
    BearishShootingStar,
    MorningStar,
    EveningStar,
    BullishEngulfing,
    BearishEngulfing,
}

/// Scan order; the first match is reported.
pub const PATTERN_PRIORITY: [PatternKind; 6] = [
    PatternKind::BullishHammer,
    PatternKind::BearishShootingStar,
    PatternKind::MorningStar,
    PatternKind::EveningStar,
    PatternKind::BullishEngulfing,
    PatternKind::BearishEngulfing,
];

/// Label used when nothing matched.
pub const NO_PATTERN: &str = "N/A";

impl PatternKind {
    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::BullishHammer => "Bullish Hammer",
            PatternKind::BearishShootingStar => "Bearish Shooting Star",
            PatternKind::MorningStar => "Morning Star",
            PatternKind::EveningStar => "Evening Star",
            PatternKind::BullishEngulfing => "Bullish Engulfing",
            PatternKind::BearishEngulfing => "Bearish Engulfing",
        }
    }

    /// Fixed confidence per pattern.
    pub fn confidence(&self) -> f64 {
        match self {
            PatternKind::BullishHammer | PatternKind::BearishShootingStar => 85.0,
            PatternKind::MorningStar | PatternKind::EveningStar => 90.0,
            PatternKind::BullishEngulfing | PatternKind::BearishEngulfing => 80.0,
        }
    }

    /// Reversal direction the pattern points to.
    pub fn bias(&self) -> Trend {
        match self {
            PatternKind::BullishHammer | PatternKind::MorningStar | PatternKind::BullishEngulfing => {
                Trend::Bullish
            }
            PatternKind::BearishShootingStar
            | PatternKind::EveningStar
            | PatternKind::BearishEngulfing => Trend::Bearish,
        }
    }

    /// Geometry check against `[first, middle, last]`.
    pub fn matches(&self, window: &[Candle; 3]) -> bool {
        let [first, middle, last] = window;
        match self {
            PatternKind::BullishHammer => {
                last.close > last.open
                    && (last.high - last.close) > 2.0 * last.body()
                    && (last.open - last.low) < last.body() * 0.3
                    && last.body() < last.range() * 0.3
            }
            PatternKind::BearishShootingStar => {
                last.close < last.open
                    && (last.high - last.open) > 2.0 * last.body()
                    && (last.close - last.low) < last.body() * 0.3
                    && last.body() < last.range() * 0.3
            }
            PatternKind::MorningStar => {
                first.close < first.open
                    && middle.body() < middle.range() * 0.3
                    && last.close > last.open
                    && last.close > (first.open + first.close) / 2.0
                    && middle.low < first.low
            }
            PatternKind::EveningStar => {
                first.close > first.open
                    && middle.body() < middle.range() * 0.3
                    && last.close < last.open
                    && last.close < (first.open + first.close) / 2.0
                    && middle.high > first.high
            }
            PatternKind::BullishEngulfing => {
                middle.close < middle.open
                    && last.close > last.open
                    && last.close > middle.open
                    && last.open < middle.close
            }
            PatternKind::BearishEngulfing => {
                middle.close > middle.open
                    && last.close < last.open
                    && last.close < middle.open
                    && last.open > middle.close
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct PatternMatch {
    pub kind: Option<PatternKind>,
}

impl PatternMatch {
    pub fn name(&self) -> &'static str {
        self.kind.map_or(NO_PATTERN, |k| k.name())
    }

    pub fn confidence(&self) -> f64 {
        self.kind.map_or(0.0, |k| k.confidence())
    }

    pub fn bias(&self) -> Option<Trend> {
        self.kind.map(|k| k.bias())
    }
}

/// First pattern in [`PATTERN_PRIORITY`] matching the last three candles.
pub fn detect_pattern(candles: &[Candle]) -> PatternMatch {
    if candles.len() < 3 {
        return PatternMatch::default();
    }

    let n = candles.len();
    let window = [candles[n - 3], candles[n - 2], candles[n - 1]];

    PatternMatch {
        kind: PATTERN_PRIORITY
            .iter()
            .copied()
            .find(|kind| kind.matches(&window)),
    }
}
