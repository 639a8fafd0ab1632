// ============================================================
// ict.rs — Institutional Concepts
// Fair value gaps, session kill zones, power of three
// ============================================================

use crate::smc::first_gap;
use crate::stats::{last, max, min};
use crate::{extract_high, extract_low, tail, Candle, Trend};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

const SCAN_WINDOW: usize = 10;
const POWER_OF_THREE_WINDOW: usize = 20;

pub const FAIR_VALUE_GAP_CONFIDENCE: f64 = 90.0;
pub const KILL_ZONE_CONFIDENCE: f64 = 95.0;
pub const POWER_OF_THREE_CONFIDENCE: f64 = 85.0;

pub const NO_KILL_ZONE: &str = "No Kill Zone";
pub const NO_POWER_OF_THREE: &str = "No POT";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Session {
    London,
    NewYork,
}

/// UTC hour windows, start inclusive, end exclusive.
pub const KILL_ZONES: [(u32, u32, Session); 2] = [
    (7, 11, Session::London),
    (13, 17, Session::NewYork),
];

impl Session {
    pub fn label(&self) -> &'static str {
        match self {
            Session::London => "London Kill Zone",
            Session::NewYork => "NY Kill Zone",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct FairValueGap {
    pub level: Option<f64>,
    pub direction: Option<Trend>,
    pub detected: bool,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct KillZone {
    pub active: bool,
    pub session: Option<Session>,
    pub confidence: f64,
}

impl KillZone {
    pub fn label(&self) -> &'static str {
        self.session.map_or(NO_KILL_ZONE, |s| s.label())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerOfThree {
    pub pattern: Option<Trend>,
    pub confidence: f64,
}

impl PowerOfThree {
    pub fn label(&self) -> &'static str {
        match self.pattern {
            Some(Trend::Bullish) => "Bullish Power of Three",
            Some(Trend::Bearish) => "Bearish Power of Three",
            None => NO_POWER_OF_THREE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct IctAnalysis {
    pub fair_value_gap: FairValueGap,
    pub kill_zone: KillZone,
    pub power_of_three: PowerOfThree,
}

/// `now` is epoch seconds; only its UTC hour is read.
pub fn analyze_ict(candles: &[Candle], now: i64, lookback: usize) -> IctAnalysis {
    if lookback < POWER_OF_THREE_WINDOW || candles.len() < lookback {
        return IctAnalysis::default();
    }

    let window = tail(candles, lookback);

    IctAnalysis {
        fair_value_gap: fair_value_gap(tail(window, SCAN_WINDOW)),
        kill_zone: kill_zone(now),
        power_of_three: power_of_three(tail(window, POWER_OF_THREE_WINDOW)),
    }
}

/// Same three-candle geometry as the SMC imbalance, plus the third close
/// must move away from the first in the gap direction.
fn fair_value_gap(scan: &[Candle]) -> FairValueGap {
    let gap = first_gap(scan, |direction, first, third| match direction {
        Trend::Bullish => third.close > first.close,
        Trend::Bearish => third.close < first.close,
    });

    match gap {
        Some(gap) => FairValueGap {
            level: Some(gap.level),
            direction: Some(gap.direction),
            detected: true,
            confidence: FAIR_VALUE_GAP_CONFIDENCE,
        },
        None => FairValueGap::default(),
    }
}

/// Session window containing the UTC hour of `now`, if any.
pub fn kill_zone(now: i64) -> KillZone {
    let hour = match DateTime::<Utc>::from_timestamp(now, 0) {
        Some(dt) => dt.hour(),
        None => return KillZone::default(),
    };

    KILL_ZONES
        .iter()
        .find(|(start, end, _)| (*start..*end).contains(&hour))
        .map_or_else(KillZone::default, |(_, _, session)| KillZone {
            active: true,
            session: Some(*session),
            confidence: KILL_ZONE_CONFIDENCE,
        })
}

/// Compares the newest 10/5 candle extremes with the older part of a
/// 20-candle window.
fn power_of_three(window: &[Candle]) -> PowerOfThree {
    let highs = extract_high(window);
    let lows = extract_low(window);
    let n = window.len();

    let bullish = min(last(&lows, 10)) < min(&lows[..n - 10])
        && max(last(&highs, 5)) > max(&highs[..n - 5]);
    let bearish = max(last(&highs, 10)) > max(&highs[..n - 10])
        && min(last(&lows, 5)) < min(&lows[..n - 5]);

    let pattern = if bullish {
        Some(Trend::Bullish)
    } else if bearish {
        Some(Trend::Bearish)
    } else {
        None
    };

    PowerOfThree {
        pattern,
        confidence: if pattern.is_some() {
            POWER_OF_THREE_CONFIDENCE
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{flat, rising};

    /// 2024-01-01 00:00:00 UTC
    const MIDNIGHT: i64 = 1_704_067_200;

    fn at_hour(hour: i64) -> i64 {
        MIDNIGHT + hour * 3600 + 17 * 60
    }

    #[test]
    fn test_short_window_is_empty() {
        let result = analyze_ict(&rising(49), at_hour(8), 50);
        assert_eq!(result, IctAnalysis::default());
        assert!(!result.kill_zone.active);
        assert_eq!(result.power_of_three.label(), "No POT");
    }

    #[test]
    fn test_kill_zone_windows() {
        let london = kill_zone(at_hour(8));
        assert!(london.active);
        assert_eq!(london.label(), "London Kill Zone");
        assert_eq!(london.confidence, 95.0);

        let ny = kill_zone(at_hour(13));
        assert_eq!(ny.session, Some(Session::NewYork));

        for hour in [0, 6, 11, 12, 17, 23] {
            let kz = kill_zone(at_hour(hour));
            assert!(!kz.active, "hour {hour} should be inactive");
            assert_eq!(kz.label(), "No Kill Zone");
            assert_eq!(kz.confidence, 0.0);
        }
    }

    #[test]
    fn test_kill_zone_through_analyzer() {
        let candles = flat(50, 1.0);
        let kz = analyze_ict(&candles, at_hour(8), 50).kill_zone;
        assert_eq!(
            kz,
            KillZone {
                active: true,
                session: Some(Session::London),
                confidence: 95.0
            }
        );
        assert!(!analyze_ict(&candles, at_hour(12), 50).kill_zone.active);
    }

    #[test]
    fn test_bullish_fair_value_gap() {
        let mut candles = flat(50, 10.0);
        let base = candles.len() - 10;
        candles[base + 2] = Candle::new(0, 10.0, 10.2, 10.0, 10.1);
        candles[base + 4] = Candle::new(0, 10.5, 10.8, 10.4, 10.7);
        let fvg = analyze_ict(&candles, MIDNIGHT, 50).fair_value_gap;
        assert!(fvg.detected);
        assert_eq!(fvg.direction, Some(Trend::Bullish));
        assert_eq!(fvg.level, Some((10.2 + 10.4) / 2.0));
        assert_eq!(fvg.confidence, 90.0);
    }

    #[test]
    fn test_oldest_confirmed_gap_wins() {
        let mut candles = flat(50, 10.0);
        let base = candles.len() - 10;
        candles[base + 7] = Candle::new(0, 11.0, 11.3, 10.9, 11.2);

        let newer = analyze_ict(&candles, MIDNIGHT, 50).fair_value_gap;
        assert_eq!(newer.level, Some((10.0 + 10.9) / 2.0));

        candles[base + 3] = Candle::new(0, 10.5, 10.8, 10.4, 10.7);
        let fvg = analyze_ict(&candles, MIDNIGHT, 50).fair_value_gap;
        assert_eq!(fvg.direction, Some(Trend::Bullish));
        assert_eq!(fvg.level, Some((10.0 + 10.4) / 2.0));
    }

    #[test]
    fn test_bearish_fair_value_gap() {
        let mut candles = flat(50, 10.0);
        let base = candles.len() - 10;
        candles[base + 4] = Candle::new(0, 9.5, 9.6, 9.2, 9.3);
        let fvg = analyze_ict(&candles, MIDNIGHT, 50).fair_value_gap;
        assert!(fvg.detected);
        assert_eq!(fvg.direction, Some(Trend::Bearish));
        assert_eq!(fvg.level, Some((10.0 + 9.6) / 2.0));
        assert_eq!(fvg.confidence, 90.0);
    }

    #[test]
    fn test_gap_without_close_confirmation_is_ignored() {
        let mut candles = flat(50, 10.0);
        let base = candles.len() - 10;
        // gap up in lows but the third candle closes below the first
        candles[base + 2] = Candle::new(0, 10.0, 10.2, 9.0, 11.0);
        candles[base + 4] = Candle::new(0, 10.5, 10.8, 10.4, 10.5);
        assert!(!analyze_ict(&candles, MIDNIGHT, 50).fair_value_gap.detected);
    }

    #[test]
    fn test_bullish_power_of_three() {
        let mut candles = flat(50, 10.0);
        for c in candles.iter_mut() {
            c.high = 10.5;
            c.low = 9.5;
        }
        let n = candles.len();
        // manipulation low in the newer half, distribution high at the end
        candles[n - 8].low = 9.0;
        candles[n - 2].high = 11.0;
        let pot = analyze_ict(&candles, MIDNIGHT, 50).power_of_three;
        assert_eq!(pot.pattern, Some(Trend::Bullish));
        assert_eq!(pot.label(), "Bullish Power of Three");
        assert_eq!(pot.confidence, 85.0);
    }

    #[test]
    fn test_bearish_power_of_three() {
        let mut candles = flat(50, 10.0);
        for c in candles.iter_mut() {
            c.high = 10.5;
            c.low = 9.5;
        }
        let n = candles.len();
        candles[n - 8].high = 11.0;
        candles[n - 2].low = 9.0;
        let pot = analyze_ict(&candles, MIDNIGHT, 50).power_of_three;
        assert_eq!(pot.pattern, Some(Trend::Bearish));
    }
}
