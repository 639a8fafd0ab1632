use crate::error::SignalError;
use serde::{Deserialize, Serialize};

/// Window lengths and indicator periods used by one evaluation.
///
/// Missing fields fall back to the defaults when deserialized, so a
/// partial `[analysis]` table in a config file is fine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Trailing window read by the psychology, SMC, ICT and price-action analyzers.
    pub lookback: usize,
    /// Secondary window used by price action.
    pub short_lookback: usize,
    pub ema_short_period: usize,
    pub ema_long_period: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_multiplier: f64,
    pub atr_period: usize,
    pub adx_period: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            lookback: 50,
            short_lookback: 10,
            ema_short_period: 10,
            ema_long_period: 50,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_multiplier: 2.0,
            atr_period: 14,
            adx_period: 14,
        }
    }
}

/// Smallest lookback the structural analyzers can slice into
/// (SMC trend and ICT power-of-three both read the last 20 candles).
pub const MIN_LOOKBACK: usize = 20;

/// Price action needs at least two steps inside the short window.
pub const MIN_SHORT_LOOKBACK: usize = 3;

fn at_least(name: &'static str, value: usize, min: usize) -> Result<(), SignalError> {
    if value < min {
        return Err(SignalError::PeriodTooSmall { name, min, value });
    }
    Ok(())
}

fn strictly_below(
    fast_name: &'static str,
    fast: usize,
    slow_name: &'static str,
    slow: usize,
) -> Result<(), SignalError> {
    if fast >= slow {
        return Err(SignalError::PeriodOrder {
            fast_name,
            fast,
            slow_name,
            slow,
        });
    }
    Ok(())
}

/// An indicator must not read further back than the window the engine
/// guarantees, or it silently degrades to its neutral value.
fn within_lookback(name: &'static str, needed: usize, lookback: usize) -> Result<(), SignalError> {
    if needed > lookback {
        return Err(SignalError::PeriodExceedsLookback {
            name,
            needed,
            lookback,
        });
    }
    Ok(())
}

impl AnalysisOptions {
    /// Reject configurations that would make an analyzer slice out of
    /// bounds or divide by a zero period.
    pub fn validate(&self) -> Result<(), SignalError> {
        at_least("lookback", self.lookback, MIN_LOOKBACK)?;
        at_least("short_lookback", self.short_lookback, MIN_SHORT_LOOKBACK)?;
        if self.short_lookback > self.lookback {
            return Err(SignalError::ShortLookbackTooLong {
                short: self.short_lookback,
                lookback: self.lookback,
            });
        }

        at_least("ema_short_period", self.ema_short_period, 1)?;
        strictly_below(
            "ema_short",
            self.ema_short_period,
            "ema_long",
            self.ema_long_period,
        )?;

        at_least("rsi_period", self.rsi_period, 2)?;

        at_least("macd_fast", self.macd_fast, 1)?;
        at_least("macd_signal", self.macd_signal, 1)?;
        strictly_below("macd_fast", self.macd_fast, "macd_slow", self.macd_slow)?;

        at_least("bb_period", self.bb_period, 1)?;
        if !(self.bb_multiplier.is_finite() && self.bb_multiplier > 0.0) {
            return Err(SignalError::InvalidMultiplier(self.bb_multiplier));
        }

        at_least("atr_period", self.atr_period, 1)?;
        at_least("adx_period", self.adx_period, 1)?;

        let lookback = self.lookback;
        within_lookback("ema_long_period", self.ema_long_period, lookback)?;
        within_lookback("rsi_period", self.rsi_period + 1, lookback)?;
        within_lookback("macd_slow", self.macd_slow + self.macd_signal - 1, lookback)?;
        within_lookback("bb_period", self.bb_period, lookback)?;
        within_lookback("atr_period", self.atr_period + 1, lookback)?;
        within_lookback("adx_period", self.adx_period + 1, lookback)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(AnalysisOptions::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_lookback_rejected() {
        let opts = AnalysisOptions {
            lookback: 0,
            ..Default::default()
        };
        assert_eq!(
            opts.validate(),
            Err(SignalError::PeriodTooSmall {
                name: "lookback",
                min: MIN_LOOKBACK,
                value: 0
            })
        );
    }

    #[test]
    fn test_short_lookback_longer_than_lookback_rejected() {
        let opts = AnalysisOptions {
            lookback: 20,
            short_lookback: 25,
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(SignalError::ShortLookbackTooLong { .. })
        ));
    }

    #[test]
    fn test_macd_order_rejected() {
        let opts = AnalysisOptions {
            macd_fast: 26,
            macd_slow: 12,
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(SignalError::PeriodOrder { .. })));
    }

    fn exceeds(name: &'static str, needed: usize, lookback: usize) -> Result<(), SignalError> {
        Err(SignalError::PeriodExceedsLookback {
            name,
            needed,
            lookback,
        })
    }

    #[test]
    fn test_ema_long_beyond_lookback_rejected() {
        let opts = AnalysisOptions {
            lookback: 30,
            ..Default::default()
        };
        assert_eq!(opts.validate(), exceeds("ema_long_period", 50, 30));
    }

    #[test]
    fn test_rsi_needs_one_extra_candle() {
        let opts = AnalysisOptions {
            lookback: 30,
            ema_long_period: 30,
            rsi_period: 30,
            ..Default::default()
        };
        assert_eq!(opts.validate(), exceeds("rsi_period", 31, 30));

        let opts = AnalysisOptions {
            rsi_period: 29,
            ..opts
        };
        assert!(!matches!(
            opts.validate(),
            Err(SignalError::PeriodExceedsLookback {
                name: "rsi_period",
                ..
            })
        ));
    }

    #[test]
    fn test_macd_history_beyond_lookback_rejected() {
        // 26 + 9 - 1 = 34 candles for the signal line
        let opts = AnalysisOptions {
            lookback: 30,
            ema_long_period: 30,
            ..Default::default()
        };
        assert_eq!(opts.validate(), exceeds("macd_slow", 34, 30));
    }

    #[test]
    fn test_bollinger_beyond_lookback_rejected() {
        let opts = AnalysisOptions {
            bb_period: 51,
            ..Default::default()
        };
        assert_eq!(opts.validate(), exceeds("bb_period", 51, 50));
    }

    #[test]
    fn test_atr_and_adx_need_one_extra_candle() {
        let opts = AnalysisOptions {
            atr_period: 50,
            ..Default::default()
        };
        assert_eq!(opts.validate(), exceeds("atr_period", 51, 50));

        let opts = AnalysisOptions {
            adx_period: 50,
            ..Default::default()
        };
        assert_eq!(opts.validate(), exceeds("adx_period", 51, 50));

        let opts = AnalysisOptions {
            atr_period: 49,
            adx_period: 49,
            ..Default::default()
        };
        assert_eq!(opts.validate(), Ok(()));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let opts: AnalysisOptions = serde_json::from_str(r#"{"lookback": 60}"#).unwrap();
        assert_eq!(opts.lookback, 60);
        assert_eq!(opts.short_lookback, 10);
        assert_eq!(opts.rsi_period, 14);
    }
}
