use thiserror::Error;

/// Contract violations in how the scoring core was configured.
///
/// Short candle windows are not errors; every analyzer degrades to its
/// neutral result instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("{name} must be at least {min}, got {value}")]
    PeriodTooSmall {
        name: &'static str,
        min: usize,
        value: usize,
    },

    #[error("short lookback {short} must not exceed lookback {lookback}")]
    ShortLookbackTooLong { short: usize, lookback: usize },

    #[error("{fast_name} period {fast} must be below {slow_name} period {slow}")]
    PeriodOrder {
        fast_name: &'static str,
        fast: usize,
        slow_name: &'static str,
        slow: usize,
    },

    #[error("{name} reads {needed} candles but lookback is only {lookback}")]
    PeriodExceedsLookback {
        name: &'static str,
        needed: usize,
        lookback: usize,
    },

    #[error("band width multiplier must be positive and finite, got {0}")]
    InvalidMultiplier(f64),
}
