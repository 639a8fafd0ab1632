// ============================================================
// aggregator.rs — Composite Signal Scoring
// Direction from EMA ordering, confidence from a fixed rule table
// ============================================================

use crate::error::SignalError;
use crate::ict::{analyze_ict, IctAnalysis, NO_KILL_ZONE, NO_POWER_OF_THREE};
use crate::indicators::{adx, atr, bollinger_bands, ema, macd, rsi, BollingerBands, Macd};
use crate::options::AnalysisOptions;
use crate::patterns::{detect_pattern, PatternMatch, NO_PATTERN};
use crate::price_action::{analyze_price_action, PriceActionAnalysis};
use crate::psychology::{analyze_candle_psychology, CandlePsychology, Sentiment};
use crate::smc::{analyze_smc, SmcAnalysis};
use crate::{Candle, Trend};
use serde::{Deserialize, Serialize};

// ============================================================
// Direction
// ============================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Call,
    Put,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Call => "call",
            Direction::Put => "put",
        }
    }

    pub fn trend(&self) -> Trend {
        match self {
            Direction::Call => Trend::Bullish,
            Direction::Put => Trend::Bearish,
        }
    }

    fn sentiment(&self) -> Sentiment {
        match self {
            Direction::Call => Sentiment::Bullish,
            Direction::Put => Sentiment::Bearish,
        }
    }
}

// ============================================================
// Rule table
// ============================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum Weight {
    /// Constant points, negative for penalties.
    Fixed(f64),
    /// `min(cap, |metric| * factor)`
    Scaled { factor: f64, cap: f64 },
}

impl Weight {
    pub fn points(&self, metric: f64) -> f64 {
        match *self {
            Weight::Fixed(points) => points,
            Weight::Scaled { factor, cap } => (metric.abs() * factor).min(cap),
        }
    }
}

/// Every condition that can move the confidence score.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreRule {
    EmaAlignment,
    RsiExtreme,
    MacdMomentum,
    BollingerRoom,
    AdxTrending,
    AtrActive,
    TrendPersistence,
    ReversalStrength,
    VolatilityClustering,
    Exhaustion,
    FractalMomentum,
    MtfCorrelation,
    PsychologicalPressure,
    CandleEntropy,
    OrderBlock,
    LiquidityGrab,
    Imbalance,
    FairValueGap,
    KillZone,
    PowerOfThree,
    Pattern,
    SupplyDemand,
    Breakout,
    Trendline,
    LiquiditySweep,
    Rejection,
    Consolidation,
    Impulse,
    Fibonacci,
    MomentumDivergence,
}

const fn scaled(factor: f64, cap: f64) -> Weight {
    Weight::Scaled { factor, cap }
}

impl ScoreRule {
    pub fn weight(&self) -> Weight {
        use ScoreRule::*;
        match self {
            EmaAlignment => Weight::Fixed(10.0),
            RsiExtreme => Weight::Fixed(8.0),
            MacdMomentum => Weight::Fixed(10.0),
            BollingerRoom => Weight::Fixed(8.0),
            AdxTrending => Weight::Fixed(8.0),
            AtrActive => Weight::Fixed(8.0),
            TrendPersistence => scaled(0.3, 15.0),
            ReversalStrength => scaled(0.15, 10.0),
            VolatilityClustering => scaled(0.15, 8.0),
            Exhaustion => scaled(0.15, 10.0),
            FractalMomentum => scaled(3.0, 8.0),
            MtfCorrelation => scaled(0.15, 10.0),
            PsychologicalPressure => scaled(0.15, 8.0),
            CandleEntropy => Weight::Fixed(8.0),
            OrderBlock => scaled(0.2, 15.0),
            LiquidityGrab => scaled(0.15, 10.0),
            Imbalance => scaled(0.15, 10.0),
            FairValueGap => scaled(0.2, 15.0),
            KillZone => scaled(0.15, 10.0),
            PowerOfThree => scaled(0.15, 10.0),
            Pattern => scaled(0.2, 15.0),
            SupplyDemand => scaled(0.2, 15.0),
            Breakout => scaled(0.2, 15.0),
            Trendline => scaled(0.15, 10.0),
            LiquiditySweep => scaled(0.2, 15.0),
            Rejection => scaled(0.15, 10.0),
            Consolidation => scaled(0.15, 10.0),
            Impulse => scaled(2.0, 10.0),
            Fibonacci => Weight::Fixed(10.0),
            MomentumDivergence => Weight::Fixed(-10.0),
        }
    }
}

// Thresholds the rule predicates compare against.
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const MIN_BANDWIDTH: f64 = 0.015;
const ADX_TRENDING: f64 = 25.0;
const ATR_ACTIVE_RATIO: f64 = 0.005;
const PERSISTENCE_THRESHOLD: f64 = 50.0;
const REVERSAL_THRESHOLD: f64 = 70.0;
const CLUSTERING_THRESHOLD: f64 = 60.0;
const EXHAUSTION_THRESHOLD: f64 = 80.0;
const FRACTAL_THRESHOLD: f64 = 1.5;
const MTF_THRESHOLD: f64 = 70.0;
const PRESSURE_THRESHOLD: f64 = 60.0;
const ENTROPY_THRESHOLD: f64 = 70.0;
const BREAKOUT_THRESHOLD: f64 = 50.0;
const TRENDLINE_STRENGTH_THRESHOLD: f64 = 70.0;
const REJECTION_THRESHOLD: f64 = 70.0;
const CONSOLIDATION_THRESHOLD: f64 = 80.0;
const IMPULSE_THRESHOLD: f64 = 5.0;
const FIBONACCI_THRESHOLD: f64 = 80.0;
const DIVERGENCE_THRESHOLD: f64 = 50.0;

// ============================================================
// Signal
// ============================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub rule: ScoreRule,
    pub points: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Signal {
    pub direction: Option<Direction>,
    /// 0..=100
    pub confidence: f64,
    pub pattern_label: String,
    pub kill_zone_label: String,
    pub power_of_three_label: String,
    /// Fired rules in evaluation order.
    pub contributions: Vec<Contribution>,
}

impl Signal {
    pub fn neutral() -> Self {
        Self {
            direction: None,
            confidence: 0.0,
            pattern_label: NO_PATTERN.to_string(),
            kill_zone_label: NO_KILL_ZONE.to_string(),
            power_of_three_label: NO_POWER_OF_THREE.to_string(),
            contributions: Vec::new(),
        }
    }

    /// A directionless signal is never tradeable, whatever its score.
    pub fn is_tradeable(&self, min_confidence: f64) -> bool {
        self.direction.is_some() && self.confidence >= min_confidence
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Accumulates fired rules.
struct Scorecard {
    contributions: Vec<Contribution>,
}

impl Scorecard {
    fn new() -> Self {
        Self {
            contributions: Vec::new(),
        }
    }

    fn award(&mut self, rule: ScoreRule, metric: f64) {
        self.contributions.push(Contribution {
            rule,
            points: rule.weight().points(metric),
        });
    }

    fn award_if(&mut self, condition: bool, rule: ScoreRule, metric: f64) {
        if condition {
            self.award(rule, metric);
        }
    }

    fn total(&self) -> f64 {
        let sum: f64 = self.contributions.iter().map(|c| c.points).sum();
        sum.clamp(0.0, 100.0)
    }
}

// ============================================================
// Engine
// ============================================================

/// Validated options plus the scoring pipeline.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    options: AnalysisOptions,
}

impl SignalEngine {
    pub fn new(options: AnalysisOptions) -> Result<Self, SignalError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Scores the trailing window of `candles`. `now` is epoch seconds and
    /// only feeds the kill-zone check.
    pub fn evaluate(&self, candles: &[Candle], now: i64) -> Signal {
        let o = &self.options;
        if candles.len() < o.lookback {
            return Signal::neutral();
        }

        score(&Readings {
            latest_close: candles[candles.len() - 1].close,
            ema_short: ema(candles, o.ema_short_period),
            ema_long: ema(candles, o.ema_long_period),
            rsi: rsi(candles, o.rsi_period),
            macd: macd(candles, o.macd_fast, o.macd_slow, o.macd_signal),
            bb: bollinger_bands(candles, o.bb_period, o.bb_multiplier),
            atr: atr(candles, o.atr_period),
            adx: adx(candles, o.adx_period),
            psych: analyze_candle_psychology(candles, o.lookback),
            smc: analyze_smc(candles, o.lookback),
            ict: analyze_ict(candles, now, o.lookback),
            pa: analyze_price_action(candles, o.lookback, o.short_lookback),
            pattern: detect_pattern(candles),
        })
    }
}

/// Every analyzer output the rule table reads.
#[derive(Debug, Clone, Copy, Default)]
struct Readings {
    latest_close: f64,
    ema_short: f64,
    ema_long: f64,
    rsi: f64,
    macd: Macd,
    bb: BollingerBands,
    atr: f64,
    adx: f64,
    psych: CandlePsychology,
    smc: SmcAnalysis,
    ict: IctAnalysis,
    pa: PriceActionAnalysis,
    pattern: PatternMatch,
}

fn score(r: &Readings) -> Signal {
    let Readings {
        latest_close,
        ema_short,
        ema_long,
        rsi,
        macd,
        bb,
        atr,
        adx,
        psych,
        smc,
        ict,
        pa,
        pattern,
    } = *r;

    let mut card = Scorecard::new();

    // --- Indicators: direction is fixed here and never changes ---
    let direction = if latest_close > ema_short && ema_short > ema_long {
        Some(Direction::Call)
    } else if latest_close < ema_short && ema_short < ema_long {
        Some(Direction::Put)
    } else {
        None
    };
    card.award_if(direction.is_some(), ScoreRule::EmaAlignment, 0.0);

    let call = direction == Some(Direction::Call);
    let put = direction == Some(Direction::Put);
    let with_trend = |trend: Option<Trend>| trend.is_some() && trend == direction.map(|d| d.trend());
    let with_sentiment = direction.is_some_and(|d| psych.sentiment == d.sentiment());

    card.award_if(
        (call && rsi < RSI_OVERSOLD) || (put && rsi > RSI_OVERBOUGHT),
        ScoreRule::RsiExtreme,
        rsi,
    );
    card.award_if(
        (call && macd.line > macd.signal && macd.histogram > 0.0)
            || (put && macd.line < macd.signal && macd.histogram < 0.0),
        ScoreRule::MacdMomentum,
        macd.histogram,
    );
    card.award_if(
        bb.bandwidth > MIN_BANDWIDTH
            && ((call && latest_close < bb.upper) || (put && latest_close > bb.lower)),
        ScoreRule::BollingerRoom,
        bb.bandwidth,
    );
    card.award_if(adx > ADX_TRENDING, ScoreRule::AdxTrending, adx);
    card.award_if(atr > bb.middle * ATR_ACTIVE_RATIO, ScoreRule::AtrActive, atr);

    // --- Candle psychology ---
    card.award_if(
        (call && psych.trend_persistence > PERSISTENCE_THRESHOLD)
            || (put && psych.trend_persistence < -PERSISTENCE_THRESHOLD),
        ScoreRule::TrendPersistence,
        psych.trend_persistence,
    );
    card.award_if(
        psych.reversal_strength > REVERSAL_THRESHOLD && with_sentiment,
        ScoreRule::ReversalStrength,
        psych.reversal_strength,
    );
    card.award_if(
        psych.volatility_clustering > CLUSTERING_THRESHOLD,
        ScoreRule::VolatilityClustering,
        psych.volatility_clustering,
    );
    card.award_if(
        psych.exhaustion_signal > EXHAUSTION_THRESHOLD && with_sentiment,
        ScoreRule::Exhaustion,
        psych.exhaustion_signal,
    );
    card.award_if(
        (call && psych.fractal_momentum > FRACTAL_THRESHOLD)
            || (put && psych.fractal_momentum < -FRACTAL_THRESHOLD),
        ScoreRule::FractalMomentum,
        psych.fractal_momentum,
    );
    card.award_if(
        (call && psych.mtf_correlation > MTF_THRESHOLD)
            || (put && psych.mtf_correlation < -MTF_THRESHOLD),
        ScoreRule::MtfCorrelation,
        psych.mtf_correlation,
    );
    card.award_if(
        psych.psychological_pressure > PRESSURE_THRESHOLD,
        ScoreRule::PsychologicalPressure,
        psych.psychological_pressure,
    );
    card.award_if(
        psych.candle_entropy > ENTROPY_THRESHOLD,
        ScoreRule::CandleEntropy,
        psych.candle_entropy,
    );

    // --- Smart money structure ---
    let ob = smc.order_block;
    card.award_if(
        with_trend(ob.kind) && ob.level.is_some_and(|level| (latest_close - level).abs() < atr),
        ScoreRule::OrderBlock,
        ob.confidence,
    );
    card.award_if(
        with_trend(smc.liquidity_grab.direction),
        ScoreRule::LiquidityGrab,
        smc.liquidity_grab.confidence,
    );
    let imb = smc.imbalance;
    card.award_if(
        with_trend(imb.direction)
            && imb.level.is_some_and(|level| {
                (call && latest_close < level) || (put && latest_close > level)
            }),
        ScoreRule::Imbalance,
        imb.confidence,
    );

    // --- Institutional concepts ---
    let fvg = ict.fair_value_gap;
    card.award_if(
        fvg.detected
            && fvg.level.is_some_and(|level| {
                (call && latest_close < level) || (put && latest_close > level)
            }),
        ScoreRule::FairValueGap,
        fvg.confidence,
    );
    card.award_if(ict.kill_zone.active, ScoreRule::KillZone, ict.kill_zone.confidence);
    card.award_if(
        with_trend(ict.power_of_three.pattern),
        ScoreRule::PowerOfThree,
        ict.power_of_three.confidence,
    );

    // --- Candlestick pattern ---
    card.award_if(with_trend(pattern.bias()), ScoreRule::Pattern, pattern.confidence());

    // --- Price action ---
    let (demand, supply) = (pa.demand_zone, pa.supply_zone);
    if call && latest_close > demand.level && (latest_close - demand.level).abs() < atr {
        card.award(ScoreRule::SupplyDemand, demand.strength);
    } else if put && latest_close < supply.level && (latest_close - supply.level).abs() < atr {
        card.award(ScoreRule::SupplyDemand, supply.strength);
    }
    card.award_if(
        direction.is_some() && pa.breakout_power > BREAKOUT_THRESHOLD,
        ScoreRule::Breakout,
        pa.breakout_power,
    );
    let tl = pa.trendline;
    card.award_if(
        tl.strength > TRENDLINE_STRENGTH_THRESHOLD
            && ((call && tl.slope > 0.0) || (put && tl.slope < 0.0)),
        ScoreRule::Trendline,
        tl.strength,
    );
    let sweep = pa.liquidity_sweep;
    card.award_if(
        with_trend(sweep.direction) && (latest_close - sweep.level).abs() < atr,
        ScoreRule::LiquiditySweep,
        sweep.confidence,
    );
    let beyond_pivot = (call && latest_close > pa.volatility_adjusted_pivot)
        || (put && latest_close < pa.volatility_adjusted_pivot);
    card.award_if(
        pa.rejection_intensity > REJECTION_THRESHOLD && beyond_pivot,
        ScoreRule::Rejection,
        pa.rejection_intensity,
    );
    card.award_if(
        direction.is_some() && pa.consolidation_breakout_potential > CONSOLIDATION_THRESHOLD,
        ScoreRule::Consolidation,
        pa.consolidation_breakout_potential,
    );
    card.award_if(
        direction.is_some() && pa.impulse_wave_strength > IMPULSE_THRESHOLD,
        ScoreRule::Impulse,
        pa.impulse_wave_strength,
    );
    card.award_if(
        direction.is_some() && pa.fibonacci_confluence > FIBONACCI_THRESHOLD,
        ScoreRule::Fibonacci,
        pa.fibonacci_confluence,
    );
    card.award_if(
        pa.momentum_divergence > DIVERGENCE_THRESHOLD && beyond_pivot,
        ScoreRule::MomentumDivergence,
        pa.momentum_divergence,
    );

    Signal {
        direction,
        confidence: card.total(),
        pattern_label: pattern.name().to_string(),
        kill_zone_label: ict.kill_zone.label().to_string(),
        power_of_three_label: ict.power_of_three.label().to_string(),
        contributions: card.contributions,
    }
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self {
            options: AnalysisOptions::default(),
        }
    }
}

/// Evaluate with the default options.
pub fn evaluate(candles: &[Candle], now: i64) -> Signal {
    SignalEngine::default().evaluate(candles, now)
}
