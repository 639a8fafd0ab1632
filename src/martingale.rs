// ============================================================
// martingale.rs — Stake escalation and the trading cycle
// ============================================================

use crate::broker::{Broker, BrokerError, TradeOutcome};
use crate::events::{EngineEvent, EventSink, StopReason, TradeKind};
use crate::market_scanner::{AssetScanResult, MarketScanner};
use anyhow::Result;
use std::time::Duration;
use tokio::time::{sleep, Instant};

// ============================================================
// Stake state
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionLimits {
    pub base_stake: f64,
    pub multiplier: f64,
    pub max_attempts: u32,
    pub stop_loss: f64,
    pub stop_profit: f64,
}

/// What the session should do after a settled trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Continue,
    Escalated { next_stake: f64, attempt: u32 },
    Exhausted { attempts: u32 },
    Stop(StopReason),
}

/// Stake is `base * multiplier^losses` for the current losing streak.
#[derive(Debug, Clone, PartialEq)]
pub struct MartingaleState {
    limits: SessionLimits,
    /// 1-based attempt within the current streak.
    pub attempt: u32,
    pub stake: f64,
    pub total_profit: f64,
    pub trades: u32,
    pub wins: u32,
}

impl MartingaleState {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            attempt: 1,
            stake: limits.base_stake,
            total_profit: 0.0,
            trades: 0,
            wins: 0,
        }
    }

    pub fn on_win(&mut self, profit: f64) -> Transition {
        self.record(profit);
        self.wins += 1;
        self.reset_streak();
        self.check_limits().unwrap_or(Transition::Continue)
    }

    pub fn on_loss(&mut self, profit: f64) -> Transition {
        self.record(profit);
        if let Some(stop) = self.check_limits() {
            return stop;
        }

        if self.attempt >= self.limits.max_attempts {
            let attempts = self.attempt;
            self.reset_streak();
            return Transition::Exhausted { attempts };
        }

        self.attempt += 1;
        self.stake = self.limits.base_stake * self.limits.multiplier.powi(self.attempt as i32 - 1);
        Transition::Escalated {
            next_stake: self.stake,
            attempt: self.attempt,
        }
    }

    fn record(&mut self, profit: f64) {
        self.total_profit += profit;
        self.trades += 1;
    }

    fn reset_streak(&mut self) {
        self.attempt = 1;
        self.stake = self.limits.base_stake;
    }

    fn check_limits(&self) -> Option<Transition> {
        if self.total_profit >= self.limits.stop_profit {
            Some(Transition::Stop(StopReason::ProfitTarget))
        } else if -self.total_profit >= self.limits.stop_loss {
            Some(Transition::Stop(StopReason::LossLimit))
        } else {
            None
        }
    }
}

// ============================================================
// Session
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTiming {
    /// Total scanning window per cycle.
    pub cycle: Duration,
    /// Trades taken after this point are reported as fallback trades.
    pub fallback_after: Duration,
    pub poll: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeSettings {
    pub min_confidence: f64,
    pub duration_secs: u64,
    /// 0 = unlimited.
    pub max_cycles: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Traded(Transition),
    NoTrade,
}

pub struct TradingSession<B> {
    broker: B,
    scanner: MarketScanner,
    state: MartingaleState,
    timing: CycleTiming,
    settings: TradeSettings,
    sink: EventSink,
}

impl<B: Broker> TradingSession<B> {
    pub fn new(
        broker: B,
        scanner: MarketScanner,
        limits: SessionLimits,
        timing: CycleTiming,
        settings: TradeSettings,
        sink: EventSink,
    ) -> Self {
        Self {
            broker,
            scanner,
            state: MartingaleState::new(limits),
            timing,
            settings,
            sink,
        }
    }

    pub fn state(&self) -> &MartingaleState {
        &self.state
    }

    #[cfg(test)]
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Runs cycles until a stop condition. Broker failures inside a cycle
    /// are reported and the next cycle starts after one poll interval.
    pub async fn run(&mut self) -> Result<StopReason> {
        let mut cycles = 0u64;
        loop {
            if self.settings.max_cycles > 0 && cycles >= self.settings.max_cycles {
                return Ok(self.stop(StopReason::CycleLimit));
            }
            cycles += 1;

            match self.run_cycle().await {
                Ok(CycleOutcome::Traded(Transition::Stop(reason))) => return Ok(self.stop(reason)),
                Ok(_) => {}
                Err(BrokerError::InsufficientBalance { .. }) => {
                    return Ok(self.stop(StopReason::InsufficientBalance))
                }
                Err(e) => {
                    self.sink.emit(EngineEvent::Error(format!("Trade error: {}", e)));
                    sleep(self.timing.poll).await;
                }
            }
        }
    }

    fn stop(&self, reason: StopReason) -> StopReason {
        self.sink.emit(EngineEvent::Stopped(reason));
        reason
    }

    /// Scans every poll interval for up to one cycle and trades the first
    /// tradeable best signal. When the window closes without a trade, one
    /// final scan gets a forced chance.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, BrokerError> {
        let started = Instant::now();

        while started.elapsed() < self.timing.cycle {
            let report = self.scanner.scan(&self.broker, &self.sink).await;
            if let Some(best) = report.best(self.settings.min_confidence) {
                let kind = if started.elapsed() > self.timing.fallback_after {
                    TradeKind::Fallback
                } else {
                    TradeKind::Signal
                };
                let best = best.clone();
                return self.trade(kind, &best).await.map(CycleOutcome::Traded);
            }

            let remaining = self.timing.cycle.saturating_sub(started.elapsed());
            self.sink.emit(EngineEvent::Scanning {
                remaining_secs: remaining.as_secs(),
            });
            sleep(self.timing.poll.min(remaining)).await;
        }

        let report = self.scanner.scan(&self.broker, &self.sink).await;
        match report.best(self.settings.min_confidence) {
            Some(best) => {
                let best = best.clone();
                self.trade(TradeKind::Forced, &best)
                    .await
                    .map(CycleOutcome::Traded)
            }
            None => {
                self.sink.emit(EngineEvent::NoTrade);
                Ok(CycleOutcome::NoTrade)
            }
        }
    }

    async fn trade(
        &mut self,
        kind: TradeKind,
        best: &AssetScanResult,
    ) -> Result<Transition, BrokerError> {
        let Some(direction) = best.signal.direction else {
            return Ok(Transition::Continue);
        };
        let stake = self.state.stake;

        let balance = self.broker.balance().await?;
        if balance < stake {
            return Err(BrokerError::InsufficientBalance { balance, stake });
        }

        self.sink.emit(EngineEvent::TradePlaced {
            kind,
            asset: best.asset.clone(),
            direction,
            stake,
            confidence: best.signal.confidence,
        });

        let TradeOutcome { win, profit, .. } = self
            .broker
            .buy_and_check_win(&best.asset, direction, stake, self.settings.duration_secs)
            .await?;

        let transition = if win {
            self.state.on_win(profit)
        } else {
            self.state.on_loss(profit)
        };

        self.sink.emit(EngineEvent::TradeSettled {
            asset: best.asset.clone(),
            win,
            profit,
            total_profit: self.state.total_profit,
        });
        match transition {
            Transition::Escalated {
                next_stake,
                attempt,
            } => self.sink.emit(EngineEvent::Escalated {
                next_stake,
                attempt,
            }),
            Transition::Exhausted { attempts } => {
                self.sink.emit(EngineEvent::AttemptsExhausted { attempts })
            }
            _ => {}
        }
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::testing::{flat, rising, ScriptedBroker};
    use crate::events::channel;
    use signal_math::{Direction, SignalEngine};

    fn limits() -> SessionLimits {
        SessionLimits {
            base_stake: 1.0,
            multiplier: 2.0,
            max_attempts: 3,
            stop_loss: 100.0,
            stop_profit: 100.0,
        }
    }

    fn fast_timing() -> CycleTiming {
        CycleTiming {
            cycle: Duration::from_millis(30),
            fallback_after: Duration::from_millis(20),
            poll: Duration::from_millis(5),
        }
    }

    fn session(broker: ScriptedBroker, limits: SessionLimits) -> TradingSession<ScriptedBroker> {
        let scanner = MarketScanner::new(
            SignalEngine::default(),
            vec!["UP".to_string()],
            60,
            120,
        );
        let (sink, _rx) = channel();
        TradingSession::new(
            broker,
            scanner,
            limits,
            fast_timing(),
            TradeSettings {
                min_confidence: 10.0,
                duration_secs: 60,
                max_cycles: 0,
            },
            sink,
        )
    }

    #[test]
    fn test_escalation_sequence() {
        let mut state = MartingaleState::new(limits());
        assert_eq!(state.stake, 1.0);
        assert_eq!(
            state.on_loss(-1.0),
            Transition::Escalated {
                next_stake: 2.0,
                attempt: 2
            }
        );
        assert_eq!(
            state.on_loss(-2.0),
            Transition::Escalated {
                next_stake: 4.0,
                attempt: 3
            }
        );
        assert_eq!(state.on_loss(-4.0), Transition::Exhausted { attempts: 3 });
        assert_eq!(state.stake, 1.0);
        assert_eq!(state.attempt, 1);
        assert_eq!(state.total_profit, -7.0);
        assert_eq!(state.trades, 3);
    }

    #[test]
    fn test_win_resets_stake() {
        let mut state = MartingaleState::new(limits());
        state.on_loss(-1.0);
        assert_eq!(state.stake, 2.0);
        assert_eq!(state.on_win(1.6), Transition::Continue);
        assert_eq!(state.stake, 1.0);
        assert_eq!(state.attempt, 1);
        assert_eq!(state.wins, 1);
    }

    #[test]
    fn test_stop_conditions() {
        let mut state = MartingaleState::new(SessionLimits {
            stop_profit: 1.5,
            ..limits()
        });
        assert_eq!(
            state.on_win(1.6),
            Transition::Stop(StopReason::ProfitTarget)
        );

        let mut state = MartingaleState::new(SessionLimits {
            stop_loss: 3.0,
            ..limits()
        });
        state.on_loss(-1.0);
        assert_eq!(state.on_loss(-2.0), Transition::Stop(StopReason::LossLimit));
    }

    #[tokio::test]
    async fn test_cycle_trades_best_signal() {
        let broker = ScriptedBroker::new(50.0)
            .with_series("UP", rising(120, 100.0))
            .with_outcomes(&[false]);
        let mut session = session(broker, limits());

        let outcome = session.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Traded(Transition::Escalated {
                next_stake: 2.0,
                attempt: 2
            })
        );
        let placed = session.broker().placed();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].direction, Direction::Call);
        assert_eq!(placed[0].stake, 1.0);
        assert_eq!(session.state().stake, 2.0);
    }

    #[tokio::test]
    async fn test_cycle_without_signal_ends_with_no_trade() {
        let broker = ScriptedBroker::new(50.0).with_series("UP", flat(120, 10.0));
        let mut session = session(broker, limits());

        let outcome = session.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoTrade);
        assert!(session.broker().placed().is_empty());
        // polled during the window plus the forced final scan
        assert!(
            session
                .broker()
                .candle_requests
                .load(std::sync::atomic::Ordering::Relaxed)
                >= 2
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_profit_target() {
        let broker = ScriptedBroker::new(50.0)
            .with_series("UP", rising(120, 100.0))
            .with_outcomes(&[false, true, true]);
        let mut session = session(
            broker,
            SessionLimits {
                stop_profit: 1.0,
                ..limits()
            },
        );

        let reason = session.run().await.unwrap();
        assert_eq!(reason, StopReason::ProfitTarget);
        let stakes: Vec<f64> = session.broker().placed().iter().map(|t| t.stake).collect();
        // lose 1, win 2 * 0.8 = 1.6, net +0.6; then win 0.8, net +1.4
        assert_eq!(stakes, vec![1.0, 2.0, 1.0]);
    }

    #[tokio::test]
    async fn test_run_stops_when_balance_below_stake() {
        let broker = ScriptedBroker::new(0.5).with_series("UP", rising(120, 100.0));
        let mut session = session(broker, limits());
        assert_eq!(
            session.run().await.unwrap(),
            StopReason::InsufficientBalance
        );
        assert!(session.broker().placed().is_empty());
    }

    #[tokio::test]
    async fn test_run_honours_cycle_limit() {
        let broker = ScriptedBroker::new(50.0).with_series("UP", flat(120, 10.0));
        let mut session = session(broker, limits());
        session.settings.max_cycles = 1;
        assert_eq!(session.run().await.unwrap(), StopReason::CycleLimit);
    }
}
