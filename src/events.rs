// ============================================================
// events.rs — Engine event sink and signal board
// ============================================================

use dashmap::DashMap;
use log::{error, info, warn};
use signal_math::{Direction, Signal};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Latest signal per asset, shared with anything that wants to render it.
pub type SignalBoard = Arc<DashMap<String, Signal>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    Signal,
    /// Taken after the fallback point of the cycle.
    Fallback,
    /// Taken by the extra scan once the cycle ran out.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ProfitTarget,
    LossLimit,
    InsufficientBalance,
    CycleLimit,
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::ProfitTarget => "profit target reached",
            StopReason::LossLimit => "loss limit hit",
            StopReason::InsufficientBalance => "balance below next stake",
            StopReason::CycleLimit => "cycle limit reached",
            StopReason::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    SignalUpdated {
        asset: String,
        signal: Signal,
    },
    ScanFailed {
        asset: String,
        error: String,
    },
    Scanning {
        remaining_secs: u64,
    },
    TradePlaced {
        kind: TradeKind,
        asset: String,
        direction: Direction,
        stake: f64,
        confidence: f64,
    },
    TradeSettled {
        asset: String,
        win: bool,
        profit: f64,
        total_profit: f64,
    },
    Escalated {
        next_stake: f64,
        attempt: u32,
    },
    AttemptsExhausted {
        attempts: u32,
    },
    NoTrade,
    Stopped(StopReason),
    Error(String),
}

/// Cloneable sending half. Sends never block and are dropped once the
/// consumer is gone.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

pub fn channel() -> (EventSink, mpsc::UnboundedReceiver<EngineEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

/// Consumes events until every sink is dropped: logs them and keeps the
/// board current.
pub fn spawn_consumer(
    mut rx: mpsc::UnboundedReceiver<EngineEvent>,
    board: SignalBoard,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            apply(&board, &event);
            log_event(&event);
        }
    })
}

fn apply(board: &SignalBoard, event: &EngineEvent) {
    match event {
        EngineEvent::SignalUpdated { asset, signal } => {
            board.insert(asset.clone(), signal.clone());
        }
        EngineEvent::ScanFailed { asset, .. } => {
            board.insert(asset.clone(), Signal::neutral());
        }
        _ => {}
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::SignalUpdated { asset, signal } => info!(
            "{:<8} {} {:5.1}% | {} | {} | {}",
            asset,
            signal_bar(signal.confidence),
            signal.confidence,
            signal.direction.map_or("N/A", |d| d.as_str()),
            signal.pattern_label,
            signal.kill_zone_label,
        ),
        EngineEvent::ScanFailed { asset, error } => warn!("Analysis error for {}: {}", asset, error),
        EngineEvent::Scanning { remaining_secs } => {
            info!("Scanning signals ({}s left in cycle)", remaining_secs)
        }
        EngineEvent::TradePlaced {
            kind,
            asset,
            direction,
            stake,
            confidence,
        } => info!(
            "{:?} trade {} on {} @ ${:.2} (conf {:.1}%)",
            kind,
            direction.as_str().to_uppercase(),
            asset,
            stake,
            confidence
        ),
        EngineEvent::TradeSettled {
            asset,
            win,
            profit,
            total_profit,
        } => {
            if *win {
                info!("WIN on {}: +${:.2} (session ${:.2})", asset, profit, total_profit)
            } else {
                info!("LOSS on {}: ${:.2} (session ${:.2})", asset, profit, total_profit)
            }
        }
        EngineEvent::Escalated {
            next_stake,
            attempt,
        } => info!("Martingale escalation: attempt {} @ ${:.2}", attempt, next_stake),
        EngineEvent::AttemptsExhausted { attempts } => {
            warn!("Max attempts ({}) reached, stake reset", attempts)
        }
        EngineEvent::NoTrade => info!("No signal above threshold this cycle"),
        EngineEvent::Stopped(reason) => info!("Session stopped: {}", reason),
        EngineEvent::Error(e) => error!("{}", e),
    }
}

/// 20-cell bar, one cell per 5 points of confidence.
pub fn signal_bar(confidence: f64) -> String {
    let filled = ((confidence / 5.0) as usize).min(20);
    format!("{}{}", "█".repeat(filled), "·".repeat(20 - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_bar() {
        assert_eq!(signal_bar(0.0).chars().filter(|c| *c == '█').count(), 0);
        assert_eq!(signal_bar(47.0).chars().filter(|c| *c == '█').count(), 9);
        assert_eq!(signal_bar(100.0).chars().filter(|c| *c == '█').count(), 20);
        assert_eq!(signal_bar(100.0).chars().count(), 20);
    }

    #[tokio::test]
    async fn test_consumer_updates_board_and_exits() {
        let board = SignalBoard::default();
        let (sink, rx) = channel();
        let handle = spawn_consumer(rx, board.clone());

        let mut signal = Signal::neutral();
        signal.confidence = 42.0;
        sink.emit(EngineEvent::SignalUpdated {
            asset: "R_10".to_string(),
            signal,
        });
        sink.emit(EngineEvent::ScanFailed {
            asset: "R_25".to_string(),
            error: "closed".to_string(),
        });
        drop(sink);
        handle.await.unwrap();

        assert_eq!(board.get("R_10").unwrap().confidence, 42.0);
        assert_eq!(board.get("R_25").unwrap().confidence, 0.0);
    }

    #[test]
    fn test_emit_after_consumer_gone_is_silent() {
        let (sink, rx) = channel();
        drop(rx);
        sink.emit(EngineEvent::NoTrade);
    }
}
