mod broker;
mod config;
mod deriv;
mod events;
mod market_scanner;
mod martingale;

use anyhow::{Context, Result};
use broker::{Broker, PaperBroker};
use config::{AppConfig, TradingMode, CONFIG_PATH};
use deriv::DerivBroker;
use events::{EngineEvent, EventSink, SignalBoard, StopReason};
use log::{info, warn};
use market_scanner::MarketScanner;
use martingale::{CycleTiming, SessionLimits, TradeSettings, TradingSession};
use signal_math::SignalEngine;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load(CONFIG_PATH).with_env()?;
    config.validate()?;

    let engine =
        SignalEngine::new(config.analysis.clone()).context("invalid analysis options")?;
    let scanner = MarketScanner::new(
        engine,
        config.trading.assets.clone(),
        config.broker.granularity,
        config.broker.candle_count,
    );

    let board = SignalBoard::default();
    let (sink, rx) = events::channel();
    let consumer = events::spawn_consumer(rx, board.clone());

    let deriv = DerivBroker::new(
        config.endpoint()?,
        config.api_token.clone(),
        Duration::from_secs(config.broker.request_timeout_secs),
    );

    println!("-----------------------------------------");
    println!("📊 Signal matrix over {} assets", scanner.assets().len());
    println!(
        "💰 Base ${:.2} x{} | stop loss ${:.2} | stop profit ${:.2}",
        config.trading.base_bet,
        config.trading.martingale,
        config.trading.stop_loss,
        config.trading.stop_profit
    );
    println!(
        "🎯 Min confidence {:.0}% | cycle {}s | mode {:?}",
        config.trading.min_confidence, config.trading.cycle_secs, config.trading.mode
    );
    println!("-----------------------------------------");

    let reason = match config.trading.mode {
        TradingMode::Paper => {
            let paper = PaperBroker::new(
                deriv,
                config.broker.granularity,
                config.broker.paper_payout,
                config.broker.paper_balance,
            );
            run_session(paper, scanner, &config, sink).await?
        }
        TradingMode::Live => run_session(deriv, scanner, &config, sink).await?,
    };

    // every sink is gone once the session returns, so the consumer drains and exits
    if let Err(e) = consumer.await {
        warn!("Event consumer ended abnormally: {}", e);
    }

    info!("Final signals:");
    for entry in board.iter() {
        info!(
            "  {:<8} {:5.1}% {}",
            entry.key(),
            entry.value().confidence,
            entry.value().direction.map_or("N/A", |d| d.as_str())
        );
    }
    info!("Session finished: {}", reason);
    Ok(())
}

async fn run_session<B: Broker>(
    broker: B,
    scanner: MarketScanner,
    config: &AppConfig,
    sink: EventSink,
) -> Result<StopReason> {
    let t = &config.trading;
    let mut session = TradingSession::new(
        broker,
        scanner,
        SessionLimits {
            base_stake: t.base_bet,
            multiplier: t.martingale,
            max_attempts: t.max_attempts,
            stop_loss: t.stop_loss,
            stop_profit: t.stop_profit,
        },
        CycleTiming {
            cycle: t.cycle(),
            fallback_after: t.fallback_after(),
            poll: t.poll(),
        },
        TradeSettings {
            min_confidence: t.min_confidence,
            duration_secs: config.broker.trade_duration,
            max_cycles: t.max_cycles,
        },
        sink.clone(),
    );

    let reason = tokio::select! {
        result = session.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            sink.emit(EngineEvent::Stopped(StopReason::Interrupted));
            StopReason::Interrupted
        }
    };

    let state = session.state();
    info!(
        "Trades {} | wins {} | total profit ${:.2}",
        state.trades, state.wins, state.total_profit
    );
    Ok(reason)
}
