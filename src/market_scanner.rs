// Market Scanner Module
// Fetches every configured asset, scores them in parallel and ranks the results

use crate::broker::Broker;
use crate::events::{EngineEvent, EventSink};
use futures_util::future::join_all;
use rayon::prelude::*;
use signal_math::{Candle, Signal, SignalEngine};

/// Scan result for a single asset
#[derive(Debug, Clone)]
pub struct AssetScanResult {
    pub asset: String,
    pub signal: Signal,
    /// 1 = best
    pub rank: u32,
}

impl AssetScanResult {
    /// Directionless signals rank as zero.
    fn score(&self) -> f64 {
        if self.signal.direction.is_some() {
            self.signal.confidence
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Sorted by rank.
    pub results: Vec<AssetScanResult>,
    pub failures: Vec<(String, String)>,
}

impl ScanReport {
    /// Top-ranked asset, if its signal is tradeable at `min_confidence`.
    pub fn best(&self, min_confidence: f64) -> Option<&AssetScanResult> {
        self.results
            .first()
            .filter(|r| r.signal.is_tradeable(min_confidence))
    }
}

pub struct MarketScanner {
    engine: SignalEngine,
    assets: Vec<String>,
    granularity: u64,
    candle_count: usize,
}

impl MarketScanner {
    pub fn new(
        engine: SignalEngine,
        assets: Vec<String>,
        granularity: u64,
        candle_count: usize,
    ) -> Self {
        Self {
            engine,
            assets,
            granularity,
            candle_count,
        }
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// One pass over all assets. A failed fetch is reported and skipped;
    /// it never fails the scan.
    pub async fn scan<B: Broker>(&self, broker: &B, sink: &EventSink) -> ScanReport {
        let fetches = self.assets.iter().map(|asset| async move {
            let candles = broker
                .candles(asset, self.granularity, self.candle_count)
                .await;
            (asset.clone(), candles)
        });

        let mut fetched: Vec<(String, Vec<Candle>)> = Vec::new();
        let mut failures = Vec::new();
        for (asset, result) in join_all(fetches).await {
            match result {
                Ok(candles) => fetched.push((asset, candles)),
                Err(e) => {
                    sink.emit(EngineEvent::ScanFailed {
                        asset: asset.clone(),
                        error: e.to_string(),
                    });
                    failures.push((asset, e.to_string()));
                }
            }
        }

        let now = chrono::Utc::now().timestamp();
        let results = self.rank(fetched, now);

        for result in &results {
            sink.emit(EngineEvent::SignalUpdated {
                asset: result.asset.clone(),
                signal: result.signal.clone(),
            });
        }

        ScanReport { results, failures }
    }

    /// Scores every series in parallel and sorts by score, highest first.
    fn rank(&self, fetched: Vec<(String, Vec<Candle>)>, now: i64) -> Vec<AssetScanResult> {
        let mut results: Vec<AssetScanResult> = fetched
            .into_par_iter()
            .map(|(asset, candles)| AssetScanResult {
                signal: self.engine.evaluate(&candles, now),
                asset,
                rank: 0,
            })
            .collect();

        results.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for (index, result) in results.iter_mut().enumerate() {
            result.rank = (index + 1) as u32;
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::testing::{flat, rising, ScriptedBroker};
    use crate::events::channel;
    use std::sync::atomic::Ordering;

    fn scanner(assets: &[&str]) -> MarketScanner {
        MarketScanner::new(
            SignalEngine::default(),
            assets.iter().map(|s| s.to_string()).collect(),
            60,
            120,
        )
    }

    #[tokio::test]
    async fn test_ranks_directional_signal_first() {
        let broker = ScriptedBroker::new(100.0)
            .with_series("FLAT", flat(120, 10.0))
            .with_series("UP", rising(120, 100.0));
        let (sink, _rx) = channel();

        let report = scanner(&["FLAT", "UP"]).scan(&broker, &sink).await;
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].asset, "UP");
        assert_eq!(report.results[0].rank, 1);
        assert_eq!(report.results[1].rank, 2);
        assert!(report.results[0].signal.direction.is_some());
        assert_eq!(broker.candle_requests.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_failed_asset_is_reported_not_fatal() {
        let broker = ScriptedBroker::new(100.0)
            .with_series("UP", rising(120, 100.0))
            .with_failure("CLOSED");
        let (sink, mut rx) = channel();

        let report = scanner(&["CLOSED", "UP"]).scan(&broker, &sink).await;
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "CLOSED");

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, EngineEvent::ScanFailed { ref asset, .. } if asset == "CLOSED"));
    }

    #[tokio::test]
    async fn test_best_requires_direction_and_threshold() {
        let broker = ScriptedBroker::new(100.0).with_series("UP", rising(120, 100.0));
        let (sink, _rx) = channel();
        let report = scanner(&["UP"]).scan(&broker, &sink).await;

        assert!(report.best(10.0).is_some());
        assert!(report.best(100.1).is_none());

        let flat_broker = ScriptedBroker::new(100.0).with_series("FLAT", flat(120, 10.0));
        let report = scanner(&["FLAT"]).scan(&flat_broker, &sink).await;
        assert!(report.best(0.0).is_none());
    }

    #[test]
    fn test_short_history_scores_neutral() {
        let results = scanner(&["UP"]).rank(vec![("UP".to_string(), rising(20, 1.0))], 0);
        assert_eq!(results[0].signal, Signal::neutral());
    }
}
