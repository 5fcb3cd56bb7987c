use crate::algo::AlgoController;
use crate::models::{AlgoMode, Candle};
use crate::pnl::{LivePnl, PnlEngine};
use crate::store::CandleStore;
use crate::timeframe::TimeframeAggregator;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Result of a start request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartResponse {
    pub accepted: bool,
    pub mode: AlgoMode,
}

/// Health snapshot for liveness checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Health {
    pub mode: AlgoMode,
    pub running: bool,
}

/// The operations the request router calls into
///
/// Wire formats stay outside this crate; these are plain calls. Control
/// operations are idempotent and return immediately - none of them touch
/// the network or the broker, so a caller never waits on I/O to learn
/// whether its request was accepted.
#[derive(Clone)]
pub struct ApiService {
    controller: AlgoController,
    store: CandleStore,
    aggregator: TimeframeAggregator,
    pnl: PnlEngine,
}

impl ApiService {
    pub fn new(
        controller: AlgoController,
        store: CandleStore,
        aggregator: TimeframeAggregator,
        pnl: PnlEngine,
    ) -> Self {
        Self {
            controller,
            store,
            aggregator,
            pnl,
        }
    }

    /// Set the mode and start the algo
    ///
    /// An unrecognized mode string is rejected here at the boundary, before
    /// it can reach session state. A start while already running is not an
    /// error; `accepted` is false and the session keeps its current mode.
    pub fn start(&self, mode: &str) -> Result<StartResponse> {
        let mode: AlgoMode = mode.parse()?;

        self.controller.set_mode(mode);
        let accepted = self.controller.start_algo();

        Ok(StartResponse {
            accepted,
            mode: self.controller.mode(),
        })
    }

    /// Stop the algo; no-op when already stopped
    pub fn stop(&self) {
        self.controller.stop_algo();
    }

    /// Request liquidation of open positions; no-op while stopped
    pub fn force_exit(&self) {
        self.controller.request_force_exit();
    }

    /// Candle series for a symbol, optionally aggregated
    ///
    /// When aggregation yields nothing (unsupported interval, empty series)
    /// the raw 1-minute series is returned instead; unknown symbols give an
    /// empty sequence, never an error.
    pub fn candles(&self, symbol: &str, interval_minutes: Option<u32>) -> Vec<Candle> {
        if let Some(interval) = interval_minutes {
            let aggregated = self.aggregator.get_timeframe_candles(symbol, interval);
            if !aggregated.is_empty() {
                return aggregated;
            }
        }
        self.store.get_candles(symbol)
    }

    pub fn live_pnl(&self, symbol: &str) -> LivePnl {
        self.pnl.live_pnl(symbol)
    }

    pub fn health(&self) -> Health {
        Health {
            mode: self.controller.mode(),
            running: self.controller.is_algo_running(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pnl::PositionBook;

    fn service() -> (ApiService, CandleStore, AlgoController) {
        let store = CandleStore::new();
        let controller = AlgoController::new();
        let aggregator = TimeframeAggregator::new(store.clone());
        let pnl = PnlEngine::new(store.clone(), PositionBook::new());
        (
            ApiService::new(controller.clone(), store.clone(), aggregator, pnl),
            store,
            controller,
        )
    }

    fn candle(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "NIFTY".to_string(),
            timestamp: ts,
            open,
            high,
            low,
            close,
        }
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let (service, _, _) = service();

        let first = service.start("LIVE").unwrap();
        assert!(first.accepted);
        assert_eq!(first.mode, AlgoMode::Live);

        let second = service.start("LIVE").unwrap();
        assert!(!second.accepted);

        assert!(service.health().running);
        service.stop();
        assert!(!service.health().running);

        // Force-exit after stop is a quiet no-op
        service.force_exit();
        assert!(!service.health().running);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let (service, _, controller) = service();

        assert!(service.start("TURBO").is_err());
        assert!(!controller.is_algo_running());
    }

    #[test]
    fn test_health_reports_mode_and_running() {
        let (service, _, _) = service();

        let health = service.health();
        assert_eq!(health.mode, AlgoMode::Demo);
        assert!(!health.running);

        service.start("DEMO").unwrap();
        let health = service.health();
        assert_eq!(health.mode, AlgoMode::Demo);
        assert!(health.running);
    }

    #[tokio::test]
    async fn test_candles_with_interval_aggregates() {
        let (service, store, _) = service();

        for (i, (o, h, l, c)) in [
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0),
            (106.0, 110.0, 104.0, 109.0),
            (109.0, 109.0, 101.0, 103.0),
            (103.0, 107.0, 99.0, 105.0),
        ]
        .iter()
        .enumerate()
        {
            store
                .upsert_candle(candle(i as i64 * 60, *o, *h, *l, *c))
                .await
                .unwrap();
        }

        let bars = service.candles("NIFTY", Some(5));
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].close, 105.0);
    }

    #[tokio::test]
    async fn test_candles_falls_back_to_raw_series() {
        let (service, store, _) = service();
        store
            .upsert_candle(candle(0, 100.0, 105.0, 95.0, 102.0))
            .await
            .unwrap();

        // Interval 0 is unsupported; fall back to the 1-minute data
        let bars = service.candles("NIFTY", Some(0));
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp, 0);

        // No interval at all returns the raw series too
        assert_eq!(service.candles("NIFTY", None).len(), 1);
    }

    #[test]
    fn test_unknown_symbol_is_empty_not_error() {
        let (service, _, _) = service();
        assert!(service.candles("UNKNOWN", Some(15)).is_empty());
        assert!(service.candles("UNKNOWN", None).is_empty());
    }
}
