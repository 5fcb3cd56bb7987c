use crate::models::Candle;
use crate::store::CandleStore;

/// Aggregate a 1-minute series into `interval_minutes` buckets
///
/// Buckets are aligned to multiples of `interval * 60` seconds from epoch.
/// For each bucket with at least one constituent: open of the earliest,
/// close of the latest, max high, min low, timestamp = bucket start. Empty
/// buckets are omitted - no synthetic candles. Interval 0 or an empty input
/// yields an empty Vec; the input is assumed ordered by timestamp, as the
/// store guarantees.
pub fn aggregate(candles: &[Candle], interval_minutes: u32) -> Vec<Candle> {
    if interval_minutes == 0 || candles.is_empty() {
        return Vec::new();
    }

    let bucket_secs = interval_minutes as i64 * 60;
    let mut result: Vec<Candle> = Vec::new();
    let mut current: Option<Candle> = None;

    for candle in candles {
        let bucket = Candle::floor_timestamp(candle.timestamp, bucket_secs);

        match current.as_mut() {
            Some(agg) if agg.timestamp == bucket => {
                agg.high = agg.high.max(candle.high);
                agg.low = agg.low.min(candle.low);
                agg.close = candle.close;
            }
            _ => {
                if let Some(done) = current.take() {
                    result.push(done);
                }
                current = Some(Candle {
                    symbol: candle.symbol.clone(),
                    timestamp: bucket,
                    open: candle.open,
                    high: candle.high,
                    low: candle.low,
                    close: candle.close,
                });
            }
        }
    }

    if let Some(done) = current {
        result.push(done);
    }

    result
}

/// Read-side aggregator over the candle store
///
/// Aggregated candles are computed per request and discarded - only the
/// 1-minute series is ever persisted.
#[derive(Clone)]
pub struct TimeframeAggregator {
    store: CandleStore,
}

impl TimeframeAggregator {
    pub fn new(store: CandleStore) -> Self {
        Self { store }
    }

    /// Aggregate the stored series for `symbol` into `interval_minutes` bars
    ///
    /// Empty result (unknown symbol, empty series, interval 0) is not an
    /// error; callers fall back to the raw 1-minute series.
    pub fn get_timeframe_candles(&self, symbol: &str, interval_minutes: u32) -> Vec<Candle> {
        let candles = self.store.get_candles(symbol);
        aggregate(&candles, interval_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn scenario_series() -> Vec<Candle> {
        vec![
            candle(0, 100.0, 105.0, 95.0, 102.0),
            candle(60, 102.0, 108.0, 100.0, 106.0),
            candle(120, 106.0, 110.0, 104.0, 109.0),
            candle(180, 109.0, 109.0, 101.0, 103.0),
            candle(240, 103.0, 107.0, 99.0, 105.0),
        ]
    }

    #[test]
    fn test_five_minute_rollup() {
        let result = aggregate(&scenario_series(), 5);

        assert_eq!(result.len(), 1);
        let bar = &result[0];
        assert_eq!(bar.timestamp, 0);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 110.0);
        assert_eq!(bar.low, 95.0);
        assert_eq!(bar.close, 105.0);
    }

    #[test]
    fn test_buckets_align_to_epoch_multiples() {
        // Candles straddling the 300s boundary land in different buckets
        let series = vec![
            candle(240, 100.0, 101.0, 99.0, 100.5),
            candle(300, 100.5, 103.0, 100.0, 102.0),
            candle(360, 102.0, 104.0, 101.0, 103.0),
        ];

        let result = aggregate(&series, 5);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].timestamp, 0);
        assert_eq!(result[0].close, 100.5);
        assert_eq!(result[1].timestamp, 300);
        assert_eq!(result[1].open, 100.5);
        assert_eq!(result[1].high, 104.0);
    }

    #[test]
    fn test_empty_buckets_are_omitted() {
        // Gap between minute 1 and minute 20
        let series = vec![
            candle(60, 100.0, 101.0, 99.0, 100.0),
            candle(1200, 105.0, 106.0, 104.0, 105.0),
        ];

        let result = aggregate(&series, 5);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].timestamp, 0);
        assert_eq!(result[1].timestamp, 1200);
    }

    #[test]
    fn test_bucket_bounds_cover_constituents() {
        let series = scenario_series();
        let result = aggregate(&series, 2);

        // Every constituent's high/low is bounded by its bucket
        for bar in &result {
            let bucket_secs = 120;
            let members: Vec<&Candle> = series
                .iter()
                .filter(|c| Candle::floor_timestamp(c.timestamp, bucket_secs) == bar.timestamp)
                .collect();
            assert!(!members.is_empty());
            for member in members {
                assert!(bar.high >= member.high);
                assert!(bar.low <= member.low);
            }
        }
    }

    #[test]
    fn test_no_candle_dropped_or_double_counted() {
        let series = scenario_series();

        for interval in [1u32, 2, 3, 5, 15] {
            let result = aggregate(&series, interval);
            let bucket_secs = interval as i64 * 60;
            let counted: usize = result
                .iter()
                .map(|bar| {
                    series
                        .iter()
                        .filter(|c| {
                            Candle::floor_timestamp(c.timestamp, bucket_secs) == bar.timestamp
                        })
                        .count()
                })
                .sum();
            assert_eq!(counted, series.len(), "interval {} dropped candles", interval);
        }
    }

    #[test]
    fn test_interval_one_is_identity() {
        let series = scenario_series();
        assert_eq!(aggregate(&series, 1), series);
    }

    #[test]
    fn test_invalid_interval_and_empty_series() {
        assert!(aggregate(&scenario_series(), 0).is_empty());
        assert!(aggregate(&[], 5).is_empty());
    }

    #[tokio::test]
    async fn test_aggregator_reads_store_snapshot() {
        let store = CandleStore::new();
        for c in scenario_series() {
            store.upsert_candle(c).await.unwrap();
        }

        let aggregator = TimeframeAggregator::new(store.clone());
        let bars = aggregator.get_timeframe_candles("NIFTY", 5);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 105.0);

        // Deterministic: repeated calls give the same output
        assert_eq!(aggregator.get_timeframe_candles("NIFTY", 5), bars);
        // Nothing was persisted back into the 1-minute series
        assert_eq!(store.candle_count("NIFTY"), 5);
    }
}
