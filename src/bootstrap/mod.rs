use crate::api::BrokerClient;
use crate::db::CandleRepository;
use crate::feed::bar_to_candle;
use crate::models::Instrument;
use crate::store::CandleStore;
use crate::Result;
use chrono::{Duration as ChronoDuration, Utc};

/// Statistics from the startup bootstrap
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BootstrapStats {
    pub warm_loaded: usize,
    pub fetched_bars: usize,
    pub stored: usize,
    pub skipped_malformed: usize,
}

/// One-time startup load: warm the store from Postgres, then backfill
/// recent history from the broker
///
/// Must complete before the live feed attaches. Unlike the live path, any
/// storage failure here is fatal - starting with a silent hole in history
/// is worse than not starting. Overlap between this backfill and the first
/// live bars is resolved by the store's idempotent upsert, so arrival order
/// does not matter.
pub async fn bootstrap(
    store: &CandleStore,
    repository: Option<&CandleRepository>,
    broker: Option<&BrokerClient>,
    instruments: &[Instrument],
    days: u32,
) -> Result<BootstrapStats> {
    let mut stats = BootstrapStats::default();

    // Phase 1: warm the in-memory series from what is already durable
    if let Some(repo) = repository {
        let by_symbol = repo.load_all().await?;
        for (symbol, candles) in by_symbol {
            stats.warm_loaded += candles.len();
            store.load_series(&symbol, candles);
        }
        tracing::info!("Warm-loaded {} candles from Postgres", stats.warm_loaded);
    }

    // Phase 2: backfill recent history from the broker
    let broker = match broker {
        Some(broker) => broker,
        None => {
            tracing::info!("No broker client, skipping historical backfill");
            return Ok(stats);
        }
    };

    let to = Utc::now();
    let from = to - ChronoDuration::days(days as i64);

    for instrument in instruments {
        let bars = broker
            .historical_data(instrument.token, from, to, "minute")
            .await?;
        stats.fetched_bars += bars.len();

        let mut stored = 0usize;
        for bar in &bars {
            let candle = match bar_to_candle(&instrument.symbol, bar) {
                Ok(candle) => candle,
                Err(e) => {
                    tracing::warn!("Skipping malformed historical record: {}", e);
                    stats.skipped_malformed += 1;
                    continue;
                }
            };

            // Fatal on storage failure during bootstrap
            store.upsert_candle(candle).await?;
            stored += 1;
        }

        stats.stored += stored;
        tracing::info!(
            "Loaded historical candles: {} ({} bars, {} stored)",
            instrument.symbol,
            bars.len(),
            stored
        );
    }

    Ok(stats)
}
