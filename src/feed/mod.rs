// Market feed ingestion
pub mod simulated;

pub use simulated::SimulatedFeed;

use crate::api::{BrokerClient, RawBar};
use crate::models::{Candle, Instrument};
use crate::store::CandleStore;
use chrono::{Duration as ChronoDuration, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration};

const WRITE_MAX_RETRIES: u32 = 3;
const WRITE_BACKOFF_MS: u64 = 500;

/// One bar delivered by a feed producer (live poll or simulator)
#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub symbol: String,
    pub bar: RawBar,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed bar for {symbol}: missing {field}")]
    MalformedBar {
        symbol: String,
        field: &'static str,
    },
}

/// Convert a raw broker bar into a minute-aligned candle
///
/// A record missing its date or any OHLC field is malformed and rejected;
/// the caller drops it and keeps ingesting.
pub fn bar_to_candle(symbol: &str, bar: &RawBar) -> Result<Candle, FeedError> {
    let malformed = |field: &'static str| FeedError::MalformedBar {
        symbol: symbol.to_string(),
        field,
    };

    let date = bar.date.ok_or_else(|| malformed("date"))?;

    Ok(Candle {
        symbol: symbol.to_string(),
        timestamp: date.timestamp(),
        open: bar.open.ok_or_else(|| malformed("open"))?,
        high: bar.high.ok_or_else(|| malformed("high"))?,
        low: bar.low.ok_or_else(|| malformed("low"))?,
        close: bar.close.ok_or_else(|| malformed("close"))?,
    }
    .aligned())
}

/// Consume feed events and upsert them into the store
///
/// Runs until the channel closes. A malformed record is dropped and logged.
/// A storage failure is retried with backoff a bounded number of times and
/// then the single write is dropped - the feed loop itself never dies, and
/// storage backpressure never propagates to the producer beyond the bounded
/// channel.
pub async fn run_live_feed(store: CandleStore, mut rx: mpsc::Receiver<FeedEvent>) {
    tracing::info!("Live feed ingestion starting...");

    while let Some(event) = rx.recv().await {
        let candle = match bar_to_candle(&event.symbol, &event.bar) {
            Ok(candle) => candle,
            Err(e) => {
                tracing::warn!("Dropping malformed feed record: {}", e);
                continue;
            }
        };

        upsert_with_retry(&store, candle).await;
    }

    tracing::info!("Live feed channel closed, ingestion stopping");
}

async fn upsert_with_retry(store: &CandleStore, candle: Candle) {
    let symbol = candle.symbol.clone();
    let ts = candle.timestamp;

    for attempt in 1..=WRITE_MAX_RETRIES {
        match store.upsert_candle(candle.clone()).await {
            Ok(()) => return,
            Err(e) if attempt < WRITE_MAX_RETRIES => {
                let backoff_ms = WRITE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tracing::warn!(
                    "Storage write failed for {}@{} (attempt {}/{}): {}. Retrying in {}ms...",
                    symbol,
                    ts,
                    attempt,
                    WRITE_MAX_RETRIES,
                    e,
                    backoff_ms
                );
                sleep(Duration::from_millis(backoff_ms)).await;
            }
            Err(e) => {
                tracing::error!(
                    "Dropping candle {}@{} after {} failed writes: {}",
                    symbol,
                    ts,
                    WRITE_MAX_RETRIES,
                    e
                );
            }
        }
    }
}

/// Poll the broker for fresh minute bars and forward them as feed events
///
/// Each cycle re-fetches the last few minutes per instrument; overlapping
/// bars are harmless because the store upsert is idempotent. Fetch failures
/// are logged and the next cycle retries - a broker outage must not kill
/// the producer.
pub async fn run_broker_feed(
    broker: BrokerClient,
    instruments: Vec<Instrument>,
    tx: mpsc::Sender<FeedEvent>,
    poll_secs: u64,
) {
    tracing::info!(
        "Broker feed starting for {} instruments (every {}s)",
        instruments.len(),
        poll_secs
    );

    let mut ticker = interval(Duration::from_secs(poll_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let to = Utc::now();
        let from = to - ChronoDuration::minutes(5);

        for instrument in &instruments {
            match broker
                .historical_data(instrument.token, from, to, "minute")
                .await
            {
                Ok(bars) => {
                    for bar in bars {
                        let event = FeedEvent {
                            symbol: instrument.symbol.clone(),
                            bar,
                        };
                        if tx.send(event).await.is_err() {
                            tracing::info!("Feed channel closed, broker feed stopping");
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to fetch bars for {}: {}", instrument.symbol, e);
                }
            }
        }
    }
}
