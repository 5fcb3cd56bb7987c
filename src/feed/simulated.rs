use super::FeedEvent;
use crate::api::RawBar;
use crate::models::Instrument;
use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

/// Random-walk bar generator used in demo mode
///
/// Produces plausible minute bars per instrument so the whole pipeline
/// (ingestion, aggregation, scheduler) runs without a broker session.
/// Seeded for reproducibility.
pub struct SimulatedFeed {
    rng: StdRng,
    last_close: HashMap<String, f64>,
}

impl SimulatedFeed {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            last_close: HashMap::new(),
        }
    }

    /// Generate the bar for one instrument at the given epoch second
    pub fn next_bar(&mut self, instrument: &Instrument, ts: i64) -> FeedEvent {
        // Seed each index near a realistic level on first sight
        let base = match instrument.symbol.as_str() {
            "NIFTY" => 22_000.0,
            "BANKNIFTY" => 47_000.0,
            "SENSEX" => 72_000.0,
            _ => 1_000.0,
        };
        let open = *self
            .last_close
            .entry(instrument.symbol.clone())
            .or_insert(base);

        // +-0.05% random walk per minute with intrabar wiggle
        let drift: f64 = self.rng.gen_range(-0.0005..0.0005);
        let close = open * (1.0 + drift);
        let wiggle = open * self.rng.gen_range(0.0..0.0003);
        let high = open.max(close) + wiggle;
        let low = open.min(close) - wiggle;

        self.last_close.insert(instrument.symbol.clone(), close);

        FeedEvent {
            symbol: instrument.symbol.clone(),
            bar: RawBar {
                date: Utc.timestamp_opt(ts, 0).single(),
                open: Some(open),
                high: Some(high),
                low: Some(low),
                close: Some(close),
            },
        }
    }

    /// Emit one bar per instrument every `tick_secs` until the channel closes
    pub async fn run(
        mut self,
        instruments: Vec<Instrument>,
        tx: mpsc::Sender<FeedEvent>,
        tick_secs: u64,
    ) {
        tracing::info!(
            "Simulated feed starting for {} instruments (every {}s)",
            instruments.len(),
            tick_secs
        );

        let mut ticker = interval(Duration::from_secs(tick_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp();

            for instrument in &instruments {
                let event = self.next_bar(instrument, ts);
                if tx.send(event).await.is_err() {
                    tracing::info!("Feed channel closed, simulated feed stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::bar_to_candle;

    fn nifty() -> Instrument {
        Instrument {
            symbol: "NIFTY".to_string(),
            token: 256_265,
        }
    }

    #[test]
    fn test_bars_are_well_formed() {
        let mut feed = SimulatedFeed::new(42);

        for i in 0..100i64 {
            let event = feed.next_bar(&nifty(), i * 60);
            let candle = bar_to_candle(&event.symbol, &event.bar).unwrap();

            assert!(candle.high >= candle.open.max(candle.close));
            assert!(candle.low <= candle.open.min(candle.close));
            assert_eq!(candle.timestamp, i * 60);
        }
    }

    #[test]
    fn test_walk_is_continuous() {
        let mut feed = SimulatedFeed::new(7);

        let first = feed.next_bar(&nifty(), 0);
        let second = feed.next_bar(&nifty(), 60);

        // Next bar opens where the previous one closed
        assert_eq!(second.bar.open, first.bar.close);
    }

    #[test]
    fn test_same_seed_same_bars() {
        let mut a = SimulatedFeed::new(99);
        let mut b = SimulatedFeed::new(99);

        for i in 0..10i64 {
            let bar_a = a.next_bar(&nifty(), i * 60).bar;
            let bar_b = b.next_bar(&nifty(), i * 60).bar;
            assert_eq!(bar_a.close, bar_b.close);
        }
    }
}
