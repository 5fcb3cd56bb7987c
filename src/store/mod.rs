use crate::db::CandleRepository;
use crate::models::{Candle, BASE_INTERVAL_SECS};
use crate::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;

/// One symbol's series plus the gate that orders its write-through path
///
/// `write_gate` must be held across the repository write and the memory
/// insert; the data lock alone cannot span the await, so without the gate
/// two writers to the same slot could commit to Postgres in one order and
/// to memory in the other.
struct SymbolSeries {
    write_gate: AsyncMutex<()>,
    data: Mutex<BTreeMap<i64, Candle>>,
}

impl SymbolSeries {
    fn new() -> Self {
        Self {
            write_gate: AsyncMutex::new(()),
            data: Mutex::new(BTreeMap::new()),
        }
    }
}

type Series = Arc<SymbolSeries>;

/// Thread-safe store of 1-minute candles, one ordered series per symbol
///
/// Writes go through Postgres first when a repository is attached, so a
/// candle that was acknowledged is already durable. The in-memory series is
/// the read path; each symbol has its own gate so independent symbols write
/// in parallel while writes to one symbol stay serialized end to end.
#[derive(Clone)]
pub struct CandleStore {
    series: Arc<RwLock<HashMap<String, Series>>>,
    repository: Option<CandleRepository>,
}

impl CandleStore {
    /// Create a memory-only store (tests, demo mode without a database)
    pub fn new() -> Self {
        Self {
            series: Arc::new(RwLock::new(HashMap::new())),
            repository: None,
        }
    }

    /// Create a store that writes through to Postgres before acknowledging
    pub fn with_repository(repository: CandleRepository) -> Self {
        Self {
            series: Arc::new(RwLock::new(HashMap::new())),
            repository: Some(repository),
        }
    }

    /// Write or overwrite the candle at (symbol, floor(timestamp, 60))
    ///
    /// Idempotent: a second write to the same slot replaces the first.
    pub async fn upsert_candle(&self, candle: Candle) -> Result<()> {
        let candle = candle.aligned();
        let series = self.series_for(&candle.symbol);

        // The gate covers both the durable write and the memory insert, so
        // concurrent writes to the same slot cannot land in Postgres in one
        // order and in memory in the other.
        let _gate = series.write_gate.lock().await;

        // Durability first; a failure here leaves memory untouched so the
        // caller can retry the whole write.
        if let Some(repo) = &self.repository {
            repo.upsert_candle(&candle).await?;
        }

        debug_assert_eq!(
            candle.timestamp % BASE_INTERVAL_SECS,
            0,
            "candle must be minute-aligned before insert"
        );
        series.data.lock().unwrap().insert(candle.timestamp, candle);
        Ok(())
    }

    /// Preload a series without touching the database (warm start)
    pub fn load_series(&self, symbol: &str, candles: Vec<Candle>) {
        let series = self.series_for(symbol);
        let mut map = series.data.lock().unwrap();
        for candle in candles {
            let candle = candle.aligned();
            map.insert(candle.timestamp, candle);
        }
    }

    /// Full ordered series for a symbol, oldest first
    ///
    /// Unknown symbol yields an empty Vec, not an error.
    pub fn get_candles(&self, symbol: &str) -> Vec<Candle> {
        let guard = self.series.read().unwrap();
        match guard.get(symbol) {
            Some(series) => series.data.lock().unwrap().values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Number of stored candles for a symbol
    pub fn candle_count(&self, symbol: &str) -> usize {
        let guard = self.series.read().unwrap();
        guard
            .get(symbol)
            .map(|s| s.data.lock().unwrap().len())
            .unwrap_or(0)
    }

    /// All symbols with at least one candle
    pub fn symbols(&self) -> Vec<String> {
        self.series.read().unwrap().keys().cloned().collect()
    }

    /// Latest close for a symbol, if any candle exists
    pub fn last_close(&self, symbol: &str) -> Option<f64> {
        let guard = self.series.read().unwrap();
        guard
            .get(symbol)
            .and_then(|s| s.data.lock().unwrap().values().next_back().map(|c| c.close))
    }

    fn series_for(&self, symbol: &str) -> Series {
        if let Some(series) = self.series.read().unwrap().get(symbol) {
            return series.clone();
        }

        let mut guard = self.series.write().unwrap();
        guard
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(SymbolSeries::new()))
            .clone()
    }
}

impl Default for CandleStore {
    fn default() -> Self {
        Self::new()
    }
}
