use crate::store::CandleStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// An open or closed position held by the algo session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub realized_pnl: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Live profit and loss for one symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LivePnl {
    pub symbol: String,
    pub last_price: Option<f64>,
    pub unrealized: f64,
    pub realized: f64,
}

/// Thread-safe book of the session's positions
#[derive(Clone, Default)]
pub struct PositionBook {
    positions: Arc<RwLock<Vec<Position>>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, symbol: &str, entry_price: f64, quantity: f64) -> Uuid {
        let position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            entry_price,
            quantity,
            status: PositionStatus::Open,
            exit_price: None,
            realized_pnl: None,
        };
        let id = position.id;
        self.positions.write().unwrap().push(position);
        tracing::info!("Opened position {} for {} @ {}", id, symbol, entry_price);
        id
    }

    /// Close one open position at the given price; no-op for unknown ids
    pub fn close(&self, id: Uuid, exit_price: f64) {
        let mut positions = self.positions.write().unwrap();
        if let Some(position) = positions
            .iter_mut()
            .find(|p| p.id == id && p.status == PositionStatus::Open)
        {
            position.status = PositionStatus::Closed;
            position.exit_price = Some(exit_price);
            position.realized_pnl =
                Some((exit_price - position.entry_price) * position.quantity);
            tracing::info!("Closed position {} @ {}", id, exit_price);
        }
    }

    /// Close every open position at the latest stored close (force exit)
    ///
    /// Positions with no price available stay open; the next pass retries.
    pub fn close_all(&self, store: &CandleStore) -> usize {
        let open_ids: Vec<(Uuid, String)> = self
            .positions
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| (p.id, p.symbol.clone()))
            .collect();

        let mut closed = 0;
        for (id, symbol) in open_ids {
            if let Some(price) = store.last_close(&symbol) {
                self.close(id, price);
                closed += 1;
            } else {
                tracing::warn!("No price for {}, leaving position {} open", symbol, id);
            }
        }
        closed
    }

    pub fn open_positions(&self, symbol: &str) -> Vec<Position> {
        self.positions
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.symbol == symbol && p.status == PositionStatus::Open)
            .cloned()
            .collect()
    }

    pub fn all_positions(&self) -> Vec<Position> {
        self.positions.read().unwrap().clone()
    }
}

/// Computes live PnL from stored candles and the position book
///
/// Read-only consumer of both; never mutates candle or session state.
#[derive(Clone)]
pub struct PnlEngine {
    store: CandleStore,
    book: PositionBook,
}

impl PnlEngine {
    pub fn new(store: CandleStore, book: PositionBook) -> Self {
        Self { store, book }
    }

    /// Live PnL for a symbol against the latest stored close
    ///
    /// No stored candles or no positions degrade to zeros, not an error.
    pub fn live_pnl(&self, symbol: &str) -> LivePnl {
        let last_price = self.store.last_close(symbol);

        let positions = self.book.all_positions();
        let mut unrealized = 0.0;
        let mut realized = 0.0;

        for position in positions.iter().filter(|p| p.symbol == symbol) {
            match position.status {
                PositionStatus::Open => {
                    if let Some(price) = last_price {
                        unrealized += (price - position.entry_price) * position.quantity;
                    }
                }
                PositionStatus::Closed => {
                    realized += position.realized_pnl.unwrap_or(0.0);
                }
            }
        }

        LivePnl {
            symbol: symbol.to_string(),
            last_price,
            unrealized,
            realized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;

    fn candle(symbol: &str, ts: i64, close: f64) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
        }
    }

    #[tokio::test]
    async fn test_unrealized_pnl_tracks_last_close() {
        let store = CandleStore::new();
        store.upsert_candle(candle("NIFTY", 0, 100.0)).await.unwrap();

        let book = PositionBook::new();
        book.open("NIFTY", 100.0, 50.0);

        let engine = PnlEngine::new(store.clone(), book);

        let pnl = engine.live_pnl("NIFTY");
        assert_eq!(pnl.unrealized, 0.0);

        store.upsert_candle(candle("NIFTY", 60, 102.0)).await.unwrap();
        let pnl = engine.live_pnl("NIFTY");
        assert_eq!(pnl.last_price, Some(102.0));
        assert_eq!(pnl.unrealized, 100.0); // (102 - 100) * 50
    }

    #[tokio::test]
    async fn test_realized_pnl_after_close() {
        let store = CandleStore::new();
        store.upsert_candle(candle("NIFTY", 0, 110.0)).await.unwrap();

        let book = PositionBook::new();
        let id = book.open("NIFTY", 100.0, 10.0);
        book.close(id, 110.0);

        let engine = PnlEngine::new(store, book.clone());
        let pnl = engine.live_pnl("NIFTY");

        assert_eq!(pnl.unrealized, 0.0);
        assert_eq!(pnl.realized, 100.0); // (110 - 100) * 10
        assert!(book.open_positions("NIFTY").is_empty());
    }

    #[tokio::test]
    async fn test_close_all_uses_stored_price() {
        let store = CandleStore::new();
        store.upsert_candle(candle("NIFTY", 0, 105.0)).await.unwrap();

        let book = PositionBook::new();
        book.open("NIFTY", 100.0, 1.0);
        book.open("BANKNIFTY", 200.0, 1.0); // No stored price

        let closed = book.close_all(&store);
        assert_eq!(closed, 1);
        assert!(book.open_positions("NIFTY").is_empty());
        assert_eq!(book.open_positions("BANKNIFTY").len(), 1);
    }

    #[test]
    fn test_unknown_symbol_degrades_to_zeros() {
        let engine = PnlEngine::new(CandleStore::new(), PositionBook::new());
        let pnl = engine.live_pnl("UNKNOWN");

        assert_eq!(pnl.last_price, None);
        assert_eq!(pnl.unrealized, 0.0);
        assert_eq!(pnl.realized, 0.0);
    }
}
