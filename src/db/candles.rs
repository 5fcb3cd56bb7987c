use crate::models::{Candle, BASE_INTERVAL_SECS};
use crate::Result;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::collections::HashMap;

/// Postgres persistence for 1-minute candles
///
/// One row per (symbol, ts); writes are upserts so overlapping backfill and
/// live feed resolve to a single row with the latest values.
#[derive(Clone)]
pub struct CandleRepository {
    pool: PgPool,
}

impl CandleRepository {
    /// Connect to Postgres and run migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }

    /// Upsert a single candle, keyed by (symbol, minute-aligned ts)
    ///
    /// Writing the same logical candle twice leaves exactly one row holding
    /// the values of the second write.
    pub async fn upsert_candle(&self, candle: &Candle) -> Result<()> {
        let ts = Candle::floor_timestamp(candle.timestamp, BASE_INTERVAL_SECS);

        sqlx::query(
            r#"
            INSERT INTO candles (symbol, ts, open, high, low, close)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (symbol, ts) DO UPDATE SET
                open = EXCLUDED.open,
                high = EXCLUDED.high,
                low = EXCLUDED.low,
                close = EXCLUDED.close,
                updated_at = NOW()
            "#,
        )
        .bind(&candle.symbol)
        .bind(ts)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Upserted candle {}@{} to Postgres", candle.symbol, ts);

        Ok(())
    }

    /// Load the full ordered series for a symbol, oldest first
    pub async fn load_candles(&self, symbol: &str) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, ts, open, high, low, close
            FROM candles
            WHERE symbol = $1
            ORDER BY ts ASC
            "#,
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(row_to_candle(&row));
        }

        tracing::info!("Loaded {} candles for {} from Postgres", candles.len(), symbol);

        Ok(candles)
    }

    /// Load every stored candle grouped by symbol (warm start)
    pub async fn load_all(&self) -> Result<HashMap<String, Vec<Candle>>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, ts, open, high, low, close
            FROM candles
            ORDER BY symbol, ts ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_symbol: HashMap<String, Vec<Candle>> = HashMap::new();
        for row in rows {
            let candle = row_to_candle(&row);
            by_symbol.entry(candle.symbol.clone()).or_default().push(candle);
        }

        tracing::info!("Warm-loaded candles for {} symbols", by_symbol.len());

        Ok(by_symbol)
    }

    /// Delete all candles for a symbol (testing only)
    #[cfg(test)]
    pub async fn clear_symbol(&self, symbol: &str) -> Result<()> {
        sqlx::query("DELETE FROM candles WHERE symbol = $1")
            .bind(symbol)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn row_to_candle(row: &sqlx::postgres::PgRow) -> Candle {
    Candle {
        symbol: row.get("symbol"),
        timestamp: row.get("ts"),
        open: row.get("open"),
        high: row.get("high"),
        low: row.get("low"),
        close: row.get("close"),
    }
}
