use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

const RATE_LIMIT_RPM: u32 = 60; // Historical API allows one call per second
const MAX_RETRIES: u32 = 3;

// Type alias for the rate limiter to simplify signatures
type BrokerRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// One bar as the broker sends it
///
/// OHLC fields are optional on purpose: a record missing any of them is
/// malformed and gets dropped by the feed, it must never abort the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBar {
    pub date: Option<DateTime<Utc>>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    candles: Vec<RawBar>,
}

/// Client for the broker's historical data API
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct BrokerClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<BrokerRateLimiter>,
}

impl BrokerClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter,
        })
    }

    /// Fetch historical bars for an instrument token, ordered oldest first
    ///
    /// `interval` is the broker's interval name, e.g. "minute".
    pub async fn historical_data(
        &self,
        instrument_token: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: &str,
    ) -> Result<Vec<RawBar>> {
        let url = format!(
            "{}/instruments/historical/{}/{}?from={}&to={}",
            self.base_url,
            instrument_token,
            interval,
            from.to_rfc3339(),
            to.to_rfc3339()
        );

        tracing::debug!(
            "Fetching {} bars for token {} ({} -> {})",
            interval,
            instrument_token,
            from,
            to
        );

        let response = self.make_request(&url).await?;
        let data: HistoricalResponse = response
            .json()
            .await
            .context("Failed to parse historical data")?;

        tracing::debug!(
            "Fetched {} bars for token {}",
            data.candles.len(),
            instrument_token
        );

        Ok(data.candles)
    }

    /// Make a rate-limited API request with retry logic
    async fn make_request(&self, url: &str) -> Result<reqwest::Response> {
        for attempt in 1..=MAX_RETRIES {
            // Wait for rate limiter
            self.rate_limiter.until_ready().await;

            let request = self
                .client
                .get(url)
                .header("Authorization", format!("token {}", self.api_key));

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    // Rate limited or server error: back off and retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Broker returned {}, retrying in {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    // Other errors (4xx) - don't retry
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("Broker API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }
}
