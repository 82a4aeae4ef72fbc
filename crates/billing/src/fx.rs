//! USD -> NGN exchange rate cache
//!
//! One process-wide scalar with a 6 hour TTL, refreshed lazily from an
//! external rate API. Pricing must not hard-fail on a transient FX
//! outage, so every failure mode degrades to `None` and the caller
//! supplies a fallback rate. Two concurrent expirations may both
//! refetch; the fetched value is idempotent data so the race is benign.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;

/// Default external rate source
pub const DEFAULT_RATE_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Cache TTL: 6 hours
pub const RATE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Bounded fetch timeout
const FETCH_TIMEOUT: Duration = Duration::from_millis(3_500);

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: f64,
    fetched_at: Instant,
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    rates: Rates,
}

#[derive(Debug, Deserialize)]
struct Rates {
    #[serde(rename = "NGN")]
    ngn: Option<f64>,
}

/// Time-bounded cache of the USD -> NGN rate
pub struct FxRateCache {
    http: reqwest::Client,
    source_url: String,
    ttl: Duration,
    cached: RwLock<Option<CachedRate>>,
}

impl FxRateCache {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self::with_ttl(source_url, RATE_TTL)
    }

    pub fn with_ttl(source_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            source_url: source_url.into(),
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Current USD -> NGN rate, or `None` when the cache is cold and
    /// the source is unreachable or returns garbage.
    pub async fn usd_to_ngn(&self) -> Option<f64> {
        if let Some(cached) = *self.cached.read().await {
            if cached.fetched_at.elapsed() < self.ttl {
                return Some(cached.rate);
            }
        }

        match self.fetch_rate().await {
            Ok(rate) => {
                *self.cached.write().await = Some(CachedRate {
                    rate,
                    fetched_at: Instant::now(),
                });
                Some(rate)
            }
            Err(e) => {
                tracing::warn!(error = %e, "FX rate fetch failed, caller will fall back");
                None
            }
        }
    }

    async fn fetch_rate(&self) -> anyhow::Result<f64> {
        let response = self
            .http
            .get(&self.source_url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("FX fetch failed ({})", response.status());
        }

        let body: RateResponse = response.json().await?;
        let rate = body
            .rates
            .ngn
            .ok_or_else(|| anyhow::anyhow!("FX rate for NGN unavailable"))?;

        if !rate.is_finite() || rate <= 0.0 {
            anyhow::bail!("FX rate for NGN invalid: {rate}");
        }

        Ok(rate)
    }
}
