//! Market-data provider (§6): one outbound HTTP collaborator, the only one
//! that retries. Grounded on the teacher's `binance_session` fetch-with-retry
//! shape, minus the jitter (see `transport::backoff_delay`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::config::Config;
use crate::errors::PipelineError;

use super::{backoff_delay, TRACE_ID_HEADER};

/// A symbol's current bar plus trailing closes, capped defensively at 50
/// entries (§3 "recentClosingPrices: newest-first, capped at 50") regardless
/// of how many the upstream sends.
#[derive(Debug, Clone)]
pub struct MarketQuote {
    pub symbol: String,
    pub latest_close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub recent_closing_prices: Vec<f64>,
    pub fetched_at: DateTime<Utc>,
}

const MAX_RECENT_PRICES: usize = 50;

#[derive(Debug, Deserialize)]
struct MarketQuoteWire {
    symbol: String,
    #[serde(rename = "latestClose")]
    latest_close: f64,
    open: f64,
    high: f64,
    low: f64,
    volume: f64,
    #[serde(rename = "recentClosingPrices")]
    recent_closing_prices: Vec<f64>,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch(&self, symbol: &str, trace_id: &str) -> Result<MarketQuote, PipelineError>;
}

pub struct HttpMarketDataProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
    max_retries: u32,
}

impl HttpMarketDataProvider {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.market_data_base_url.clone(),
            timeout: config.market_data_timeout,
            max_retries: config.market_data_max_retries,
        }
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    /// Fetches one symbol's quote, retrying up to `max_retries` times on a 5xx
    /// or transport-level failure with an exponential backoff. A 4xx is not
    /// retried — it means the request itself is wrong, retrying won't help.
    async fn fetch(&self, symbol: &str, trace_id: &str) -> Result<MarketQuote, PipelineError> {
        let url = format!("{}/quotes/{}", self.base_url, symbol);
        let mut last_err = String::new();

        for attempt in 0..self.max_retries {
            let response = self
                .client
                .get(&url)
                .timeout(self.timeout)
                .header(TRACE_ID_HEADER, trace_id)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let wire: MarketQuoteWire = resp
                        .json()
                        .await
                        .map_err(|e| PipelineError::ParseError(format!("market data body: {e}")))?;
                    let mut prices = wire.recent_closing_prices;
                    prices.truncate(MAX_RECENT_PRICES);
                    return Ok(MarketQuote {
                        symbol: wire.symbol,
                        latest_close: wire.latest_close,
                        open: wire.open,
                        high: wire.high,
                        low: wire.low,
                        volume: wire.volume,
                        recent_closing_prices: prices,
                        fetched_at: Utc::now(),
                    });
                }
                Ok(resp) if resp.status().is_client_error() => {
                    return Err(PipelineError::UpstreamUnavailable(format!(
                        "market data returned {} for {}",
                        resp.status(),
                        symbol
                    )));
                }
                Ok(resp) => {
                    last_err = format!("market data returned {}", resp.status());
                }
                Err(e) => {
                    last_err = e.to_string();
                }
            }

            if attempt + 1 < self.max_retries {
                warn!(symbol, attempt, error = %last_err, "market data fetch failed, retrying");
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        Err(PipelineError::UpstreamUnavailable(format!(
            "market data unavailable for {symbol} after {} attempts: {last_err}",
            self.max_retries
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_recent_prices_to_cap() {
        let wire = MarketQuoteWire {
            symbol: "NIFTY50".into(),
            latest_close: 100.0,
            open: 99.0,
            high: 101.0,
            low: 98.0,
            volume: 1000.0,
            recent_closing_prices: (0..80).map(|i| i as f64).collect(),
        };
        let mut prices = wire.recent_closing_prices;
        prices.truncate(MAX_RECENT_PRICES);
        assert_eq!(prices.len(), MAX_RECENT_PRICES);
    }
}
