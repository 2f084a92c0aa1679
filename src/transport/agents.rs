//! Agent dispatch (§6): fans a single `AgentDispatchContext` out to the
//! configured agent pool in one HTTP call and collects their opinions. No
//! retry here — per spec.md §7, a dispatch failure aborts the cycle rather
//! than retrying, since by the time a retry would land the market snapshot
//! it reasoned over is already stale.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::Config;
use crate::domain::AnalysisResult;
use crate::errors::PipelineError;

use super::market_data::MarketQuote;
use super::TRACE_ID_HEADER;

/// Wire payload sent to the agent-dispatch collaborator (§3 `AgentDispatchContext`).
#[derive(Debug, Serialize)]
pub struct AgentDispatchContext {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "marketData")]
    pub market_data: MarketDataWire,
    pub prices: Vec<f64>,
    #[serde(rename = "traceId")]
    pub trace_id: String,
}

#[derive(Debug, Serialize)]
pub struct MarketDataWire {
    #[serde(rename = "latestClose")]
    pub latest_close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

impl AgentDispatchContext {
    pub fn from_quote(symbol: &str, timestamp: DateTime<Utc>, quote: &MarketQuote, trace_id: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp,
            market_data: MarketDataWire {
                latest_close: quote.latest_close,
                open: quote.open,
                high: quote.high,
                low: quote.low,
                volume: quote.volume,
            },
            prices: quote.recent_closing_prices.clone(),
            trace_id: trace_id.to_string(),
        }
    }
}

#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    async fn dispatch(&self, ctx: &AgentDispatchContext) -> Result<Vec<AnalysisResult>, PipelineError>;
}

pub struct HttpAgentDispatcher {
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
}

impl HttpAgentDispatcher {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.agent_dispatch_base_url.clone(),
            timeout: config.agent_dispatch_timeout,
        }
    }
}

#[async_trait]
impl AgentDispatcher for HttpAgentDispatcher {
    /// Posts the context once and decodes the array of agent opinions. A
    /// malformed or unreachable dispatch service is `UpstreamUnavailable`,
    /// aborting the cycle (§4.2 step 5); a single agent's *own* failure is
    /// expected to already have been substituted with `AnalysisResult::degraded`
    /// by the dispatch collaborator itself before the array is returned here.
    async fn dispatch(&self, ctx: &AgentDispatchContext) -> Result<Vec<AnalysisResult>, PipelineError> {
        let response = self
            .client
            .post(format!("{}/dispatch", self.base_url))
            .timeout(self.timeout)
            .header(TRACE_ID_HEADER, ctx.trace_id.clone())
            .json(ctx)
            .send()
            .await
            .map_err(|e| PipelineError::UpstreamUnavailable(format!("agent dispatch: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::UpstreamUnavailable(format!(
                "agent dispatch returned {}",
                response.status()
            )));
        }

        let mut results: Vec<AnalysisResult> = response
            .json()
            .await
            .map_err(|e| PipelineError::ParseError(format!("agent dispatch body: {e}")))?;

        for r in &mut results {
            if !r.is_valid() {
                warn!(agent = %r.agent_name, confidence = r.confidence, "agent returned out-of-range confidence, clamping");
                r.confidence = r.confidence.clamp(0.0, 1.0);
            }
        }
        Ok(results)
    }
}
