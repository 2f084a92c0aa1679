//! Strategist client (§6): the primary LLM-backed decision-maker. Grounded on
//! the teacher's model-choice-by-urgency pattern (fast model under load,
//! deeper model otherwise) applied here to peak-mode vs normal-mode timeouts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    DecisionContext, DirectionalBias, MarketRegime, MemoryEntry, Signal, StrategistDecision,
    TradeDirection, TradingSession,
};
use crate::errors::PipelineError;

use super::TRACE_ID_HEADER;

/// Picks the faster model under peak-mode time pressure (§4.1 "Adaptive tempo
/// & peak-mode"), the deeper one otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    Fast,
    Deep,
}

impl ModelChoice {
    pub fn for_peak_mode(peak_mode: bool) -> Self {
        if peak_mode {
            ModelChoice::Fast
        } else {
            ModelChoice::Deep
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ModelChoice::Fast => "fast",
            ModelChoice::Deep => "deep",
        }
    }
}

/// The prompt sent to the strategist service: the decision context reduced to
/// what the model needs to reason over, plus recent strategy memory.
#[derive(Debug, Serialize)]
pub struct StrategistPrompt {
    pub symbol: String,
    pub regime: MarketRegime,
    pub session: TradingSession,
    pub directional_bias: DirectionalBias,
    pub latest_close: f64,
    pub agent_summaries: Vec<AgentSummaryWire>,
    pub memory: Vec<MemoryEntry>,
    pub model: String,
    /// Peak-mode short-prompt variant (§4.2 step 11): agent free-text summaries
    /// are dropped and memory trimmed to the single most recent entry, to keep
    /// the prompt small enough for the tight peak-mode timeout budget.
    pub short_prompt: bool,
}

#[derive(Debug, Serialize)]
pub struct AgentSummaryWire {
    pub agent_name: String,
    pub signal: Signal,
    pub confidence: f64,
    pub summary: String,
}

impl StrategistPrompt {
    /// Builds the prompt from an assembled (pre-strategy) `DecisionContext`
    /// plus the strategy memory fetched in stage 10 (§4.2). `short_prompt`
    /// forces the peak-mode variant (no free text, memory trimmed to 1).
    pub fn build(
        ctx: &DecisionContext,
        mut memory: Vec<MemoryEntry>,
        model: ModelChoice,
        short_prompt: bool,
    ) -> Self {
        if short_prompt {
            memory.truncate(1);
        }
        Self {
            symbol: ctx.symbol.clone(),
            regime: ctx.regime,
            session: ctx.trading_session,
            directional_bias: ctx.directional_bias,
            latest_close: ctx.latest_close,
            agent_summaries: ctx
                .agent_results
                .iter()
                .map(|r| AgentSummaryWire {
                    agent_name: r.agent_name.clone(),
                    signal: r.signal,
                    confidence: r.confidence,
                    summary: if short_prompt { String::new() } else { r.summary.clone() },
                })
                .collect(),
            memory,
            model: model.as_str().to_string(),
            short_prompt,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StrategistReplyWire {
    #[serde(rename = "finalSignal")]
    final_signal: Signal,
    confidence: f64,
    reasoning: String,
    #[serde(rename = "entryPrice")]
    entry_price: Option<f64>,
    #[serde(rename = "targetPrice")]
    target_price: Option<f64>,
    #[serde(rename = "stopLoss")]
    stop_loss: Option<f64>,
    #[serde(rename = "estimatedHoldMinutes")]
    estimated_hold_minutes: Option<i64>,
    #[serde(rename = "tradeDirection")]
    trade_direction: Option<TradeDirection>,
}

#[async_trait]
pub trait Strategist: Send + Sync {
    async fn decide(
        &self,
        prompt: &StrategistPrompt,
        trace_id: &str,
        timeout: std::time::Duration,
    ) -> Result<StrategistDecision, PipelineError>;
}

pub struct HttpStrategistClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpStrategistClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self { client, base_url, api_key }
    }
}

#[async_trait]
impl Strategist for HttpStrategistClient {
    /// Posts the prompt and decodes the decision. A non-JSON or malformed
    /// reply surfaces as `ParseError`/`StrategistFailure` rather than
    /// panicking, so the pipeline's rule-based fallback can take over
    /// (§4.2 step 12 "strategist failure falls back to rule-based decision").
    async fn decide(
        &self,
        prompt: &StrategistPrompt,
        trace_id: &str,
        timeout: std::time::Duration,
    ) -> Result<StrategistDecision, PipelineError> {
        let mut request = self
            .client
            .post(format!("{}/decide", self.base_url))
            .timeout(timeout)
            .header(TRACE_ID_HEADER, trace_id)
            .json(prompt);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::StrategistFailure(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::StrategistFailure(format!(
                "strategist returned {}",
                response.status()
            )));
        }

        let wire: StrategistReplyWire = response
            .json()
            .await
            .map_err(|e| PipelineError::ParseError(format!("strategist body: {e}")))?;

        Ok(StrategistDecision {
            final_signal: wire.final_signal,
            confidence: wire.confidence.clamp(0.0, 1.0),
            reasoning: wire.reasoning,
            entry_price: wire.entry_price,
            target_price: wire.target_price,
            stop_loss: wire.stop_loss,
            estimated_hold_minutes: wire.estimated_hold_minutes,
            trade_direction: wire.trade_direction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_mode_selects_fast_model() {
        assert_eq!(ModelChoice::for_peak_mode(true), ModelChoice::Fast);
        assert_eq!(ModelChoice::for_peak_mode(false), ModelChoice::Deep);
    }
}
