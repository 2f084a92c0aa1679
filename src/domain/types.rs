//! Value types that flow through the pipeline (§3 of the spec).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::{
    DecisionMode, DirectionalBias, MarketRegime, OutcomeLabel, Signal, TradeDirection,
    TradingSession,
};

/// Emitted by the scheduler, consumed exactly once by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub symbol: String,
    pub triggered_at: DateTime<Utc>,
    pub trace_id: String,
}

/// One agent's opinion for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub agent_name: String,
    pub summary: String,
    pub signal: Signal,
    pub confidence: f64,
    pub metadata: BTreeMap<String, Value>,
}

impl AnalysisResult {
    /// A degraded result substituted when an agent fails (§4.2 step 5); the pipeline
    /// continues rather than aborting on a single agent's failure.
    pub fn degraded(agent_name: impl Into<String>, error: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("error".to_string(), Value::String(error.into()));
        Self {
            agent_name: agent_name.into(),
            summary: "agent unavailable".to_string(),
            signal: Signal::Hold,
            confidence: 0.0,
            metadata,
        }
    }

    /// `[I]` confidence is finite and within [0,1].
    pub fn is_valid(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }
}

/// Returned by the strategist (primary LLM or rule-based fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategistDecision {
    pub final_signal: Signal,
    pub confidence: f64,
    pub reasoning: String,
    pub entry_price: Option<f64>,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub estimated_hold_minutes: Option<i64>,
    pub trade_direction: Option<TradeDirection>,
}

/// Output of the performance-weighted consensus guardrail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub final_signal: Signal,
    pub normalized_confidence: f64,
    pub per_agent_weights: BTreeMap<String, f64>,
}

/// A single prior decision reduced to the four fields strategy memory needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub final_signal: Signal,
    pub confidence: f64,
    pub divergence_flag: bool,
    pub regime: MarketRegime,
}

/// Pipeline-local, immutable context assembled once per invocation (§3.1):
/// the gate chain and strategist prompt both read from the same snapshot, so
/// neither can observe a partially-updated view of agent results or weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionContext {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub regime: MarketRegime,
    pub trading_session: TradingSession,
    pub latest_close: f64,
    pub agent_results: Vec<AnalysisResult>,
    pub adaptive_weights: BTreeMap<String, f64>,
    pub directional_bias: DirectionalBias,
    pub momentum_state: super::enums::MarketState,
}

#[allow(clippy::too_many_arguments)]
impl DecisionContext {
    /// `agent_results` and `adaptive_weights` are defensively copied here:
    /// later mutation of the caller's containers must never be visible to the
    /// gate chain (the defensive-copy property in spec.md §8).
    pub fn assemble(
        symbol: String,
        timestamp: DateTime<Utc>,
        trace_id: String,
        regime: MarketRegime,
        trading_session: TradingSession,
        latest_close: f64,
        agent_results: &[AnalysisResult],
        adaptive_weights: &BTreeMap<String, f64>,
        directional_bias: DirectionalBias,
        momentum_state: super::enums::MarketState,
    ) -> Self {
        Self {
            symbol,
            timestamp,
            trace_id,
            regime,
            trading_session,
            latest_close,
            agent_results: agent_results.to_vec(),
            adaptive_weights: adaptive_weights.clone(),
            directional_bias,
            momentum_state,
        }
    }
}

/// Versioned, persisted decision (v9, 24 fields per spec.md §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalDecision {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub agents: Vec<AnalysisResult>,
    pub final_signal: Signal,
    pub confidence: f64,
    pub metadata: BTreeMap<String, Value>,
    pub trace_id: String,
    pub decision_version: u32,
    pub orchestrator_version: String,
    pub agent_count: u32,
    pub decision_latency_ms: u64,
    pub consensus_score: f64,
    pub agent_weight_snapshot: BTreeMap<String, f64>,
    pub adaptive_agent_weights: BTreeMap<String, f64>,
    pub market_regime: MarketRegime,
    pub ai_reasoning: String,
    pub divergence_flag: bool,
    pub trading_session: TradingSession,
    pub entry_price: Option<f64>,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub estimated_hold_minutes: Option<i64>,
    pub trade_direction: TradeDirection,
    pub directional_bias: DirectionalBias,
    pub decision_mode: DecisionMode,
}

pub const DECISION_SCHEMA_VERSION: u32 = 9;
pub const ORCHESTRATOR_VERSION: &str = "decision-intel-engine/1.0";

impl FinalDecision {
    /// `[I]` finalSignal is always one of the four signals (enforced by the type); confidence in [0,1].
    pub fn is_valid(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }
}

/// Persisted form of `FinalDecision`; adds bookkeeping and outcome-resolution fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: i64,
    pub decision: FinalDecision,
    pub saved_at: DateTime<Utc>,
    pub outcome_percent: Option<f64>,
    pub outcome_hold_minutes: Option<i64>,
    pub outcome_resolved: bool,
    pub outcome_label: Option<OutcomeLabel>,
}

/// Running counters for one agent, keyed by `agent_name`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentPerformanceSnapshot {
    pub agent_name: String,
    pub total_decisions: u64,
    pub sum_confidence: f64,
    pub sum_latency_ms: u64,
    pub sum_wins: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformanceModel {
    pub agent_name: String,
    pub total_decisions: u64,
    pub avg_confidence: f64,
    pub avg_latency_ms: f64,
    pub win_rate: f64,
    pub latency_weight: f64,
    pub historical_accuracy_score: f64,
}

impl AgentPerformanceSnapshot {
    pub fn avg_confidence(&self) -> f64 {
        if self.total_decisions == 0 {
            0.0
        } else {
            self.sum_confidence / self.total_decisions as f64
        }
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.total_decisions == 0 {
            0.0
        } else {
            self.sum_latency_ms as f64 / self.total_decisions as f64
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_decisions == 0 {
            0.5
        } else {
            self.sum_wins as f64 / self.total_decisions as f64
        }
    }
}

/// Market-truth-derived agent feedback, §4.3 `getAgentFeedback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFeedback {
    pub agent_name: String,
    pub win_rate: f64,
    pub avg_confidence: f64,
    pub normalized_latency: f64,
    pub is_market_truth: bool,
}

/// Snapshot of how far the agent-feedback learning loop has progressed,
/// surfaced by the `/feedback-loop-status` control endpoint (§6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedbackLoopStatus {
    pub total_resolved_live_decisions: u64,
    pub agents_with_market_truth: u32,
    pub agents_pending: u32,
    pub min_resolved_outcomes_for_feedback: u32,
}

/// Pre-aggregated per-symbol projection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DecisionMetricsProjection {
    pub symbol: String,
    pub last_confidence: f64,
    pub confidence_slope5: f64,
    pub divergence_streak: u32,
    pub momentum_streak: u32,
}

/// Composite key `(session, regime, bias, signal)` used by the win-rate registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub session: TradingSession,
    pub regime: MarketRegime,
    pub bias: DirectionalBias,
    pub signal: Signal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EdgeCondition {
    pub win_count: u64,
    pub total_count: u64,
}

impl EdgeCondition {
    pub fn win_rate(&self) -> Option<f64> {
        if self.total_count == 0 {
            None
        } else {
            Some(self.win_count as f64 / self.total_count as f64)
        }
    }
}

/// 15-field projection broadcast to SSE subscribers on every save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub final_signal: Signal,
    pub confidence: f64,
    pub trace_id: String,
    pub market_regime: MarketRegime,
    pub trading_session: TradingSession,
    pub directional_bias: DirectionalBias,
    pub trade_direction: TradeDirection,
    pub divergence_flag: bool,
    pub consensus_score: f64,
    pub agent_count: u32,
    pub decision_latency_ms: u64,
    pub decision_mode: DecisionMode,
    pub entry_price: Option<f64>,
}

impl From<&FinalDecision> for DecisionSnapshot {
    fn from(d: &FinalDecision) -> Self {
        Self {
            symbol: d.symbol.clone(),
            timestamp: d.timestamp,
            final_signal: d.final_signal,
            confidence: d.confidence,
            trace_id: d.trace_id.clone(),
            market_regime: d.market_regime,
            trading_session: d.trading_session,
            directional_bias: d.directional_bias,
            trade_direction: d.trade_direction,
            divergence_flag: d.divergence_flag,
            consensus_score: d.consensus_score,
            agent_count: d.agent_count,
            decision_latency_ms: d.decision_latency_ms,
            decision_mode: d.decision_mode,
            entry_price: d.entry_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defensive_copy_survives_source_mutation() {
        let mut results = vec![AnalysisResult::degraded("a", "x")];
        let mut weights = BTreeMap::new();
        weights.insert("a".to_string(), 1.0);

        let ctx = DecisionContext::assemble(
            "NIFTY50".into(),
            Utc::now(),
            "t1".into(),
            MarketRegime::Calm,
            TradingSession::OffHours,
            100.0,
            &results,
            &weights,
            DirectionalBias::Neutral,
            super::super::enums::MarketState::Calm,
        );

        results.push(AnalysisResult::degraded("b", "y"));
        weights.insert("a".to_string(), 2.0);

        assert_eq!(ctx.agent_results.len(), 1);
        assert_eq!(ctx.adaptive_weights["a"], 1.0);
    }
}
