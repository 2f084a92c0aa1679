//! Handler bodies for every control endpoint (§6). Each one is a thin
//! translation between the wire shape and the collaborator's native call —
//! no gate logic, no persistence decisions are made here.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::classifiers::{DecisionSample, MomentumStateCalculator};
use crate::domain::{
    AgentFeedback, AgentPerformanceModel, AnalysisResult, DecisionMetricsProjection, DecisionRecord,
    DecisionSnapshot, FeedbackLoopStatus, FinalDecision, MarketRegime, MarketState,
};

use super::AppState;

/// Mirrors the teacher's plain-string `health_check` handler.
pub async fn health() -> &'static str {
    "decision-intel-engine operational"
}

#[derive(Debug, Deserialize)]
pub struct OrchestrateRequest {
    pub symbol: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub replay_mode: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct OrchestrateResponse {
    pub trace_id: String,
    pub symbol: String,
    pub agents: Vec<AnalysisResult>,
}

/// `orchestrate_trigger` (§6): accepts a trigger payload and an optional
/// replay-mode signal (either the request body's `replayMode` field or the
/// configured replay header), runs the pipeline, and returns only the
/// per-agent results — the internal `FinalDecision` is never exposed to
/// external callers (§6 "the internal FinalDecision is not exposed").
pub async fn orchestrate_trigger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<OrchestrateRequest>,
) -> Result<Json<OrchestrateResponse>, StatusCode> {
    let replay_mode = req.replay_mode.unwrap_or_else(|| {
        headers
            .get(state.config.replay_mode_header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| matches!(v, "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(false)
    });

    let trigger = crate::domain::Trigger {
        symbol: req.symbol,
        triggered_at: chrono::Utc::now(),
        trace_id: req.trace_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    };

    let decision = state
        .orchestrator
        .orchestrate(trigger, replay_mode)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(OrchestrateResponse { trace_id: decision.trace_id.clone(), symbol: decision.symbol.clone(), agents: decision.agents }))
}

/// `save` (§6): external decision persistence, for the out-of-scope replay
/// harness to feed previously-computed decisions back into the store.
pub async fn save_decision(
    State(state): State<Arc<AppState>>,
    Json(decision): Json<FinalDecision>,
) -> Result<Json<DecisionRecord>, StatusCode> {
    let record = state.store.save(&decision).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(record))
}

/// `snapshot` (§6).
pub async fn snapshot(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DecisionSnapshot>>, StatusCode> {
    let rows = state.store.find_latest_per_symbol().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    pub symbol: String,
}

/// `latest-regime?symbol=` (§6).
pub async fn latest_regime(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SymbolQuery>,
) -> Result<Json<MarketRegime>, StatusCode> {
    let regime = state.store.latest_regime(&params.symbol).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(regime))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_recent_limit")]
    pub limit: usize,
}

fn default_recent_limit() -> usize {
    10
}

/// `recent/{symbol}?limit=` (§6).
pub async fn recent_decisions(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<crate::domain::MemoryEntry>>, StatusCode> {
    let rows = state.store.recent_decisions(&symbol, params.limit).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct SinceMinsQuery {
    #[serde(default = "default_since_mins", rename = "sinceMins")]
    pub since_mins: i64,
}

fn default_since_mins() -> i64 {
    10
}

/// `unresolved/{symbol}?sinceMins=` (§6).
pub async fn unresolved(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(params): Query<SinceMinsQuery>,
) -> Result<Json<Vec<DecisionRecord>>, StatusCode> {
    let rows = state.store.unresolved_since(&symbol, params.since_mins).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct RecordOutcomeRequest {
    pub outcome_percent: f64,
    pub hold_minutes: i64,
}

/// `outcome/{traceId}` (§6).
pub async fn record_outcome(
    State(state): State<Arc<AppState>>,
    Path(trace_id): Path<String>,
    Json(req): Json<RecordOutcomeRequest>,
) -> Result<StatusCode, StatusCode> {
    match state.store.record_outcome(&trace_id, req.outcome_percent, req.hold_minutes) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(crate::errors::StoreError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[derive(Debug, Deserialize)]
pub struct CurrentPriceQuery {
    #[serde(rename = "currentPrice")]
    pub current_price: f64,
}

#[derive(Debug, Serialize)]
pub struct ResolveOutcomesResponse {
    pub resolved_count: u32,
}

/// `resolve-outcomes/{symbol}?currentPrice=` (§6).
pub async fn resolve_outcomes(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(params): Query<CurrentPriceQuery>,
) -> Result<Json<ResolveOutcomesResponse>, StatusCode> {
    let resolved_count =
        state.store.resolve_outcomes(&symbol, params.current_price).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(ResolveOutcomesResponse { resolved_count }))
}

/// `agent-performance` (§6).
pub async fn agent_performance(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, AgentPerformanceModel>>, StatusCode> {
    let map = state.store.agent_performance().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(map))
}

/// `agent-feedback` (§6).
pub async fn agent_feedback(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, AgentFeedback>>, StatusCode> {
    let map = state.store.agent_feedback().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(map))
}

/// `feedback-loop-status` (§6).
pub async fn feedback_loop_status(State(state): State<Arc<AppState>>) -> Result<Json<FeedbackLoopStatus>, StatusCode> {
    let status = state.store.feedback_loop_status().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(status))
}

/// `decision-metrics/{symbol}` (§6).
pub async fn decision_metrics(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<DecisionMetricsProjection>, StatusCode> {
    let projection = state.store.decision_metrics(&symbol).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(projection))
}

const MARKET_STATE_WINDOW: usize = 8;

/// `market-state` (§6). spec.md leaves this endpoint's exact payload
/// unspecified; this crate resolves it as the `MomentumStateCalculator`
/// output (§4.4) over the symbol's last 8 decisions — the same input the
/// pipeline itself feeds into `DecisionContext.momentumState` — so external
/// callers see the identical state the gate chain reasoned over (documented
/// in DESIGN.md).
pub async fn market_state(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<MarketState>, StatusCode> {
    let recent = state.store.recent_decisions(&symbol, MARKET_STATE_WINDOW).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let samples: Vec<DecisionSample> = recent
        .into_iter()
        .rev()
        .map(|m| DecisionSample { signal: m.final_signal, confidence: m.confidence, divergence_flag: m.divergence_flag, regime: m.regime })
        .collect();
    Ok(Json(MomentumStateCalculator::state(&samples)))
}

#[derive(Debug, Deserialize)]
pub struct ReplayModeRequest {
    pub running: bool,
}

/// Not named in spec.md §6, but required for the replay interlock (§4.1, §9
/// "Replay isolation") to have any external trigger at all, since the replay
/// harness itself is out of scope. Supplemented and documented in DESIGN.md.
pub async fn set_replay_mode(State(state): State<Arc<AppState>>, Json(req): Json<ReplayModeRequest>) -> StatusCode {
    state.replay_gate.set_running(req.running);
    StatusCode::NO_CONTENT
}
