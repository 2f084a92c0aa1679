//! Control endpoints (§6 "Control endpoints"): a thin Axum surface over the
//! pipeline, the scheduler's replay interlock, and the store's reads. No
//! business logic lives here — every handler delegates straight to the
//! collaborator that owns the behaviour. Grounded on the teacher's
//! `api::signals_api`/`api::simple_routes` handler shape: `Query`/`Path`/
//! `State` extractors, `Result<Json<T>, StatusCode>` returns.

mod handlers;
mod sse;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::pipeline::Orchestrator;
use crate::replay::ReplayGate;
use crate::store::FeedbackStore;

/// Everything a control-endpoint handler needs, held behind one `Arc` so
/// cloning the state for each request is a pointer copy.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: FeedbackStore,
    pub replay_gate: ReplayGate,
    pub config: Arc<Config>,
}

/// Assembles the full control-endpoint router (§6). `cors`/`trace` layers
/// mirror the teacher's `CorsLayer::permissive()` +
/// `tower_http::trace::TraceLayer` composition.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/orchestrate", post(handlers::orchestrate_trigger))
        .route("/save", post(handlers::save_decision))
        .route("/snapshot", get(handlers::snapshot))
        .route("/stream", get(sse::stream))
        .route("/latest-regime", get(handlers::latest_regime))
        .route("/recent/:symbol", get(handlers::recent_decisions))
        .route("/unresolved/:symbol", get(handlers::unresolved))
        .route("/outcome/:trace_id", post(handlers::record_outcome))
        .route("/resolve-outcomes/:symbol", post(handlers::resolve_outcomes))
        .route("/agent-performance", get(handlers::agent_performance))
        .route("/agent-feedback", get(handlers::agent_feedback))
        .route("/feedback-loop-status", get(handlers::feedback_loop_status))
        .route("/decision-metrics/:symbol", get(handlers::decision_metrics))
        .route("/market-state/:symbol", get(handlers::market_state))
        .route("/replay-mode", post(handlers::set_replay_mode))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}
