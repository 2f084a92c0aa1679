//! Error taxonomy (§7). Only `UpstreamUnavailable` (market data, agent dispatch)
//! is allowed to surface out of `orchestrate` as an orchestration failure; every
//! other kind here is recovered locally by the caller and never propagated past
//! its own stage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("strategist failed: {0}")]
    StrategistFailure(String),

    #[error("parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("projection failed: {0}")]
    ProjectionFailure(String),

    #[error("outcome resolution failed for trace {trace_id}: {reason}")]
    OutcomeResolutionFailure { trace_id: String, reason: String },

    #[error("not found")]
    NotFound,
}
