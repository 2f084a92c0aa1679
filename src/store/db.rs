//! Connection + schema, following `signals/db_storage.rs`'s pragma-and-schema
//! style. Four tables: `decision_history`, `agent_performance_snapshot`,
//! `decision_metrics_projection`, `edge_conditions` (§6).

use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::info;

use crate::errors::StoreError;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -32000;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS decision_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    agents_json TEXT NOT NULL,
    final_signal TEXT NOT NULL,
    confidence REAL NOT NULL,
    metadata_json TEXT NOT NULL,
    trace_id TEXT NOT NULL,
    decision_version INTEGER NOT NULL,
    orchestrator_version TEXT NOT NULL,
    agent_count INTEGER NOT NULL,
    decision_latency_ms INTEGER NOT NULL,
    consensus_score REAL NOT NULL,
    agent_weight_snapshot_json TEXT NOT NULL,
    adaptive_agent_weights_json TEXT NOT NULL,
    market_regime TEXT NOT NULL,
    ai_reasoning TEXT NOT NULL,
    divergence_flag INTEGER NOT NULL,
    trading_session TEXT NOT NULL,
    entry_price REAL,
    target_price REAL,
    stop_loss REAL,
    estimated_hold_minutes INTEGER,
    trade_direction TEXT NOT NULL,
    directional_bias TEXT NOT NULL,
    decision_mode TEXT NOT NULL DEFAULT 'LIVE',
    saved_at TEXT NOT NULL,
    outcome_percent REAL,
    outcome_hold_minutes INTEGER,
    outcome_resolved INTEGER NOT NULL DEFAULT 0,
    outcome_label TEXT
);

CREATE INDEX IF NOT EXISTS idx_decision_history_symbol_saved_at
    ON decision_history(symbol, saved_at DESC);

CREATE INDEX IF NOT EXISTS idx_decision_history_trace_id
    ON decision_history(trace_id);

CREATE TABLE IF NOT EXISTS agent_performance_snapshot (
    agent_name TEXT PRIMARY KEY,
    total_decisions INTEGER NOT NULL DEFAULT 0,
    sum_confidence REAL NOT NULL DEFAULT 0.0,
    sum_latency_ms INTEGER NOT NULL DEFAULT 0,
    sum_wins INTEGER NOT NULL DEFAULT 0
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS decision_metrics_projection (
    symbol TEXT PRIMARY KEY,
    last_confidence REAL NOT NULL DEFAULT 0.0,
    confidence_slope5 REAL NOT NULL DEFAULT 0.0,
    divergence_streak INTEGER NOT NULL DEFAULT 0,
    momentum_streak INTEGER NOT NULL DEFAULT 0
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS edge_conditions (
    session TEXT NOT NULL,
    regime TEXT NOT NULL,
    bias TEXT NOT NULL,
    signal TEXT NOT NULL,
    win_count INTEGER NOT NULL DEFAULT 0,
    total_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (session, regime, bias, signal)
) WITHOUT ROWID;
"#;

/// Thin wrapper around a single `rusqlite::Connection` behind `parking_lot::Mutex`,
/// matching the teacher's synchronous-sqlite-behind-a-fast-mutex shape. Concurrent
/// callers serialize on the mutex; writes are cheap single-row upserts/inserts so
/// contention is not a practical bottleneck at this crate's scale.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(database_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(database_path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!(database_path, "decision store schema ready");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let guard = self.conn.lock();
        f(&guard)
    }
}
