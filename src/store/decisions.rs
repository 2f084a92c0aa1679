//! The feedback & projection store's public surface (component D, §4.3): save,
//! reads for the pipeline and scheduler, outcome resolution, and the edge
//! condition registry.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{
    AgentFeedback, AgentPerformanceModel, AnalysisResult, DecisionMetricsProjection,
    DecisionMode, DecisionRecord, DecisionSnapshot, DirectionalBias, EdgeCondition, EdgeKey,
    FeedbackLoopStatus, FinalDecision, MarketRegime, MemoryEntry, OutcomeLabel, Signal,
    TradeDirection, TradingSession,
};
use crate::errors::StoreError;

use super::db::Db;
use super::projections;
use super::snapshots::SnapshotBus;

const RECENT_DECISIONS_CAP: usize = 10;
const METRICS_PROJECTION_WINDOW: usize = 5;
const OUTCOME_RESOLUTION_WINDOW_MINUTES: i64 = 10;
const FAST_WIN_MINUTES: i64 = 5;
const SLOW_WIN_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct FeedbackStore {
    db: Db,
    bus: SnapshotBus,
    config: Arc<Config>,
    /// Session-local set of observed trace ids, used only to surface the
    /// duplicate-trace-id drift as a `debug!` log (§9 "Idempotency note surfaced
    /// as a typed warning log") — `trace_id` carries no uniqueness constraint at
    /// the schema level, by design (spec.md §9 Open Questions).
    seen_trace_ids: Arc<Mutex<HashSet<String>>>,
}

impl FeedbackStore {
    pub fn new(db: Db, bus: SnapshotBus, config: Arc<Config>) -> Self {
        Self { db, bus, config, seen_trace_ids: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// Writes one row, fires the (non-fatal) projection pipeline, and publishes a
    /// snapshot event. Projection failures never roll back the save.
    pub fn save(&self, decision: &FinalDecision) -> Result<DecisionRecord, StoreError> {
        {
            let mut seen = self.seen_trace_ids.lock();
            if !seen.insert(decision.trace_id.clone()) {
                debug!(trace_id = %decision.trace_id, "duplicate trace_id observed on save (no uniqueness enforced)");
            }
        }

        let saved_at = Utc::now();
        let agents_json = serde_json::to_string(&decision.agents).map_err(|e| StoreError::ProjectionFailure(e.to_string()))?;
        let metadata_json = serde_json::to_string(&decision.metadata).map_err(|e| StoreError::ProjectionFailure(e.to_string()))?;
        let agent_weight_snapshot_json = serde_json::to_string(&decision.agent_weight_snapshot).unwrap_or_default();
        let adaptive_agent_weights_json = serde_json::to_string(&decision.adaptive_agent_weights).unwrap_or_default();

        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO decision_history (
                    symbol, timestamp, agents_json, final_signal, confidence, metadata_json,
                    trace_id, decision_version, orchestrator_version, agent_count,
                    decision_latency_ms, consensus_score, agent_weight_snapshot_json,
                    adaptive_agent_weights_json, market_regime, ai_reasoning, divergence_flag,
                    trading_session, entry_price, target_price, stop_loss, estimated_hold_minutes,
                    trade_direction, directional_bias, decision_mode, saved_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                    ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26
                )",
                params![
                    decision.symbol,
                    decision.timestamp.to_rfc3339(),
                    agents_json,
                    decision.final_signal.as_str(),
                    decision.confidence,
                    metadata_json,
                    decision.trace_id,
                    decision.decision_version,
                    decision.orchestrator_version,
                    decision.agent_count,
                    decision.decision_latency_ms as i64,
                    decision.consensus_score,
                    agent_weight_snapshot_json,
                    adaptive_agent_weights_json,
                    decision.market_regime.as_str(),
                    decision.ai_reasoning,
                    decision.divergence_flag as i64,
                    decision.trading_session.as_str(),
                    decision.entry_price,
                    decision.target_price,
                    decision.stop_loss,
                    decision.estimated_hold_minutes,
                    decision.trade_direction.as_str(),
                    decision.directional_bias.as_str(),
                    decision.decision_mode.as_str(),
                    saved_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        self.run_projection_pipeline(decision);

        let snapshot = DecisionSnapshot::from(decision);
        self.bus.publish(snapshot);

        Ok(DecisionRecord {
            id,
            decision: decision.clone(),
            saved_at,
            outcome_percent: None,
            outcome_hold_minutes: None,
            outcome_resolved: false,
            outcome_label: None,
        })
    }

    /// Non-fatal: every step logs and swallows its own error (§7 `ProjectionFailure`).
    fn run_projection_pipeline(&self, decision: &FinalDecision) {
        for agent in &decision.agents {
            let won = agent.signal == decision.final_signal;
            if let Err(e) = projections::upsert_agent_performance(
                &self.db,
                &agent.agent_name,
                agent.confidence,
                decision.decision_latency_ms,
                won,
            ) {
                projections::log_projection_failure("agent_performance_upsert", &e);
            }
        }

        match self.recent_metrics_inputs(&decision.symbol, METRICS_PROJECTION_WINDOW) {
            Ok(rows) if !rows.is_empty() => {
                if let Err(e) = projections::upsert_decision_metrics(&self.db, &decision.symbol, &rows) {
                    projections::log_projection_failure("decision_metrics_upsert", &e);
                }
            }
            Ok(_) => {}
            Err(e) => projections::log_projection_failure("decision_metrics_read", &e),
        }
    }

    fn recent_metrics_inputs(&self, symbol: &str, limit: usize) -> Result<Vec<(f64, bool, bool)>, StoreError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT confidence, divergence_flag, final_signal FROM decision_history
                 WHERE symbol = ?1 ORDER BY saved_at DESC LIMIT ?2",
            )?;
            let mapped = stmt.query_map(params![symbol, limit as i64], |row| {
                let confidence: f64 = row.get(0)?;
                let divergence_flag: i64 = row.get(1)?;
                let final_signal: String = row.get(2)?;
                Ok((confidence, divergence_flag, final_signal))
            })?;
            let mut out = Vec::new();
            for r in mapped {
                out.push(r?);
            }
            Ok(out)
        })?;

        let dominant = dominant_signal(&rows.iter().map(|(_, _, s)| Signal::parse(s)).collect::<Vec<_>>());
        Ok(rows
            .into_iter()
            .map(|(confidence, divergence_flag, final_signal)| {
                let on_dominant = Signal::parse(&final_signal) == dominant;
                (confidence, divergence_flag != 0, on_dominant)
            })
            .collect())
    }

    /// One row per distinct symbol — the most recent by `saved_at`.
    pub fn find_latest_per_symbol(&self) -> Result<Vec<DecisionSnapshot>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT dh.* FROM decision_history dh
                 INNER JOIN (
                    SELECT symbol, MAX(saved_at) AS max_saved_at FROM decision_history GROUP BY symbol
                 ) latest ON dh.symbol = latest.symbol AND dh.saved_at = latest.max_saved_at",
            )?;
            let rows = stmt.query_map([], |row| row_to_decision_record(row))?;
            let mut out = Vec::new();
            for r in rows {
                out.push(DecisionSnapshot::from(&r?.decision));
            }
            Ok(out)
        })
    }

    pub fn agent_performance(&self) -> Result<BTreeMap<String, AgentPerformanceModel>, StoreError> {
        projections::agent_performance_map(&self.db)
    }

    /// Market-truth win rate once an agent has ≥ `min_resolved_outcomes_for_feedback`
    /// resolved outcomes within the trailing `feedback_lookback_resolved` resolved
    /// `LIVE` decisions; else a neutral 0.5 fallback (§4.3 `getAgentFeedback`).
    pub fn agent_feedback(&self) -> Result<BTreeMap<String, AgentFeedback>, StoreError> {
        let perf = projections::agent_performance_map(&self.db)?;

        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT agents_json, final_signal, outcome_percent FROM decision_history
                 WHERE outcome_resolved = 1 AND decision_mode = 'LIVE'
                 ORDER BY saved_at DESC LIMIT ?1",
            )?;
            let mapped = stmt.query_map(params![self.config.feedback_lookback_resolved], |row| {
                let agents_json: String = row.get(0)?;
                let final_signal: String = row.get(1)?;
                let outcome_percent: Option<f64> = row.get(2)?;
                Ok((agents_json, final_signal, outcome_percent))
            })?;
            let mut out = Vec::new();
            for r in mapped {
                out.push(r?);
            }
            Ok(out)
        })?;

        let mut wins: HashMap<String, u32> = HashMap::new();
        let mut totals: HashMap<String, u32> = HashMap::new();

        for (agents_json, final_signal, outcome_percent) in &rows {
            let Some(outcome_percent) = outcome_percent else { continue };
            let profitable = *outcome_percent > self.config.profitable_threshold_percent;
            let final_signal = Signal::parse(final_signal);
            let Ok(agents) = serde_json::from_str::<Vec<AnalysisResult>>(agents_json) else { continue };
            for agent in agents {
                let aligned = agent.signal == final_signal;
                let agent_win = aligned == profitable;
                *totals.entry(agent.agent_name.clone()).or_insert(0) += 1;
                if agent_win {
                    *wins.entry(agent.agent_name).or_insert(0) += 1;
                }
            }
        }

        let mut out = BTreeMap::new();
        let agent_names: HashSet<String> = perf.keys().cloned().chain(totals.keys().cloned()).collect();
        for agent_name in agent_names {
            let total = totals.get(&agent_name).copied().unwrap_or(0);
            let model = perf.get(&agent_name);
            let is_market_truth = total >= self.config.min_resolved_outcomes_for_feedback;
            let win_rate = if is_market_truth {
                wins.get(&agent_name).copied().unwrap_or(0) as f64 / total as f64
            } else {
                0.5
            };
            out.insert(
                agent_name.clone(),
                AgentFeedback {
                    agent_name,
                    win_rate,
                    avg_confidence: model.map(|m| m.avg_confidence).unwrap_or(0.5),
                    normalized_latency: model.map(|m| m.latency_weight).unwrap_or(0.0),
                    is_market_truth,
                },
            );
        }
        Ok(out)
    }

    pub fn decision_metrics(&self, symbol: &str) -> Result<DecisionMetricsProjection, StoreError> {
        projections::decision_metrics(&self.db, symbol)
    }

    /// `UNKNOWN` if no decision has ever been saved for `symbol`.
    pub fn latest_regime(&self, symbol: &str) -> Result<MarketRegime, StoreError> {
        self.db.with_conn(|conn| {
            let regime: Option<String> = conn
                .query_row(
                    "SELECT market_regime FROM decision_history WHERE symbol = ?1 ORDER BY saved_at DESC LIMIT 1",
                    params![symbol],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(regime.map(|r| MarketRegime::parse(&r)).unwrap_or(MarketRegime::Unknown))
        })
    }

    /// Most-recent first, capped at 10 regardless of the requested `limit`.
    pub fn recent_decisions(&self, symbol: &str, limit: usize) -> Result<Vec<MemoryEntry>, StoreError> {
        let capped = limit.min(RECENT_DECISIONS_CAP);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT final_signal, confidence, divergence_flag, market_regime FROM decision_history
                 WHERE symbol = ?1 ORDER BY saved_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![symbol, capped as i64], |row| {
                let final_signal: String = row.get(0)?;
                let confidence: f64 = row.get(1)?;
                let divergence_flag: i64 = row.get(2)?;
                let regime: String = row.get(3)?;
                Ok(MemoryEntry {
                    final_signal: Signal::parse(&final_signal),
                    confidence,
                    divergence_flag: divergence_flag != 0,
                    regime: MarketRegime::parse(&regime),
                })
            })?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
    }

    /// Locates the decision by `trace_id` (not unique — the first match by
    /// `saved_at desc` is used) and sets its outcome fields, then triggers agent
    /// re-scoring. `REPLAY_CONSENSUS_ONLY` rows are excluded from that learning
    /// loop (§8 "must not appear in the agent feedback computation nor in the
    /// edge-condition registry") — only the outcome fields on the row itself are
    /// updated for those.
    pub fn record_outcome(&self, trace_id: &str, outcome_percent: f64, hold_minutes: i64) -> Result<(), StoreError> {
        let row = self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT id, symbol, final_signal, agents_json, trading_session, market_regime, directional_bias, decision_mode
                 FROM decision_history WHERE trace_id = ?1 ORDER BY saved_at DESC LIMIT 1",
                params![trace_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            ).optional()?)
        })?;

        let Some((id, symbol, final_signal, agents_json, session, regime, bias, decision_mode)) = row else {
            return Err(StoreError::NotFound);
        };

        let label = classify_outcome_label(outcome_percent, hold_minutes);

        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE decision_history SET outcome_percent = ?1, outcome_hold_minutes = ?2,
                 outcome_resolved = 1, outcome_label = ?3 WHERE id = ?4",
                params![outcome_percent, hold_minutes, label.as_str(), id],
            )?;
            Ok(())
        })?;

        if DecisionMode::parse(&decision_mode) == DecisionMode::Live {
            self.rescore_agents_for_decision(&agents_json, Signal::parse(&final_signal), outcome_percent);
            self.update_edge_condition(
                &symbol,
                TradingSession::parse(&session),
                MarketRegime::parse(&regime),
                DirectionalBias::parse(&bias),
                Signal::parse(&final_signal),
                outcome_percent,
            );
        }

        Ok(())
    }

    /// Scans the last `OUTCOME_RESOLUTION_WINDOW_MINUTES` minutes of unresolved
    /// BUY/SELL decisions with a stored `entryPrice`, resolves each against
    /// `current_price`, and re-scores agents. Per-decision failures are logged and
    /// the batch continues with the remaining rows (§7 `OutcomeResolutionFailure`).
    pub fn resolve_outcomes(&self, symbol: &str, current_price: f64) -> Result<u32, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::minutes(OUTCOME_RESOLUTION_WINDOW_MINUTES);

        let candidates = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT trace_id, final_signal, entry_price, target_price, stop_loss, saved_at
                 FROM decision_history
                 WHERE symbol = ?1 AND outcome_resolved = 0
                   AND final_signal IN ('BUY', 'SELL') AND entry_price IS NOT NULL
                   AND saved_at >= ?2",
            )?;
            let rows = stmt.query_map(params![symbol, cutoff.to_rfc3339()], |row| {
                let trace_id: String = row.get(0)?;
                let final_signal: String = row.get(1)?;
                let entry_price: f64 = row.get(2)?;
                let target_price: Option<f64> = row.get(3)?;
                let stop_loss: Option<f64> = row.get(4)?;
                let saved_at: String = row.get(5)?;
                Ok((trace_id, final_signal, entry_price, target_price, stop_loss, saved_at))
            })?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })?;

        let mut resolved_count = 0;
        for (trace_id, final_signal, entry_price, target_price, stop_loss, saved_at) in candidates {
            let signal = Signal::parse(&final_signal);
            let mut pct = (current_price - entry_price) / entry_price * 100.0;
            if signal == Signal::Sell {
                pct = -pct;
            }

            let saved_at_parsed: DateTime<Utc> = match DateTime::parse_from_rfc3339(&saved_at) {
                Ok(v) => v.with_timezone(&Utc),
                Err(e) => {
                    warn!(trace_id = %trace_id, error = %e, "outcome resolution: unparseable saved_at, skipped");
                    continue;
                }
            };
            let hold_minutes = (Utc::now() - saved_at_parsed).num_minutes().max(0);

            let label = classify_outcome_label_with_targets(pct, hold_minutes, current_price, target_price, stop_loss, signal);

            match self.apply_resolution(&trace_id, pct, hold_minutes, label) {
                Ok(()) => resolved_count += 1,
                Err(e) => warn!(trace_id = %trace_id, error = %e, "outcome resolution failed for decision, batch continues"),
            }
        }

        Ok(resolved_count)
    }

    fn apply_resolution(&self, trace_id: &str, pct: f64, hold_minutes: i64, label: OutcomeLabel) -> Result<(), StoreError> {
        let row = self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT id, symbol, final_signal, agents_json, trading_session, market_regime, directional_bias, decision_mode
                 FROM decision_history WHERE trace_id = ?1 ORDER BY saved_at DESC LIMIT 1",
                params![trace_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )?)
        })?;
        let (id, symbol, final_signal, agents_json, session, regime, bias, decision_mode) = row;

        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE decision_history SET outcome_percent = ?1, outcome_hold_minutes = ?2,
                 outcome_resolved = 1, outcome_label = ?3 WHERE id = ?4",
                params![pct, hold_minutes, label.as_str(), id],
            )?;
            Ok(())
        })?;

        if DecisionMode::parse(&decision_mode) != DecisionMode::Live {
            return Ok(());
        }

        self.rescore_agents_for_decision(&agents_json, Signal::parse(&final_signal), pct);
        self.update_edge_condition(
            &symbol,
            TradingSession::parse(&session),
            MarketRegime::parse(&regime),
            DirectionalBias::parse(&bias),
            Signal::parse(&final_signal),
            pct,
        );
        Ok(())
    }

    fn rescore_agents_for_decision(&self, agents_json: &str, final_signal: Signal, outcome_percent: f64) {
        let profitable = outcome_percent > self.config.profitable_threshold_percent;
        let Ok(agents) = serde_json::from_str::<Vec<AnalysisResult>>(agents_json) else {
            warn!("rescore: could not parse agents_json, skipped");
            return;
        };
        for agent in agents {
            let self_agreement_win = agent.signal == final_signal;
            let aligned = agent.signal == final_signal;
            let market_truth_win = aligned == profitable;
            if let Err(e) = projections::adjust_agent_win_by_market_truth(
                &self.db,
                &agent.agent_name,
                market_truth_win,
                self_agreement_win,
            ) {
                projections::log_projection_failure("agent_rescore", &e);
            }
        }
    }

    /// Callers (`record_outcome`, `apply_resolution`) check `decision_mode` before
    /// reaching this, so only `LIVE` decisions are ever passed in here.
    fn update_edge_condition(
        &self,
        _symbol: &str,
        session: TradingSession,
        regime: MarketRegime,
        bias: DirectionalBias,
        signal: Signal,
        outcome_percent: f64,
    ) {
        let profitable = outcome_percent > self.config.profitable_threshold_percent;
        let result = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO edge_conditions (session, regime, bias, signal, win_count, total_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)
                 ON CONFLICT(session, regime, bias, signal) DO UPDATE SET
                    win_count = win_count + ?5,
                    total_count = total_count + 1",
                params![session.as_str(), regime.as_str(), bias.as_str(), signal.as_str(), if profitable { 1i64 } else { 0i64 }],
            )?;
            Ok(())
        });
        if let Err(e) = result {
            projections::log_projection_failure("edge_condition_upsert", &e);
        }
    }

    pub fn edge_conditions(&self) -> Result<HashMap<EdgeKey, EdgeCondition>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT session, regime, bias, signal, win_count, total_count FROM edge_conditions")?;
            let rows = stmt.query_map([], |row| {
                let session: String = row.get(0)?;
                let regime: String = row.get(1)?;
                let bias: String = row.get(2)?;
                let signal: String = row.get(3)?;
                let win_count: i64 = row.get(4)?;
                let total_count: i64 = row.get(5)?;
                Ok((
                    EdgeKey {
                        session: TradingSession::parse(&session),
                        regime: MarketRegime::parse(&regime),
                        bias: DirectionalBias::parse(&bias),
                        signal: Signal::parse(&signal),
                    },
                    EdgeCondition { win_count: win_count as u64, total_count: total_count as u64 },
                ))
            })?;
            let mut out = HashMap::new();
            for r in rows {
                let (k, v) = r?;
                out.insert(k, v);
            }
            Ok(out)
        })
    }

    pub fn subscribe_snapshots(&self) -> tokio::sync::broadcast::Receiver<DecisionSnapshot> {
        self.bus.subscribe()
    }

    /// Unresolved decisions for `symbol` saved within the last `since_mins`
    /// minutes, newest first — backs the `/unresolved/{symbol}` control endpoint.
    pub fn unresolved_since(&self, symbol: &str, since_mins: i64) -> Result<Vec<DecisionRecord>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::minutes(since_mins);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM decision_history
                 WHERE symbol = ?1 AND outcome_resolved = 0 AND saved_at >= ?2
                 ORDER BY saved_at DESC",
            )?;
            let rows = stmt.query_map(params![symbol, cutoff.to_rfc3339()], row_to_decision_record)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
    }

    /// Aggregate view of how far the market-truth feedback loop has progressed
    /// (§4.3 `getAgentFeedback`) — backs the `/feedback-loop-status` control endpoint.
    pub fn feedback_loop_status(&self) -> Result<FeedbackLoopStatus, StoreError> {
        let feedback = self.agent_feedback()?;
        let total_resolved_live_decisions = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM decision_history WHERE outcome_resolved = 1 AND decision_mode = 'LIVE'",
                [],
                |row| row.get::<_, i64>(0),
            )
        })? as u64;

        let agents_with_market_truth = feedback.values().filter(|f| f.is_market_truth).count() as u32;
        let agents_pending = feedback.values().filter(|f| !f.is_market_truth).count() as u32;

        Ok(FeedbackLoopStatus {
            total_resolved_live_decisions,
            agents_with_market_truth,
            agents_pending,
            min_resolved_outcomes_for_feedback: self.config.min_resolved_outcomes_for_feedback,
        })
    }
}

fn dominant_signal(signals: &[Signal]) -> Signal {
    let mut counts: BTreeMap<Signal, usize> = BTreeMap::new();
    for s in signals {
        *counts.entry(*s).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, c)| *c).map(|(s, _)| s).unwrap_or(Signal::Hold)
}

fn classify_outcome_label(outcome_percent: f64, hold_minutes: i64) -> OutcomeLabel {
    if outcome_percent > 0.0 && hold_minutes < FAST_WIN_MINUTES {
        OutcomeLabel::FastWin
    } else if outcome_percent > 0.0 && hold_minutes >= SLOW_WIN_MINUTES {
        OutcomeLabel::SlowWin
    } else {
        OutcomeLabel::NoEdge
    }
}

fn classify_outcome_label_with_targets(
    pct: f64,
    hold_minutes: i64,
    current_price: f64,
    target_price: Option<f64>,
    stop_loss: Option<f64>,
    signal: Signal,
) -> OutcomeLabel {
    let hit_target = target_price.map(|t| match signal {
        Signal::Sell => current_price <= t,
        _ => current_price >= t,
    }).unwrap_or(false);
    let hit_stop = stop_loss.map(|s| match signal {
        Signal::Sell => current_price >= s,
        _ => current_price <= s,
    }).unwrap_or(false);

    if hit_target {
        OutcomeLabel::TargetHit
    } else if hit_stop {
        OutcomeLabel::StopOut
    } else if pct > 0.0 && hold_minutes < FAST_WIN_MINUTES {
        OutcomeLabel::FastWin
    } else if pct > 0.0 && hold_minutes >= SLOW_WIN_MINUTES {
        OutcomeLabel::SlowWin
    } else {
        OutcomeLabel::NoEdge
    }
}

fn row_to_decision_record(row: &rusqlite::Row) -> rusqlite::Result<DecisionRecord> {
    let agents_json: String = row.get("agents_json")?;
    let metadata_json: String = row.get("metadata_json")?;
    let agent_weight_snapshot_json: String = row.get("agent_weight_snapshot_json")?;
    let adaptive_agent_weights_json: String = row.get("adaptive_agent_weights_json")?;
    let timestamp: String = row.get("timestamp")?;
    let saved_at: String = row.get("saved_at")?;
    let final_signal: String = row.get("final_signal")?;
    let market_regime: String = row.get("market_regime")?;
    let trading_session: String = row.get("trading_session")?;
    let trade_direction: String = row.get("trade_direction")?;
    let directional_bias: String = row.get("directional_bias")?;
    let decision_mode: String = row.get("decision_mode")?;
    let outcome_label: Option<String> = row.get("outcome_label")?;

    let decision = FinalDecision {
        symbol: row.get("symbol")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp).unwrap_or_default().with_timezone(&Utc),
        agents: serde_json::from_str(&agents_json).unwrap_or_default(),
        final_signal: Signal::parse(&final_signal),
        confidence: row.get("confidence")?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        trace_id: row.get("trace_id")?,
        decision_version: row.get::<_, i64>("decision_version")? as u32,
        orchestrator_version: row.get("orchestrator_version")?,
        agent_count: row.get::<_, i64>("agent_count")? as u32,
        decision_latency_ms: row.get::<_, i64>("decision_latency_ms")? as u64,
        consensus_score: row.get("consensus_score")?,
        agent_weight_snapshot: serde_json::from_str(&agent_weight_snapshot_json).unwrap_or_default(),
        adaptive_agent_weights: serde_json::from_str(&adaptive_agent_weights_json).unwrap_or_default(),
        market_regime: MarketRegime::parse(&market_regime),
        ai_reasoning: row.get("ai_reasoning")?,
        divergence_flag: row.get::<_, i64>("divergence_flag")? != 0,
        trading_session: TradingSession::parse(&trading_session),
        entry_price: row.get("entry_price")?,
        target_price: row.get("target_price")?,
        stop_loss: row.get("stop_loss")?,
        estimated_hold_minutes: row.get("estimated_hold_minutes")?,
        trade_direction: TradeDirection::parse(&trade_direction),
        directional_bias: DirectionalBias::parse(&directional_bias),
        decision_mode: DecisionMode::parse(&decision_mode),
    };

    Ok(DecisionRecord {
        id: row.get("id")?,
        decision,
        saved_at: DateTime::parse_from_rfc3339(&saved_at).unwrap_or_default().with_timezone(&Utc),
        outcome_percent: row.get("outcome_percent")?,
        outcome_hold_minutes: row.get("outcome_hold_minutes")?,
        outcome_resolved: row.get::<_, i64>("outcome_resolved")? != 0,
        outcome_label: outcome_label.and_then(|s| OutcomeLabel::parse(&s)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisResult, DECISION_SCHEMA_VERSION, ORCHESTRATOR_VERSION};
    use std::collections::BTreeMap as Map;

    fn store() -> FeedbackStore {
        let db = Db::in_memory().unwrap();
        let bus = SnapshotBus::new(64);
        FeedbackStore::new(db, bus, Arc::new(Config::minimal()))
    }

    fn sample_decision(symbol: &str, trace_id: &str, signal: Signal) -> FinalDecision {
        FinalDecision {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            agents: vec![AnalysisResult { agent_name: "trend".into(), summary: String::new(), signal, confidence: 0.8, metadata: Map::new() }],
            final_signal: signal,
            confidence: 0.8,
            metadata: Map::new(),
            trace_id: trace_id.to_string(),
            decision_version: DECISION_SCHEMA_VERSION,
            orchestrator_version: ORCHESTRATOR_VERSION.to_string(),
            agent_count: 1,
            decision_latency_ms: 120,
            consensus_score: 0.7,
            agent_weight_snapshot: Map::new(),
            adaptive_agent_weights: Map::new(),
            market_regime: MarketRegime::Trending,
            ai_reasoning: "test".to_string(),
            divergence_flag: false,
            trading_session: TradingSession::OpeningBurst,
            entry_price: Some(100.0),
            target_price: Some(105.0),
            stop_loss: Some(98.0),
            estimated_hold_minutes: Some(15),
            trade_direction: TradeDirection::Long,
            directional_bias: DirectionalBias::StrongBullish,
            decision_mode: DecisionMode::Live,
        }
    }

    #[test]
    fn save_then_find_latest_per_symbol_round_trips() {
        let store = store();
        store.save(&sample_decision("NIFTY50", "t1", Signal::Buy)).unwrap();
        let latest = store.find_latest_per_symbol().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].symbol, "NIFTY50");
    }

    #[test]
    fn projection_pipeline_is_not_deduplicated() {
        // The idempotent-projection law: applying the projection pipeline twice
        // with the same decision must double the counters, not dedupe them.
        let store = store();
        let decision = sample_decision("NIFTY50", "dup", Signal::Buy);
        store.save(&decision).unwrap();
        store.save(&decision).unwrap();
        let perf = store.agent_performance().unwrap();
        assert_eq!(perf["trend"].total_decisions, 2);
    }

    #[test]
    fn resolve_outcomes_marks_decision_resolved() {
        let store = store();
        store.save(&sample_decision("NIFTY50", "r1", Signal::Buy)).unwrap();
        let resolved = store.resolve_outcomes("NIFTY50", 100.5).unwrap();
        assert_eq!(resolved, 1);
    }

    #[test]
    fn record_outcome_unknown_trace_id_is_not_found() {
        let store = store();
        let err = store.record_outcome("missing", 1.0, 10).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn record_outcome_on_replay_row_skips_edge_condition_and_agent_rescoring() {
        let store = store();
        let mut decision = sample_decision("NIFTY50", "replay1", Signal::Buy);
        decision.decision_mode = DecisionMode::ReplayConsensusOnly;
        store.save(&decision).unwrap();

        store.record_outcome("replay1", 2.0, 10).unwrap();

        assert!(store.edge_conditions().unwrap().is_empty());
        assert_eq!(store.agent_performance().unwrap()["trend"].total_decisions, 1);
    }

    #[test]
    fn resolve_outcomes_on_replay_row_resolves_but_skips_learning() {
        let store = store();
        let mut decision = sample_decision("NIFTY50", "replay2", Signal::Buy);
        decision.decision_mode = DecisionMode::ReplayConsensusOnly;
        store.save(&decision).unwrap();

        let resolved = store.resolve_outcomes("NIFTY50", 100.5).unwrap();

        assert_eq!(resolved, 1);
        assert!(store.edge_conditions().unwrap().is_empty());
    }
}
