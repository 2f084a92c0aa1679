//! Adaptive scheduler (component F, §4.1): one independent tempo loop per
//! watched symbol. Each loop recomputes its own sleep interval from the
//! regime last observed for that symbol and the current trading session,
//! and goes quiet (without stopping) while a replay run owns the pipeline.
//! Grounded on the teacher's `main.rs` background-loop shape — one
//! `tokio::spawn`ed `loop { ticker.tick().await; ... }` per independent
//! concern, errors logged and swallowed rather than propagated.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifiers::TradingSessionClassifier;
use crate::config::Config;
use crate::domain::{MarketRegime, Trigger, TradingSession};
use crate::pipeline::Orchestrator;
use crate::replay::ReplayGate;
use crate::store::FeedbackStore;

/// Pure tempo policy (§4.1 "Tempo policy"): session overrides take priority
/// over the regime table. No I/O, no clock read — `chrono::Utc::now()` is
/// the caller's concern, not this function's.
pub fn next_interval(regime: MarketRegime, session: TradingSession, config: &Config) -> Duration {
    match session {
        TradingSession::OffHours => config.tempo_off_hours,
        TradingSession::MiddayConsolidation => config.tempo_midday_consolidation,
        _ => match regime {
            MarketRegime::Volatile => config.tempo_volatile,
            MarketRegime::Trending => config.tempo_trending,
            MarketRegime::Ranging => config.tempo_ranging,
            MarketRegime::Calm => config.tempo_calm,
            MarketRegime::Unknown => config.tempo_unknown,
        },
    }
}

/// Owns one background loop per watched symbol. `start`/`stop` are the only
/// two operations spec.md §4.1 names; both are idempotent.
pub struct AdaptiveScheduler {
    config: Arc<Config>,
    store: FeedbackStore,
    orchestrator: Arc<Orchestrator>,
    session_classifier: TradingSessionClassifier,
    replay_gate: ReplayGate,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl AdaptiveScheduler {
    pub fn new(
        config: Arc<Config>,
        store: FeedbackStore,
        orchestrator: Arc<Orchestrator>,
        session_classifier: TradingSessionClassifier,
        replay_gate: ReplayGate,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self { config, store, orchestrator, session_classifier, replay_gate, handles: Mutex::new(Vec::new()), stop_tx, stop_rx }
    }

    /// Spawns one independent loop per symbol. Idempotent: a second call
    /// while loops are already running is a no-op (§4.1 "subsequent calls
    /// are ignored").
    pub async fn start(&self, symbols: Vec<String>) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            info!("scheduler already running, start() ignored");
            return;
        }

        for symbol in symbols {
            let config = self.config.clone();
            let store = self.store.clone();
            let orchestrator = self.orchestrator.clone();
            let session_classifier = self.session_classifier.clone();
            let replay_gate = self.replay_gate.clone();
            let mut stop_rx = self.stop_rx.clone();

            handles.push(tokio::spawn(async move {
                run_symbol_loop(symbol, config, store, orchestrator, session_classifier, replay_gate, &mut stop_rx).await;
            }));
        }
        info!(loop_count = handles.len(), "adaptive scheduler started");
    }

    /// Signals every loop to terminate and waits for them to release their
    /// resources (§4.1 "returns after all loops have released their
    /// resources"). In-flight pipeline invocations are not cancelled — they
    /// run to completion per §5 "Cancellation & timeouts".
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("adaptive scheduler stopped");
    }
}

/// One symbol's independent loop (§4.1 "Loop body"). Never returns except on
/// a stop signal; every other failure mode degrades to `UNKNOWN` + the
/// fallback interval and continues (§4.1 "Failure semantics").
#[allow(clippy::too_many_arguments)]
async fn run_symbol_loop(
    symbol: String,
    config: Arc<Config>,
    store: FeedbackStore,
    orchestrator: Arc<Orchestrator>,
    session_classifier: TradingSessionClassifier,
    replay_gate: ReplayGate,
    stop_rx: &mut watch::Receiver<bool>,
) {
    let mut interval = config.tempo_unknown;

    loop {
        // Step 1: wait for `interval` or the cancellation signal.
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_rx.changed() => {
                info!(%symbol, "scheduler loop received stop signal");
                return;
            }
        }
        if *stop_rx.borrow() {
            return;
        }

        // Step 2: replay interlock. Skip the trigger but still recompute interval.
        let replay_running = replay_gate.is_running();
        if replay_running {
            info!(%symbol, "replay running, skipping this cycle's trigger");
        } else {
            // Step 3: construct the trigger.
            let trigger = Trigger { symbol: symbol.clone(), triggered_at: chrono::Utc::now(), trace_id: Uuid::new_v4().to_string() };

            // Step 4: fire-and-forget submission to the pipeline.
            let orchestrator = orchestrator.clone();
            let trace_id = trigger.trace_id.clone();
            let loop_symbol = symbol.clone();
            tokio::spawn(async move {
                if let Err(e) = orchestrator.orchestrate(trigger, false).await {
                    warn!(symbol = %loop_symbol, trace_id = %trace_id, error = %e, "scheduled orchestration failed");
                }
            });
        }

        // Step 5: read the latest regime, falling back to UNKNOWN on error.
        let regime = match store.latest_regime(&symbol) {
            Ok(regime) => regime,
            Err(e) => {
                warn!(%symbol, error = %e, "latest_regime failed, defaulting to UNKNOWN");
                MarketRegime::Unknown
            }
        };

        // Step 6: compute the next interval from the tempo policy.
        let session = session_classifier.classify(chrono::Utc::now());
        interval = next_interval(regime, session, &config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_hours_overrides_regime() {
        let config = Config::minimal();
        let d = next_interval(MarketRegime::Volatile, TradingSession::OffHours, &config);
        assert_eq!(d, config.tempo_off_hours);
    }

    #[test]
    fn midday_consolidation_overrides_regime() {
        let config = Config::minimal();
        let d = next_interval(MarketRegime::Trending, TradingSession::MiddayConsolidation, &config);
        assert_eq!(d, config.tempo_midday_consolidation);
    }

    #[test]
    fn volatile_regime_during_opening_burst_is_thirty_seconds() {
        let config = Config::minimal();
        let d = next_interval(MarketRegime::Volatile, TradingSession::OpeningBurst, &config);
        assert_eq!(d, config.tempo_volatile);
        assert_eq!(d, Duration::from_secs(30));
    }

    #[test]
    fn unknown_regime_during_power_hour_uses_unknown_bucket() {
        let config = Config::minimal();
        let d = next_interval(MarketRegime::Unknown, TradingSession::PowerHour, &config);
        assert_eq!(d, config.tempo_unknown);
    }
}
