//! Orchestration Pipeline (component E, §4.2): the single per-trigger data flow
//! that turns one `Trigger` into one `FinalDecision`. Grounded on the teacher's
//! `main.rs` service-composition shape (one struct holding every collaborator
//! as `Arc<dyn Trait>`, methods that thread a `traceId` through `tracing`
//! spans) applied here to the sixteen stages of §4.2 instead of the teacher's
//! arbitrage/backtest flow.

mod fallback;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::classifiers::{
    DecisionSample, MarketRegimeClassifier, MomentumStateCalculator, TradingSessionClassifier,
};
use crate::config::Config;
use crate::domain::{
    AnalysisResult, DecisionContext, DirectionalBias, FinalDecision, Signal, TradeDirection,
    DECISION_SCHEMA_VERSION, ORCHESTRATOR_VERSION,
};
use crate::domain::{DecisionMode, MarketRegime};
use crate::engines::{AgentScoreCalculator, ConsensusEngine, GateChain, GateInput};
use crate::errors::PipelineError;
use crate::store::FeedbackStore;
use crate::transport::{
    AgentDispatchContext, AgentDispatcher, MarketDataCache, MarketDataProvider, ModelChoice,
    Notifier, Strategist, StrategistPrompt,
};
use crate::domain::Trigger;

/// Maximum window of prior decisions fed to the momentum classifier (§4.4).
const MOMENTUM_WINDOW: usize = 8;
/// Memory window fed to the strategist and used for the divergence streak (§4.2 step 10, 13).
const STRATEGY_MEMORY_WINDOW: usize = 3;

/// Owns every external collaborator plus the pure-logic helpers the pipeline
/// threads data through. One instance is shared (behind `Arc`) by every
/// scheduler loop and every `orchestrate_trigger` control-endpoint call.
pub struct Orchestrator {
    config: Arc<Config>,
    store: FeedbackStore,
    cache: MarketDataCache,
    session_classifier: TradingSessionClassifier,
    market_data: Arc<dyn MarketDataProvider>,
    agent_dispatcher: Arc<dyn AgentDispatcher>,
    strategist: Arc<dyn Strategist>,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        store: FeedbackStore,
        cache: MarketDataCache,
        session_classifier: TradingSessionClassifier,
        market_data: Arc<dyn MarketDataProvider>,
        agent_dispatcher: Arc<dyn AgentDispatcher>,
        strategist: Arc<dyn Strategist>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { config, store, cache, session_classifier, market_data, agent_dispatcher, strategist, notifier }
    }

    /// Runs every stage of §4.2 for one trigger. Only stage 1 (market data)
    /// and stage 5 (agent dispatch) can abort this call with `Err`; every
    /// other failure is locally recovered so this returns a valid decision.
    #[instrument(skip(self, trigger), fields(trace_id = %trigger.trace_id, symbol = %trigger.symbol))]
    pub async fn orchestrate(&self, trigger: Trigger, replay_mode: bool) -> Result<FinalDecision, PipelineError> {
        let started_at = Instant::now();
        let symbol = trigger.symbol.clone();
        let trace_id = trigger.trace_id.clone();

        // Stage 1: FetchMarketData.
        let now = Utc::now();
        let quote = match self.cache.get_fresh(&symbol, now, &self.config) {
            Some(quote) => {
                debug!(stage = "FetchMarketData", %symbol, "cache hit");
                quote
            }
            None => {
                info!(stage = "FetchMarketData", %symbol, "cache miss, fetching");
                let quote = self.market_data.fetch(&symbol, &trace_id).await?;
                self.cache.insert(&symbol, quote.clone(), now);
                quote
            }
        };

        // Stage 2: ClassifyRegime.
        let regime = MarketRegimeClassifier::classify(&quote.recent_closing_prices, quote.latest_close);
        self.cache.update_regime(&symbol, regime);
        info!(stage = "ClassifyRegime", %symbol, ?regime);

        // Stage 3: ClassifySession.
        let session = self.session_classifier.classify(trigger.triggered_at);
        info!(stage = "ClassifySession", %symbol, ?session);

        // Stage 4: ResolveOpenOutcomes (fire-and-forget, errors swallowed).
        {
            let store = self.store.clone();
            let symbol = symbol.clone();
            let current_price = quote.latest_close;
            tokio::spawn(async move {
                if let Err(e) = store.resolve_outcomes(&symbol, current_price) {
                    warn!(stage = "ResolveOpenOutcomes", %symbol, error = %e, "resolve_outcomes failed");
                }
            });
        }

        // Stage 5: RunAgents.
        let dispatch_ctx = AgentDispatchContext::from_quote(&symbol, trigger.triggered_at, &quote, &trace_id);
        let agent_results = self.agent_dispatcher.dispatch(&dispatch_ctx).await?;
        info!(stage = "RunAgents", %symbol, agent_count = agent_results.len());

        // Stage 6: ExtractDirectionalBias.
        let bias = extract_directional_bias(&agent_results);

        // Stage 7: FetchPerformance & Feedback (two independent store reads).
        let performance = self.store.agent_performance().unwrap_or_default();
        let feedback = self.store.agent_feedback().unwrap_or_default();

        // Stage 8: ComputeAdaptiveWeights.
        let adaptive_weights: BTreeMap<String, f64> = agent_results
            .iter()
            .map(|r| {
                let capability = self
                    .config
                    .agent_capabilities
                    .get(&r.agent_name)
                    .copied()
                    .unwrap_or(crate::domain::AgentCapability::Discipline);
                let weight = AgentScoreCalculator::compute(
                    capability,
                    regime,
                    performance.get(&r.agent_name),
                    feedback.get(&r.agent_name),
                );
                (r.agent_name.clone(), weight)
            })
            .collect();

        // Momentum state over the last few decisions for this symbol, used by
        // the assembled context (§4.4).
        let momentum_state = self.momentum_state(&symbol);

        // Stage 9: AssembleContext.
        let ctx = DecisionContext::assemble(
            symbol.clone(),
            trigger.triggered_at,
            trace_id.clone(),
            regime,
            session,
            quote.latest_close,
            &agent_results,
            &adaptive_weights,
            bias,
            momentum_state,
        );

        // Stage 10: FetchStrategyMemory (skipped in replay).
        let memory = if replay_mode {
            Vec::new()
        } else {
            self.store.recent_decisions(&symbol, STRATEGY_MEMORY_WINDOW).unwrap_or_default()
        };

        // Stage 13 (computed ahead of stage 11: peak-mode needs it, and its only
        // input — the memory fetched in stage 10 — is already available).
        let divergence_streak = if replay_mode { 0 } else { leading_divergence_streak(&memory) };

        // Stage 11: EvaluateStrategist (skipped in replay).
        let peak_mode = !replay_mode && session.is_active() && regime == MarketRegime::Volatile && divergence_streak == 0;
        let (strategist_decision, model_label) = if replay_mode {
            (None, None)
        } else if !self.config.strategist_enabled {
            let fallback = fallback::rule_based_fallback(&agent_results, "strategist disabled");
            (Some(fallback), Some("rule-based".to_string()))
        } else {
            let model = ModelChoice::for_peak_mode(peak_mode);
            let prompt = StrategistPrompt::build(&ctx, memory.clone(), model, peak_mode);
            let timeout =
                if peak_mode { self.config.strategist_timeout_peak_mode } else { self.config.strategist_timeout_normal };
            match self.strategist.decide(&prompt, &trace_id, timeout).await {
                Ok(decision) => (Some(decision), Some(format!("{:?}", model).to_lowercase())),
                Err(e) => {
                    warn!(stage = "EvaluateStrategist", %symbol, error = %e, "strategist failed, using rule-based fallback");
                    let fallback = fallback::rule_based_fallback(&agent_results, &e.to_string());
                    (Some(fallback), Some("rule-based".to_string()))
                }
            }
        };

        // Stage 12: ComputeConsensus.
        let consensus = ConsensusEngine::compute(&agent_results, &adaptive_weights);
        info!(
            stage = "ComputeConsensus",
            %symbol,
            final_signal = ?consensus.final_signal,
            normalized_confidence = consensus.normalized_confidence
        );

        let (strategist_signal, strategist_confidence, reasoning) = match &strategist_decision {
            Some(decision) => (decision.final_signal, decision.confidence, decision.reasoning.clone()),
            None => (consensus.final_signal, consensus.normalized_confidence, "replay: consensus-only (no strategist)".to_string()),
        };

        // Stage 14: GateChain.
        let gate_output = GateChain::apply(GateInput {
            strategist_signal,
            strategist_confidence,
            reasoning,
            consensus: consensus.clone(),
            session,
            regime,
            bias,
            divergence_streak,
        });
        info!(stage = "GateChain", %symbol, signal = ?gate_output.signal, confidence = gate_output.confidence);

        // Stage 15: BuildDecision.
        let trade_direction = strategist_decision
            .as_ref()
            .and_then(|d| d.trade_direction)
            .unwrap_or_else(|| trade_direction_for(gate_output.signal));

        let mut metadata = BTreeMap::new();
        if let Some(label) = &model_label {
            metadata.insert("modelLabel".to_string(), serde_json::Value::String(label.clone()));
        }
        metadata.insert("peakMode".to_string(), serde_json::Value::Bool(peak_mode));
        metadata.insert("divergenceStreak".to_string(), serde_json::Value::from(divergence_streak));

        let decision = FinalDecision {
            symbol: symbol.clone(),
            timestamp: trigger.triggered_at,
            agents: agent_results.clone(),
            final_signal: gate_output.signal,
            confidence: gate_output.confidence,
            metadata,
            trace_id: trace_id.clone(),
            decision_version: DECISION_SCHEMA_VERSION,
            orchestrator_version: ORCHESTRATOR_VERSION.to_string(),
            agent_count: agent_results.len() as u32,
            decision_latency_ms: started_at.elapsed().as_millis() as u64,
            consensus_score: consensus.normalized_confidence,
            agent_weight_snapshot: consensus.per_agent_weights.clone(),
            adaptive_agent_weights: adaptive_weights,
            market_regime: regime,
            ai_reasoning: gate_output.reasoning,
            divergence_flag: gate_output.divergence_flag,
            trading_session: session,
            entry_price: strategist_decision.as_ref().and_then(|d| d.entry_price),
            target_price: strategist_decision.as_ref().and_then(|d| d.target_price),
            stop_loss: strategist_decision.as_ref().and_then(|d| d.stop_loss),
            estimated_hold_minutes: strategist_decision.as_ref().and_then(|d| d.estimated_hold_minutes),
            trade_direction,
            directional_bias: bias,
            decision_mode: if replay_mode { DecisionMode::ReplayConsensusOnly } else { DecisionMode::Live },
        };

        // Stage 16: Publish (two fire-and-forget branches).
        {
            let store = self.store.clone();
            let decision = decision.clone();
            let trace_id = trace_id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.save(&decision) {
                    warn!(stage = "Publish", %trace_id, error = %e, "StoreSaveFailure: decision lost");
                }
            });
        }
        {
            let notifier = self.notifier.clone();
            let decision = decision.clone();
            let trace_id = trace_id.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&decision).await {
                    warn!(stage = "Publish", %trace_id, error = %e, "NotificationFailure");
                }
            });
        }

        Ok(decision)
    }

    /// Momentum state (§4.4) over the last `MOMENTUM_WINDOW` decisions, oldest-first.
    fn momentum_state(&self, symbol: &str) -> crate::domain::MarketState {
        let recent = self.store.recent_decisions(symbol, MOMENTUM_WINDOW).unwrap_or_default();
        let samples: Vec<DecisionSample> = recent
            .into_iter()
            .rev()
            .map(|m| DecisionSample {
                signal: m.final_signal,
                confidence: m.confidence,
                divergence_flag: m.divergence_flag,
                regime: m.regime,
            })
            .collect();
        MomentumStateCalculator::state(&samples)
    }
}

/// Stage 6: the first agent result whose metadata carries `directionalBias`,
/// parsed to the enum; `NEUTRAL` if none do or parsing is ambiguous.
fn extract_directional_bias(results: &[AnalysisResult]) -> DirectionalBias {
    for r in results {
        if let Some(serde_json::Value::String(s)) = r.metadata.get("directionalBias") {
            return DirectionalBias::parse(s);
        }
    }
    DirectionalBias::Neutral
}

/// Stage 13: leading run of `divergenceFlag = true` in the strategy memory
/// sequence (most-recent-first, as returned by `recent_decisions`).
fn leading_divergence_streak(memory: &[crate::domain::MemoryEntry]) -> u32 {
    memory.iter().take_while(|m| m.divergence_flag).count() as u32
}

fn trade_direction_for(signal: Signal) -> TradeDirection {
    match signal {
        Signal::Buy => TradeDirection::Long,
        Signal::Sell => TradeDirection::Short,
        Signal::Hold | Signal::Watch => TradeDirection::Flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::domain::{StrategistDecision, Trigger};
    use crate::errors::StoreError;
    use crate::store::{Db, SnapshotBus};
    use crate::transport::MarketQuote;

    struct FakeMarketData;

    #[async_trait]
    impl MarketDataProvider for FakeMarketData {
        async fn fetch(&self, symbol: &str, _trace_id: &str) -> Result<MarketQuote, PipelineError> {
            Ok(MarketQuote {
                symbol: symbol.to_string(),
                latest_close: 105.0,
                open: 100.0,
                high: 106.0,
                low: 99.0,
                volume: 10000.0,
                recent_closing_prices: vec![105.0, 104.0, 103.0, 102.0, 101.0, 100.0],
                fetched_at: Utc::now(),
            })
        }
    }

    struct FakeAgents {
        signal: Signal,
        bias: &'static str,
    }

    #[async_trait]
    impl AgentDispatcher for FakeAgents {
        async fn dispatch(&self, ctx: &AgentDispatchContext) -> Result<Vec<AnalysisResult>, PipelineError> {
            let mut metadata = BTreeMap::new();
            metadata.insert("directionalBias".to_string(), serde_json::Value::String(self.bias.to_string()));
            Ok(vec![
                AnalysisResult {
                    agent_name: "trend_agent".into(),
                    summary: format!("{} at {}", self.signal.as_str(), ctx.symbol),
                    signal: self.signal,
                    confidence: 0.9,
                    metadata,
                },
                AnalysisResult {
                    agent_name: "risk_agent".into(),
                    summary: "risk ok".into(),
                    signal: self.signal,
                    confidence: 0.8,
                    metadata: BTreeMap::new(),
                },
            ])
        }
    }

    struct FailingAgents;

    #[async_trait]
    impl AgentDispatcher for FailingAgents {
        async fn dispatch(&self, _ctx: &AgentDispatchContext) -> Result<Vec<AnalysisResult>, PipelineError> {
            Err(PipelineError::UpstreamUnavailable("agents down".into()))
        }
    }

    struct FakeStrategist {
        signal: Signal,
        confidence: f64,
    }

    #[async_trait]
    impl Strategist for FakeStrategist {
        async fn decide(
            &self,
            _prompt: &StrategistPrompt,
            _trace_id: &str,
            _timeout: Duration,
        ) -> Result<StrategistDecision, PipelineError> {
            Ok(StrategistDecision {
                final_signal: self.signal,
                confidence: self.confidence,
                reasoning: "strategist says so".into(),
                entry_price: Some(105.0),
                target_price: Some(110.0),
                stop_loss: Some(102.0),
                estimated_hold_minutes: Some(30),
                trade_direction: None,
            })
        }
    }

    struct FakeNotifier {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn notify(&self, _decision: &FinalDecision) -> Result<(), PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config::minimal())
    }

    fn test_store(config: Arc<Config>) -> FeedbackStore {
        let db = Db::in_memory().unwrap();
        FeedbackStore::new(db, SnapshotBus::new(64), config)
    }

    fn orchestrator(
        config: Arc<Config>,
        store: FeedbackStore,
        agents: Arc<dyn AgentDispatcher>,
        strategist: Arc<dyn Strategist>,
        notifier: Arc<dyn Notifier>,
    ) -> Orchestrator {
        Orchestrator::new(
            config,
            store,
            MarketDataCache::new(),
            TradingSessionClassifier::new(chrono_tz::Asia::Kolkata),
            Arc::new(FakeMarketData),
            agents,
            strategist,
            notifier,
        )
    }

    fn opening_burst_trigger(symbol: &str) -> Trigger {
        // 2024-06-03 is a Monday; 09:30 IST falls inside OPENING_BURST.
        let triggered_at = chrono::DateTime::parse_from_rfc3339("2024-06-03T04:00:00Z").unwrap().with_timezone(&Utc);
        Trigger { symbol: symbol.to_string(), triggered_at, trace_id: "trace-1".to_string() }
    }

    #[tokio::test]
    async fn clean_opening_buy_survives_the_gate_chain() {
        let config = test_config();
        let store = test_store(config.clone());
        let agents = Arc::new(FakeAgents { signal: Signal::Buy, bias: "STRONG_BULLISH" });
        let strategist = Arc::new(FakeStrategist { signal: Signal::Buy, confidence: 0.9 });
        let notified = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(FakeNotifier { calls: notified.clone() });

        let orchestrator = orchestrator(config, store, agents, strategist, notifier);
        let decision = orchestrator.orchestrate(opening_burst_trigger("NIFTY50"), false).await.unwrap();

        assert_eq!(decision.final_signal, Signal::Buy);
        assert!(decision.is_valid());
        assert_eq!(decision.decision_mode, DecisionMode::Live);
    }

    #[tokio::test]
    async fn agent_dispatch_failure_aborts_with_upstream_unavailable() {
        let config = test_config();
        let store = test_store(config.clone());
        let agents: Arc<dyn AgentDispatcher> = Arc::new(FailingAgents);
        let strategist = Arc::new(FakeStrategist { signal: Signal::Buy, confidence: 0.9 });
        let notifier = Arc::new(FakeNotifier { calls: Arc::new(AtomicUsize::new(0)) });

        let orchestrator = orchestrator(config, store, agents, strategist, notifier);
        let err = orchestrator.orchestrate(opening_burst_trigger("NIFTY50"), false).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn replay_mode_skips_the_strategist_and_uses_consensus() {
        let config = test_config();
        let store = test_store(config.clone());
        let agents = Arc::new(FakeAgents { signal: Signal::Buy, bias: "STRONG_BULLISH" });
        let strategist = Arc::new(FakeStrategist { signal: Signal::Sell, confidence: 0.9 });
        let notifier = Arc::new(FakeNotifier { calls: Arc::new(AtomicUsize::new(0)) });

        let orchestrator = orchestrator(config, store, agents, strategist, notifier);
        let decision = orchestrator.orchestrate(opening_burst_trigger("NIFTY50"), true).await.unwrap();

        assert_eq!(decision.decision_mode, DecisionMode::ReplayConsensusOnly);
        assert!(!decision.divergence_flag);
    }

    #[test]
    fn leading_streak_stops_at_first_non_divergent_entry() {
        use crate::domain::MemoryEntry;
        let memory = vec![
            MemoryEntry { final_signal: Signal::Buy, confidence: 0.7, divergence_flag: true, regime: MarketRegime::Trending },
            MemoryEntry { final_signal: Signal::Buy, confidence: 0.7, divergence_flag: true, regime: MarketRegime::Trending },
            MemoryEntry { final_signal: Signal::Buy, confidence: 0.7, divergence_flag: false, regime: MarketRegime::Trending },
        ];
        assert_eq!(leading_divergence_streak(&memory), 2);
    }

    #[test]
    fn missing_directional_bias_metadata_defaults_to_neutral() {
        let results = vec![AnalysisResult::degraded("a", "down")];
        assert_eq!(extract_directional_bias(&results), DirectionalBias::Neutral);
    }
}
