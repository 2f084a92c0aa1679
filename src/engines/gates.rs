//! The discipline gate chain (§4.2 step 14): `AuthorityChain`, `SessionGate`,
//! `BiasGate`, `DivergencePenalty` (the `DivergenceGuard` in §2's component table),
//! `MultiFilter`, and `EligibilityGuard` (the `TradeEligibilityGuard`).
//!
//! Gates run in order on a mutable `(signal, confidence, reasoning)` triple. Each
//! firing gate appends a tag to `reasoning`; `divergence_flag` is computed once,
//! before any gate runs, and is never altered by a later gate (it reflects the
//! pre-gate strategist/consensus disagreement per spec.md §4.2 step 14).

use crate::domain::{ConsensusResult, DirectionalBias, MarketRegime, Signal, TradingSession};

const AUTHORITY_CONSENSUS_CONFIDENCE_THRESHOLD: f64 = 0.65;
const DIVERGENCE_CONFIDENCE_MULTIPLIER: f64 = 0.85;
const DIVERGENCE_CONFIDENCE_FLOOR: f64 = 0.50;
const DIVERGENCE_STREAK_FORCE_WATCH: u32 = 2;
const MULTI_FILTER_MIN_CONFIDENCE: f64 = 0.65;
const ELIGIBILITY_MIN_CONFIDENCE: f64 = 0.65;

#[derive(Debug, Clone)]
pub struct GateInput {
    pub strategist_signal: Signal,
    pub strategist_confidence: f64,
    pub reasoning: String,
    pub consensus: ConsensusResult,
    pub session: TradingSession,
    pub regime: MarketRegime,
    pub bias: DirectionalBias,
    pub divergence_streak: u32,
}

#[derive(Debug, Clone)]
pub struct GateOutput {
    pub signal: Signal,
    pub confidence: f64,
    pub reasoning: String,
    /// Pre-gate boolean: true when the strategist's signal differs from the
    /// guardrail's (consensus) signal, frozen before any gate runs.
    pub divergence_flag: bool,
}

struct GateState {
    signal: Signal,
    confidence: f64,
    reasoning: String,
}

impl GateState {
    fn tag(&mut self, tag: &str) {
        self.reasoning.push_str(" [OVERRIDE: ");
        self.reasoning.push_str(tag);
        self.reasoning.push(']');
    }
}

/// `AuthorityChain`: the strategist is authoritative; consensus may only force a
/// downgrade, never an upgrade.
fn authority_chain(state: &mut GateState, input: &GateInput, divergence_flag: bool) {
    if !divergence_flag {
        return;
    }
    if input.consensus.normalized_confidence < AUTHORITY_CONSENSUS_CONFIDENCE_THRESHOLD {
        return;
    }
    if !input.consensus.final_signal.is_no_more_active_than(state.signal) {
        return;
    }
    state.signal = input.consensus.final_signal;
    state.confidence = input.consensus.normalized_confidence;
    state.tag("ConsensusAuthority");
}

/// `SessionGate`: inactive sessions cannot carry an active BUY/SELL signal through.
fn session_gate(state: &mut GateState, input: &GateInput) {
    if !matches!(input.session, TradingSession::OffHours | TradingSession::MiddayConsolidation) {
        return;
    }
    if !matches!(state.signal, Signal::Buy | Signal::Sell) {
        return;
    }
    state.signal = if input.session == TradingSession::OffHours { Signal::Hold } else { Signal::Watch };
    state.tag("SessionGate");
}

/// `BiasGate`: BUY requires a bullish-family bias, SELL a bearish-family bias.
fn bias_gate(state: &mut GateState, input: &GateInput) {
    let violates = match state.signal {
        Signal::Buy => !input.bias.is_bullish_family(),
        Signal::Sell => !input.bias.is_bearish_family(),
        _ => false,
    };
    if violates {
        state.signal = Signal::Watch;
        state.tag("BiasGate");
    }
}

/// `DivergencePenalty` (`DivergenceGuard`): confidence discount plus a hard
/// downgrade when disagreement has persisted across cycles.
fn divergence_penalty(state: &mut GateState, divergence_flag: bool, divergence_streak: u32) {
    if !divergence_flag {
        return;
    }
    state.confidence = (state.confidence * DIVERGENCE_CONFIDENCE_MULTIPLIER).max(DIVERGENCE_CONFIDENCE_FLOOR);
    state.tag("DivergencePenalty");
    if divergence_streak >= DIVERGENCE_STREAK_FORCE_WATCH {
        state.signal = Signal::Watch;
        state.tag("DivergenceStreak");
    }
}

/// `MultiFilter`: a catch-all confidence/divergence/session-activity floor.
fn multi_filter(state: &mut GateState, input: &GateInput, divergence_flag: bool) {
    let should_force = state.confidence < MULTI_FILTER_MIN_CONFIDENCE
        || divergence_flag
        || !input.session.is_active();
    if should_force && state.signal != Signal::Hold {
        state.signal = Signal::Watch;
        state.tag("MultiFilter");
    }
}

/// `EligibilityGuard` (`TradeEligibilityGuard`): the hard final check before a
/// BUY/SELL can survive the chain.
fn eligibility_guard(state: &mut GateState, input: &GateInput, divergence_flag: bool) {
    let eligible = match state.signal {
        Signal::Buy => {
            matches!(input.session, TradingSession::OpeningBurst | TradingSession::PowerHour)
                && matches!(input.regime, MarketRegime::Volatile | MarketRegime::Trending)
                && input.bias.is_bullish_family()
                && state.confidence >= ELIGIBILITY_MIN_CONFIDENCE
                && !divergence_flag
        }
        Signal::Sell => {
            input.session == TradingSession::OpeningBurst
                && input.regime == MarketRegime::Volatile
                && input.bias.is_bearish_family()
                && state.confidence >= ELIGIBILITY_MIN_CONFIDENCE
                && !divergence_flag
        }
        _ => true,
    };
    if !eligible {
        state.signal = Signal::Watch;
        state.tag("EligibilityGuard");
    }
}

pub struct GateChain;

impl GateChain {
    pub fn apply(input: GateInput) -> GateOutput {
        let divergence_flag = input.strategist_signal != input.consensus.final_signal;

        let mut state = GateState {
            signal: input.strategist_signal,
            confidence: input.strategist_confidence,
            reasoning: input.reasoning.clone(),
        };

        authority_chain(&mut state, &input, divergence_flag);
        session_gate(&mut state, &input);
        bias_gate(&mut state, &input);
        divergence_penalty(&mut state, divergence_flag, input.divergence_streak);
        multi_filter(&mut state, &input, divergence_flag);
        eligibility_guard(&mut state, &input, divergence_flag);

        GateOutput {
            signal: state.signal,
            confidence: state.confidence.clamp(0.0, 1.0),
            reasoning: state.reasoning,
            divergence_flag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn consensus(signal: Signal, confidence: f64) -> ConsensusResult {
        ConsensusResult { final_signal: signal, normalized_confidence: confidence, per_agent_weights: BTreeMap::new() }
    }

    fn base_input(strategist_signal: Signal, consensus: ConsensusResult) -> GateInput {
        GateInput {
            strategist_signal,
            strategist_confidence: 0.78,
            reasoning: "initial".to_string(),
            consensus,
            session: TradingSession::OpeningBurst,
            regime: MarketRegime::Trending,
            bias: DirectionalBias::StrongBullish,
            divergence_streak: 0,
        }
    }

    #[test]
    fn clean_opening_buy_survives_all_gates() {
        let out = GateChain::apply(base_input(Signal::Buy, consensus(Signal::Buy, 0.8)));
        assert_eq!(out.signal, Signal::Buy);
        assert!(!out.divergence_flag);
    }

    #[test]
    fn downgrade_only_never_upgrades_to_more_active_signal() {
        // Strategist says HOLD, consensus says BUY (more active) — authority chain must not upgrade.
        let mut input = base_input(Signal::Hold, consensus(Signal::Buy, 0.9));
        input.strategist_confidence = 0.2;
        let out = GateChain::apply(input);
        assert!(out.signal.is_no_more_active_than(Signal::Hold));
    }

    #[test]
    fn divergence_override_replaces_signal_with_consensus_when_downgrade() {
        let mut input = base_input(Signal::Buy, consensus(Signal::Sell, 0.80));
        input.bias = DirectionalBias::Bearish;
        let out = GateChain::apply(input);
        assert!(out.divergence_flag);
        // SELL is not less active than BUY (equal rank), so the authority rule applies.
        assert_eq!(out.reasoning.contains("ConsensusAuthority"), true);
    }

    #[test]
    fn quiet_midday_session_forces_watch() {
        let mut input = base_input(Signal::Buy, consensus(Signal::Buy, 0.8));
        input.session = TradingSession::MiddayConsolidation;
        let out = GateChain::apply(input);
        assert_eq!(out.signal, Signal::Watch);
    }

    #[test]
    fn off_hours_forces_hold() {
        let mut input = base_input(Signal::Sell, consensus(Signal::Sell, 0.8));
        input.session = TradingSession::OffHours;
        input.bias = DirectionalBias::StrongBearish;
        let out = GateChain::apply(input);
        assert_eq!(out.signal, Signal::Hold);
    }

    #[test]
    fn bias_mismatch_forces_watch() {
        let mut input = base_input(Signal::Buy, consensus(Signal::Buy, 0.8));
        input.bias = DirectionalBias::Bearish;
        let out = GateChain::apply(input);
        assert_eq!(out.signal, Signal::Watch);
    }

    #[test]
    fn divergence_streak_of_two_forces_watch() {
        let mut input = base_input(Signal::Buy, consensus(Signal::Sell, 0.7));
        input.bias = DirectionalBias::StrongBullish;
        input.divergence_streak = 2;
        let out = GateChain::apply(input);
        assert_eq!(out.signal, Signal::Watch);
    }

    #[test]
    fn sell_requires_opening_burst_and_volatile_regime() {
        let mut input = base_input(Signal::Sell, consensus(Signal::Sell, 0.9));
        input.bias = DirectionalBias::StrongBearish;
        input.regime = MarketRegime::Trending; // SELL eligibility requires VOLATILE specifically
        let out = GateChain::apply(input);
        assert_eq!(out.signal, Signal::Watch);
    }
}
