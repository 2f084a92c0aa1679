//! `ConsensusEngine` — performance-weighted linear combination of agent signals,
//! used as a downgrade-only override of the strategist (§4.2 step 12).

use std::collections::BTreeMap;

use crate::domain::{AnalysisResult, ConsensusResult, Signal};

fn signal_score(signal: Signal) -> f64 {
    match signal {
        Signal::Buy => 1.0,
        Signal::Sell => -1.0,
        Signal::Hold => 0.0,
        Signal::Watch => 0.5,
    }
}

pub struct ConsensusEngine;

impl ConsensusEngine {
    /// Guard pattern: an empty agent-result list yields `{HOLD, 0.0}` without exception
    /// (the consensus engine is never called with empty input in practice, but the
    /// guard must hold even if it is — the "guard safety" law in spec.md §8).
    pub fn compute(results: &[AnalysisResult], weights: &BTreeMap<String, f64>) -> ConsensusResult {
        if results.is_empty() {
            return ConsensusResult {
                final_signal: Signal::Hold,
                normalized_confidence: 0.0,
                per_agent_weights: BTreeMap::new(),
            };
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut per_agent_weights = BTreeMap::new();

        for r in results {
            let w = weights.get(&r.agent_name).copied().unwrap_or(1.0);
            weighted_sum += signal_score(r.signal) * w;
            weight_total += w;
            per_agent_weights.insert(r.agent_name.clone(), w);
        }

        let raw_score = if weight_total > 0.0 { weighted_sum / weight_total } else { 0.0 };
        let normalized_confidence = (raw_score + 1.0) / 2.0;

        let final_signal = if raw_score > 0.3 {
            Signal::Buy
        } else if raw_score < -0.3 {
            Signal::Sell
        } else if raw_score > 0.0 {
            Signal::Watch
        } else {
            Signal::Hold
        };

        ConsensusResult {
            final_signal,
            normalized_confidence: normalized_confidence.clamp(0.0, 1.0),
            per_agent_weights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(agent: &str, signal: Signal) -> AnalysisResult {
        AnalysisResult {
            agent_name: agent.to_string(),
            summary: String::new(),
            signal,
            confidence: 0.8,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_input_yields_hold_zero_without_panic() {
        let weights = BTreeMap::new();
        let out = ConsensusEngine::compute(&[], &weights);
        assert_eq!(out.final_signal, Signal::Hold);
        assert_eq!(out.normalized_confidence, 0.0);
    }

    #[test]
    fn unanimous_buy_with_equal_weights_is_buy() {
        let results = vec![result("a", Signal::Buy), result("b", Signal::Buy)];
        let mut weights = BTreeMap::new();
        weights.insert("a".to_string(), 1.0);
        weights.insert("b".to_string(), 1.0);
        let out = ConsensusEngine::compute(&results, &weights);
        assert_eq!(out.final_signal, Signal::Buy);
        assert_eq!(out.normalized_confidence, 1.0);
    }

    #[test]
    fn split_buy_hold_lands_in_watch_band() {
        let results = vec![result("a", Signal::Buy), result("b", Signal::Hold)];
        let mut weights = BTreeMap::new();
        weights.insert("a".to_string(), 1.0);
        weights.insert("b".to_string(), 1.0);
        let out = ConsensusEngine::compute(&results, &weights);
        assert_eq!(out.final_signal, Signal::Watch);
    }
}
