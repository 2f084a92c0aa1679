//! Rule-based strategist fallback (§4.2 step 11): majority vote over agent
//! signals with mean confidence. Runs whenever the strategist is disabled,
//! times out, or returns a malformed reply — never stalls the pipeline.

use std::collections::BTreeMap;

use crate::domain::{AnalysisResult, Signal, StrategistDecision};

fn dominant_signal(results: &[AnalysisResult]) -> Signal {
    let mut counts: BTreeMap<Signal, usize> = BTreeMap::new();
    for r in results {
        *counts.entry(r.signal).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map(|(signal, _)| signal).unwrap_or(Signal::Hold)
}

pub fn rule_based_fallback(results: &[AnalysisResult], reason: &str) -> StrategistDecision {
    if results.is_empty() {
        return StrategistDecision {
            final_signal: Signal::Hold,
            confidence: 0.0,
            reasoning: format!("rule-based fallback (no agent results): {reason}"),
            entry_price: None,
            target_price: None,
            stop_loss: None,
            estimated_hold_minutes: None,
            trade_direction: None,
        };
    }

    let confidence = results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64;
    StrategistDecision {
        final_signal: dominant_signal(results),
        confidence: confidence.clamp(0.0, 1.0),
        reasoning: format!(
            "rule-based fallback (majority vote over {} agents): {reason}",
            results.len()
        ),
        entry_price: None,
        target_price: None,
        stop_loss: None,
        estimated_hold_minutes: None,
        trade_direction: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(signal: Signal, confidence: f64) -> AnalysisResult {
        AnalysisResult {
            agent_name: "agent".into(),
            summary: "s".into(),
            signal,
            confidence,
            metadata: Default::default(),
        }
    }

    #[test]
    fn majority_signal_wins() {
        let results = vec![result(Signal::Buy, 0.8), result(Signal::Buy, 0.6), result(Signal::Hold, 0.4)];
        let decision = rule_based_fallback(&results, "strategist timed out");
        assert_eq!(decision.final_signal, Signal::Buy);
        assert!((decision.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn empty_results_hold_with_zero_confidence() {
        let decision = rule_based_fallback(&[], "no agents responded");
        assert_eq!(decision.final_signal, Signal::Hold);
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn reasoning_carries_the_failure_reason() {
        let results = vec![result(Signal::Sell, 0.7)];
        let decision = rule_based_fallback(&results, "strategist returned 500");
        assert!(decision.reasoning.contains("strategist returned 500"));
    }
}
