//! `AgentScoreCalculator` — adaptive per-agent weighting (§4.2 step 8).

use crate::domain::{AgentCapability, AgentFeedback, AgentPerformanceModel, MarketRegime};

const WEIGHT_MIN: f64 = 0.1;
const WEIGHT_MAX: f64 = 2.0;
const DEFAULT_BASE_WEIGHT: f64 = 1.0;

/// `(agentCapability, regime) → boost`, a compile-time table rather than the
/// fragile case-insensitive name-substring match the original regime-boost
/// policy used (§9 "Agent capability instead of name substring").
fn regime_boost(capability: AgentCapability, regime: MarketRegime) -> f64 {
    match (capability, regime) {
        (AgentCapability::Trend, MarketRegime::Trending) => 0.20,
        (AgentCapability::Risk, MarketRegime::Volatile) => 0.20,
        (AgentCapability::Portfolio, MarketRegime::Ranging) => 0.15,
        _ => 0.0,
    }
}

pub struct AgentScoreCalculator;

impl AgentScoreCalculator {
    fn base_weight(performance: Option<&AgentPerformanceModel>) -> f64 {
        match performance {
            None => DEFAULT_BASE_WEIGHT,
            Some(p) => (0.5 * p.historical_accuracy_score - 0.2 * p.latency_weight).max(0.1),
        }
    }

    fn feedback_boost(feedback: Option<&AgentFeedback>) -> f64 {
        match feedback {
            None => 0.0,
            Some(f) => 0.4 * f.win_rate + 0.3 * f.avg_confidence - 0.2 * f.normalized_latency,
        }
    }

    /// Always yields a weight in `[0.1, 2.0]` regardless of inputs (the weight-clamping law).
    pub fn compute(
        capability: AgentCapability,
        regime: MarketRegime,
        performance: Option<&AgentPerformanceModel>,
        feedback: Option<&AgentFeedback>,
    ) -> f64 {
        let raw = Self::base_weight(performance)
            + Self::feedback_boost(feedback)
            + regime_boost(capability, regime);
        raw.clamp(WEIGHT_MIN, WEIGHT_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_performance_and_feedback_uses_defaults() {
        let w = AgentScoreCalculator::compute(AgentCapability::Discipline, MarketRegime::Calm, None, None);
        assert_eq!(w, 1.0);
    }

    #[test]
    fn trend_agent_gets_boosted_in_trending_regime() {
        let w = AgentScoreCalculator::compute(AgentCapability::Trend, MarketRegime::Trending, None, None);
        assert!((w - 1.2).abs() < 1e-9);
    }

    #[test]
    fn weight_is_always_clamped_for_extreme_inputs() {
        let extreme_perf = AgentPerformanceModel {
            agent_name: "x".into(),
            total_decisions: 1,
            avg_confidence: 1.0,
            avg_latency_ms: 1.0,
            win_rate: 1.0,
            latency_weight: 100.0,
            historical_accuracy_score: 1000.0,
        };
        let extreme_feedback = AgentFeedback {
            agent_name: "x".into(),
            win_rate: 10.0,
            avg_confidence: 10.0,
            normalized_latency: -10.0,
            is_market_truth: true,
        };
        let w = AgentScoreCalculator::compute(
            AgentCapability::Risk,
            MarketRegime::Volatile,
            Some(&extreme_perf),
            Some(&extreme_feedback),
        );
        assert!((WEIGHT_MIN..=WEIGHT_MAX).contains(&w));
        assert_eq!(w, WEIGHT_MAX);

        let negative_perf = AgentPerformanceModel {
            historical_accuracy_score: -1000.0,
            latency_weight: 1000.0,
            ..extreme_perf
        };
        let w2 = AgentScoreCalculator::compute(AgentCapability::Discipline, MarketRegime::Unknown, Some(&negative_perf), None);
        assert!((WEIGHT_MIN..=WEIGHT_MAX).contains(&w2));
    }
}
