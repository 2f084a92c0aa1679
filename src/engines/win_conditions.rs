//! `WinConditionRegistry` — validates an edge (`session, regime, bias, signal`)
//! against its historical win rate before it is treated as trustworthy (glossary:
//! "Edge condition").

use std::collections::HashMap;

use crate::domain::{EdgeCondition, EdgeKey};

pub struct WinConditionRegistry;

impl WinConditionRegistry {
    /// An edge is validated once it has accumulated a minimum sample size and its
    /// win rate clears the given threshold. Conditions with no samples are
    /// considered unvalidated (neither proven nor disproven).
    pub fn is_validated(
        edges: &HashMap<EdgeKey, EdgeCondition>,
        key: &EdgeKey,
        min_samples: u64,
        min_win_rate: f64,
    ) -> bool {
        let Some(edge) = edges.get(key) else {
            return false;
        };
        if edge.total_count < min_samples {
            return false;
        }
        edge.win_rate().map(|wr| wr >= min_win_rate).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DirectionalBias, MarketRegime, Signal, TradingSession};

    #[test]
    fn unknown_edge_is_unvalidated() {
        let edges = HashMap::new();
        let key = EdgeKey {
            session: TradingSession::OpeningBurst,
            regime: MarketRegime::Trending,
            bias: DirectionalBias::StrongBullish,
            signal: Signal::Buy,
        };
        assert!(!WinConditionRegistry::is_validated(&edges, &key, 10, 0.55));
    }

    #[test]
    fn edge_below_minimum_samples_is_unvalidated() {
        let key = EdgeKey {
            session: TradingSession::OpeningBurst,
            regime: MarketRegime::Trending,
            bias: DirectionalBias::StrongBullish,
            signal: Signal::Buy,
        };
        let mut edges = HashMap::new();
        edges.insert(key.clone(), EdgeCondition { win_count: 3, total_count: 3 });
        assert!(!WinConditionRegistry::is_validated(&edges, &key, 10, 0.55));
    }

    #[test]
    fn edge_above_threshold_is_validated() {
        let key = EdgeKey {
            session: TradingSession::OpeningBurst,
            regime: MarketRegime::Trending,
            bias: DirectionalBias::StrongBullish,
            signal: Signal::Buy,
        };
        let mut edges = HashMap::new();
        edges.insert(key.clone(), EdgeCondition { win_count: 7, total_count: 10 });
        assert!(WinConditionRegistry::is_validated(&edges, &key, 10, 0.55));
    }
}
