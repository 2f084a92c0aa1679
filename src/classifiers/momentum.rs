//! `MomentumStateCalculator` — pure function over a window of recent decisions
//! (§4.2 step 6's upstream data, §4.4). Window is oldest-first.

use nalgebra::DVector;

use crate::domain::{MarketRegime, MarketState, Signal};

#[derive(Debug, Clone, Copy)]
pub struct DecisionSample {
    pub signal: Signal,
    pub confidence: f64,
    pub divergence_flag: bool,
    pub regime: MarketRegime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumMetrics {
    pub signal_alignment: f64,
    pub confidence_trend: f64,
    pub divergence_ratio: f64,
    pub regime_stable: bool,
}

pub struct MomentumStateCalculator;

impl MomentumStateCalculator {
    /// Fraction of samples on the dominant (most frequent) signal.
    fn signal_alignment(samples: &[DecisionSample]) -> f64 {
        let mut counts: [usize; 4] = [0; 4];
        for s in samples {
            counts[s.signal as usize] += 1;
        }
        let dominant = *counts.iter().max().unwrap_or(&0);
        dominant as f64 / samples.len() as f64
    }

    /// Least-squares slope of confidence over the sample index.
    fn confidence_trend(samples: &[DecisionSample]) -> f64 {
        let n = samples.len();
        if n < 2 {
            return 0.0;
        }
        let xs = DVector::from_iterator(n, (0..n).map(|i| i as f64));
        let ys = DVector::from_iterator(n, samples.iter().map(|s| s.confidence));
        let dx = xs.add_scalar(-xs.mean());
        let dy = ys.add_scalar(-ys.mean());
        let den = dx.dot(&dx);
        if den == 0.0 {
            0.0
        } else {
            dx.dot(&dy) / den
        }
    }

    fn divergence_ratio(samples: &[DecisionSample]) -> f64 {
        let diverged = samples.iter().filter(|s| s.divergence_flag).count();
        diverged as f64 / samples.len() as f64
    }

    fn regime_stable(samples: &[DecisionSample]) -> bool {
        match samples.first() {
            Some(first) => samples.iter().all(|s| s.regime == first.regime),
            None => false,
        }
    }

    pub fn metrics(samples: &[DecisionSample]) -> MomentumMetrics {
        MomentumMetrics {
            signal_alignment: Self::signal_alignment(samples),
            confidence_trend: Self::confidence_trend(samples),
            divergence_ratio: Self::divergence_ratio(samples),
            regime_stable: Self::regime_stable(samples),
        }
    }

    /// `samples` are the last N ≤ 8 decisions, oldest-first. Window < 3 → `CALM`.
    pub fn state(samples: &[DecisionSample]) -> MarketState {
        if samples.len() < 3 {
            return MarketState::Calm;
        }

        let m = Self::metrics(samples);

        if m.signal_alignment >= 0.80
            && m.confidence_trend >= -0.03
            && m.divergence_ratio < 0.40
            && m.regime_stable
        {
            return MarketState::Confirmed;
        }

        if m.signal_alignment >= 0.65 && (m.confidence_trend < -0.03 || m.divergence_ratio >= 0.40)
        {
            return MarketState::Weakening;
        }

        if m.signal_alignment >= 0.65 && m.confidence_trend > 0.02 && m.divergence_ratio < 0.40 {
            return MarketState::Building;
        }

        // Softened variant: no stronger condition matched, but alignment and
        // divergence still support a building read with a flatter trend.
        if m.signal_alignment >= 0.65 && m.confidence_trend >= -0.03 && m.divergence_ratio < 0.40 {
            return MarketState::Building;
        }

        MarketState::Calm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(signal: Signal, confidence: f64, divergence: bool, regime: MarketRegime) -> DecisionSample {
        DecisionSample { signal, confidence, divergence_flag: divergence, regime }
    }

    #[test]
    fn window_below_three_is_calm() {
        let samples = vec![
            sample(Signal::Buy, 0.8, false, MarketRegime::Trending),
            sample(Signal::Buy, 0.8, false, MarketRegime::Trending),
        ];
        assert_eq!(MomentumStateCalculator::state(&samples), MarketState::Calm);
    }

    #[test]
    fn strong_aligned_rising_stable_is_confirmed() {
        let samples = vec![
            sample(Signal::Buy, 0.70, false, MarketRegime::Trending),
            sample(Signal::Buy, 0.75, false, MarketRegime::Trending),
            sample(Signal::Buy, 0.80, false, MarketRegime::Trending),
            sample(Signal::Buy, 0.85, false, MarketRegime::Trending),
        ];
        assert_eq!(MomentumStateCalculator::state(&samples), MarketState::Confirmed);
    }

    #[test]
    fn falling_confidence_with_alignment_is_weakening() {
        let samples = vec![
            sample(Signal::Buy, 0.85, false, MarketRegime::Trending),
            sample(Signal::Buy, 0.75, false, MarketRegime::Trending),
            sample(Signal::Buy, 0.65, false, MarketRegime::Trending),
            sample(Signal::Buy, 0.55, false, MarketRegime::Ranging),
        ];
        assert_eq!(MomentumStateCalculator::state(&samples), MarketState::Weakening);
    }

    #[test]
    fn determinism_same_samples_same_state() {
        let samples = vec![
            sample(Signal::Hold, 0.5, true, MarketRegime::Ranging),
            sample(Signal::Hold, 0.5, false, MarketRegime::Ranging),
            sample(Signal::Buy, 0.6, false, MarketRegime::Ranging),
        ];
        let a = MomentumStateCalculator::state(&samples);
        let b = MomentumStateCalculator::state(&samples);
        assert_eq!(a, b);
    }
}
