//! `DirectionalBiasCalculator` — 5-vote majority among trend indicators (§4.4).

use crate::domain::DirectionalBias;

/// The five votes that feed the directional-bias majority: trend slope, MACD
/// histogram, price vs SMA20, price vs EMA12, and 5-candle momentum.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendVotes {
    pub trend_slope_positive: bool,
    pub macd_histogram_positive: bool,
    pub price_above_sma20: bool,
    pub price_above_ema12: bool,
    pub five_candle_momentum_positive: bool,
}

pub struct DirectionalBiasCalculator;

impl DirectionalBiasCalculator {
    pub fn classify(votes: TrendVotes) -> DirectionalBias {
        let count = [
            votes.trend_slope_positive,
            votes.macd_histogram_positive,
            votes.price_above_sma20,
            votes.price_above_ema12,
            votes.five_candle_momentum_positive,
        ]
        .iter()
        .filter(|v| **v)
        .count() as u8;

        DirectionalBias::from_vote_count(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_bullish_votes_are_strong_bullish() {
        let votes = TrendVotes {
            trend_slope_positive: true,
            macd_histogram_positive: true,
            price_above_sma20: true,
            price_above_ema12: true,
            five_candle_momentum_positive: true,
        };
        assert_eq!(DirectionalBiasCalculator::classify(votes), DirectionalBias::StrongBullish);
    }

    #[test]
    fn split_votes_are_neutral() {
        let votes = TrendVotes {
            trend_slope_positive: true,
            macd_histogram_positive: true,
            price_above_sma20: false,
            price_above_ema12: false,
            five_candle_momentum_positive: false,
        };
        assert_eq!(DirectionalBiasCalculator::classify(votes), DirectionalBias::Neutral);
    }

    #[test]
    fn no_bullish_votes_is_strong_bearish() {
        let votes = TrendVotes::default();
        assert_eq!(DirectionalBiasCalculator::classify(votes), DirectionalBias::StrongBearish);
    }
}
