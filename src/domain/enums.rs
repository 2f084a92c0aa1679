//! Closed enumerations shared across the pipeline, scheduler, and store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four signals a `FinalDecision` may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
    Watch,
}

impl Signal {
    /// Activity ordering from the Authority-Chain rule: `HOLD < WATCH < {BUY, SELL}`.
    /// Externalised as a table per spec.md §9 Open Questions rather than an inline comparison.
    pub fn activity_rank(self) -> u8 {
        match self {
            Signal::Hold => 0,
            Signal::Watch => 1,
            Signal::Buy | Signal::Sell => 2,
        }
    }

    pub fn is_no_more_active_than(self, other: Signal) -> bool {
        self.activity_rank() <= other.activity_rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
            Signal::Watch => "WATCH",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Signal::Buy,
            "SELL" => Signal::Sell,
            "WATCH" => Signal::Watch,
            _ => Signal::Hold,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
    Calm,
    Unknown,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MarketRegime {
    pub fn as_str(self) -> &'static str {
        match self {
            MarketRegime::Trending => "TRENDING",
            MarketRegime::Ranging => "RANGING",
            MarketRegime::Volatile => "VOLATILE",
            MarketRegime::Calm => "CALM",
            MarketRegime::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "TRENDING" => MarketRegime::Trending,
            "RANGING" => MarketRegime::Ranging,
            "VOLATILE" => MarketRegime::Volatile,
            "CALM" => MarketRegime::Calm,
            _ => MarketRegime::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingSession {
    OpeningBurst,
    PowerHour,
    MiddayConsolidation,
    OffHours,
}

impl TradingSession {
    /// Active sessions are the two windows where BUY/SELL can survive the gate chain.
    pub fn is_active(self) -> bool {
        matches!(self, TradingSession::OpeningBurst | TradingSession::PowerHour)
    }
}

impl fmt::Display for TradingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TradingSession {
    pub fn as_str(self) -> &'static str {
        match self {
            TradingSession::OpeningBurst => "OPENING_BURST",
            TradingSession::PowerHour => "POWER_HOUR",
            TradingSession::MiddayConsolidation => "MIDDAY_CONSOLIDATION",
            TradingSession::OffHours => "OFF_HOURS",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "OPENING_BURST" => TradingSession::OpeningBurst,
            "POWER_HOUR" => TradingSession::PowerHour,
            "MIDDAY_CONSOLIDATION" => TradingSession::MiddayConsolidation,
            _ => TradingSession::OffHours,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketState {
    Calm,
    Building,
    Confirmed,
    Weakening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectionalBias {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

impl DirectionalBias {
    pub fn is_bullish_family(self) -> bool {
        matches!(self, DirectionalBias::Bullish | DirectionalBias::StrongBullish)
    }

    pub fn is_bearish_family(self) -> bool {
        matches!(self, DirectionalBias::Bearish | DirectionalBias::StrongBearish)
    }

    pub fn from_vote_count(votes: u8) -> Self {
        match votes {
            5 => DirectionalBias::StrongBullish,
            4 => DirectionalBias::Bullish,
            2 | 3 => DirectionalBias::Neutral,
            1 => DirectionalBias::Bearish,
            _ => DirectionalBias::StrongBearish,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DirectionalBias::StrongBullish => "STRONG_BULLISH",
            DirectionalBias::Bullish => "BULLISH",
            DirectionalBias::Neutral => "NEUTRAL",
            DirectionalBias::Bearish => "BEARISH",
            DirectionalBias::StrongBearish => "STRONG_BEARISH",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "STRONG_BULLISH" => DirectionalBias::StrongBullish,
            "BULLISH" => DirectionalBias::Bullish,
            "BEARISH" => DirectionalBias::Bearish,
            "STRONG_BEARISH" => DirectionalBias::StrongBearish,
            _ => DirectionalBias::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeDirection {
    Long,
    Short,
    Flat,
}

impl TradeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeDirection::Long => "LONG",
            TradeDirection::Short => "SHORT",
            TradeDirection::Flat => "FLAT",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "LONG" => TradeDirection::Long,
            "SHORT" => TradeDirection::Short,
            _ => TradeDirection::Flat,
        }
    }
}

/// Capability an agent declares at registration; drives the regime-boost table
/// (§4.2 step 8) instead of fragile case-insensitive name substring matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentCapability {
    Trend,
    Risk,
    Portfolio,
    Discipline,
}

/// `LIVE` vs `REPLAY_CONSENSUS_ONLY` — gates inclusion in the learning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionMode {
    Live,
    ReplayConsensusOnly,
}

impl Default for DecisionMode {
    fn default() -> Self {
        DecisionMode::Live
    }
}

impl DecisionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionMode::Live => "LIVE",
            DecisionMode::ReplayConsensusOnly => "REPLAY_CONSENSUS_ONLY",
        }
    }

    /// "legacy rows behave as live": anything that isn't exactly the replay tag
    /// resolves to `LIVE`, matching the `decisionMode IS NULL OR decisionMode = 'LIVE'`
    /// filter spec.md §9 describes.
    pub fn parse(s: &str) -> Self {
        match s {
            "REPLAY_CONSENSUS_ONLY" => DecisionMode::ReplayConsensusOnly,
            _ => DecisionMode::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeLabel {
    TargetHit,
    StopOut,
    FastWin,
    SlowWin,
    NoEdge,
}

impl OutcomeLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeLabel::TargetHit => "TARGET_HIT",
            OutcomeLabel::StopOut => "STOP_OUT",
            OutcomeLabel::FastWin => "FAST_WIN",
            OutcomeLabel::SlowWin => "SLOW_WIN",
            OutcomeLabel::NoEdge => "NO_EDGE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TARGET_HIT" => Some(OutcomeLabel::TargetHit),
            "STOP_OUT" => Some(OutcomeLabel::StopOut),
            "FAST_WIN" => Some(OutcomeLabel::FastWin),
            "SLOW_WIN" => Some(OutcomeLabel::SlowWin),
            "NO_EDGE" => Some(OutcomeLabel::NoEdge),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_ordering_matches_authority_chain_rule() {
        assert!(Signal::Hold.activity_rank() < Signal::Watch.activity_rank());
        assert!(Signal::Watch.activity_rank() < Signal::Buy.activity_rank());
        assert_eq!(Signal::Buy.activity_rank(), Signal::Sell.activity_rank());
    }

    #[test]
    fn bias_vote_count_maps_to_five_point_ordinal() {
        assert_eq!(DirectionalBias::from_vote_count(5), DirectionalBias::StrongBullish);
        assert_eq!(DirectionalBias::from_vote_count(4), DirectionalBias::Bullish);
        assert_eq!(DirectionalBias::from_vote_count(3), DirectionalBias::Neutral);
        assert_eq!(DirectionalBias::from_vote_count(2), DirectionalBias::Neutral);
        assert_eq!(DirectionalBias::from_vote_count(1), DirectionalBias::Bearish);
        assert_eq!(DirectionalBias::from_vote_count(0), DirectionalBias::StrongBearish);
    }
}
