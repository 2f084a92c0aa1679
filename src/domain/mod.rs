//! Domain model (component A): records, enums, and the invariants that accompany them.

pub mod enums;
pub mod types;

pub use enums::{
    AgentCapability, DecisionMode, DirectionalBias, MarketRegime, MarketState, OutcomeLabel,
    Signal, TradeDirection, TradingSession,
};
pub use types::{
    AgentFeedback, AgentPerformanceModel, AgentPerformanceSnapshot, AnalysisResult,
    ConsensusResult, DecisionContext, DecisionMetricsProjection, DecisionRecord, DecisionSnapshot,
    EdgeCondition, EdgeKey, FeedbackLoopStatus, FinalDecision, MemoryEntry, StrategistDecision,
    Trigger, DECISION_SCHEMA_VERSION, ORCHESTRATOR_VERSION,
};
