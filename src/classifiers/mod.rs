//! Pure classifiers (component B): no I/O, no implicit clock reads — time is
//! always passed in as a parameter so the replay harness can reuse the same logic
//! against historical timestamps (§4.4, §9 "Pure-logic / I/O separation").

pub mod bias;
pub mod momentum;
pub mod regime;
pub mod session;

pub use bias::{DirectionalBiasCalculator, TrendVotes};
pub use momentum::{DecisionSample, MomentumMetrics, MomentumStateCalculator};
pub use regime::MarketRegimeClassifier;
pub use session::TradingSessionClassifier;
