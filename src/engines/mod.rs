//! Weight & score engines (component C): performance-weighted consensus, adaptive
//! weighting, the discipline gate chain, and the edge win-rate registry.

pub mod consensus;
pub mod gates;
pub mod weights;
pub mod win_conditions;

pub use consensus::ConsensusEngine;
pub use gates::{GateChain, GateInput, GateOutput};
pub use weights::AgentScoreCalculator;
pub use win_conditions::WinConditionRegistry;
