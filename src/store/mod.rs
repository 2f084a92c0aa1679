//! Feedback & Projection Store (component D, §4.3 and §6): owns the SQLite
//! connection, the non-fatal projection pipeline, the agent-feedback and edge
//! registries, and the live snapshot broadcast.

pub mod db;
pub mod decisions;
pub mod projections;
pub mod snapshots;

pub use db::Db;
pub use decisions::FeedbackStore;
pub use snapshots::SnapshotBus;
