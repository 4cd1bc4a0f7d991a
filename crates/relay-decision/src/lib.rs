//! Decision automation for Relay.
//!
//! Answers "should this be approved?" questions from learned patterns,
//! static rules and per-category heuristics, escalating to a human when
//! none of them is confident enough.

pub mod confidence;
pub mod engine;
pub mod error;
pub mod history;
pub mod patterns;
pub mod persistence;
pub mod rules;
pub mod similarity;
pub mod strategy;

pub use engine::{Decision, DecisionEngine, DecisionSnapshot, DecisionStats};
pub use error::{PersistenceError, RuleError};
pub use history::{DecisionHistory, DecisionRecord};
pub use patterns::{Pattern, PatternBucket, PatternStore};
pub use persistence::{JsonFilePersistence, MemoryPersistence, PersistencePort};
pub use rules::DecisionRule;
pub use strategy::CategoryStrategy;
