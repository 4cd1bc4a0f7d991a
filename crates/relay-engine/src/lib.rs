//! Relay engine: wiring, orchestration and background jobs.

pub mod context;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod orchestrator;

pub use context::{RelayContext, RelayContextBuilder};
pub use error::OrchestratorError;
pub use jobs::BackgroundJobs;
pub use metrics::{MetricsSnapshot, PerformanceReport};
pub use orchestrator::{ApprovalGate, Orchestrator, TaskOutcome, TaskRequest};
