//! Task routing for Relay.
//!
//! Classifies work, resolves it through local processors or the result
//! cache when possible, coalesces batchable tasks, and falls back to the
//! remote executor only when nothing cheaper applies.

pub mod batch;
pub mod cache;
pub mod classifier;
pub mod error;
pub mod metrics;
pub mod processor;
pub mod remote;
pub mod router;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{BatchHandle, BatchScheduler};
pub use cache::{CacheStats, CacheStore};
pub use classifier::{Classification, Classifier, RoutingRecommendation};
pub use error::{LocalProcessingError, RemoteError, RouteError};
pub use metrics::{RoutingCounters, RoutingMetrics};
pub use processor::{LocalProcessor, ProcessorRegistry};
pub use remote::RemoteExecutor;
pub use router::{RouteOptions, RouteOutcome, TaskRouter};
