//! Task router: local -> cache -> batch -> remote.

use std::sync::Arc;

use relay_core::types::{RouteSource, Task};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::batch::BatchScheduler;
use crate::cache::CacheStore;
use crate::error::RouteError;
use crate::metrics::RoutingMetrics;
use crate::processor::ProcessorRegistry;
use crate::remote::RemoteExecutor;

/// Per-call switches that skip routing steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOptions {
    /// Skip the cache lookup. The remote result is still stored.
    pub bypass_cache: bool,
    /// Send batchable tasks straight to the remote path.
    pub no_batch: bool,
}

/// How a routed task was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub result: Value,
    pub source: RouteSource,
    pub was_cached: bool,
}

/// Resolves tasks through the cheapest available path.
pub struct TaskRouter {
    processors: ProcessorRegistry,
    cache: Arc<CacheStore>,
    batch: Arc<BatchScheduler>,
    remote: Arc<dyn RemoteExecutor>,
    metrics: Arc<RoutingMetrics>,
}

impl TaskRouter {
    pub fn new(
        processors: ProcessorRegistry,
        cache: Arc<CacheStore>,
        batch: Arc<BatchScheduler>,
        remote: Arc<dyn RemoteExecutor>,
        metrics: Arc<RoutingMetrics>,
    ) -> Self {
        Self {
            processors,
            cache,
            batch,
            remote,
            metrics,
        }
    }

    /// Route one task.
    ///
    /// Order: a registered local processor, then the cache, then the batch
    /// scheduler for batchable types, then a direct remote call whose result
    /// is cached. Local failures are returned as-is and never cached.
    pub async fn route(
        &self,
        task_type: &str,
        payload: Value,
        options: RouteOptions,
    ) -> Result<RouteOutcome, RouteError> {
        self.metrics.record_request();

        if let Some(processor) = self.processors.get(task_type) {
            let result = processor
                .process(&payload)
                .map_err(|source| RouteError::Local {
                    task_type: task_type.to_string(),
                    source,
                })?;
            self.metrics.record_resolution(RouteSource::Local);
            debug!(task_type, "Resolved locally");
            return Ok(RouteOutcome {
                result,
                source: RouteSource::Local,
                was_cached: false,
            });
        }

        let task = Task::new(task_type, payload);
        let key = task.cache_key();

        if !options.bypass_cache {
            if let Some(result) = self.cache.get(&key) {
                self.metrics.record_resolution(RouteSource::Cache);
                debug!(task_type, "Cache hit");
                return Ok(RouteOutcome {
                    result,
                    source: RouteSource::Cache,
                    was_cached: true,
                });
            }
        }

        if !options.no_batch && self.batch.is_batchable(task_type) {
            let handle = self.batch.submit(task, key)?;
            let result = handle.wait().await?;
            self.metrics.record_resolution(RouteSource::Batch);
            debug!(task_type, "Resolved through batch");
            return Ok(RouteOutcome {
                result,
                source: RouteSource::Batch,
                was_cached: false,
            });
        }

        self.metrics.record_remote_call();
        let result = self.remote.execute(&task).await?;
        self.cache.put(&key, &result);
        self.metrics.record_resolution(RouteSource::Remote);
        debug!(task_type, "Resolved remotely");
        Ok(RouteOutcome {
            result,
            source: RouteSource::Remote,
            was_cached: false,
        })
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn batch(&self) -> &Arc<BatchScheduler> {
        &self.batch
    }

    pub fn metrics(&self) -> &Arc<RoutingMetrics> {
        &self.metrics
    }
}
