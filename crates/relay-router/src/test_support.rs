//! Scripted remote collaborator for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::types::Task;
use serde_json::{json, Value};

use crate::error::RemoteError;
use crate::remote::RemoteExecutor;

/// Echoes payloads back. Payloads with `"fail": true` fail individually.
#[derive(Default)]
pub(crate) struct MockRemote {
    batch_calls: Mutex<Vec<(String, usize)>>,
    single_calls: AtomicUsize,
    fail_batches: bool,
    short_batches: bool,
    delay: Option<Duration>,
}

impl MockRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_batches(mut self) -> Self {
        self.fail_batches = true;
        self
    }

    pub(crate) fn short_batches(mut self) -> Self {
        self.short_batches = true;
        self
    }

    /// Sleep this long inside every remote call.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) fn batch_calls(&self) -> Vec<(String, usize)> {
        self.batch_calls.lock().unwrap().clone()
    }

    pub(crate) fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteExecutor for MockRemote {
    async fn execute(&self, task: &Task) -> Result<Value, RemoteError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if task.payload.get("fail") == Some(&Value::Bool(true)) {
            return Err(RemoteError::Failed(format!("{} rejected", task.task_type)));
        }
        Ok(json!({"echo": task.payload, "via": "single"}))
    }

    async fn execute_batch(
        &self,
        task_type: &str,
        tasks: &[Task],
    ) -> Result<Vec<Value>, RemoteError> {
        self.batch_calls
            .lock()
            .unwrap()
            .push((task_type.to_string(), tasks.len()));
        self.pause().await;
        if self.fail_batches {
            return Err(RemoteError::Unavailable("batch endpoint down".to_string()));
        }
        let mut results: Vec<Value> = tasks
            .iter()
            .map(|t| json!({"echo": t.payload, "via": "batch"}))
            .collect();
        if self.short_batches {
            results.pop();
        }
        Ok(results)
    }
}
