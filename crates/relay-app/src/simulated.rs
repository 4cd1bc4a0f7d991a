//! Stand-in for the remote service, used by `relay simulate`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relay_core::types::Task;
use relay_router::{RemoteError, RemoteExecutor};
use serde_json::{json, Value};

/// Remote that sleeps for a fixed latency per call and echoes the task.
pub struct SimulatedRemote {
    latency: Duration,
    calls: AtomicU64,
}

impl SimulatedRemote {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            calls: AtomicU64::new(0),
        }
    }

    /// Remote calls made so far, single and collective alike.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RemoteExecutor for SimulatedRemote {
    async fn execute(&self, task: &Task) -> Result<Value, RemoteError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
        Ok(json!({"taskType": task.task_type, "payload": task.payload, "simulated": true}))
    }

    async fn execute_batch(
        &self,
        task_type: &str,
        tasks: &[Task],
    ) -> Result<Vec<Value>, RemoteError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
        Ok(tasks
            .iter()
            .map(|t| json!({"taskType": task_type, "payload": t.payload, "simulated": true}))
            .collect())
    }
}
