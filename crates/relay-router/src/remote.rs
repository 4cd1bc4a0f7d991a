//! Port to the remote execution collaborator.

use async_trait::async_trait;
use relay_core::types::Task;
use serde_json::Value;

use crate::error::RemoteError;

/// The expensive external operation the router tries to avoid.
///
/// Implementations own their own timeouts and retries; the router calls
/// `execute` at most once per task and `execute_batch` at most once per
/// flushed group.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Execute a single task.
    async fn execute(&self, task: &Task) -> Result<Value, RemoteError>;

    /// Execute a group of same-type tasks in one collective call.
    ///
    /// On success the returned vector must hold one result per task, in the
    /// order the tasks were given. The default declines, which makes the
    /// scheduler fall back to one `execute` per task.
    async fn execute_batch(
        &self,
        task_type: &str,
        tasks: &[Task],
    ) -> Result<Vec<Value>, RemoteError> {
        let _ = (task_type, tasks);
        Err(RemoteError::BatchUnsupported)
    }
}
