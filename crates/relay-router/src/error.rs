//! Error types for task routing.

/// Errors raised by a registered local processor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocalProcessingError {
    #[error("Payload validation failed: {0}")]
    InvalidPayload(String),
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("Local processing failed: {0}")]
    Failed(String),
}

/// Errors reported by the remote execution collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote call failed: {0}")]
    Failed(String),
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
    #[error("Remote returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("Collective execution not supported")]
    BatchUnsupported,
}

/// Errors surfaced to callers of the task router.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Local processor for {task_type} failed: {source}")]
    Local {
        task_type: String,
        #[source]
        source: LocalProcessingError,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Batch scheduler is not accepting tasks")]
    BatchClosed,
    /// The scheduler's flush loop was never started, so a queued task
    /// would never complete.
    #[error("Batch scheduler is not running")]
    SchedulerNotRunning,
}
