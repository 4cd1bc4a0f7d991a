//! Orchestrator error types.

use relay_core::types::Severity;
use relay_router::RouteError;

/// Errors returned by the orchestrator.
///
/// A decision that needs human approval is not an error; see
/// [`crate::orchestrator::TaskOutcome::AwaitingApproval`].
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Action '{action}' is forbidden ({severity:?}): {reason}")]
    Forbidden {
        action: String,
        severity: Severity,
        reason: String,
    },
    #[error(transparent)]
    Route(#[from] RouteError),
}
