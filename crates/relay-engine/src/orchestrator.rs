//! Relay orchestrator.
//!
//! Entry point for callers: routes tasks, answers approval questions, runs
//! approval-gated tasks end to end, and reports metrics. Every outcome is
//! published as an [`ActivityEvent`].

use std::time::Instant;

use chrono::Utc;
use relay_core::events::ActivityEvent;
use relay_decision::Decision;
use relay_router::{Classification, RouteOptions, RouteOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::RelayContext;
use crate::error::OrchestratorError;
use crate::metrics::{MetricsSnapshot, PerformanceReport};

/// Policy action meaning "ask a human" rather than "refuse".
const ESCALATE: &str = "escalate";

/// Question put to the decision engine before a task may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalGate {
    pub category: String,
    pub action: String,
    #[serde(default)]
    pub context: Value,
}

/// A task together with its policy action and optional approval gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_type: String,
    #[serde(default)]
    pub payload: Value,
    /// Checked against the forbidden and autonomous policy tables.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub approval: Option<ApprovalGate>,
    #[serde(default)]
    pub options: RouteOptions,
}

impl TaskRequest {
    pub fn new(task_type: impl Into<String>, payload: Value) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
            action: None,
            approval: None,
            options: RouteOptions::default(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_approval(
        mut self,
        category: impl Into<String>,
        action: impl Into<String>,
        context: Value,
    ) -> Self {
        self.approval = Some(ApprovalGate {
            category: category.into(),
            action: action.into(),
            context,
        });
        self
    }
}

/// Terminal state of a processed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task ran.
    Completed {
        outcome: RouteOutcome,
        decision: Option<Decision>,
    },
    /// Nothing ran; a human has to approve first.
    AwaitingApproval {
        reason: String,
        decision: Option<Decision>,
    },
    /// The decision engine answered "no".
    Rejected { reason: String, decision: Decision },
}

/// Whether a decision result grants approval. Only an explicit `true` (or
/// `{"approved": true}`) does.
fn grants_approval(result: &Value) -> bool {
    match result {
        Value::Bool(b) => *b,
        Value::Object(map) => map.get("approved").and_then(Value::as_bool).unwrap_or(false),
        _ => false,
    }
}

pub struct Orchestrator {
    ctx: RelayContext,
}

impl Orchestrator {
    pub fn new(ctx: RelayContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RelayContext {
        &self.ctx
    }

    fn emit(&self, event: ActivityEvent) {
        // No subscribers is fine.
        let _ = self.ctx.events.send(event);
    }

    /// Route a task through local -> cache -> batch -> remote.
    pub async fn route_task(
        &self,
        task_type: &str,
        payload: Value,
        options: RouteOptions,
    ) -> Result<RouteOutcome, OrchestratorError> {
        let started = Instant::now();
        match self.ctx.router.route(task_type, payload, options).await {
            Ok(outcome) => {
                self.emit(ActivityEvent::TaskRouted {
                    task_type: task_type.to_string(),
                    source: outcome.source,
                    processing_duration_ms: started.elapsed().as_millis() as u64,
                    saved_a_call: outcome.source.saves_call(),
                    timestamp: Utc::now(),
                });
                Ok(outcome)
            }
            Err(e) => {
                warn!(task_type, error = %e, "Task routing failed");
                self.emit(ActivityEvent::TaskFailed {
                    task_type: task_type.to_string(),
                    reason: e.to_string(),
                    processing_duration_ms: started.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                });
                Err(e.into())
            }
        }
    }

    /// Ask the decision engine and publish the outcome.
    pub fn decide(&self, category: &str, action: &str, context: &Value) -> Decision {
        let decision = self.ctx.decisions.decide(category, action, context);
        self.emit(ActivityEvent::DecisionMade {
            record_id: decision.record_id,
            category: category.to_string(),
            action: action.to_string(),
            source: decision.source,
            confidence: decision.confidence,
            requires_approval: decision.requires_approval,
            processing_duration_ms: decision.processing_duration_ms,
            saved_a_call: decision.is_automated(),
            timestamp: Utc::now(),
        });
        decision
    }

    /// Classify a `(category, action)` pair against the policy tables.
    pub fn classify(&self, category: &str, action: &str) -> Classification {
        self.ctx.classifier.classify(category, action)
    }

    /// Run a task through policy, the approval gate, and routing.
    ///
    /// Forbidden actions with a `block` policy fail; forbidden actions with
    /// an `escalate` policy wait for approval. Autonomous actions skip the
    /// approval gate. Otherwise the gate, if any, must grant approval before
    /// the task is routed.
    pub async fn process(&self, request: TaskRequest) -> Result<TaskOutcome, OrchestratorError> {
        let mut autonomous = false;

        if let Some(action) = &request.action {
            let classification = self.classify(&request.task_type, action);
            if !classification.allowed {
                let severity = classification
                    .severity
                    .unwrap_or(relay_core::types::Severity::High);
                if classification.action_to_take.as_deref() == Some(ESCALATE) {
                    info!(task_type = %request.task_type, action = %action, "Forbidden action escalated");
                    return Ok(TaskOutcome::AwaitingApproval {
                        reason: classification.reason,
                        decision: None,
                    });
                }
                warn!(
                    task_type = %request.task_type,
                    action = %action,
                    ?severity,
                    "Forbidden action blocked"
                );
                return Err(OrchestratorError::Forbidden {
                    action: action.clone(),
                    severity,
                    reason: classification.reason,
                });
            }
            autonomous = classification.priority.is_some();
        }

        let decision = match (&request.approval, autonomous) {
            (Some(gate), false) => {
                let decision = self.decide(&gate.category, &gate.action, &gate.context);
                match &decision.result {
                    None => {
                        debug!(task_type = %request.task_type, "Task awaiting approval");
                        return Ok(TaskOutcome::AwaitingApproval {
                            reason: format!(
                                "{}/{} needs approval (confidence {:.2})",
                                gate.category, gate.action, decision.confidence
                            ),
                            decision: Some(decision),
                        });
                    }
                    Some(result) if !grants_approval(result) => {
                        return Ok(TaskOutcome::Rejected {
                            reason: format!(
                                "{}/{} was denied by {}",
                                gate.category, gate.action, decision.source
                            ),
                            decision,
                        });
                    }
                    Some(_) => Some(decision),
                }
            }
            _ => None,
        };

        let outcome = self
            .route_task(&request.task_type, request.payload, request.options)
            .await?;
        Ok(TaskOutcome::Completed { outcome, decision })
    }

    /// Mark a past decision correct or incorrect.
    pub fn record_feedback(&self, record_id: Uuid, was_correct: bool) -> bool {
        let known = self.ctx.decisions.record_feedback(record_id, was_correct);
        if !known {
            debug!(%record_id, "Feedback for unknown decision");
        }
        known
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::capture(&self.ctx.metrics, &self.ctx.decisions.stats())
    }

    pub fn check_target_performance(&self) -> PerformanceReport {
        PerformanceReport::evaluate(&self.metrics(), &self.ctx.config.targets)
    }

    /// Restore decision state from the persistence port, if one is
    /// configured. Failures are logged and leave the engine empty.
    pub async fn load_state(&self) -> bool {
        let Some(port) = &self.ctx.persistence else {
            return false;
        };
        match self.ctx.decisions.load_from(port.as_ref()).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Failed to load decision state; starting fresh");
                false
            }
        }
    }
}
