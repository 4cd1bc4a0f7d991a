use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DecisionSource, RouteSource};

/// Activity events emitted by the routing core.
///
/// Events are broadcast to whatever activity logger is subscribed. The core
/// never waits on, or depends on, a subscriber receiving them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ActivityEvent {
    /// A task was routed to completion.
    TaskRouted {
        task_type: String,
        source: RouteSource,
        processing_duration_ms: u64,
        saved_a_call: bool,
        timestamp: DateTime<Utc>,
    },

    /// A routed task failed.
    TaskFailed {
        task_type: String,
        reason: String,
        processing_duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The decision engine produced an outcome.
    DecisionMade {
        record_id: Uuid,
        category: String,
        action: String,
        source: DecisionSource,
        confidence: f64,
        requires_approval: bool,
        processing_duration_ms: u64,
        saved_a_call: bool,
        timestamp: DateTime<Utc>,
    },

    /// The batch scheduler flushed one group of same-type tasks.
    BatchFlushed {
        task_type: String,
        size: usize,
        succeeded: bool,
        processing_duration_ms: u64,
        calls_saved: u64,
        timestamp: DateTime<Utc>,
    },
}

impl ActivityEvent {
    /// Short machine-readable name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityEvent::TaskRouted { .. } => "task_routed",
            ActivityEvent::TaskFailed { .. } => "task_failed",
            ActivityEvent::DecisionMade { .. } => "decision_made",
            ActivityEvent::BatchFlushed { .. } => "batch_flushed",
        }
    }

    /// Whether the event represents a remote call that did not have to happen.
    pub fn saved_a_call(&self) -> bool {
        match self {
            ActivityEvent::TaskRouted { saved_a_call, .. }
            | ActivityEvent::DecisionMade { saved_a_call, .. } => *saved_a_call,
            ActivityEvent::BatchFlushed { calls_saved, .. } => *calls_saved > 0,
            ActivityEvent::TaskFailed { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_routed_serializes_with_type_tag() {
        let event = ActivityEvent::TaskRouted {
            task_type: "formatting".to_string(),
            source: RouteSource::Local,
            processing_duration_ms: 3,
            saved_a_call: true,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_routed");
        assert_eq!(json["source"], "local");
        assert_eq!(json["saved_a_call"], true);
        assert_eq!(event.kind(), "task_routed");
    }

    #[test]
    fn test_saved_a_call() {
        let flushed = ActivityEvent::BatchFlushed {
            task_type: "notification".to_string(),
            size: 1,
            succeeded: true,
            processing_duration_ms: 10,
            calls_saved: 0,
            timestamp: Utc::now(),
        };
        assert!(!flushed.saved_a_call());

        let failed = ActivityEvent::TaskFailed {
            task_type: "x".to_string(),
            reason: "boom".to_string(),
            processing_duration_ms: 1,
            timestamp: Utc::now(),
        };
        assert!(!failed.saved_a_call());
        assert_eq!(failed.kind(), "task_failed");
    }

    #[test]
    fn test_decision_event_round_trip() {
        let event = ActivityEvent::DecisionMade {
            record_id: Uuid::new_v4(),
            category: "file_operation".to_string(),
            action: "canDelete".to_string(),
            source: DecisionSource::Rule,
            confidence: 0.9,
            requires_approval: false,
            processing_duration_ms: 0,
            saved_a_call: true,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let rt: ActivityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(rt.kind(), "decision_made");
        assert!(rt.saved_a_call());
    }
}
