//! Append-only decision log.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use relay_core::types::DecisionSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One decision, as made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub category: String,
    pub action: String,
    pub context: Value,
    pub result: Option<Value>,
    pub confidence: f64,
    pub source: DecisionSource,
    pub decided_at: DateTime<Utc>,
    pub processing_duration_ms: u64,
    /// Set later through feedback; `None` until then.
    pub was_correct: Option<bool>,
}

#[derive(Default)]
pub struct DecisionHistory {
    records: Mutex<Vec<DecisionRecord>>,
}

impl DecisionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DecisionRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, record: DecisionRecord) {
        self.lock().push(record);
    }

    /// `(records marked correct, all records)` for one bucket.
    pub fn bucket_stats(&self, category: &str, action: &str) -> (usize, usize) {
        self.lock()
            .iter()
            .filter(|r| r.category == category && r.action == action)
            .fold((0, 0), |(correct, total), r| {
                (correct + usize::from(r.was_correct == Some(true)), total + 1)
            })
    }

    /// Mark a record correct or incorrect. Returns `false` if it is unknown
    /// (never recorded, or already pruned).
    pub fn record_feedback(&self, id: Uuid, was_correct: bool) -> bool {
        match self.lock().iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.was_correct = Some(was_correct);
                true
            }
            None => false,
        }
    }

    /// Drop records decided before `cutoff`. Returns how many were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|r| r.decided_at >= cutoff);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<DecisionRecord> {
        self.lock().clone()
    }

    pub fn restore(&self, records: Vec<DecisionRecord>) {
        *self.lock() = records;
    }
}
