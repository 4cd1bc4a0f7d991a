use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// =============================================================================
// Enums
// =============================================================================

/// Where a routed task was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// Resolved by a registered local processor.
    Local,
    /// Served from the cache store.
    Cache,
    /// Resolved as part of a collective batch call (or its per-item fallback).
    Batch,
    /// Resolved by a direct remote call.
    Remote,
}

impl RouteSource {
    /// Whether resolving from this source avoided a dedicated remote call.
    pub fn saves_call(&self) -> bool {
        !matches!(self, RouteSource::Remote)
    }
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSource::Local => write!(f, "local"),
            RouteSource::Cache => write!(f, "cache"),
            RouteSource::Batch => write!(f, "batch"),
            RouteSource::Remote => write!(f, "remote"),
        }
    }
}

/// Which stage of the decision engine produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Pattern,
    Rule,
    Confident,
    /// No automated answer; the decision needs external approval.
    None,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionSource::Pattern => write!(f, "pattern"),
            DecisionSource::Rule => write!(f, "rule"),
            DecisionSource::Confident => write!(f, "confident"),
            DecisionSource::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for DecisionSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pattern" => Ok(DecisionSource::Pattern),
            "rule" => Ok(DecisionSource::Rule),
            "confident" => Ok(DecisionSource::Confident),
            "none" => Ok(DecisionSource::None),
            _ => Err(format!("Unknown decision source: {}", s)),
        }
    }
}

/// How the classifier expects a task category to be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingHint {
    Local,
    Cacheable,
    Remote,
    Unknown,
}

impl fmt::Display for ProcessingHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingHint::Local => write!(f, "local"),
            ProcessingHint::Cacheable => write!(f, "cacheable"),
            ProcessingHint::Remote => write!(f, "remote"),
            ProcessingHint::Unknown => write!(f, "unknown"),
        }
    }
}

/// Qualitative label for how much a routing choice avoids the remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavingsTier {
    High,
    Medium,
    None,
}

impl fmt::Display for SavingsTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SavingsTier::High => write!(f, "high"),
            SavingsTier::Medium => write!(f, "medium"),
            SavingsTier::None => write!(f, "none"),
        }
    }
}

/// Severity attached to a forbidden action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Priority attached to an autonomous-preferred action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

// =============================================================================
// Domain Structs
// =============================================================================

/// A unit of requested work: a type tag plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_type: String,
    pub payload: Value,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: Value) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
        }
    }

    /// Deterministic cache key for this task.
    ///
    /// Two tasks with structurally equal payloads always produce the same key,
    /// regardless of object key insertion order.
    pub fn cache_key(&self) -> String {
        cache_key(&self.task_type, &self.payload)
    }
}

/// Build the cache key for a `(task_type, payload)` pair.
pub fn cache_key(task_type: &str, payload: &Value) -> String {
    let mut key = String::with_capacity(task_type.len() + 32);
    key.push_str(task_type);
    key.push(':');
    write_canonical(payload, &mut key);
    key
}

/// Serialize a JSON value with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Strings serialize infallibly.
                out.push_str(&Value::String((*k).clone()).to_string());
                out.push(':');
                write_canonical(&map[k.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================
