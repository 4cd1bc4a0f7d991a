//! Blended confidence for heuristic decisions.

use serde_json::Value;

/// Context fields whose presence makes a decision better informed.
pub const EXPECTED_CONTEXT_FIELDS: [&str; 3] = ["filePath", "changeType", "importance"];

const BASE: f64 = 0.5;
const HISTORY_WEIGHT: f64 = 0.3;
const CONTEXT_WEIGHT: f64 = 0.2;
const PATTERN_WEIGHT: f64 = 0.3;

/// The three factors feeding [`ConfidenceInputs::score`], each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfidenceInputs {
    /// Share of past decisions in the bucket confirmed correct.
    pub history: f64,
    /// Share of [`EXPECTED_CONTEXT_FIELDS`] present in the context.
    pub context: f64,
    /// Best similarity against the bucket's patterns.
    pub pattern: f64,
}

impl ConfidenceInputs {
    /// `min(1, 0.5 + 0.3 * history + 0.2 * context + 0.3 * pattern)`.
    ///
    /// Inputs are clamped to `[0, 1]` first.
    pub fn score(&self) -> f64 {
        let clamp = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        (BASE
            + HISTORY_WEIGHT * clamp(self.history)
            + CONTEXT_WEIGHT * clamp(self.context)
            + PATTERN_WEIGHT * clamp(self.pattern))
        .min(1.0)
    }
}

/// `correct / total`, or 0 for an empty bucket.
pub fn history_score(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// Share of [`EXPECTED_CONTEXT_FIELDS`] present (non-null) in `context`.
pub fn context_score(context: &Value) -> f64 {
    let present = EXPECTED_CONTEXT_FIELDS
        .iter()
        .filter(|f| context.get(**f).map(|v| !v.is_null()).unwrap_or(false))
        .count();
    present as f64 / EXPECTED_CONTEXT_FIELDS.len() as f64
}
