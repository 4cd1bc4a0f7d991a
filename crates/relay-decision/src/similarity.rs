//! Context similarity.
//!
//! Two contexts are compared key by key over the union of their keys:
//! equal values score 1, strings score by normalized Levenshtein distance,
//! numbers by relative difference, and anything else scores 0. The result is
//! the mean over the union, so a key present on only one side pulls the
//! score down. Non-object contexts are compared as single values.

use serde_json::{Map, Value};

/// Similarity of two contexts in `[0, 1]`.
pub fn similarity(a: &Value, b: &Value) -> f64 {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => object_similarity(a, b),
        _ => value_similarity(Some(a), Some(b)),
    }
}

fn object_similarity(a: &Map<String, Value>, b: &Map<String, Value>) -> f64 {
    let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
    keys.sort();
    keys.dedup();

    if keys.is_empty() {
        return 1.0;
    }

    let total: f64 = keys
        .iter()
        .map(|k| value_similarity(a.get(*k), b.get(*k)))
        .sum();
    total / keys.len() as f64
}

fn value_similarity(a: Option<&Value>, b: Option<&Value>) -> f64 {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return 0.0,
    };

    if a == b {
        return 1.0;
    }

    match (a, b) {
        (Value::String(x), Value::String(y)) => string_similarity(x, y),
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => number_similarity(x, y),
            _ => 0.0,
        },
        _ => 0.0,
    }
}

/// `1 - lev(a, b) / max(len(a), len(b))`, counted in characters.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// `1 - |a - b| / max(|a|, |b|)`, floored at 0; two zeros are identical.
pub fn number_similarity(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return 1.0;
    }
    (1.0 - (a - b).abs() / scale).max(0.0)
}

/// Character-level edit distance (insert, delete, substitute).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
