//! Learned decision patterns, bucketed by `(category, action)`.
//!
//! The outer map is only write-locked to create a bucket; every bucket has
//! its own mutex, so work on different buckets never contends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::similarity::similarity;

/// A reusable context -> result association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Uuid,
    pub context: Value,
    pub result: Value,
    pub confidence: f64,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl Pattern {
    pub fn new(context: Value, result: Value, confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            context,
            result,
            confidence,
            usage_count: 0,
            created_at: now,
            last_used_at: now,
        }
    }
}

/// Serialized form of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternBucket {
    pub category: String,
    pub action: String,
    pub patterns: Vec<Pattern>,
}

/// Outcome of matching a context against a bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    /// Highest similarity in the bucket; 0 when the bucket is empty.
    pub best_score: f64,
    /// The pattern whose result is reused, already bumped.
    pub reused: Option<Pattern>,
}

type Bucket = Arc<Mutex<Vec<Pattern>>>;

pub struct PatternStore {
    buckets: RwLock<HashMap<(String, String), Bucket>>,
    max_per_bucket: usize,
    retained: usize,
}

fn lock(bucket: &Bucket) -> MutexGuard<'_, Vec<Pattern>> {
    bucket.lock().unwrap_or_else(|e| e.into_inner())
}

/// Keep the `retained` most-used patterns once `max` is exceeded.
fn enforce_retention(patterns: &mut Vec<Pattern>, max: usize, retained: usize) -> usize {
    if patterns.len() <= max {
        return 0;
    }
    let before = patterns.len();
    patterns.sort_by(|a, b| {
        b.usage_count
            .cmp(&a.usage_count)
            .then(b.last_used_at.cmp(&a.last_used_at))
    });
    patterns.truncate(retained);
    before - patterns.len()
}

impl PatternStore {
    /// `max_per_bucket` triggers pruning down to `retained` entries.
    pub fn new(max_per_bucket: usize, retained: usize) -> Self {
        let max_per_bucket = max_per_bucket.max(1);
        Self {
            buckets: RwLock::new(HashMap::new()),
            max_per_bucket,
            retained: retained.clamp(1, max_per_bucket),
        }
    }

    fn bucket(&self, category: &str, action: &str) -> Option<Bucket> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets
            .get(&(category.to_string(), action.to_string()))
            .cloned()
    }

    fn bucket_or_create(&self, category: &str, action: &str) -> Bucket {
        if let Some(bucket) = self.bucket(category, action) {
            return bucket;
        }
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            buckets
                .entry((category.to_string(), action.to_string()))
                .or_default(),
        )
    }

    /// Find the most similar pattern and reuse it when it clears both
    /// thresholds. A reused pattern has its usage bumped before returning.
    pub fn find(
        &self,
        category: &str,
        action: &str,
        context: &Value,
        match_threshold: f64,
        use_threshold: f64,
    ) -> PatternMatch {
        let Some(bucket) = self.bucket(category, action) else {
            return PatternMatch {
                best_score: 0.0,
                reused: None,
            };
        };
        let mut patterns = lock(&bucket);

        let mut best: Option<(usize, f64)> = None;
        for (i, pattern) in patterns.iter().enumerate() {
            let score = similarity(context, &pattern.context);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((i, score));
            }
        }

        let best_score = best.map(|(_, s)| s).unwrap_or(0.0);
        let reused = match best {
            Some((i, score)) if score > match_threshold && score > use_threshold => {
                let pattern = &mut patterns[i];
                pattern.usage_count += 1;
                pattern.last_used_at = Utc::now();
                Some(pattern.clone())
            }
            _ => None,
        };

        PatternMatch { best_score, reused }
    }

    /// Add a pattern to its bucket. Returns how many patterns were pruned.
    pub fn insert(&self, category: &str, action: &str, pattern: Pattern) -> usize {
        let bucket = self.bucket_or_create(category, action);
        let mut patterns = lock(&bucket);
        patterns.push(pattern);
        enforce_retention(&mut patterns, self.max_per_bucket, self.retained)
    }

    /// Copy of one bucket's patterns.
    pub fn patterns(&self, category: &str, action: &str) -> Vec<Pattern> {
        self.bucket(category, action)
            .map(|b| lock(&b).clone())
            .unwrap_or_default()
    }

    /// Total patterns across all buckets.
    pub fn len(&self) -> usize {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.values().map(|b| lock(b).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `(category, action)` buckets created so far.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every non-empty bucket, sorted by `(category, action)`.
    pub fn snapshot(&self) -> Vec<PatternBucket> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<PatternBucket> = buckets
            .iter()
            .map(|((category, action), bucket)| PatternBucket {
                category: category.clone(),
                action: action.clone(),
                patterns: lock(bucket).clone(),
            })
            .filter(|b| !b.patterns.is_empty())
            .collect();
        out.sort_by(|a, b| (&a.category, &a.action).cmp(&(&b.category, &b.action)));
        out
    }

    /// Replace all buckets. Oversized buckets are pruned on the way in.
    pub fn restore(&self, snapshot: Vec<PatternBucket>) {
        let mut restored = HashMap::with_capacity(snapshot.len());
        for mut bucket in snapshot {
            enforce_retention(&mut bucket.patterns, self.max_per_bucket, self.retained);
            restored.insert(
                (bucket.category, bucket.action),
                Arc::new(Mutex::new(bucket.patterns)),
            );
        }
        *self.buckets.write().unwrap_or_else(|e| e.into_inner()) = restored;
    }
}
