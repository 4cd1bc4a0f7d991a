//! Decision automation engine.
//!
//! A decision is answered by the first stage that can:
//!
//! 1. a learned pattern similar enough to the context,
//! 2. a static rule for the `(category, action)` pair,
//! 3. the category strategy, when blended confidence is high enough,
//!
//! and is otherwise escalated for approval. Every decision is logged, and
//! confident non-pattern answers are learned as new patterns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use relay_core::config::DecisionConfig;
use relay_core::types::DecisionSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::confidence::{context_score, history_score, ConfidenceInputs};
use crate::error::PersistenceError;
use crate::history::{DecisionHistory, DecisionRecord};
use crate::patterns::{Pattern, PatternBucket, PatternStore};
use crate::persistence::PersistencePort;
use crate::rules::DecisionRule;
use crate::strategy::CategoryStrategy;

const SNAPSHOT_VERSION: u32 = 1;

/// The answer to one decision request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Id of the history record, for later feedback.
    pub record_id: Uuid,
    /// `None` when the decision was escalated.
    pub result: Option<Value>,
    pub requires_approval: bool,
    pub confidence: f64,
    pub source: DecisionSource,
    pub processing_duration_ms: u64,
}

impl Decision {
    pub fn is_automated(&self) -> bool {
        self.source != DecisionSource::None
    }
}

/// Decision counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStats {
    pub total_decisions: u64,
    pub automated_decisions: u64,
    pub from_pattern: u64,
    pub from_rule: u64,
    pub from_confident: u64,
    pub escalated: u64,
    pub pattern_count: usize,
    /// Distinct `(category, action)` pairs with learned patterns.
    #[serde(default)]
    pub pattern_buckets: usize,
    pub history_len: usize,
}

impl DecisionStats {
    /// Share of decisions answered without approval, in percent.
    pub fn automation_rate(&self) -> f64 {
        if self.total_decisions == 0 {
            0.0
        } else {
            self.automated_decisions as f64 / self.total_decisions as f64 * 100.0
        }
    }
}

/// Everything the engine has learned, in a persistable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub patterns: Vec<PatternBucket>,
    pub history: Vec<DecisionRecord>,
    pub stats: DecisionStats,
}

#[derive(Default)]
struct SourceCounters {
    pattern: AtomicU64,
    rule: AtomicU64,
    confident: AtomicU64,
    escalated: AtomicU64,
}

impl SourceCounters {
    fn counter(&self, source: DecisionSource) -> &AtomicU64 {
        match source {
            DecisionSource::Pattern => &self.pattern,
            DecisionSource::Rule => &self.rule,
            DecisionSource::Confident => &self.confident,
            DecisionSource::None => &self.escalated,
        }
    }
}

pub struct DecisionEngine {
    config: DecisionConfig,
    patterns: PatternStore,
    history: DecisionHistory,
    counters: SourceCounters,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        let patterns = PatternStore::new(config.max_patterns_per_bucket, config.retained_patterns);
        Self {
            config,
            patterns,
            history: DecisionHistory::new(),
            counters: SourceCounters::default(),
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Answer a `(category, action)` question for `context`.
    pub fn decide(&self, category: &str, action: &str, context: &Value) -> Decision {
        let started = Instant::now();
        let cfg = &self.config;

        let matched = self.patterns.find(
            category,
            action,
            context,
            cfg.pattern_match_threshold,
            cfg.pattern_use_threshold,
        );

        let (result, confidence, source) = if let Some(pattern) = matched.reused {
            (Some(pattern.result), pattern.confidence, DecisionSource::Pattern)
        } else if let Some(answer) = self.apply_rule(category, action, context) {
            (Some(answer), cfg.rule_confidence, DecisionSource::Rule)
        } else {
            let (correct, total) = self.history.bucket_stats(category, action);
            let confidence = ConfidenceInputs {
                history: history_score(correct, total),
                context: context_score(context),
                pattern: matched.best_score,
            }
            .score();
            match CategoryStrategy::for_category(category) {
                Some(strategy) if confidence > cfg.confident_threshold => (
                    Some(strategy.decide(context)),
                    confidence,
                    DecisionSource::Confident,
                ),
                _ => (None, confidence, DecisionSource::None),
            }
        };

        let processing_duration_ms = started.elapsed().as_millis() as u64;
        let record_id = Uuid::new_v4();

        let learnable = source != DecisionSource::Pattern
            && confidence > cfg.pattern_creation_threshold
            && result.as_ref().map(|v| !v.is_null()).unwrap_or(false);
        if learnable {
            if let Some(value) = &result {
                let pruned = self.patterns.insert(
                    category,
                    action,
                    Pattern::new(context.clone(), value.clone(), confidence),
                );
                if pruned > 0 {
                    debug!(category, action, pruned, "Pattern bucket pruned");
                }
            }
        }

        self.history.append(DecisionRecord {
            id: record_id,
            category: category.to_string(),
            action: action.to_string(),
            context: context.clone(),
            result: result.clone(),
            confidence,
            source,
            decided_at: Utc::now(),
            processing_duration_ms,
            was_correct: None,
        });
        self.counters.counter(source).fetch_add(1, Ordering::Relaxed);

        debug!(
            category,
            action,
            source = %source,
            confidence,
            "Decision made"
        );

        Decision {
            record_id,
            requires_approval: result.is_none(),
            result,
            confidence,
            source,
            processing_duration_ms,
        }
    }

    /// Evaluate the static rule, treating errors and null answers as a
    /// decline.
    fn apply_rule(&self, category: &str, action: &str, context: &Value) -> Option<Value> {
        let rule = DecisionRule::resolve(category, action)?;
        match rule.evaluate(context) {
            Ok(Some(value)) if !value.is_null() => Some(value),
            Ok(_) => None,
            Err(e) => {
                debug!(category, action, error = %e, "Decision rule declined");
                None
            }
        }
    }

    /// Mark a past decision correct or incorrect. Returns `false` when the
    /// record is unknown.
    pub fn record_feedback(&self, record_id: Uuid, was_correct: bool) -> bool {
        self.history.record_feedback(record_id, was_correct)
    }

    /// Purge history older than the retention window, relative to `now`.
    pub fn prune_history(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(i64::from(self.config.history_retention_days));
        self.history.prune_before(cutoff)
    }

    pub fn patterns(&self, category: &str, action: &str) -> Vec<Pattern> {
        self.patterns.patterns(category, action)
    }

    pub fn history(&self) -> &DecisionHistory {
        &self.history
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn stats(&self) -> DecisionStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let from_pattern = load(&self.counters.pattern);
        let from_rule = load(&self.counters.rule);
        let from_confident = load(&self.counters.confident);
        let escalated = load(&self.counters.escalated);
        let automated_decisions = from_pattern + from_rule + from_confident;
        DecisionStats {
            total_decisions: automated_decisions + escalated,
            automated_decisions,
            from_pattern,
            from_rule,
            from_confident,
            escalated,
            pattern_count: self.patterns.len(),
            pattern_buckets: self.patterns.bucket_count(),
            history_len: self.history.len(),
        }
    }

    pub fn snapshot(&self) -> DecisionSnapshot {
        DecisionSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            patterns: self.patterns.snapshot(),
            history: self.history.snapshot(),
            stats: self.stats(),
        }
    }

    /// Replace learned state and counters with a snapshot.
    pub fn restore(&self, snapshot: DecisionSnapshot) {
        self.patterns.restore(snapshot.patterns);
        self.history.restore(snapshot.history);
        let stats = snapshot.stats;
        self.counters.pattern.store(stats.from_pattern, Ordering::Relaxed);
        self.counters.rule.store(stats.from_rule, Ordering::Relaxed);
        self.counters.confident.store(stats.from_confident, Ordering::Relaxed);
        self.counters.escalated.store(stats.escalated, Ordering::Relaxed);
    }

    /// Serialize the current snapshot and hand it to the port.
    pub async fn save_to(&self, port: &dyn PersistencePort) -> Result<(), PersistenceError> {
        let blob = serde_json::to_vec(&self.snapshot())?;
        port.save(blob).await
    }

    /// Restore from the port. Returns `false` when nothing was stored.
    pub async fn load_from(&self, port: &dyn PersistencePort) -> Result<bool, PersistenceError> {
        let Some(blob) = port.load().await? else {
            return Ok(false);
        };
        let snapshot: DecisionSnapshot = serde_json::from_slice(&blob)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::Backend(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        info!(
            patterns = snapshot.patterns.len(),
            history = snapshot.history.len(),
            "Restored decision state"
        );
        self.restore(snapshot);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;
    use serde_json::json;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DecisionConfig::default())
    }

    #[test]
    fn test_env_file_delete_is_refused_by_rule() {
        let d = engine().decide(
            "file_operation",
            "canDelete",
            &json!({"filePath": "/src/.env", "dependencies": []}),
        );
        assert_eq!(d.result, Some(json!(false)));
        assert_eq!(d.source, DecisionSource::Rule);
        assert!(!d.requires_approval);
        assert!((d.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_second_identical_context_reuses_pattern() {
        let engine = engine();
        let ctx = json!({"filePath": "a.txt", "changeType": "format"});

        let first = engine.decide("file_operation", "canModify", &ctx);
        assert_eq!(first.source, DecisionSource::Rule);
        assert_eq!(engine.patterns("file_operation", "canModify").len(), 1);

        let second = engine.decide("file_operation", "canModify", &ctx);
        assert_eq!(second.source, DecisionSource::Pattern);
        assert_eq!(second.result, first.result);

        // Reuse bumps usage but never creates a new pattern.
        let patterns = engine.patterns("file_operation", "canModify");
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].usage_count, 1);
        assert_eq!(engine.history_len(), 2);
    }

    #[test]
    fn test_unknown_category_escalates() {
        let engine = engine();
        let d = engine.decide("deploy", "canRollback", &json!({"filePath": "x", "changeType": "y"}));
        assert_eq!(d.result, None);
        assert!(d.requires_approval);
        assert_eq!(d.source, DecisionSource::None);
        // 0.5 + 0.2 * (2/3)
        assert!((d.confidence - (0.5 + 0.2 * 2.0 / 3.0)).abs() < 1e-9);
        assert!(engine.patterns("deploy", "canRollback").is_empty());
    }

    #[test]
    fn test_rule_error_falls_through() {
        let engine = engine();
        let d = engine.decide("file_operation", "canDelete", &json!({}));
        assert_eq!(d.source, DecisionSource::None);
        assert!(d.requires_approval);
    }

    #[test]
    fn test_confident_strategy_after_positive_feedback() {
        let engine = engine();
        let ctx = json!({"filePath": "src/a.rs", "changeType": "refactor", "importance": "low"});

        // Rule declines "refactor", confidence 0.5 + 0.2 = 0.7: escalated.
        let first = engine.decide("code_change", "autoApprove", &ctx);
        assert_eq!(first.source, DecisionSource::None);
        assert!(engine.record_feedback(first.record_id, true));

        // History now 1/1, context 1, similarity to nothing 0: 1.0 > 0.8.
        let second = engine.decide(
            "code_change",
            "autoApprove",
            &json!({"filePath": "src/b.rs", "changeType": "rename", "importance": "low"}),
        );
        assert_eq!(second.source, DecisionSource::Confident);
        assert_eq!(second.result, Some(json!(true)));
        assert_eq!(engine.patterns("code_change", "autoApprove").len(), 1);
    }

    #[test]
    fn test_stats_and_automation_rate() {
        let engine = engine();
        engine.decide("dependency", "canUpdate", &json!({"updateType": "patch"}));
        engine.decide("dependency", "canUpdate", &json!({"updateType": "minor"}));
        let stats = engine.stats();
        assert_eq!(stats.total_decisions, 2);
        assert_eq!(stats.automated_decisions, 1);
        assert_eq!(stats.from_rule, 1);
        assert_eq!(stats.escalated, 1);
        assert_eq!(stats.pattern_count, 1);
        assert_eq!(stats.pattern_buckets, 1);
        assert!((stats.automation_rate() - 50.0).abs() < 1e-9);
        assert_eq!(DecisionStats::default().automation_rate(), 0.0);
    }

    #[test]
    fn test_prune_history() {
        let engine = engine();
        engine.decide("deploy", "x", &json!({}));
        assert_eq!(engine.prune_history(Utc::now()), 0);
        assert_eq!(engine.prune_history(Utc::now() + Duration::days(8)), 1);
        assert_eq!(engine.history_len(), 0);
    }

    #[tokio::test]
    async fn test_save_and_load_through_port() {
        let port = MemoryPersistence::new();
        let source = engine();
        assert!(!source.load_from(&port).await.unwrap());

        source.decide("file_operation", "canModify", &json!({"filePath": "a.txt", "changeType": "format"}));
        source.save_to(&port).await.unwrap();

        let restored = engine();
        assert!(restored.load_from(&port).await.unwrap());
        assert_eq!(restored.history_len(), 1);
        assert_eq!(restored.stats().from_rule, 1);
        let d = restored.decide(
            "file_operation",
            "canModify",
            &json!({"filePath": "a.txt", "changeType": "format"}),
        );
        assert_eq!(d.source, DecisionSource::Pattern);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let port = MemoryPersistence::new();
        port.save(b"not json".to_vec()).await.unwrap();
        let engine = engine();
        assert!(matches!(
            engine.load_from(&port).await,
            Err(PersistenceError::Encoding(_))
        ));
        assert_eq!(engine.history_len(), 0);
    }
}
