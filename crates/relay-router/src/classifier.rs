//! Static classification of `(category, action)` pairs.
//!
//! The classifier is a pure lookup over the policy tables supplied at
//! construction. It never mutates and never performs I/O.

use std::collections::{BTreeMap, HashSet};

use relay_core::config::{AutonomousRule, ForbiddenRule, PolicyConfig};
use relay_core::types::{Priority, ProcessingHint, SavingsTier, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of classifying a `(category, action)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub allowed: bool,
    /// Set when the action matched the forbidden table.
    pub severity: Option<Severity>,
    /// Set when the action matched the autonomous table.
    pub priority: Option<Priority>,
    /// What the policy says to do for a forbidden or autonomous match.
    pub action_to_take: Option<String>,
    pub processing_hint: ProcessingHint,
    pub reason: String,
}

/// Yes/no routing advice derived from a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRecommendation {
    pub use_remote: bool,
    pub check_cache: bool,
    pub savings_tier: SavingsTier,
    pub allowed: bool,
    pub reason: String,
}

/// Lookup over the forbidden/autonomous maps and the category sets.
#[derive(Debug, Clone)]
pub struct Classifier {
    forbidden: BTreeMap<String, ForbiddenRule>,
    autonomous: BTreeMap<String, AutonomousRule>,
    local_tasks: HashSet<String>,
    cacheable_tasks: HashSet<String>,
    api_tasks: HashSet<String>,
}

impl Classifier {
    pub fn new(policy: &PolicyConfig) -> Self {
        let set = |items: &[String]| items.iter().cloned().collect::<HashSet<_>>();
        Self {
            forbidden: policy.forbidden.clone(),
            autonomous: policy.autonomous.clone(),
            local_tasks: set(&policy.local_tasks),
            cacheable_tasks: set(&policy.cacheable_tasks),
            api_tasks: set(&policy.api_tasks),
        }
    }

    /// Classify a `(category, action)` pair.
    ///
    /// Lookup order: forbidden actions, autonomous actions, then category
    /// membership in the local, cacheable and api sets. Anything else is
    /// allowed with an unknown processing hint.
    pub fn classify(&self, category: &str, action: &str) -> Classification {
        if let Some(rule) = self.forbidden.get(action) {
            return Classification {
                allowed: false,
                severity: Some(rule.severity),
                priority: None,
                action_to_take: Some(rule.action.clone()),
                processing_hint: ProcessingHint::Unknown,
                reason: format!("action '{}' is forbidden", action),
            };
        }

        if let Some(rule) = self.autonomous.get(action) {
            return Classification {
                allowed: true,
                severity: None,
                priority: Some(rule.priority),
                action_to_take: Some(rule.action.clone()),
                processing_hint: ProcessingHint::Local,
                reason: format!("action '{}' is handled autonomously", action),
            };
        }

        let (hint, reason) = if self.local_tasks.contains(category) {
            (ProcessingHint::Local, "category is processed locally")
        } else if self.cacheable_tasks.contains(category) {
            (ProcessingHint::Cacheable, "category results are cacheable")
        } else if self.api_tasks.contains(category) {
            (ProcessingHint::Remote, "category requires the remote path")
        } else {
            (ProcessingHint::Unknown, "category is not classified")
        };

        Classification {
            allowed: true,
            severity: None,
            priority: None,
            action_to_take: None,
            processing_hint: hint,
            reason: reason.to_string(),
        }
    }

    /// Recommend whether a task type should go to the remote path.
    ///
    /// The action is read from `context["action"]` when present. Unknown
    /// categories, forbidden ones included, are biased toward non-remote
    /// resolution at the medium tier; `allowed` carries the refusal.
    pub fn recommend_routing(&self, task_type: &str, context: &Value) -> RoutingRecommendation {
        let action = context.get("action").and_then(Value::as_str).unwrap_or("");
        let classification = self.classify(task_type, action);

        let (use_remote, check_cache, savings_tier, reason) = match classification.processing_hint
        {
            ProcessingHint::Local => (false, false, SavingsTier::High, "resolve locally"),
            ProcessingHint::Cacheable => (false, true, SavingsTier::Medium, "check cache first"),
            ProcessingHint::Remote => (true, false, SavingsTier::None, "remote call required"),
            ProcessingHint::Unknown => (
                false,
                false,
                SavingsTier::Medium,
                "unclassified; prefer non-remote resolution",
            ),
        };

        RoutingRecommendation {
            use_remote,
            check_cache,
            savings_tier,
            allowed: classification.allowed,
            reason: if classification.allowed {
                reason.to_string()
            } else {
                classification.reason
            },
        }
    }
}
