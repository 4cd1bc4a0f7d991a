//! Metrics snapshot and performance-target check.

use chrono::{DateTime, Utc};
use relay_core::config::TargetConfig;
use relay_decision::DecisionStats;
use relay_router::RoutingMetrics;
use serde::{Deserialize, Serialize};

/// Point-in-time view of routing and decision counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub locally_processed: u64,
    pub cached_requests: u64,
    pub batched_requests: u64,
    pub api_calls_saved: u64,
    pub remote_calls: u64,
    /// `api_calls_saved / total_requests * 100`, 0 when idle.
    pub savings_percentage: f64,
    pub total_decisions: u64,
    pub automated_decisions: u64,
    /// `automated_decisions / total_decisions * 100`, 0 when idle.
    pub automation_rate: f64,
    pub started_at: DateTime<Utc>,
    pub runtime_ms: u64,
}

impl MetricsSnapshot {
    pub fn capture(routing: &RoutingMetrics, decisions: &DecisionStats) -> Self {
        let counters = routing.counters();
        Self {
            total_requests: counters.total_requests,
            locally_processed: counters.locally_processed,
            cached_requests: counters.cached_requests,
            batched_requests: counters.batched_requests,
            api_calls_saved: counters.api_calls_saved,
            remote_calls: counters.remote_calls,
            savings_percentage: counters.savings_percentage(),
            total_decisions: decisions.total_decisions,
            automated_decisions: decisions.automated_decisions,
            automation_rate: decisions.automation_rate(),
            started_at: routing.started_at(),
            runtime_ms: routing.runtime_ms(),
        }
    }
}

/// Whether the configured targets are met, and what to change if not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub met: bool,
    pub savings_percentage: f64,
    pub savings_target: f64,
    pub automation_rate: f64,
    pub automation_target: f64,
    pub recommendations: Vec<String>,
}

impl PerformanceReport {
    pub fn evaluate(snapshot: &MetricsSnapshot, targets: &TargetConfig) -> Self {
        let savings_ok = snapshot.savings_percentage >= targets.savings_percentage;
        let automation_ok = snapshot.automation_rate >= targets.automation_rate;
        let mut recommendations = Vec::new();

        if !savings_ok {
            recommendations.push(format!(
                "Call savings at {:.1}% (target {:.1}%)",
                snapshot.savings_percentage, targets.savings_percentage
            ));
            if snapshot.locally_processed == 0 {
                recommendations.push(
                    "Register local processors for frequent task types to skip the remote path"
                        .to_string(),
                );
            }
            if snapshot.cached_requests * 5 < snapshot.total_requests {
                recommendations.push(
                    "Increase cache.ttl_secs or cache.max_size to raise the cache hit rate"
                        .to_string(),
                );
            }
            if snapshot.batched_requests == 0 {
                recommendations.push(
                    "Add high-volume task types to policy.batchable_tasks to coalesce remote calls"
                        .to_string(),
                );
            }
        }

        if !automation_ok {
            recommendations.push(format!(
                "Decision automation at {:.1}% (target {:.1}%)",
                snapshot.automation_rate, targets.automation_rate
            ));
            recommendations.push(
                "Add decision rules for frequently escalated (category, action) pairs".to_string(),
            );
            recommendations.push(
                "Record feedback on past decisions so history-based confidence can grow"
                    .to_string(),
            );
        }

        Self {
            met: savings_ok && automation_ok,
            savings_percentage: snapshot.savings_percentage,
            savings_target: targets.savings_percentage,
            automation_rate: snapshot.automation_rate,
            automation_target: targets.automation_rate,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(savings: f64, automation: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: 100,
            locally_processed: 40,
            cached_requests: 30,
            batched_requests: 10,
            api_calls_saved: savings as u64,
            remote_calls: 20,
            savings_percentage: savings,
            total_decisions: 10,
            automated_decisions: (automation / 10.0) as u64,
            automation_rate: automation,
            started_at: Utc::now(),
            runtime_ms: 1_000,
        }
    }

    #[test]
    fn test_targets_met_at_boundary() {
        let report = PerformanceReport::evaluate(&snapshot(60.0, 70.0), &TargetConfig::default());
        assert!(report.met);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_savings_shortfall_names_levers() {
        let mut snap = snapshot(40.0, 90.0);
        snap.locally_processed = 0;
        snap.batched_requests = 0;
        let report = PerformanceReport::evaluate(&snap, &TargetConfig::default());
        assert!(!report.met);
        let text = report.recommendations.join("\n");
        assert!(text.contains("local processors"));
        assert!(text.contains("batchable_tasks"));
        assert!(!text.contains("decision rules"));
    }

    #[test]
    fn test_automation_shortfall() {
        let report = PerformanceReport::evaluate(&snapshot(80.0, 50.0), &TargetConfig::default());
        assert!(!report.met);
        assert!(report.recommendations.iter().any(|r| r.contains("decision rules")));
        assert!(report.recommendations.iter().any(|r| r.contains("feedback")));
    }

    #[test]
    fn test_snapshot_uses_camel_case() {
        let json = serde_json::to_value(snapshot(60.0, 70.0)).unwrap();
        assert!(json.get("apiCallsSaved").is_some());
        assert!(json.get("savingsPercentage").is_some());
        assert!(json.get("runtimeMs").is_some());
    }

    #[test]
    fn test_capture_from_counters() {
        let routing = RoutingMetrics::new();
        routing.record_request();
        routing.record_resolution(relay_core::types::RouteSource::Cache);
        let stats = DecisionStats {
            total_decisions: 4,
            automated_decisions: 3,
            ..DecisionStats::default()
        };
        let snap = MetricsSnapshot::capture(&routing, &stats);
        assert_eq!(snap.cached_requests, 1);
        assert_eq!(snap.savings_percentage, 100.0);
        assert_eq!(snap.automation_rate, 75.0);
    }
}
