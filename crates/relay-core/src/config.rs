use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RelayError, Result};
use crate::types::{Priority, Severity};

/// Top-level configuration for Relay.
///
/// Loaded from `~/.relay/config.toml` by default. Each section corresponds
/// to one component of the routing core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub targets: TargetConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Where the decision engine's state file lives.
    pub fn persistence_path(&self) -> PathBuf {
        self.general.resolved_data_dir().join(&self.persistence.file)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &str, reason: &str) -> RelayError {
            RelayError::InvalidConfig {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.cache.max_size == 0 {
            return Err(invalid("cache.max_size", "must be greater than zero"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs", "must be greater than zero"));
        }
        if self.batch.max_batch_size == 0 {
            return Err(invalid("batch.max_batch_size", "must be greater than zero"));
        }
        if self.batch.interval_ms == 0 {
            return Err(invalid("batch.interval_ms", "must be greater than zero"));
        }
        let d = &self.decision;
        if d.retained_patterns == 0 || d.retained_patterns > d.max_patterns_per_bucket {
            return Err(invalid(
                "decision.retained_patterns",
                "must be between 1 and max_patterns_per_bucket",
            ));
        }
        for (field, value) in [
            ("decision.pattern_match_threshold", d.pattern_match_threshold),
            ("decision.pattern_use_threshold", d.pattern_use_threshold),
            ("decision.confident_threshold", d.confident_threshold),
            ("decision.rule_confidence", d.rule_confidence),
            ("decision.pattern_creation_threshold", d.pattern_creation_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be within [0, 1]"));
            }
        }
        if d.pattern_use_threshold < d.pattern_match_threshold {
            return Err(invalid(
                "decision.pattern_use_threshold",
                "must not be below pattern_match_threshold",
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for persisted patterns and history.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl GeneralConfig {
    /// `data_dir` with a leading `~` expanded to the home directory.
    pub fn resolved_data_dir(&self) -> PathBuf {
        match self.data_dir.strip_prefix('~') {
            Some(rest) => {
                let home = std::env::var("USERPROFILE")
                    .or_else(|_| std::env::var("HOME"))
                    .unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(rest.trim_start_matches(['/', '\\']))
            }
            None => PathBuf::from(&self.data_dir),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.relay/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Cache store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live for each entry in seconds.
    pub ttl_secs: u64,
    /// Maximum resident entries before FIFO eviction.
    pub max_size: usize,
    /// How often the background sweep removes expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_size: 500,
            sweep_interval_secs: 60,
        }
    }
}

/// Batch scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Flush window in milliseconds.
    pub interval_ms: u64,
    /// Maximum items per flush; reaching it triggers an early flush.
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            max_batch_size: 10,
        }
    }
}

/// Decision automation thresholds and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Minimum similarity for a pattern to be considered a candidate.
    pub pattern_match_threshold: f64,
    /// Minimum similarity for a candidate pattern's result to be reused.
    pub pattern_use_threshold: f64,
    /// Minimum blended confidence for the category strategy to answer.
    pub confident_threshold: f64,
    /// Fixed confidence assigned to static rule answers.
    pub rule_confidence: f64,
    /// Minimum confidence for an outcome to be learned as a pattern.
    pub pattern_creation_threshold: f64,
    /// Bucket size that triggers pruning.
    pub max_patterns_per_bucket: usize,
    /// Patterns kept (highest usage first) after pruning.
    pub retained_patterns: usize,
    /// Decision records older than this are purged.
    pub history_retention_days: u32,
    /// How often the history prune job runs.
    pub prune_interval_secs: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            pattern_match_threshold: 0.7,
            pattern_use_threshold: 0.8,
            confident_threshold: 0.8,
            rule_confidence: 0.9,
            pattern_creation_threshold: 0.8,
            max_patterns_per_bucket: 50,
            retained_patterns: 30,
            history_retention_days: 7,
            prune_interval_secs: 3600,
        }
    }
}

/// Periodic persistence of learned patterns and decision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// File name inside `general.data_dir`.
    pub file: String,
    pub interval_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: "decisions.json".to_string(),
            interval_secs: 30,
        }
    }
}

/// Performance targets checked by `check_target_performance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Minimum share of routed tasks that avoided a dedicated remote call.
    pub savings_percentage: f64,
    /// Minimum share of decisions answered without human approval.
    pub automation_rate: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            savings_percentage: 60.0,
            automation_rate: 70.0,
        }
    }
}

/// A forbidden action and what to do when it is requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForbiddenRule {
    pub severity: Severity,
    pub action: String,
}

/// An action the system should perform without asking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomousRule {
    pub priority: Priority,
    pub action: String,
}

/// Static classification tables. Loaded once; never mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Keyed by action name.
    pub forbidden: BTreeMap<String, ForbiddenRule>,
    /// Keyed by action name.
    pub autonomous: BTreeMap<String, AutonomousRule>,
    /// Categories fully resolvable without the remote path.
    pub local_tasks: Vec<String>,
    /// Categories whose remote results may be reused.
    pub cacheable_tasks: Vec<String>,
    /// Categories that always need the remote path.
    pub api_tasks: Vec<String>,
    /// Task types coalesced by the batch scheduler.
    pub batchable_tasks: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let forbidden = [
            ("delete_production_data", Severity::Critical, "block"),
            ("modify_credentials", Severity::Critical, "block"),
            ("force_push", Severity::High, "block"),
            ("disable_security", Severity::High, "escalate"),
            ("bulk_delete", Severity::Medium, "escalate"),
        ]
        .into_iter()
        .map(|(name, severity, action)| {
            (
                name.to_string(),
                ForbiddenRule {
                    severity,
                    action: action.to_string(),
                },
            )
        })
        .collect();

        let autonomous = [
            ("format_code", Priority::High, "apply"),
            ("fix_lint", Priority::High, "apply"),
            ("update_docs", Priority::Medium, "apply"),
            ("organize_imports", Priority::Medium, "apply"),
            ("clear_cache", Priority::Low, "apply"),
        ]
        .into_iter()
        .map(|(name, priority, action)| {
            (
                name.to_string(),
                AutonomousRule {
                    priority,
                    action: action.to_string(),
                },
            )
        })
        .collect();

        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            forbidden,
            autonomous,
            local_tasks: strings(&[
                "file_operations",
                "data_validation",
                "formatting",
                "calculation",
                "text_processing",
            ]),
            cacheable_tasks: strings(&[
                "product_lookup",
                "price_lookup",
                "settings_read",
                "static_content",
            ]),
            api_tasks: strings(&[
                "order_submission",
                "payment_processing",
                "content_generation",
                "external_sync",
            ]),
            batchable_tasks: strings(&["inventory_check", "analytics_event", "notification"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_persistence_path_expands_home() {
        let mut config = RelayConfig::default();
        config.general.data_dir = "/var/lib/relay".to_string();
        assert_eq!(
            config.persistence_path(),
            PathBuf::from("/var/lib/relay/decisions.json")
        );

        config.general.data_dir = "~/.relay/data".to_string();
        let resolved = config.general.resolved_data_dir();
        assert!(!resolved.to_string_lossy().contains('~'));
        assert!(resolved.ends_with(".relay/data"));
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.max_size, 500);
        assert_eq!(config.batch.max_batch_size, 10);
        assert_eq!(config.decision.max_patterns_per_bucket, 50);
        assert_eq!(config.decision.retained_patterns, 30);
        assert_eq!(config.decision.history_retention_days, 7);
        assert!((config.decision.pattern_match_threshold - 0.7).abs() < f64::EPSILON);
        assert!(config.policy.local_tasks.contains(&"file_operations".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[cache]
ttl_secs = 60
max_size = 10

[batch]
interval_ms = 250
max_batch_size = 4

[policy]
local_tasks = ["resize"]
cacheable_tasks = []
api_tasks = ["charge"]
batchable_tasks = ["ping"]

[policy.forbidden.drop_table]
severity = "critical"
action = "block"
"#;
        let file = create_temp_config(content);
        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.batch.interval_ms, 250);
        assert_eq!(config.policy.local_tasks, vec!["resize".to_string()]);
        assert_eq!(
            config.policy.forbidden.get("drop_table").unwrap().severity,
            Severity::Critical
        );
        // Sections left out keep their defaults.
        assert_eq!(config.decision.retained_patterns, 30);
        assert!(config.policy.autonomous.is_empty());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = create_temp_config("[cache]\nmax_size = 0\n");
        let err = RelayConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfig { .. }));
        assert!(err.to_string().contains("cache.max_size"));
    }

    #[test]
    fn test_validate_threshold_bounds() {
        let mut config = RelayConfig::default();
        config.decision.confident_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.decision.pattern_use_threshold = 0.5;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.decision.retained_patterns = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is not [valid toml");
        let err = RelayConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = RelayConfig::load_or_default(Path::new("/nonexistent/relay.toml"));
        assert_eq!(config.cache.ttl_secs, 300);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = RelayConfig::default();
        config.cache.ttl_secs = 42;
        config.targets.automation_rate = 90.0;
        config.save(&path).unwrap();

        let reloaded = RelayConfig::load(&path).unwrap();
        assert_eq!(reloaded.cache.ttl_secs, 42);
        assert!((reloaded.targets.automation_rate - 90.0).abs() < f64::EPSILON);
        assert_eq!(reloaded.policy.forbidden, config.policy.forbidden);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.persistence.file, "decisions.json");
        assert_eq!(config.policy.batchable_tasks.len(), 3);
    }
}
