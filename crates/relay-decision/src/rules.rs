//! Static decision rules.
//!
//! Each rule answers one `(category, action)` question from the decision
//! context, or declines by returning `Ok(None)`.

use std::path::Path;

use serde_json::Value;

use crate::error::RuleError;

/// Exact file names that must never be deleted or rewritten automatically.
const CRITICAL_FILE_NAMES: &[&str] = &[
    "Cargo.toml",
    "Cargo.lock",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.sum",
    "id_rsa",
    "id_ed25519",
];

const CRITICAL_EXTENSIONS: &[&str] = &["lock", "pem", "key", "crt", "cer", "p12", "pfx"];

const DISPOSABLE_EXTENSIONS: &[&str] = &["tmp", "temp", "log", "cache", "bak", "swp"];

const DISPOSABLE_DIRS: &[&str] = &["tmp", "temp", "cache", ".cache", "logs"];

/// Whether `path` names an environment file, manifest, lock file, VCS
/// internals, or key material.
pub fn is_critical_file(path: &str) -> bool {
    let p = Path::new(path);
    let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.starts_with(".env") || CRITICAL_FILE_NAMES.contains(&name) {
        return true;
    }
    if p.components().any(|c| c.as_os_str() == ".git") {
        return true;
    }
    p.extension()
        .and_then(|e| e.to_str())
        .map(|e| CRITICAL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether `path` looks like a temporary, log, or cache artifact.
pub fn is_disposable_file(path: &str) -> bool {
    let p = Path::new(path);
    let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.ends_with('~') {
        return true;
    }
    let ext_match = p
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| DISPOSABLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if ext_match {
        return true;
    }
    p.parent()
        .map(|dir| {
            dir.components().any(|c| {
                c.as_os_str()
                    .to_str()
                    .map(|s| DISPOSABLE_DIRS.contains(&s))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

fn optional_str<'a>(
    context: &'a Value,
    field: &'static str,
) -> Result<Option<&'a str>, RuleError> {
    match context.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(RuleError::InvalidField {
            field,
            reason: format!("expected a string, got {}", other),
        }),
    }
}

fn required_str<'a>(context: &'a Value, field: &'static str) -> Result<&'a str, RuleError> {
    optional_str(context, field)?.ok_or(RuleError::MissingField(field))
}

/// The code-defined rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionRule {
    /// `file_operation / canDelete`
    FileCanDelete,
    /// `file_operation / canModify`
    FileCanModify,
    /// `code_change / autoApprove`
    CodeAutoApprove,
    /// `dependency / canUpdate`
    DependencyCanUpdate,
}

impl DecisionRule {
    /// Look up the rule for a `(category, action)` pair.
    pub fn resolve(category: &str, action: &str) -> Option<Self> {
        match (category, action) {
            ("file_operation", "canDelete") => Some(Self::FileCanDelete),
            ("file_operation", "canModify") => Some(Self::FileCanModify),
            ("code_change", "autoApprove") => Some(Self::CodeAutoApprove),
            ("dependency", "canUpdate") => Some(Self::DependencyCanUpdate),
            _ => None,
        }
    }

    /// Evaluate the rule. `Ok(None)` means the rule has no opinion.
    pub fn evaluate(&self, context: &Value) -> Result<Option<Value>, RuleError> {
        match self {
            Self::FileCanDelete => {
                let path = required_str(context, "filePath")?;
                if is_critical_file(path) {
                    return Ok(Some(Value::Bool(false)));
                }
                match context.get("dependencies") {
                    None | Some(Value::Null) => {}
                    Some(Value::Array(deps)) if deps.is_empty() => {}
                    Some(Value::Array(_)) => return Ok(Some(Value::Bool(false))),
                    Some(_) => {
                        return Err(RuleError::InvalidField {
                            field: "dependencies",
                            reason: "expected an array".to_string(),
                        })
                    }
                }
                if is_disposable_file(path) {
                    return Ok(Some(Value::Bool(true)));
                }
                Ok(None)
            }
            Self::FileCanModify => {
                if let Some(path) = optional_str(context, "filePath")? {
                    if is_critical_file(path) {
                        return Ok(Some(Value::Bool(false)));
                    }
                }
                match optional_str(context, "changeType")? {
                    Some("format" | "whitespace" | "comment") => Ok(Some(Value::Bool(true))),
                    _ => Ok(None),
                }
            }
            Self::CodeAutoApprove => {
                if let Some("high" | "critical") = optional_str(context, "importance")? {
                    return Ok(Some(Value::Bool(false)));
                }
                match optional_str(context, "changeType")? {
                    Some("format" | "lint" | "typo" | "comment") => Ok(Some(Value::Bool(true))),
                    _ => Ok(None),
                }
            }
            Self::DependencyCanUpdate => match update_type(context)? {
                Some("patch") => Ok(Some(Value::Bool(true))),
                Some("major") => Ok(Some(Value::Bool(false))),
                _ => Ok(None),
            },
        }
    }
}

/// `updateType`, falling back to `changeType`.
pub(crate) fn update_type(context: &Value) -> Result<Option<&str>, RuleError> {
    match optional_str(context, "updateType")? {
        Some(t) => Ok(Some(t)),
        None => optional_str(context, "changeType"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(category: &str, action: &str, ctx: Value) -> Result<Option<Value>, RuleError> {
        DecisionRule::resolve(category, action)
            .expect("rule should exist")
            .evaluate(&ctx)
    }

    #[test]
    fn test_critical_files() {
        for path in [
            "/src/.env",
            ".env.production",
            "Cargo.toml",
            "web/package.json",
            "poetry.lock",
            "repo/.git/config",
            "certs/server.PEM",
        ] {
            assert!(is_critical_file(path), "{} should be critical", path);
        }
        assert!(!is_critical_file("src/main.rs"));
        assert!(!is_critical_file("docs/environment.md"));
    }

    #[test]
    fn test_disposable_files() {
        assert!(is_disposable_file("build/output.log"));
        assert!(is_disposable_file("/tmp/upload-123"));
        assert!(is_disposable_file("notes.txt~"));
        assert!(!is_disposable_file("src/tmp.rs"));
    }

    #[test]
    fn test_can_delete_env_file_is_refused() {
        let out = eval(
            "file_operation",
            "canDelete",
            json!({"filePath": "/src/.env", "dependencies": []}),
        )
        .unwrap();
        assert_eq!(out, Some(json!(false)));
    }

    #[test]
    fn test_can_delete_with_dependents_is_refused() {
        let out = eval(
            "file_operation",
            "canDelete",
            json!({"filePath": "cache/blob.tmp", "dependencies": ["src/a.rs"]}),
        )
        .unwrap();
        assert_eq!(out, Some(json!(false)));
    }

    #[test]
    fn test_can_delete_disposable_and_unknown() {
        let out = eval("file_operation", "canDelete", json!({"filePath": "app.log"})).unwrap();
        assert_eq!(out, Some(json!(true)));
        let out = eval("file_operation", "canDelete", json!({"filePath": "src/lib.rs"})).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn test_can_delete_requires_path() {
        let err = eval("file_operation", "canDelete", json!({})).unwrap_err();
        assert_eq!(err, RuleError::MissingField("filePath"));
        let err = eval("file_operation", "canDelete", json!({"filePath": 3})).unwrap_err();
        assert!(matches!(err, RuleError::InvalidField { field: "filePath", .. }));
    }

    #[test]
    fn test_can_modify() {
        let ok = eval(
            "file_operation",
            "canModify",
            json!({"filePath": "a.txt", "changeType": "format"}),
        )
        .unwrap();
        assert_eq!(ok, Some(json!(true)));
        let refused = eval(
            "file_operation",
            "canModify",
            json!({"filePath": "Cargo.lock", "changeType": "format"}),
        )
        .unwrap();
        assert_eq!(refused, Some(json!(false)));
        let declined = eval(
            "file_operation",
            "canModify",
            json!({"filePath": "a.txt", "changeType": "refactor"}),
        )
        .unwrap();
        assert_eq!(declined, None);
    }

    #[test]
    fn test_code_auto_approve() {
        let out = eval(
            "code_change",
            "autoApprove",
            json!({"changeType": "lint", "importance": "critical"}),
        )
        .unwrap();
        assert_eq!(out, Some(json!(false)));
        let out = eval("code_change", "autoApprove", json!({"changeType": "typo"})).unwrap();
        assert_eq!(out, Some(json!(true)));
        let out = eval("code_change", "autoApprove", json!({"changeType": "feature"})).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn test_dependency_can_update() {
        let out = eval("dependency", "canUpdate", json!({"updateType": "patch"})).unwrap();
        assert_eq!(out, Some(json!(true)));
        let out = eval("dependency", "canUpdate", json!({"changeType": "major"})).unwrap();
        assert_eq!(out, Some(json!(false)));
        let out = eval("dependency", "canUpdate", json!({"updateType": "minor"})).unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn test_unknown_pair_has_no_rule() {
        assert_eq!(DecisionRule::resolve("deploy", "canRollback"), None);
        assert_eq!(DecisionRule::resolve("file_operation", "canRename"), None);
    }
}
