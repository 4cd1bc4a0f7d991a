//! Per-category answers for the high-confidence path.
//!
//! When no pattern or rule applies but the blended confidence is high
//! enough, the category's strategy produces the answer. Categories without
//! a strategy always escalate to approval.

use serde_json::Value;

use crate::rules::{is_critical_file, update_type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryStrategy {
    FileOperation,
    CodeChange,
    Dependency,
}

impl CategoryStrategy {
    pub fn for_category(category: &str) -> Option<Self> {
        match category {
            "file_operation" => Some(Self::FileOperation),
            "code_change" => Some(Self::CodeChange),
            "dependency" => Some(Self::Dependency),
            _ => None,
        }
    }

    /// Synthesize an approval answer. Malformed fields count as "unsafe".
    pub fn decide(&self, context: &Value) -> Value {
        let approved = match self {
            Self::FileOperation => match context.get("filePath") {
                Some(Value::String(path)) => !is_critical_file(path),
                None | Some(Value::Null) => true,
                Some(_) => false,
            },
            Self::CodeChange => !matches!(
                context.get("importance").and_then(Value::as_str),
                Some("high" | "critical")
            ),
            Self::Dependency => matches!(update_type(context), Ok(Some("patch" | "minor"))),
        };
        Value::Bool(approved)
    }
}
