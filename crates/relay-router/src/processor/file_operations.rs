//! Path inspection without touching the filesystem.

use std::path::{Component, Path, PathBuf};

use serde_json::{json, Value};

use super::{operation, required_str, LocalProcessor};
use crate::error::LocalProcessingError;

/// Handles `file_operations` tasks: `extension`, `file_name`, `parent`,
/// `normalize`, `info`.
pub struct FileOperationsProcessor;

impl LocalProcessor for FileOperationsProcessor {
    fn task_type(&self) -> &str {
        "file_operations"
    }

    fn process(&self, payload: &Value) -> Result<Value, LocalProcessingError> {
        let op = operation(payload)?;
        let raw = required_str(payload, "path")?;
        if raw.is_empty() {
            return Err(LocalProcessingError::InvalidPayload(
                "path must not be empty".to_string(),
            ));
        }
        let path = Path::new(raw);

        match op {
            "extension" => Ok(json!(path.extension().and_then(|e| e.to_str()))),
            "file_name" => Ok(json!(path.file_name().and_then(|n| n.to_str()))),
            "parent" => Ok(json!(path
                .parent()
                .map(|p| p.to_string_lossy().into_owned()))),
            "normalize" => Ok(json!(normalize(path).to_string_lossy())),
            "info" => Ok(json!({
                "path": raw,
                "file_name": path.file_name().and_then(|n| n.to_str()),
                "extension": path.extension().and_then(|e| e.to_str()),
                "is_absolute": path.is_absolute(),
                "is_hidden": path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('.'))
                    .unwrap_or(false),
                "depth": path.components().count(),
            })),
            other => Err(LocalProcessingError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// Resolve `.` and `..` lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
