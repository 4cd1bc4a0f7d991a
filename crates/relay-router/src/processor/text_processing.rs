use serde_json::{json, Value};

use super::{operation, required_str, LocalProcessor};
use crate::error::LocalProcessingError;

/// Handles `text_processing` tasks on the `text` field.
pub struct TextProcessingProcessor;

impl LocalProcessor for TextProcessingProcessor {
    fn task_type(&self) -> &str {
        "text_processing"
    }

    fn process(&self, payload: &Value) -> Result<Value, LocalProcessingError> {
        let op = operation(payload)?;
        let text = required_str(payload, "text")?;

        match op {
            "word_count" => Ok(json!(text.split_whitespace().count())),
            "char_count" => Ok(json!(text.chars().count())),
            "uppercase" => Ok(json!(text.to_uppercase())),
            "lowercase" => Ok(json!(text.to_lowercase())),
            "normalize_whitespace" => {
                Ok(json!(text.split_whitespace().collect::<Vec<_>>().join(" ")))
            }
            "truncate" => {
                let max = payload
                    .get("max_chars")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| {
                        LocalProcessingError::InvalidPayload(
                            "missing numeric field 'max_chars'".to_string(),
                        )
                    })? as usize;
                if text.chars().count() <= max {
                    return Ok(json!(text));
                }
                let cut: String = text.chars().take(max.saturating_sub(3)).collect();
                Ok(json!(format!("{}...", cut.trim_end())))
            }
            other => Err(LocalProcessingError::UnsupportedOperation(other.to_string())),
        }
    }
}
