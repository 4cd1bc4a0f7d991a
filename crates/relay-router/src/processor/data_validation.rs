//! Field validation against declarative rules.

use regex::Regex;
use serde_json::{json, Map, Value};

use super::{operation, required_str, LocalProcessor};
use crate::error::LocalProcessingError;

/// Handles `data_validation` tasks.
///
/// Operations:
/// - `email` with `value`: `{ "valid": bool }`
/// - `validate` with `data` (object) and `rules` (field -> rule object):
///   `{ "valid": bool, "errors": [..] }`. Supported rule keys are
///   `required`, `type`, `pattern`, `min_length`, `max_length`, `min`, `max`.
pub struct DataValidationProcessor {
    email: Regex,
}

impl DataValidationProcessor {
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
                .expect("Invalid email regex"),
        }
    }

    fn validate(
        &self,
        data: &Map<String, Value>,
        rules: &Map<String, Value>,
    ) -> Result<Vec<String>, LocalProcessingError> {
        let mut errors = Vec::new();

        for (field, rule) in rules {
            let value = data.get(field).filter(|v| !v.is_null());
            let required = rule.get("required").and_then(Value::as_bool).unwrap_or(false);

            let Some(value) = value else {
                if required {
                    errors.push(format!("{}: is required", field));
                }
                continue;
            };

            if let Some(expected) = rule.get("type").and_then(Value::as_str) {
                let matches = match expected {
                    "string" => value.is_string(),
                    "number" => value.is_number(),
                    "boolean" => value.is_boolean(),
                    "array" => value.is_array(),
                    "object" => value.is_object(),
                    "email" => value.as_str().map(|s| self.email.is_match(s)).unwrap_or(false),
                    other => {
                        return Err(LocalProcessingError::InvalidPayload(format!(
                            "unknown type '{}' for field '{}'",
                            other, field
                        )))
                    }
                };
                if !matches {
                    errors.push(format!("{}: expected {}", field, expected));
                    continue;
                }
            }

            if let Some(s) = value.as_str() {
                let len = s.chars().count() as u64;
                if let Some(min) = rule.get("min_length").and_then(Value::as_u64) {
                    if len < min {
                        errors.push(format!("{}: shorter than {}", field, min));
                    }
                }
                if let Some(max) = rule.get("max_length").and_then(Value::as_u64) {
                    if len > max {
                        errors.push(format!("{}: longer than {}", field, max));
                    }
                }
                if let Some(pattern) = rule.get("pattern").and_then(Value::as_str) {
                    let re = Regex::new(pattern).map_err(|e| {
                        LocalProcessingError::InvalidPayload(format!(
                            "invalid pattern for field '{}': {}",
                            field, e
                        ))
                    })?;
                    if !re.is_match(s) {
                        errors.push(format!("{}: does not match pattern", field));
                    }
                }
            }

            if let Some(n) = value.as_f64() {
                if let Some(min) = rule.get("min").and_then(Value::as_f64) {
                    if n < min {
                        errors.push(format!("{}: below minimum {}", field, min));
                    }
                }
                if let Some(max) = rule.get("max").and_then(Value::as_f64) {
                    if n > max {
                        errors.push(format!("{}: above maximum {}", field, max));
                    }
                }
            }
        }

        Ok(errors)
    }
}

impl Default for DataValidationProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalProcessor for DataValidationProcessor {
    fn task_type(&self) -> &str {
        "data_validation"
    }

    fn process(&self, payload: &Value) -> Result<Value, LocalProcessingError> {
        match operation(payload)? {
            "email" => {
                let value = required_str(payload, "value")?;
                Ok(json!({ "valid": self.email.is_match(value.trim()) }))
            }
            "validate" => {
                let data = payload.get("data").and_then(Value::as_object).ok_or_else(|| {
                    LocalProcessingError::InvalidPayload("'data' must be an object".to_string())
                })?;
                let rules = payload.get("rules").and_then(Value::as_object).ok_or_else(|| {
                    LocalProcessingError::InvalidPayload("'rules' must be an object".to_string())
                })?;
                let errors = self.validate(data, rules)?;
                Ok(json!({ "valid": errors.is_empty(), "errors": errors }))
            }
            other => Err(LocalProcessingError::UnsupportedOperation(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(payload: Value) -> Result<Value, LocalProcessingError> {
        DataValidationProcessor::new().process(&payload)
    }

    #[test]
    fn test_email() {
        let ok = run(json!({"operation": "email", "value": "dev@example.com"})).unwrap();
        assert_eq!(ok["valid"], json!(true));
        let bad = run(json!({"operation": "email", "value": "dev@example"})).unwrap();
        assert_eq!(bad["valid"], json!(false));
    }

    #[test]
    fn test_validate_collects_every_error() {
        let out = run(json!({
            "operation": "validate",
            "data": {"name": "Al", "age": 130, "code": "abc"},
            "rules": {
                "name": {"required": true, "type": "string", "min_length": 3},
                "age": {"type": "number", "min": 0, "max": 120},
                "code": {"pattern": "^[0-9]+$"},
                "email": {"required": true}
            }
        }))
        .unwrap();
        assert_eq!(out["valid"], json!(false));
        assert_eq!(out["errors"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_validate_passes() {
        let out = run(json!({
            "operation": "validate",
            "data": {"contact": "a@b.io"},
            "rules": {"contact": {"required": true, "type": "email"}}
        }))
        .unwrap();
        assert_eq!(out, json!({"valid": true, "errors": []}));
    }

    #[test]
    fn test_invalid_rule_pattern_is_rejected() {
        let err = run(json!({
            "operation": "validate",
            "data": {"x": "y"},
            "rules": {"x": {"pattern": "("}}
        }))
        .unwrap_err();
        assert!(matches!(err, LocalProcessingError::InvalidPayload(_)));
    }
}
