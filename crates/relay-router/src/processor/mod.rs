//! Local processor registry.
//!
//! A local processor resolves a task type entirely in-process. Processors are
//! pure functions of the payload: no I/O, no shared state, so a task they
//! handle never reaches the cache or the remote path.

pub mod calculation;
pub mod data_validation;
pub mod file_operations;
pub mod formatting;
pub mod text_processing;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::LocalProcessingError;

/// A pure, synchronous resolver for one task type.
pub trait LocalProcessor: Send + Sync {
    /// The task type this processor handles.
    fn task_type(&self) -> &str;

    /// Resolve the payload.
    fn process(&self, payload: &Value) -> Result<Value, LocalProcessingError>;
}

/// Adapts a closure into a [`LocalProcessor`].
struct FnProcessor<F> {
    task_type: String,
    func: F,
}

impl<F> LocalProcessor for FnProcessor<F>
where
    F: Fn(&Value) -> Result<Value, LocalProcessingError> + Send + Sync,
{
    fn task_type(&self) -> &str {
        &self.task_type
    }

    fn process(&self, payload: &Value) -> Result<Value, LocalProcessingError> {
        (self.func)(payload)
    }
}

/// Task type -> processor lookup.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn LocalProcessor>>,
}

impl ProcessorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in processors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Register a processor, replacing any previous one for its task type.
    pub fn register(&mut self, processor: Arc<dyn LocalProcessor>) {
        let task_type = processor.task_type().to_string();
        if self.processors.insert(task_type.clone(), processor).is_some() {
            tracing::debug!(task_type = %task_type, "Replaced local processor");
        }
    }

    /// Register a closure as the processor for `task_type`.
    pub fn register_fn<F>(&mut self, task_type: impl Into<String>, func: F)
    where
        F: Fn(&Value) -> Result<Value, LocalProcessingError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnProcessor {
            task_type: task_type.into(),
            func,
        }));
    }

    pub fn register_defaults(&mut self) {
        self.register(Arc::new(file_operations::FileOperationsProcessor));
        self.register(Arc::new(data_validation::DataValidationProcessor::new()));
        self.register(Arc::new(formatting::FormattingProcessor));
        self.register(Arc::new(calculation::CalculationProcessor));
        self.register(Arc::new(text_processing::TextProcessingProcessor));
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn LocalProcessor>> {
        self.processors.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.processors.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.processors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

/// Read the `operation` field every built-in processor dispatches on.
pub(crate) fn operation(payload: &Value) -> Result<&str, LocalProcessingError> {
    payload
        .get("operation")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            LocalProcessingError::InvalidPayload("missing string field 'operation'".to_string())
        })
}

/// Read a required string field.
pub(crate) fn required_str<'a>(
    payload: &'a Value,
    field: &str,
) -> Result<&'a str, LocalProcessingError> {
    payload.get(field).and_then(Value::as_str).ok_or_else(|| {
        LocalProcessingError::InvalidPayload(format!("missing string field '{}'", field))
    })
}

/// Read a required numeric field.
pub(crate) fn required_f64(payload: &Value, field: &str) -> Result<f64, LocalProcessingError> {
    payload.get(field).and_then(Value::as_f64).ok_or_else(|| {
        LocalProcessingError::InvalidPayload(format!("missing numeric field '{}'", field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_cover_local_task_types() {
        let registry = ProcessorRegistry::with_defaults();
        assert_eq!(
            registry.task_types(),
            vec![
                "calculation",
                "data_validation",
                "file_operations",
                "formatting",
                "text_processing"
            ]
        );
    }

    #[test]
    fn test_register_fn_and_replace() {
        let mut registry = ProcessorRegistry::new();
        assert!(registry.is_empty());

        registry.register_fn("echo", |p| Ok(p.clone()));
        let out = registry.get("echo").unwrap().process(&json!({"a": 1})).unwrap();
        assert_eq!(out, json!({"a": 1}));

        registry.register_fn("echo", |_| Ok(json!("replaced")));
        assert_eq!(registry.len(), 1);
        let out = registry.get("echo").unwrap().process(&Value::Null).unwrap();
        assert_eq!(out, json!("replaced"));
    }

    #[test]
    fn test_missing_operation_is_invalid_payload() {
        let err = operation(&json!({"path": "x"})).unwrap_err();
        assert!(matches!(err, LocalProcessingError::InvalidPayload(_)));
    }
}
