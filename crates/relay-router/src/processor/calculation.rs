//! Arithmetic over numeric lists and order totals.

use serde_json::{json, Value};

use super::{operation, LocalProcessor};
use crate::error::LocalProcessingError;

/// Handles `calculation` tasks: `sum`, `average`, `min`, `max` over `values`,
/// and `total` over `items` (`price` x `quantity`) with optional
/// `tax_rate` and `discount` fractions.
pub struct CalculationProcessor;

impl LocalProcessor for CalculationProcessor {
    fn task_type(&self) -> &str {
        "calculation"
    }

    fn process(&self, payload: &Value) -> Result<Value, LocalProcessingError> {
        match operation(payload)? {
            "sum" => Ok(json!(numbers(payload)?.iter().sum::<f64>())),
            "average" => {
                let values = numbers(payload)?;
                if values.is_empty() {
                    return Err(LocalProcessingError::Failed(
                        "average of an empty list".to_string(),
                    ));
                }
                Ok(json!(values.iter().sum::<f64>() / values.len() as f64))
            }
            "min" => Ok(json!(numbers(payload)?.into_iter().reduce(f64::min))),
            "max" => Ok(json!(numbers(payload)?.into_iter().reduce(f64::max))),
            "total" => total(payload),
            other => Err(LocalProcessingError::UnsupportedOperation(other.to_string())),
        }
    }
}

fn numbers(payload: &Value) -> Result<Vec<f64>, LocalProcessingError> {
    let values = payload.get("values").and_then(Value::as_array).ok_or_else(|| {
        LocalProcessingError::InvalidPayload("'values' must be an array".to_string())
    })?;
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                LocalProcessingError::InvalidPayload(format!("non-numeric value {}", v))
            })
        })
        .collect()
}

fn rate(payload: &Value, field: &str) -> Result<f64, LocalProcessingError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(0.0),
        Some(v) => match v.as_f64() {
            Some(r) if (0.0..=1.0).contains(&r) => Ok(r),
            _ => Err(LocalProcessingError::InvalidPayload(format!(
                "'{}' must be a fraction between 0 and 1",
                field
            ))),
        },
    }
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn total(payload: &Value) -> Result<Value, LocalProcessingError> {
    let items = payload.get("items").and_then(Value::as_array).ok_or_else(|| {
        LocalProcessingError::InvalidPayload("'items' must be an array".to_string())
    })?;

    let mut subtotal = 0.0;
    for item in items {
        let price = item.get("price").and_then(Value::as_f64).ok_or_else(|| {
            LocalProcessingError::InvalidPayload("item is missing numeric 'price'".to_string())
        })?;
        let quantity = item.get("quantity").and_then(Value::as_f64).unwrap_or(1.0);
        subtotal += price * quantity;
    }

    let discount = subtotal * rate(payload, "discount")?;
    let taxable = subtotal - discount;
    let tax = taxable * rate(payload, "tax_rate")?;

    Ok(json!({
        "subtotal": round_cents(subtotal),
        "discount": round_cents(discount),
        "tax": round_cents(tax),
        "total": round_cents(taxable + tax),
    }))
}
