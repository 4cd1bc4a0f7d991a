//! Display formatting for numbers and strings.

use serde_json::{json, Value};

use super::{operation, required_f64, required_str, LocalProcessor};
use crate::error::LocalProcessingError;

const MAX_DECIMALS: u64 = 20;

/// Handles `formatting` tasks: `currency`, `percentage`, `thousands`,
/// `title_case`, `slug`.
pub struct FormattingProcessor;

impl LocalProcessor for FormattingProcessor {
    fn task_type(&self) -> &str {
        "formatting"
    }

    fn process(&self, payload: &Value) -> Result<Value, LocalProcessingError> {
        match operation(payload)? {
            "currency" => {
                let amount = required_f64(payload, "value")?;
                let symbol = payload.get("symbol").and_then(Value::as_str).unwrap_or("$");
                let sign = if amount < 0.0 { "-" } else { "" };
                let grouped = group_thousands(&format!("{:.2}", amount.abs()));
                Ok(json!(format!("{}{}{}", sign, symbol, grouped)))
            }
            "percentage" => {
                let value = required_f64(payload, "value")?;
                let decimals = match payload.get("decimals") {
                    None | Some(Value::Null) => 1,
                    Some(v) => v.as_u64().filter(|d| *d <= MAX_DECIMALS).ok_or_else(|| {
                        LocalProcessingError::InvalidPayload(format!(
                            "decimals must be an integer between 0 and {}",
                            MAX_DECIMALS
                        ))
                    })?,
                };
                Ok(json!(format!("{:.*}%", decimals as usize, value * 100.0)))
            }
            "thousands" => {
                let value = required_f64(payload, "value")?;
                let sign = if value < 0.0 { "-" } else { "" };
                let digits = format!("{}", value.abs());
                Ok(json!(format!("{}{}", sign, group_thousands(&digits))))
            }
            "title_case" => Ok(json!(title_case(required_str(payload, "value")?))),
            "slug" => Ok(json!(slug(required_str(payload, "value")?))),
            other => Err(LocalProcessingError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// Insert `,` separators into the integer part of an unsigned decimal string.
fn group_thousands(digits: &str) -> String {
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{}.{}", grouped, f),
        None => grouped,
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}
