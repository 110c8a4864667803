//! Shared normalization helpers.

use serde_json::Value;

use crate::error::EngineError;
use crate::models::{Therapist, TherapistPage};

/// Trimmed text, or `None` when blank.
pub fn clean_text(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

pub fn has_text(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Collapses the three therapist listing envelopes into one page shape:
///
/// - bare array
/// - `{data: [...]}`
/// - `{data: {data: [...], total}}`
///
/// Anything else is a `Normalization` error.
pub fn therapist_page(raw: Value) -> Result<TherapistPage, EngineError> {
    match raw {
        Value::Array(items) => {
            let items = decode_items(items)?;
            let total = items.len() as u64;
            Ok(TherapistPage { items, total })
        }
        Value::Object(mut outer) => match outer.remove("data") {
            Some(Value::Array(items)) => {
                let items = decode_items(items)?;
                let total = items.len() as u64;
                Ok(TherapistPage { items, total })
            }
            Some(Value::Object(mut inner)) => {
                let Some(Value::Array(items)) = inner.remove("data") else {
                    return Err(EngineError::Normalization(
                        "nested data is not an array".into(),
                    ));
                };
                let items = decode_items(items)?;
                let total = inner
                    .get("total")
                    .and_then(Value::as_u64)
                    .unwrap_or(items.len() as u64);
                Ok(TherapistPage { items, total })
            }
            _ => Err(EngineError::Normalization(
                "object without a data array".into(),
            )),
        },
        other => Err(EngineError::Normalization(format!(
            "unexpected {} payload",
            kind(&other)
        ))),
    }
}

fn decode_items(items: Vec<Value>) -> Result<Vec<Therapist>, EngineError> {
    items
        .into_iter()
        .map(|v| {
            serde_json::from_value(v)
                .map_err(|e| EngineError::Normalization(format!("therapist item: {e}")))
        })
        .collect()
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
