//! Translation of the frontend's transaction form into a Firefly III payload

use serde_json::{json, Map, Value};
use thiserror::Error;

/// Fields the frontend must always send, in the order they are reported
pub const REQUIRED_FIELDS: [&str; 5] = [
    "description",
    "source_account_id",
    "destination_account_id",
    "date",
    "amount",
];

/// Transaction type used when the form does not pick one
pub const DEFAULT_TRANSACTION_TYPE: &str = "transfer";

/// Errors that can occur when validating a transaction form
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The request body is not a JSON object
    #[error("Missing JSON payload.")]
    MissingPayload,

    /// One or more required fields are absent or empty
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

/// Builds the Firefly III `POST /transactions` body from a frontend form
///
/// A required field counts as missing when it is absent, null, false, zero,
/// an empty string or an empty collection. Every missing field is reported.
pub fn build_transaction_payload(form: &Value) -> Result<Value, ValidationError> {
    let form = form.as_object().ok_or(ValidationError::MissingPayload)?;

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !form.get(*field).is_some_and(is_truthy))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    let mut entry = Map::new();
    entry.insert("description".into(), form["description"].clone());
    entry.insert(
        "type".into(),
        form.get("transaction_type")
            .filter(|t| !t.is_null())
            .cloned()
            .unwrap_or_else(|| json!(DEFAULT_TRANSACTION_TYPE)),
    );
    entry.insert("date".into(), form["date"].clone());
    entry.insert("amount".into(), Value::String(amount_string(&form["amount"])));
    entry.insert("source_id".into(), form["source_account_id"].clone());
    entry.insert("destination_id".into(), form["destination_account_id"].clone());

    for (field, target) in [("budget_id", "budget_id"), ("category_id", "category_id")] {
        if let Some(value) = form.get(field).filter(|v| is_truthy(v)) {
            entry.insert(target.into(), value.clone());
        }
    }

    if let Some(tags) = form.get("tags").and_then(normalize_tags) {
        entry.insert("tags".into(), tags);
    }

    if let Some(notes) = form
        .get("notes")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|notes| !notes.is_empty())
    {
        entry.insert("notes".into(), json!(notes));
    }

    Ok(json!({ "transactions": [Value::Object(entry)] }))
}

/// Accepts a tag array as-is or splits a comma-separated string
///
/// Returns `None` when there are no tags to send.
pub fn normalize_tags(tags: &Value) -> Option<Value> {
    match tags {
        Value::String(list) => {
            let tags: Vec<Value> = list
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(|tag| json!(tag))
                .collect();
            (!tags.is_empty()).then(|| Value::Array(tags))
        }
        Value::Array(list) if !list.is_empty() => Some(tags.clone()),
        _ => None,
    }
}

fn amount_string(amount: &Value) -> String {
    match amount {
        Value::String(amount) => amount.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
