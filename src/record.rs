use std::collections::HashMap;
use std::error::Error as StdError;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// A single cell value as it flows through the pipeline.
///
/// Values start out as `Text` (CSV) or whatever JSON gives us, and acquire
/// richer forms (`Number`, `Timestamp`) once the Normalize step has run.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Absent,
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_blank_text(&self) -> bool {
        matches!(self, Value::Text(s) if s.trim().is_empty())
    }
}

/// Lets a `Value` be bound directly as a query parameter: the loader's batch
/// upsert builds its parameter list from `&Record` without per-field match
/// arms at the call site.
impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            Value::Text(s) => s.to_sql(ty, out),
            Value::Number(n) => n.to_sql(ty, out),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Timestamp(t) => t.to_sql(ty, out),
            Value::Absent => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl From<&JsonValue> for Value {
    fn from(v: &JsonValue) -> Self {
        match v {
            JsonValue::Null => Value::Absent,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::Text(s.clone()),
            // Nested arrays/objects have no place in a flat record; keep their
            // JSON text rather than silently dropping data.
            other => Value::Text(other.to_string()),
        }
    }
}

/// An unordered mapping from field name to value.
pub type Record = HashMap<String, Value>;

/// Builds a `Record` from a CSV header/row pair. Fields absent from a short
/// row become empty `Text`, never `Absent` -- this falls out of zipping the
/// row against the full header, matching the contract in the reader module.
pub fn record_from_csv_row(header: &csv::StringRecord, row: &csv::StringRecord) -> Record {
    let mut record = Record::with_capacity(header.len());
    for (i, name) in header.iter().enumerate() {
        let value = row.get(i).unwrap_or("");
        record.insert(name.to_string(), Value::Text(value.to_string()));
    }
    record
}

/// Builds a `Record` from one parsed JSON object.
pub fn record_from_json_object(object: &serde_json::Map<String, JsonValue>) -> Record {
    object
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v)))
        .collect()
}
