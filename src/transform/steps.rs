use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::TransformStep;
use crate::record::{Record, Value};

/// Drops absent/blank-after-trim fields and trims surviving `Text` values.
/// Fails if nothing survives.
pub struct CleanStep;

impl TransformStep for CleanStep {
    fn process(&self, record: &Record) -> Result<Record, String> {
        let mut cleaned = Record::new();

        for (k, v) in record {
            match v {
                Value::Absent => continue,
                Value::Text(s) => {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    cleaned.insert(k.clone(), Value::Text(trimmed.to_string()));
                }
                other => {
                    cleaned.insert(k.clone(), other.clone());
                }
            }
        }

        if cleaned.is_empty() {
            return Err("Empty record after cleaning".to_string());
        }

        Ok(cleaned)
    }
}

/// Parses `created_at` as an RFC 3339 timestamp and coerces `amount` to a
/// number, when present.
pub struct NormalizeStep;

impl TransformStep for NormalizeStep {
    fn process(&self, record: &Record) -> Result<Record, String> {
        let mut normalized = record.clone();

        if let Some(value) = normalized.get("created_at") {
            if let Value::Text(s) = value {
                let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| format!("Invalid datetime: {}", s))?;
                normalized.insert("created_at".to_string(), Value::Timestamp(parsed));
            }
        }

        if let Some(value) = normalized.get("amount") {
            let as_number = match value {
                Value::Number(n) => Some(*n),
                Value::Text(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match as_number {
                Some(n) => {
                    normalized.insert("amount".to_string(), Value::Number(n));
                }
                None => return Err(format!("Invalid amount: {:?}", value)),
            }
        }

        Ok(normalized)
    }
}

/// Looks up `country_code` in a caller-supplied mapping and sets
/// `country_name`. Records with no (or empty) `country_code` pass through
/// unchanged.
pub struct EnrichStep {
    country_map: HashMap<String, String>,
}

impl EnrichStep {
    pub fn new(country_map: HashMap<String, String>) -> Self {
        Self { country_map }
    }
}

impl TransformStep for EnrichStep {
    fn process(&self, record: &Record) -> Result<Record, String> {
        let mut enriched = record.clone();

        let country_code = match enriched.get("country_code") {
            Some(Value::Text(s)) if !s.is_empty() => s.clone(),
            _ => return Ok(enriched),
        };

        match self.country_map.get(&country_code) {
            Some(name) => {
                enriched.insert("country_name".to_string(), Value::Text(name.clone()));
                Ok(enriched)
            }
            None => Err(format!("Unknown country code: {}", country_code)),
        }
    }
}
