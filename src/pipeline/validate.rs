//! Response validation: provider output → [`AnalysisResult`].
//!
//! ## Parsing policy
//!
//! Models asked for "JSON only" still sometimes answer
//! `Sure! Here is the result: {…}`. A raw string is therefore parsed in two
//! attempts:
//!
//! 1. the whole string as JSON;
//! 2. the greedy span from the first `{` to the last `}`.
//!
//! The second attempt is a heuristic. Two separate objects in one answer
//! (`{…} and also {…}`) produce a span that is not valid JSON and the
//! response is rejected as malformed.
//!
//! ## Schema enforcement
//!
//! Fields are checked in schema order and the first violation is reported
//! with its JSON path. Enumerations are closed and case-sensitive. Unknown
//! fields are ignored.

use crate::error::ValidationError;
use crate::output::{AnalysisResult, HealthStatus, Priority, Supplement};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

static RE_OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Validate a raw provider response string.
pub fn validate_text(raw: &str) -> Result<AnalysisResult, ValidationError> {
    let value = parse_lenient(raw)?;
    validate_value(value)
}

/// Validate an already-decoded JSON value.
pub fn validate_value(value: Value) -> Result<AnalysisResult, ValidationError> {
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(ValidationError::NotAnObject {
                found: type_name(&other),
            })
        }
    };

    let blood_type = optional_string(&obj, "bloodType", "bloodType")?;
    let key_findings = string_array(&obj, "keyFindings")?;
    let supplements = supplements(&obj)?;
    let health_status = {
        let s = required_string(&obj, "healthStatus", "healthStatus")?;
        HealthStatus::parse(&s).ok_or_else(|| ValidationError::InvalidEnum {
            path: "healthStatus".into(),
            value: s,
            allowed: HealthStatus::ALLOWED,
        })?
    };
    let summary = required_string(&obj, "summary", "summary")?;

    Ok(AnalysisResult {
        blood_type,
        key_findings,
        supplements,
        health_status,
        summary,
    })
}

/// Parse `raw` as JSON, falling back to its first-`{`-to-last-`}` span.
pub fn parse_lenient(raw: &str) -> Result<Value, ValidationError> {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return Ok(v);
    }

    let span = RE_OBJECT_SPAN
        .find(raw)
        .ok_or(ValidationError::Malformed)?
        .as_str();

    match serde_json::from_str::<Value>(span) {
        Ok(v) => {
            warn!(
                "Recovered JSON object from prose-wrapped response ({} of {} bytes)",
                span.len(),
                raw.len()
            );
            Ok(v)
        }
        Err(e) => {
            debug!("Embedded span is not JSON either: {}", e);
            Err(ValidationError::Malformed)
        }
    }
}

// ── Field helpers ────────────────────────────────────────────────────────

fn supplements(obj: &Map<String, Value>) -> Result<Vec<Supplement>, ValidationError> {
    let items = match obj.get("supplements") {
        None => {
            return Err(ValidationError::MissingField {
                path: "supplements".into(),
            })
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ValidationError::WrongType {
                path: "supplements".into(),
                expected: "an array",
                found: type_name(other),
            })
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let base = format!("supplements[{i}]");
        let entry = item.as_object().ok_or_else(|| ValidationError::WrongType {
            path: base.clone(),
            expected: "an object",
            found: type_name(item),
        })?;

        let name = required_string(entry, "name", &format!("{base}.name"))?;
        let reason = required_string(entry, "reason", &format!("{base}.reason"))?;
        let dosage = optional_string(entry, "dosage", &format!("{base}.dosage"))?;
        let priority_path = format!("{base}.priority");
        let raw_priority = required_string(entry, "priority", &priority_path)?;
        let priority =
            Priority::parse(&raw_priority).ok_or_else(|| ValidationError::InvalidEnum {
                path: priority_path,
                value: raw_priority,
                allowed: Priority::ALLOWED,
            })?;

        out.push(Supplement {
            name,
            reason,
            dosage,
            priority,
        });
    }
    Ok(out)
}

fn string_array(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>, ValidationError> {
    match obj.get(key) {
        None => Err(ValidationError::MissingField { path: key.into() }),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, v)| match v {
                Value::String(s) => Ok(s.clone()),
                other => Err(ValidationError::WrongType {
                    path: format!("{key}[{i}]"),
                    expected: "a string",
                    found: type_name(other),
                }),
            })
            .collect(),
        Some(other) => Err(ValidationError::WrongType {
            path: key.into(),
            expected: "an array",
            found: type_name(other),
        }),
    }
}

fn required_string(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<String, ValidationError> {
    match obj.get(key) {
        None => Err(ValidationError::MissingField { path: path.into() }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ValidationError::WrongType {
            path: path.into(),
            expected: "a string",
            found: type_name(other),
        }),
    }
}

/// Absent is fine; present (including `null`) must be a string.
fn optional_string(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<String>, ValidationError> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ValidationError::WrongType {
            path: path.into(),
            expected: "a string",
            found: type_name(other),
        }),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
