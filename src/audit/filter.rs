//! Sensitive payload filtering
//!
//! Captured request and response payloads pass through a key-based filter
//! before they are queued. Keys are matched case-insensitively as substrings,
//! so "password" also catches "user_password" and "password_confirmation".
//! Two pattern lists exist: fully redacted fields lose their value entirely,
//! masked fields keep a two-character hint at each end of string values and
//! are redacted otherwise.
//!
//! Nested objects are filtered recursively. Nested arrays are passed through
//! untouched; only a sensitive key pointing directly at an array replaces it.

use serde_json::{Map, Value};

use crate::config::AuditConfig;

/// Replacement marker for fully redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Key-substring based payload filter
#[derive(Debug, Clone)]
pub struct SensitiveDataFilter {
    redact_patterns: Vec<String>,
    mask_patterns: Vec<String>,
}

impl SensitiveDataFilter {
    /// Build a filter from pattern lists; patterns are matched lowercase
    pub fn new(redact: &[String], mask: &[String]) -> Self {
        Self {
            redact_patterns: redact.iter().map(|p| p.to_lowercase()).collect(),
            mask_patterns: mask.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &AuditConfig) -> Self {
        Self::new(&config.redact_fields, &config.mask_fields)
    }

    /// Filter a payload
    ///
    /// Only objects are inspected; arrays and scalars at the top level come
    /// back unchanged. The result is always a new value, the input is never
    /// mutated, and running the filter twice yields the same output.
    pub fn filter(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => self.filter_object(map),
            _ => value.clone(),
        }
    }

    fn filter_object(&self, map: &Map<String, Value>) -> Value {
        let mut filtered = Map::with_capacity(map.len());
        for (key, value) in map {
            let key_lower = key.to_lowercase();
            let replacement = if self.matches_redact(&key_lower) {
                Value::String(REDACTED.to_string())
            } else if self.matches_mask(&key_lower) {
                mask_value(value)
            } else if let Value::Object(inner) = value {
                self.filter_object(inner)
            } else {
                value.clone()
            };
            filtered.insert(key.clone(), replacement);
        }
        Value::Object(filtered)
    }

    fn matches_redact(&self, key_lower: &str) -> bool {
        self.redact_patterns.iter().any(|p| key_lower.contains(p))
    }

    fn matches_mask(&self, key_lower: &str) -> bool {
        self.mask_patterns.iter().any(|p| key_lower.contains(p))
    }
}

/// Mask a value while keeping a short hint
///
/// Strings of more than six characters keep their first and last two
/// characters with asterisks in between; shorter strings become all
/// asterisks. Anything that is not a string is redacted outright. The
/// redaction marker itself is left untouched, which keeps repeated
/// filtering stable.
fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s == REDACTED => value.clone(),
        Value::String(s) => Value::String(mask_string(s)),
        _ => Value::String(REDACTED.to_string()),
    }
}

fn mask_string(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    if len <= 6 {
        return "*".repeat(len);
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[len - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(len - 4), tail)
}
