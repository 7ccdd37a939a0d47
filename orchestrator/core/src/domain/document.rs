// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Semi-structured Documents
//!
//! Agent `options`, agent `memory` and event payloads are ordered string-keyed
//! maps of JSON values. Shape validation is left to each agent type at the
//! boundary (see [`crate::domain::registry::AgentBehavior::validate_options`]).

use chrono::Duration;
use serde_json::Value;

/// Ordered key-value document (insertion order is preserved).
pub type Document = serde_json::Map<String, Value>;

/// Build a [`Document`] from a `serde_json::json!({...})` literal.
///
/// Non-object values produce an empty document.
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Read a numeric option that may have been supplied as a number or a string
/// (`"2"`, `2`, `2.5` are all accepted).
pub fn number_option(doc: &Document, key: &str) -> Option<f64> {
    match doc.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Read a day-count option as a [`Duration`]. Zero or negative values count as unset.
pub fn days_option(doc: &Document, key: &str) -> Option<Duration> {
    let days = number_option(doc, key)?;
    if days <= 0.0 || !days.is_finite() {
        return None;
    }
    Some(Duration::seconds((days * 86_400.0).round() as i64))
}

/// Read a boolean option, accepting `true`/`"true"`.
pub fn bool_option(doc: &Document, key: &str) -> bool {
    match doc.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
