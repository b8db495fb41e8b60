//! Content normalization and redaction.
//!
//! Everything that leaves the process (Policy API payloads, audit records)
//! passes through here first: structured values get a stable string form,
//! oversized content is capped with a visible marker, and secret-shaped keys
//! are scrubbed from anything destined for the local log.

use serde_json::Value;

/// Appended when content exceeds the configured bound.
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Key substrings whose values are never written to disk in the clear.
const REDACT_KEYS: [&str; 6] = [
    "api_key",
    "token",
    "secret",
    "password",
    "credential",
    "authorization",
];

const REDACTED: &str = "***REDACTED***";

/// Max recursion depth for [`redact`]; deeper structures pass through as-is.
const MAX_REDACT_DEPTH: usize = 10;

/// Truncate `text` to at most `max` characters, marking the cut.
///
/// Idempotent: a capped string is exactly `max` chars long and passes through
/// unchanged on a second application.
pub fn cap_text(text: &str, max: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max {
        return text.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max <= marker_len {
        return TRUNCATION_MARKER.chars().take(max).collect();
    }
    let mut capped: String = text.chars().take(max - marker_len).collect();
    capped.push_str(TRUNCATION_MARKER);
    capped
}

/// Produce the capped string form of an arbitrary payload value.
///
/// Strings pass through directly; everything else is JSON-stringified so the
/// Policy API always receives flat text.
pub fn normalize_value(value: &Value, max: usize) -> String {
    match value {
        Value::String(text) => cap_text(text, max),
        other => cap_text(&other.to_string(), max),
    }
}

/// Recursively replace values under secret-shaped keys.
pub fn redact(value: &Value) -> Value {
    redact_at_depth(value, 0)
}

fn redact_at_depth(value: &Value, depth: usize) -> Value {
    if depth > MAX_REDACT_DEPTH {
        return value.clone();
    }
    match value {
        Value::Object(map) => {
            let mut scrubbed = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                let lowered = key.to_lowercase();
                if REDACT_KEYS.iter().any(|token| lowered.contains(token)) {
                    scrubbed.insert(key.clone(), Value::String(REDACTED.into()));
                } else {
                    scrubbed.insert(key.clone(), redact_at_depth(item, depth + 1));
                }
            }
            Value::Object(scrubbed)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_at_depth(item, depth + 1))
                .collect(),
        ),
        other => other.clone(),
    }
}
