//! The hook envelope delivered by the host on stdin.

use crate::error::EnvelopeError;
use serde_json::Value;

/// One hook invocation's input: the hook name plus the free-form body whose
/// shape depends on the hook.
#[derive(Debug, Clone)]
pub struct HookEnvelope {
    pub hook_name: String,
    pub session_id: String,
    pub transcript_path: Option<String>,
    pub body: Value,
}

impl HookEnvelope {
    /// Parse the raw stdin text. `event_override` (from `--event`) wins over
    /// the envelope's own `hook_event_name`.
    pub fn parse(raw: &str, event_override: Option<&str>) -> Result<Self, EnvelopeError> {
        let body: Value = if raw.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw).map_err(|err| EnvelopeError::Malformed(err.to_string()))?
        };
        Self::from_value(body, event_override)
    }

    pub fn from_value(body: Value, event_override: Option<&str>) -> Result<Self, EnvelopeError> {
        let hook_name = event_override
            .map(ToString::to_string)
            .or_else(|| {
                body.get("hook_event_name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(ToString::to_string)
            })
            .ok_or(EnvelopeError::MissingHookName)?;

        let session_id = body
            .get("session_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let transcript_path = body
            .get("transcript_path")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(ToString::to_string);

        Ok(Self {
            hook_name,
            session_id,
            transcript_path,
            body,
        })
    }

    /// String field accessor into the free-form body.
    pub fn field(&self, key: &str) -> &str {
        self.body.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    /// Raw value accessor into the free-form body.
    pub fn value(&self, key: &str) -> Value {
        self.body.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.body.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}
