//! Local append-only audit trail.
//!
//! One JSONL record per Policy API exchange (real or synthetic), plus an
//! envelope preview at the start of each invocation. A separate debug trace
//! file captures engine phases when enabled. Write failures are logged and
//! swallowed; auditing must never take an invocation down.

use crate::config::RunConfig;
use crate::normalize::redact;
use serde_json::{Value, json};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct AuditLog {
    log_path: PathBuf,
    debug_trace_path: Option<PathBuf>,
    invocation_id: String,
    hook_name: String,
    session_id: String,
}

impl AuditLog {
    pub fn new(config: &RunConfig, hook_name: &str, session_id: &str) -> Self {
        Self {
            log_path: config.log_path.clone(),
            debug_trace_path: config
                .debug_trace
                .then(|| config.debug_trace_path.clone()),
            invocation_id: uuid::Uuid::new_v4().to_string(),
            hook_name: hook_name.to_string(),
            session_id: session_id.to_string(),
        }
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Record one request/response exchange.
    pub fn append(&self, payload: &Value, response: &Value) {
        let record = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "invocation_id": self.invocation_id,
            "hook_name": self.hook_name,
            "session_id": self.session_id,
            "payload": redact(payload),
            "response": response,
        });
        append_line(&self.log_path, &record);
    }

    /// Record an exchange that deliberately never reached the network.
    pub fn append_synthetic(&self, payload: &Value, event_result: &str, reason: &str) {
        self.append(
            payload,
            &json!({"event_result": event_result, "reason": reason}),
        );
    }

    /// Record the redacted raw envelope at invocation start.
    pub fn preview(&self, body: &Value) {
        self.append(
            &json!({"preview": redact(body)}),
            &json!({"event_result": "preview"}),
        );
    }

    /// Phase marker for the debug trace file, if tracing is enabled.
    pub fn trace(&self, phase: &str, detail: Value) {
        let Some(path) = self.debug_trace_path.as_deref() else {
            return;
        };
        let mut record = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "invocation_id": self.invocation_id,
            "phase": phase,
            "hook_event_name": self.hook_name,
            "session_id": self.session_id,
        });
        if let (Some(record_map), Some(detail_map)) = (record.as_object_mut(), detail.as_object()) {
            for (key, value) in detail_map {
                record_map.insert(key.clone(), value.clone());
            }
        }
        append_line(path, &record);
    }
}

fn append_line(path: &Path, record: &Value) {
    if let Err(err) = try_append_line(path, record) {
        tracing::warn!(path = %path.display(), error = %err, "audit write failed");
    }
}

fn try_append_line(path: &Path, record: &Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{record}")
}
