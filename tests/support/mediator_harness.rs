#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use hookwarden::config::Mode;
use hookwarden::{HookEnvelope, Mediator, RunConfig};
use serde_json::{Value, json};

/// Per-test environment: a temp state dir shared by consecutive mediator
/// "invocations", exactly as the real state file is shared by consecutive
/// child processes.
pub struct MediatorHarness {
    dir: TempDir,
    pub config: RunConfig,
}

impl MediatorHarness {
    /// Mock-mode harness with the given block tokens.
    pub fn mock(block_tokens: &[&str]) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = RunConfig {
            mock_mode: true,
            mock_block_tokens: block_tokens.iter().map(ToString::to_string).collect(),
            state_dir: dir.path().join("state"),
            log_path: dir.path().join("logs").join("events.jsonl"),
            debug_trace_path: dir.path().join("logs").join("debug-trace.jsonl"),
            ..RunConfig::default()
        };
        Self { dir, config }
    }

    /// Harness pointed at a live (or intentionally dead) Policy API URL.
    pub fn live(api_url: &str) -> Self {
        let mut harness = Self::mock(&[]);
        harness.config.mock_mode = false;
        harness.config.api_url = api_url.to_string();
        harness
    }

    /// A fresh mediator over the shared state dir, like a new child process.
    pub fn mediator(&self) -> Mediator {
        Mediator::new(self.config.clone())
    }

    pub async fn dispatch(&self, hook: &str, body: Value) -> hookwarden::Decision {
        let envelope = envelope(hook, body);
        self.mediator().handle(&envelope).await
    }

    /// Reopen the state file the way the next invocation would.
    pub fn state(&self) -> hookwarden::state::StateStore {
        hookwarden::state::StateStore::open(&self.config.state_db_path())
    }

    pub fn write_transcript(&self, name: &str, lines: &[String]) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("{}\n", lines.join("\n"))).expect("write transcript");
        path.to_string_lossy().to_string()
    }

    /// All audit records written so far, oldest first.
    pub fn audit_records(&self) -> Vec<Value> {
        read_jsonl(&self.config.log_path)
    }

    /// Audit records that carry a given metadata source, skipping previews.
    pub fn records_with_source(&self, source: &str) -> Vec<Value> {
        self.audit_records()
            .into_iter()
            .filter(|record| record["payload"]["metadata"]["source"] == json!(source))
            .collect()
    }

    pub fn state_db(&self) -> PathBuf {
        self.config.state_db_path()
    }
}

pub fn envelope(hook: &str, mut body: Value) -> HookEnvelope {
    body["hook_event_name"] = json!(hook);
    HookEnvelope::from_value(body, None).expect("valid envelope")
}

pub fn user_line(text: &str) -> String {
    json!({"type": "user", "message": {"role": "user", "content": text}}).to_string()
}

pub fn assistant_line(text: &str) -> String {
    json!({"type": "assistant", "message": {"role": "assistant", "content": text}}).to_string()
}

pub fn read_jsonl(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("valid audit record"))
        .collect()
}

/// Records that represent CREATE requests (they carry input but no event_id).
pub fn create_records(records: &[Value]) -> Vec<Value> {
    records
        .iter()
        .filter(|record| {
            record["payload"].get("input").is_some()
                && record["payload"].get("event_id").is_none()
                && record["payload"].get("preview").is_none()
        })
        .cloned()
        .collect()
}

/// Records that represent UPDATE requests (they carry event_id and output).
pub fn update_records(records: &[Value]) -> Vec<Value> {
    records
        .iter()
        .filter(|record| {
            record["payload"].get("event_id").is_some()
                && record["payload"].get("output").is_some()
        })
        .cloned()
        .collect()
}

pub fn observe_mode(mut config: RunConfig) -> RunConfig {
    config.mode = Mode::Observe;
    config
}
