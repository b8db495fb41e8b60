//! Run configuration.
//!
//! A [`RunConfig`] is assembled once per invocation from three layers, in
//! rising precedence: built-in defaults, the optional config file, and
//! environment overrides. It is immutable after construction; every other
//! subsystem borrows it read-only.

mod env_overrides;
mod loader;

pub use loader::{defaults_with_env, load};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Whether policy verdicts are enforced or only observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Enforce,
    Observe,
}

impl Mode {
    pub fn is_enforce(self) -> bool {
        matches!(self, Self::Enforce)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "enforce" => Some(Self::Enforce),
            "observe" => Some(Self::Observe),
            _ => None,
        }
    }
}

/// Immutable per-invocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub enabled: bool,
    pub mode: Mode,
    pub dry_run: bool,
    pub print_payloads: bool,
    pub mock_mode: bool,
    pub mock_block_tokens: Vec<String>,
    pub fail_open: bool,
    pub api_url: String,
    pub api_key: String,
    pub profile_id: String,
    pub use_case_id: String,
    pub user_id: String,
    pub max_content_chars: usize,
    pub request_timeout_seconds: u64,
    pub state_dir: PathBuf,
    pub log_path: PathBuf,
    pub skip_telemetry_api_send: bool,
    pub llm_transcript_local_only: bool,
    pub tiny_debug_mode: bool,
    pub debug_trace: bool,
    pub debug_trace_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: Mode::Enforce,
            dry_run: false,
            print_payloads: false,
            mock_mode: false,
            mock_block_tokens: ["jailbreak", "toxic", "malware", "rm -rf /", "[[block]]"]
                .map(String::from)
                .to_vec(),
            fail_open: true,
            api_url: String::new(),
            api_key: String::new(),
            profile_id: String::new(),
            use_case_id: String::new(),
            user_id: "cowork_agent".into(),
            max_content_chars: 100_000,
            request_timeout_seconds: 15,
            state_dir: PathBuf::new(),
            log_path: PathBuf::new(),
            skip_telemetry_api_send: true,
            llm_transcript_local_only: true,
            tiny_debug_mode: false,
            debug_trace: false,
            debug_trace_path: PathBuf::new(),
        }
    }
}

impl RunConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.state_dir.join("mediator.db")
    }
}

/// Placeholder values shaped like `<YOUR_API_KEY>` collapse to empty so a
/// template config file behaves like an unconfigured one.
fn normalize_placeholder(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.starts_with("<YOUR_") && trimmed.ends_with('>') {
        value.clear();
    }
}
