use super::{Mode, RunConfig};
use std::path::PathBuf;

/// Look up `HOOKWARDEN_<KEY>` first, then the bare `<KEY>`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(format!("HOOKWARDEN_{key}"))
        .or_else(|_| std::env::var(key))
        .ok()
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env_string(key)?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl RunConfig {
    pub fn apply_env_overrides(&mut self) {
        if let Some(enabled) = env_bool("ENABLED") {
            self.enabled = enabled;
        }

        if let Some(raw) = env_string("MODE")
            && let Some(mode) = Mode::parse(&raw)
        {
            self.mode = mode;
        }

        if let Some(dry_run) = env_bool("DRY_RUN") {
            self.dry_run = dry_run;
        }

        if let Some(print_payloads) = env_bool("PRINT_PAYLOADS") {
            self.print_payloads = print_payloads;
        }

        if let Some(mock_mode) = env_bool("MOCK_MODE") {
            self.mock_mode = mock_mode;
        }

        if let Some(raw) = env_string("MOCK_BLOCK_TOKENS") {
            self.mock_block_tokens = raw
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        if let Some(fail_open) = env_bool("FAIL_OPEN") {
            self.fail_open = fail_open;
        }

        if let Some(raw) = env_string("REQUEST_TIMEOUT_SECONDS")
            && let Ok(seconds) = raw.trim().parse::<u64>()
            && seconds > 0
        {
            self.request_timeout_seconds = seconds;
        }

        if let Some(url) = env_string("API_URL") {
            self.api_url = url;
        }

        if let Some(key) = env_string("API_KEY") {
            self.api_key = key;
        }

        if let Some(profile_id) = env_string("PROFILE_ID") {
            self.profile_id = profile_id;
        }

        if let Some(use_case_id) = env_string("USE_CASE_ID") {
            self.use_case_id = use_case_id;
        }

        if let Some(user_id) = env_string("USER_ID") {
            self.user_id = user_id;
        }

        if let Some(raw) = env_string("MAX_CONTENT_CHARS")
            && let Ok(max) = raw.trim().parse::<usize>()
            && max > 0
        {
            self.max_content_chars = max;
        }

        if let Some(skip) = env_bool("SKIP_TELEMETRY_API_SEND") {
            self.skip_telemetry_api_send = skip;
        }

        if let Some(local_only) = env_bool("LLM_TRANSCRIPT_LOCAL_ONLY") {
            self.llm_transcript_local_only = local_only;
        }

        if let Some(state_dir) = env_string("STATE_DIR") {
            self.state_dir = PathBuf::from(state_dir);
        }

        if let Some(log_path) = env_string("LOG_PATH") {
            self.log_path = PathBuf::from(log_path);
        }

        if let Some(tiny) = env_bool("TINY_DEBUG_MODE") {
            self.tiny_debug_mode = tiny;
        }

        if let Some(debug_trace) = env_bool("DEBUG_TRACE") {
            self.debug_trace = debug_trace;
        }

        if let Some(path) = env_string("DEBUG_TRACE_PATH") {
            self.debug_trace_path = PathBuf::from(path);
        }
    }
}
