use super::{RunConfig, normalize_placeholder};
use crate::error::ConfigError;
use directories::UserDirs;
use std::path::{Path, PathBuf};

/// Assemble the invocation's configuration: defaults, then the config file
/// (if present), then environment overrides, then path fallbacks.
pub fn load(config_path: Option<&Path>) -> crate::error::Result<RunConfig> {
    let file_config = match resolve_config_path(config_path) {
        Some(path) if path.is_file() => Some(read_config_file(&path)?),
        _ => None,
    };
    Ok(finish(file_config.unwrap_or_default()))
}

/// The configuration used when the config file itself is unusable: defaults
/// plus environment overrides, so the invocation still runs fail-open.
pub fn defaults_with_env() -> RunConfig {
    finish(RunConfig::default())
}

fn finish(mut config: RunConfig) -> RunConfig {
    config.apply_env_overrides();

    for field in [
        &mut config.api_url,
        &mut config.api_key,
        &mut config.profile_id,
        &mut config.use_case_id,
        &mut config.user_id,
    ] {
        normalize_placeholder(field);
    }

    let base = base_dir();
    if config.state_dir.as_os_str().is_empty() {
        config.state_dir = base.join("state");
    }
    if config.log_path.as_os_str().is_empty() {
        config.log_path = base.join("logs").join("events.jsonl");
    }
    if config.debug_trace_path.as_os_str().is_empty() {
        config.debug_trace_path = base.join("logs").join("debug-trace.jsonl");
    }
    if config.max_content_chars == 0 {
        config.max_content_chars = RunConfig::default().max_content_chars;
    }

    if config.enabled
        && config.mode.is_enforce()
        && !config.mock_mode
        && !config.dry_run
        && !config.api_url.is_empty()
        && config.api_key.is_empty()
    {
        // Fail-open path: the client will still run, sends just degrade.
        tracing::warn!("api_url configured without api_key; requests will be unauthenticated");
    }

    config
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    Some(base_dir().join("config.toml"))
}

fn read_config_file(path: &Path) -> Result<RunConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents)
        .map_err(|err| ConfigError::Load(format!("{}: {err}", path.display())))
}

/// `~/.hookwarden`, or a temp-dir fallback when no home directory exists
/// (containerized hosts).
fn base_dir() -> PathBuf {
    UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".hookwarden"))
        .unwrap_or_else(|| std::env::temp_dir().join("hookwarden"))
}
