use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for hookwarden.
///
/// Each subsystem defines its own error variant. The entry point matches on
/// these to decide how an invocation degrades; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Envelope ─────────────────────────────────────────────────────────
    #[error("envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    // ── Durable state ────────────────────────────────────────────────────
    #[error("state: {0}")]
    State(#[from] StateError),

    // ── Policy client ────────────────────────────────────────────────────
    #[error("policy: {0}")]
    Policy(#[from] PolicyError),

    // ── Transcript ───────────────────────────────────────────────────────
    #[error("transcript: {0}")]
    Transcript(#[from] TranscriptError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Envelope errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("stdin was not valid JSON: {0}")]
    Malformed(String),

    #[error("hook_event_name missing from envelope")]
    MissingHookName,
}

// ─── State store errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open state store: {0}")]
    Open(String),

    #[error("sqlite: {0}")]
    Sqlite(String),
}

// ─── Policy client errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

// ─── Transcript errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("transcript not readable: {0}")]
    Unreadable(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, WardenError>;
