//! Policy API client.
//!
//! Two operations against a single HTTPS endpoint: CREATE (open an event with
//! its INPUT, get an event_id and a verdict) and UPDATE (close an event_id
//! with its OUTPUT, get a verdict). Mock and dry-run modes short-circuit the
//! network entirely; transport failures resolve through the fail-open policy
//! rather than propagating.

pub mod payload;

use crate::audit::AuditLog;
use crate::config::RunConfig;
use crate::error::PolicyError;
use payload::{CreatePayload, UpdatePayload};
use serde_json::Value;
use std::time::Duration;

// ─── Verdicts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyResult {
    Passed,
    Blocked,
    Rejected,
}

/// The upstream's answer for one request, with extra fields kept opaque.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub result: PolicyResult,
    pub reason: String,
    pub event_id: String,
    pub raw: Value,
}

impl Verdict {
    /// Blocked and rejected are honored identically for host decisions; the
    /// distinction survives in `result` for logging.
    pub fn is_blocking(&self) -> bool {
        matches!(self.result, PolicyResult::Blocked | PolicyResult::Rejected)
    }

    pub fn reason_or(&self, fallback: &str) -> String {
        if self.reason.is_empty() {
            fallback.to_string()
        } else {
            self.reason.clone()
        }
    }

    /// Parse an upstream response body. Unknown or missing `event_result`
    /// reads as passed (fail-open).
    fn from_response(raw: Value) -> Self {
        let event_result = raw
            .get("event_result")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let result = match event_result.as_str() {
            "block" | "blocked" => PolicyResult::Blocked,
            "reject" | "rejected" => PolicyResult::Rejected,
            _ => PolicyResult::Passed,
        };
        let event_id = raw
            .get("event_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        Self {
            result,
            reason: compose_reason(&raw),
            event_id,
            raw,
        }
    }

    fn synthetic(result: PolicyResult, event_id: String, reason: &str, raw: Value) -> Self {
        Self {
            result,
            reason: reason.to_string(),
            event_id,
            raw,
        }
    }
}

/// Human-readable reason: `policy` and `reason` composed when both present,
/// otherwise whichever exists. Multi-part reasons stay opaque text.
fn compose_reason(raw: &Value) -> String {
    let policy = raw
        .get("policy")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim();
    let reason = raw
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim();
    match (policy.is_empty(), reason.is_empty()) {
        (false, false) => format!("Policy: {policy} - {reason}"),
        (false, true) => format!("Policy: {policy}"),
        (true, false) => reason.to_string(),
        (true, true) => String::new(),
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Create,
    Update,
}

pub struct PolicyClient {
    endpoint: String,
    api_key: String,
    http: reqwest::Client,
    request_timeout: Duration,
    fail_open: bool,
    enabled: bool,
    dry_run: bool,
    mock_mode: bool,
    print_payloads: bool,
    mock_tokens: Vec<String>,
}

impl PolicyClient {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            endpoint: event_endpoint(&config.api_url),
            api_key: config.api_key.clone(),
            http: build_client(config.request_timeout()),
            request_timeout: config.request_timeout(),
            fail_open: config.fail_open,
            enabled: config.enabled,
            dry_run: config.dry_run,
            mock_mode: config.mock_mode,
            print_payloads: config.print_payloads,
            mock_tokens: config
                .mock_block_tokens
                .iter()
                .map(|token| token.to_lowercase())
                .collect(),
        }
    }

    /// Open an event. Never retried: a duplicate CREATE would open a second
    /// event upstream.
    pub async fn create(&self, payload: &CreatePayload, audit: &AuditLog) -> Verdict {
        let body = serde_json::to_value(payload).unwrap_or(Value::Null);
        self.send(body, Op::Create, audit).await
    }

    /// Close an event. Retried once on transport failure; event_id makes the
    /// operation idempotent upstream.
    pub async fn update(&self, payload: &UpdatePayload, audit: &AuditLog) -> Verdict {
        let body = serde_json::to_value(payload).unwrap_or(Value::Null);
        self.send(body, Op::Update, audit).await
    }

    async fn send(&self, body: Value, op: Op, audit: &AuditLog) -> Verdict {
        if self.print_payloads || self.dry_run {
            tracing::info!(payload = %body, "policy payload");
        }

        if !self.enabled {
            let verdict = Verdict::synthetic(
                PolicyResult::Passed,
                String::new(),
                "",
                serde_json::json!({"event_result": "passed", "disabled": true}),
            );
            audit.append(&body, &verdict.raw);
            return verdict;
        }

        if self.dry_run {
            let verdict = Verdict::synthetic(
                PolicyResult::Passed,
                synthetic_event_id(&body, op),
                "dry_run",
                serde_json::json!({"event_result": "passed", "reason": "dry_run", "dry_run": true}),
            );
            audit.append(&body, &verdict.raw);
            return verdict;
        }

        if self.mock_mode {
            let verdict = self.mock_verdict(&body, op);
            audit.append(&body, &verdict.raw);
            return verdict;
        }

        if self.endpoint.is_empty() {
            let verdict = Verdict::synthetic(
                PolicyResult::Passed,
                synthetic_event_id(&body, op),
                "",
                serde_json::json!({
                    "event_result": "passed",
                    "reason": "no endpoint configured (log-only mode)",
                }),
            );
            audit.append(&body, &verdict.raw);
            return verdict;
        }

        let attempts = match op {
            Op::Create => 1,
            Op::Update => 2,
        };
        let mut last_error = None;
        for attempt in 0..attempts {
            match self.post_once(&body).await {
                Ok(verdict) => {
                    audit.append(&body, &verdict.raw);
                    return verdict;
                }
                Err(err) => {
                    let retryable = !matches!(
                        err,
                        PolicyError::Status { status, .. } if (400..500).contains(&status)
                    );
                    tracing::warn!(error = %err, attempt, "policy request failed");
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| PolicyError::Request {
            url: self.endpoint.clone(),
            message: "request never attempted".into(),
        });
        let verdict = self.failure_verdict(&error);
        audit.append(&body, &verdict.raw);
        verdict
    }

    async fn post_once(&self, body: &Value) -> Result<Verdict, PolicyError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .timeout(self.request_timeout)
            .json(body);
        if !self.api_key.is_empty() {
            request = request.header(reqwest::header::AUTHORIZATION, &self.api_key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                PolicyError::Timeout {
                    timeout_secs: self.request_timeout.as_secs(),
                }
            } else {
                PolicyError::Request {
                    url: self.endpoint.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PolicyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = response.json().await.unwrap_or(Value::Null);
        Ok(Verdict::from_response(raw))
    }

    /// Transport failures resolve per the fail-open policy; a client error
    /// (4xx) is our own payload's fault and always passes.
    fn failure_verdict(&self, error: &PolicyError) -> Verdict {
        let client_error =
            matches!(error, PolicyError::Status { status, .. } if (400..500).contains(status));
        if self.fail_open || client_error {
            Verdict::synthetic(
                PolicyResult::Passed,
                String::new(),
                "upstream-unavailable",
                serde_json::json!({
                    "event_result": "passed",
                    "reason": "upstream-unavailable",
                    "error": error.to_string(),
                    "fail_open": true,
                }),
            )
        } else {
            Verdict::synthetic(
                PolicyResult::Rejected,
                String::new(),
                &error.to_string(),
                serde_json::json!({
                    "event_result": "rejected",
                    "reason": error.to_string(),
                    "fail_open": false,
                }),
            )
        }
    }

    fn mock_verdict(&self, body: &Value, op: Op) -> Verdict {
        let field = match op {
            Op::Create => "input",
            Op::Update => "output",
        };
        let text = body
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let event_id = synthetic_event_id(body, op);
        match self.mock_tokens.iter().find(|token| text.contains(*token)) {
            Some(token) => {
                let reason = format!("blocked by token '{token}'");
                Verdict::synthetic(
                    PolicyResult::Blocked,
                    event_id.clone(),
                    &format!("Policy: mock_policy - {reason}"),
                    serde_json::json!({
                        "event_id": event_id,
                        "event_result": "blocked",
                        "policy": "mock_policy",
                        "reason": reason,
                    }),
                )
            }
            None => Verdict::synthetic(
                PolicyResult::Passed,
                event_id.clone(),
                "",
                serde_json::json!({
                    "event_id": event_id,
                    "event_result": "passed",
                    "reason": "mock pass",
                }),
            ),
        }
    }
}

/// UPDATEs keep their own event_id; CREATEs in offline modes mint one.
fn synthetic_event_id(body: &Value, op: Op) -> String {
    match op {
        Op::Update => body
            .get("event_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Op::Create => uuid::Uuid::new_v4().to_string(),
    }
}

/// Resolve the event endpoint from the configured base URL.
fn event_endpoint(api_url: &str) -> String {
    let trimmed = api_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.ends_with("/v1/event") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1/event")
    }
}

fn build_client(request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("hookwarden/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::payload::{base_metadata, create_payload, update_payload};
    use super::*;
    use crate::classify::EventClass;
    use serde_json::json;

    fn mock_config(tokens: &[&str]) -> RunConfig {
        RunConfig {
            mock_mode: true,
            mock_block_tokens: tokens.iter().map(ToString::to_string).collect(),
            log_path: std::env::temp_dir().join("hookwarden-test-events.jsonl"),
            ..RunConfig::default()
        }
    }

    fn audit(config: &RunConfig) -> AuditLog {
        AuditLog::new(config, "Test", "s1")
    }

    #[test]
    fn endpoint_resolution() {
        assert_eq!(event_endpoint(""), "");
        assert_eq!(
            event_endpoint("https://policy.example"),
            "https://policy.example/v1/event"
        );
        assert_eq!(
            event_endpoint("https://policy.example/v1/event/"),
            "https://policy.example/v1/event"
        );
    }

    #[test]
    fn verdict_parses_results_and_reason() {
        let verdict = Verdict::from_response(json!({
            "event_id": "evt-1",
            "event_result": "blocked",
            "policy": "pii",
            "reason": "ssn detected",
        }));
        assert_eq!(verdict.result, PolicyResult::Blocked);
        assert!(verdict.is_blocking());
        assert_eq!(verdict.event_id, "evt-1");
        assert_eq!(verdict.reason, "Policy: pii - ssn detected");
    }

    #[test]
    fn unknown_result_reads_as_passed() {
        let verdict = Verdict::from_response(json!({"event_result": "maybe?"}));
        assert_eq!(verdict.result, PolicyResult::Passed);
        let verdict = Verdict::from_response(json!({}));
        assert_eq!(verdict.result, PolicyResult::Passed);
    }

    #[test]
    fn rejected_is_blocking_but_distinct() {
        let verdict = Verdict::from_response(json!({"event_result": "rejected"}));
        assert_eq!(verdict.result, PolicyResult::Rejected);
        assert!(verdict.is_blocking());
    }

    #[tokio::test]
    async fn mock_blocks_on_create_input() {
        let config = mock_config(&["jailbreak"]);
        let client = PolicyClient::new(&config);
        let metadata = base_metadata(&config, "UserPromptSubmit", "s1");
        let payload = create_payload(
            &config,
            EventClass::UserAgent,
            "please JAILBREAK everything".into(),
            "s1",
            metadata,
        );
        let verdict = client.create(&payload, &audit(&config)).await;
        assert!(verdict.is_blocking());
        assert!(!verdict.event_id.is_empty());
        assert!(verdict.reason.contains("jailbreak"));
    }

    #[tokio::test]
    async fn mock_checks_output_on_update() {
        let config = mock_config(&["malware"]);
        let client = PolicyClient::new(&config);
        let metadata = base_metadata(&config, "PostToolUse", "s1");
        // Token present only in the input field of a prior CREATE; the UPDATE
        // inspects output and must pass.
        let payload = update_payload(
            &config,
            "evt-1".into(),
            EventClass::AgentTool,
            "clean result".into(),
            "s1",
            metadata,
        );
        let verdict = client.update(&payload, &audit(&config)).await;
        assert!(!verdict.is_blocking());
        assert_eq!(verdict.event_id, "evt-1");
    }

    #[tokio::test]
    async fn dry_run_passes_with_fresh_event_id() {
        let config = RunConfig {
            dry_run: true,
            log_path: std::env::temp_dir().join("hookwarden-test-events.jsonl"),
            ..RunConfig::default()
        };
        let client = PolicyClient::new(&config);
        let metadata = base_metadata(&config, "UserPromptSubmit", "s1");
        let payload = create_payload(&config, EventClass::UserAgent, "hi".into(), "s1", metadata);
        let verdict = client.create(&payload, &audit(&config)).await;
        assert_eq!(verdict.result, PolicyResult::Passed);
        assert!(!verdict.event_id.is_empty());
    }

    #[tokio::test]
    async fn disabled_short_circuits() {
        let config = RunConfig {
            enabled: false,
            api_url: "https://unreachable.invalid".into(),
            log_path: std::env::temp_dir().join("hookwarden-test-events.jsonl"),
            ..RunConfig::default()
        };
        let client = PolicyClient::new(&config);
        let metadata = base_metadata(&config, "UserPromptSubmit", "s1");
        let payload = create_payload(&config, EventClass::UserAgent, "hi".into(), "s1", metadata);
        let verdict = client.create(&payload, &audit(&config)).await;
        assert_eq!(verdict.result, PolicyResult::Passed);
        assert_eq!(verdict.raw["disabled"], true);
    }
}
