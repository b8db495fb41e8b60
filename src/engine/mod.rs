//! The mediation engine.
//!
//! One [`Mediator`] is built per invocation. It owns the run configuration,
//! the durable state store, and the policy client, and turns a hook envelope
//! into the host-facing decision: open INPUT events, close them with their
//! OUTPUT halves, reconstruct model turns, and enforce any blocking verdict
//! by draining the session's open events before answering the host.

mod handlers;
mod turns;

use crate::audit::AuditLog;
use crate::classify::{self, EventClass};
use crate::config::RunConfig;
use crate::decision::Decision;
use crate::envelope::HookEnvelope;
use crate::normalize::{cap_text, normalize_value};
use crate::policy::payload::{base_metadata, create_payload, update_payload};
use crate::policy::{PolicyClient, PolicyResult, Verdict};
use crate::state::{OPEN_EVENT_TTL_SECONDS, OpenEvent, StateStore, now_epoch};
use serde_json::{Map, Value, json};

pub struct Mediator {
    config: RunConfig,
    store: StateStore,
    client: PolicyClient,
}

impl Mediator {
    pub fn new(config: RunConfig) -> Self {
        let store = StateStore::open(&config.state_db_path());
        let client = PolicyClient::new(&config);
        Self {
            config,
            store,
            client,
        }
    }

    /// Mediate one hook invocation end to end.
    pub async fn handle(&mut self, envelope: &HookEnvelope) -> Decision {
        let audit = AuditLog::new(&self.config, &envelope.hook_name, &envelope.session_id);
        audit.trace(
            "start",
            json!({"tiny_debug_mode": self.config.tiny_debug_mode}),
        );

        if let Err(err) = self.store.prune_stale(OPEN_EVENT_TTL_SECONDS) {
            tracing::warn!(error = %err, "stale-row prune failed");
        }

        if !self.config.enabled {
            audit.trace("skip", json!({"reason": "disabled"}));
            return Decision::Allow;
        }

        if self.config.tiny_debug_mode && !classify::in_tiny_debug_set(&envelope.hook_name) {
            audit.trace("skip", json!({"reason": "tiny_debug_mode"}));
            return Decision::Allow;
        }

        audit.preview(&envelope.body);

        let decision = match self.dispatch(envelope, &audit).await {
            Ok(decision) => decision,
            Err(err) => {
                // Handler errors never reach the host; fail-open to allow.
                tracing::error!(hook = %envelope.hook_name, error = %err, "handler failed");
                audit.trace("error", json!({"error": err.to_string()}));
                Decision::Allow
            }
        };

        audit.trace("end", json!({"decision": decision.to_json()}));
        decision
    }

    async fn dispatch(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        match envelope.hook_name.as_str() {
            "UserPromptSubmit" => self.handle_user_prompt(envelope, audit).await,
            "PreToolUse" => self.handle_pre_tool(envelope, audit).await,
            "PostToolUse" | "PostToolUseFailure" => self.handle_post_tool(envelope, audit).await,
            "PermissionRequest" => self.handle_permission(envelope, audit).await,
            "Stop" => self.handle_stop(envelope, audit).await,
            "SubagentStop" => self.handle_subagent_stop(envelope, audit).await,
            "SessionEnd" => self.handle_session_end(envelope, audit).await,
            _ => self.handle_telemetry(envelope, audit).await,
        }
    }

    fn enforce(&self) -> bool {
        self.config.mode.is_enforce()
    }

    fn cap(&self, text: &str) -> String {
        cap_text(text, self.config.max_content_chars)
    }

    /// Apply a blocking verdict: drain every open event for the session,
    /// closing each with the policy reason, then answer the host.
    async fn refuse(
        &mut self,
        hook_name: &str,
        session_id: &str,
        reason: String,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        self.close_all_for_session(session_id, &reason, audit)
            .await?;
        Ok(Decision::refusal_for(hook_name, reason))
    }

    async fn close_all_for_session(
        &mut self,
        session_id: &str,
        output_text: &str,
        audit: &AuditLog,
    ) -> anyhow::Result<()> {
        let output = self.cap(output_text);
        for event in self.store.drain_session(session_id)? {
            let payload = update_payload(
                &self.config,
                event.event_id.clone(),
                event.event_class,
                output.clone(),
                &event.session_id,
                event.metadata.clone(),
            );
            self.client.update(&payload, audit).await;
        }
        Ok(())
    }

    /// CREATE an event and immediately UPDATE it closed.
    ///
    /// Telemetry-only hooks with `skip_telemetry_api_send` produce local
    /// synthetic records and never touch the Policy Client. A blocked CREATE
    /// closes with the policy reason instead of the ack text.
    async fn one_shot(
        &mut self,
        envelope: &HookEnvelope,
        event_class: EventClass,
        content: &Value,
        output_text: &str,
        source: &str,
        link_key: Option<&str>,
        audit: &AuditLog,
    ) -> anyhow::Result<Verdict> {
        let session_id = &envelope.session_id;
        let mut metadata = base_metadata(&self.config, &envelope.hook_name, session_id);
        metadata.insert("source".into(), json!(source));
        let input = normalize_value(content, self.config.max_content_chars);

        let skip_api = self.config.skip_telemetry_api_send
            && classify::is_telemetry_hook(&envelope.hook_name);
        if skip_api {
            let create = create_payload(
                &self.config,
                event_class,
                input.clone(),
                session_id,
                metadata.clone(),
            );
            let update = update_payload(
                &self.config,
                format!("local-{}", envelope.hook_name),
                event_class,
                output_text.to_string(),
                session_id,
                metadata,
            );
            let reason = "telemetry-only hook";
            audit.append_synthetic(
                &serde_json::to_value(&create)?,
                "telemetry_skipped",
                reason,
            );
            audit.append_synthetic(
                &serde_json::to_value(&update)?,
                "telemetry_skipped",
                reason,
            );
            return Ok(Verdict {
                result: PolicyResult::Passed,
                reason: String::new(),
                event_id: String::new(),
                raw: json!({"event_result": "telemetry_skipped"}),
            });
        }

        let create = create_payload(
            &self.config,
            event_class,
            input.clone(),
            session_id,
            metadata.clone(),
        );
        let create_verdict = self.client.create(&create, audit).await;
        if create_verdict.event_id.is_empty() {
            return Ok(create_verdict);
        }

        self.store.insert_open_event(
            &OpenEvent {
                event_id: create_verdict.event_id.clone(),
                event_class,
                session_id: session_id.clone(),
                hook_name: envelope.hook_name.clone(),
                input_content: input,
                metadata: metadata.clone(),
                created_at: now_epoch(),
            },
            link_key,
        )?;

        let output = if create_verdict.is_blocking() {
            create_verdict.reason_or("blocked by policy")
        } else {
            output_text.to_string()
        };
        let update = update_payload(
            &self.config,
            create_verdict.event_id.clone(),
            event_class,
            self.cap(&output),
            session_id,
            metadata,
        );
        let update_verdict = self.client.update(&update, audit).await;
        self.store.remove_open_event(&create_verdict.event_id)?;

        if update_verdict.is_blocking() {
            Ok(update_verdict)
        } else {
            Ok(create_verdict)
        }
    }

    /// Telemetry and unknown hooks: one-shot into the agt_agt bucket.
    async fn handle_telemetry(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        let (content, output_text, source) = telemetry_projection(envelope);
        let verdict = self
            .one_shot(
                envelope,
                EventClass::AgentAgent,
                &content,
                output_text,
                source,
                None,
                audit,
            )
            .await?;

        if self.enforce()
            && classify::is_block_capable(&envelope.hook_name)
            && verdict.is_blocking()
        {
            let reason =
                verdict.reason_or(&format!("{} blocked by policy.", envelope.hook_name));
            return self
                .refuse(&envelope.hook_name, &envelope.session_id, reason, audit)
                .await;
        }
        Ok(Decision::Allow)
    }

    fn tool_metadata(&self, envelope: &HookEnvelope, tool_name: &str, tool_use_id: &str) -> Map<String, Value> {
        let mut metadata = base_metadata(&self.config, &envelope.hook_name, &envelope.session_id);
        metadata.insert("tool_name".into(), json!(tool_name));
        metadata.insert("tool_use_id".into(), json!(tool_use_id));
        metadata
    }
}

/// Content projection, ack text, and source tag for lifecycle hooks.
///
/// Each known telemetry hook keeps a narrow, stable shape; anything the host
/// invents later falls through with its whole body.
fn telemetry_projection(envelope: &HookEnvelope) -> (Value, &'static str, &'static str) {
    let body = &envelope.body;
    let session = json!(envelope.session_id);
    match envelope.hook_name.as_str() {
        "Setup" => (
            json!({
                "hook_event_name": "Setup",
                "session_id": session,
                "cwd": body.get("cwd").cloned().unwrap_or(json!("")),
                "argv": body.get("argv").cloned().unwrap_or(json!([])),
            }),
            "[setup_ack]",
            "setup",
        ),
        "SessionStart" => (
            json!({
                "hook_event_name": "SessionStart",
                "session_id": session,
                "source": body.get("source").cloned().unwrap_or(json!("")),
                "resume": body.get("resume").cloned().unwrap_or(json!(false)),
            }),
            "[session_started]",
            "session_start",
        ),
        "Notification" => (
            json!({
                "hook_event_name": "Notification",
                "session_id": session,
                "message": body.get("message").cloned().unwrap_or(json!("")),
                "level": body.get("level").cloned().unwrap_or(json!("")),
            }),
            "[notification_ack]",
            "notification",
        ),
        "TeammateIdle" => (
            json!({
                "hook_event_name": "TeammateIdle",
                "session_id": session,
                "teammate_id": body.get("teammate_id").cloned().unwrap_or(json!("")),
                "idle_seconds": body.get("idle_seconds").cloned().unwrap_or(json!(0)),
            }),
            "[teammate_idle_seen]",
            "teammate_idle",
        ),
        "TaskCompleted" => (
            json!({
                "hook_event_name": "TaskCompleted",
                "session_id": session,
                "task_id": body.get("task_id").cloned().unwrap_or(json!("")),
                "status": body.get("status").cloned().unwrap_or(json!("")),
                "summary": body.get("summary").cloned().unwrap_or(json!("")),
            }),
            "[task_completed_seen]",
            "task_completed",
        ),
        "ConfigChange" => (
            json!({
                "hook_event_name": "ConfigChange",
                "session_id": session,
                "changed_keys": body.get("changed_keys").cloned().unwrap_or(json!([])),
                "change_source": body.get("source").cloned().unwrap_or(json!("")),
            }),
            "[config_change_seen]",
            "config_change",
        ),
        "WorktreeCreate" => (
            json!({
                "hook_event_name": "WorktreeCreate",
                "session_id": session,
                "worktree_path": body.get("worktree_path").cloned().unwrap_or(json!("")),
                "branch": body.get("branch").cloned().unwrap_or(json!("")),
            }),
            "[worktree_created]",
            "worktree_create",
        ),
        "WorktreeRemove" => (
            json!({
                "hook_event_name": "WorktreeRemove",
                "session_id": session,
                "worktree_path": body.get("worktree_path").cloned().unwrap_or(json!("")),
            }),
            "[worktree_removed]",
            "worktree_remove",
        ),
        "PreCompact" => (
            json!({
                "hook_event_name": "PreCompact",
                "session_id": session,
                "transcript_path": body.get("transcript_path").cloned().unwrap_or(json!("")),
                "estimated_tokens": body.get("estimated_tokens").cloned().unwrap_or(json!("")),
            }),
            "[precompact_seen]",
            "precompact",
        ),
        _ => (body.clone(), "[ack]", "generic_hook"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(hook: &str, body: Value) -> HookEnvelope {
        let mut body = body;
        body["hook_event_name"] = json!(hook);
        HookEnvelope::from_value(body, None).unwrap()
    }

    #[test]
    fn known_telemetry_hooks_project_narrow_content() {
        let envelope = envelope(
            "Notification",
            json!({"session_id": "s1", "message": "hi", "level": "info", "noise": "dropped"}),
        );
        let (content, output_text, source) = telemetry_projection(&envelope);
        assert_eq!(content["message"], "hi");
        assert!(content.get("noise").is_none());
        assert_eq!(output_text, "[notification_ack]");
        assert_eq!(source, "notification");
    }

    #[test]
    fn unknown_hooks_carry_their_whole_body() {
        let envelope = envelope("BrandNewHook", json!({"session_id": "s1", "anything": 42}));
        let (content, output_text, source) = telemetry_projection(&envelope);
        assert_eq!(content["anything"], 42);
        assert_eq!(output_text, "[ack]");
        assert_eq!(source, "generic_hook");
    }
}
