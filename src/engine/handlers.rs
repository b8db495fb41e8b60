//! Handlers for the live (blockable) hook events and session cleanup.

use super::Mediator;
use crate::audit::AuditLog;
use crate::classify::{self, EventClass};
use crate::decision::Decision;
use crate::envelope::HookEnvelope;
use crate::normalize::normalize_value;
use crate::policy::payload::{base_metadata, create_payload, update_payload};
use crate::state::{OpenEvent, now_epoch};
use serde_json::json;

impl Mediator {
    /// UserPromptSubmit: open the session's user↔agent pair. The OUTPUT half
    /// arrives later, at Stop.
    pub(super) async fn handle_user_prompt(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        let prompt = {
            let primary = envelope.field("prompt");
            if primary.is_empty() {
                envelope.field("user_prompt").to_string()
            } else {
                primary.to_string()
            }
        };
        let session_id = &envelope.session_id;
        let mut metadata = base_metadata(&self.config, &envelope.hook_name, session_id);
        metadata.insert("source".into(), json!("user_prompt_submit"));

        let input = self.cap(&prompt);
        let payload = create_payload(
            &self.config,
            EventClass::UserAgent,
            input.clone(),
            session_id,
            metadata.clone(),
        );
        let verdict = self.client.create(&payload, audit).await;

        if !verdict.event_id.is_empty() {
            self.store.insert_open_event(
                &OpenEvent {
                    event_id: verdict.event_id.clone(),
                    event_class: EventClass::UserAgent,
                    session_id: session_id.clone(),
                    hook_name: envelope.hook_name.clone(),
                    input_content: input,
                    metadata,
                    created_at: now_epoch(),
                },
                Some(&format!("prompt:{session_id}")),
            )?;
        }

        if self.enforce() && verdict.is_blocking() {
            let reason = verdict.reason_or("User prompt blocked by policy.");
            return self
                .refuse(&envelope.hook_name, session_id, reason, audit)
                .await;
        }
        Ok(Decision::Allow)
    }

    /// PreToolUse: open the tool pair keyed by tool_use_id.
    pub(super) async fn handle_pre_tool(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        let tool_name = envelope.field("tool_name").to_string();
        let Some(event_class) = classify::classify_tool(&tool_name) else {
            return Ok(Decision::Allow);
        };
        let session_id = &envelope.session_id;
        let tool_use_id = envelope.field("tool_use_id").to_string();

        let content = json!({
            "tool_name": tool_name,
            "tool_input": envelope.value("tool_input"),
            "tool_use_id": tool_use_id,
        });
        let input = normalize_value(&content, self.config.max_content_chars);
        let metadata = self.tool_metadata(envelope, &tool_name, &tool_use_id);

        let payload = create_payload(
            &self.config,
            event_class,
            input.clone(),
            session_id,
            metadata.clone(),
        );
        let verdict = self.client.create(&payload, audit).await;

        if !verdict.event_id.is_empty() {
            let link_key = (!tool_use_id.is_empty()).then(|| format!("tool:{tool_use_id}"));
            self.store.insert_open_event(
                &OpenEvent {
                    event_id: verdict.event_id.clone(),
                    event_class,
                    session_id: session_id.clone(),
                    hook_name: envelope.hook_name.clone(),
                    input_content: input.clone(),
                    metadata: metadata.clone(),
                    created_at: now_epoch(),
                },
                link_key.as_deref(),
            )?;
        }

        if self.enforce() && verdict.is_blocking() {
            let reason = verdict.reason_or("Tool call blocked by policy.");
            // Close the just-opened pair with the reason before draining the rest.
            if !verdict.event_id.is_empty() {
                let close = update_payload(
                    &self.config,
                    verdict.event_id.clone(),
                    event_class,
                    self.cap(&reason),
                    session_id,
                    metadata,
                );
                self.client.update(&close, audit).await;
                self.store.remove_open_event(&verdict.event_id)?;
            }
            return self
                .refuse(&envelope.hook_name, session_id, reason, audit)
                .await;
        }
        Ok(Decision::Allow)
    }

    /// PostToolUse / PostToolUseFailure: close the tool pair. A missing link
    /// degrades to a one-shot so the OUTPUT is still observed.
    pub(super) async fn handle_post_tool(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        let session_id = &envelope.session_id;
        let tool_use_id = envelope.field("tool_use_id").to_string();
        if tool_use_id.is_empty() {
            return Ok(Decision::Allow);
        }
        let failed = envelope.hook_name == "PostToolUseFailure";

        let output_value = if failed {
            json!({
                "error": envelope
                    .body
                    .get("error")
                    .cloned()
                    .unwrap_or(json!("unknown error")),
                "is_interrupt": envelope.flag("is_interrupt"),
            })
        } else {
            envelope.value("tool_response")
        };
        let output = normalize_value(&output_value, self.config.max_content_chars);

        let link_key = format!("tool:{tool_use_id}");
        let paired = match self.store.pop_link(session_id, &link_key)? {
            Some(event_id) => self.store.get_open_event(&event_id)?,
            None => None,
        };

        let Some(open_event) = paired else {
            // No INPUT half to pair with; emit the output one-shot.
            let tool_name = envelope.field("tool_name").to_string();
            let content = json!({"tool_name": tool_name, "tool_use_id": tool_use_id});
            let verdict = self
                .one_shot(
                    envelope,
                    classify::classify_tool(&tool_name).unwrap_or(EventClass::AgentTool),
                    &content,
                    &output,
                    "unpaired_tool_result",
                    None,
                    audit,
                )
                .await?;
            if self.enforce() && !failed && verdict.is_blocking() {
                let reason = verdict.reason_or("Tool result blocked by policy.");
                return self
                    .refuse(&envelope.hook_name, session_id, reason, audit)
                    .await;
            }
            return Ok(Decision::Allow);
        };

        let payload = update_payload(
            &self.config,
            open_event.event_id.clone(),
            open_event.event_class,
            output,
            &open_event.session_id,
            open_event.metadata.clone(),
        );
        let verdict = self.client.update(&payload, audit).await;
        self.store.remove_open_event(&open_event.event_id)?;

        // The tool already failed; PostToolUseFailure is observe-only.
        if self.enforce() && !failed && verdict.is_blocking() {
            let reason = verdict.reason_or("Tool result blocked by policy.");
            return self
                .refuse(&envelope.hook_name, session_id, reason, audit)
                .await;
        }
        Ok(Decision::Allow)
    }

    /// PermissionRequest: a one-shot pair, exactly one CREATE then one UPDATE.
    pub(super) async fn handle_permission(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        let tool_name = envelope.field("tool_name").to_string();
        let event_class =
            classify::classify_tool(&tool_name).unwrap_or(EventClass::AgentTool);
        let content = json!({
            "tool_name": tool_name,
            "tool_input": envelope.value("tool_input"),
            "permission_suggestions": envelope.value("permission_suggestions"),
        });
        let request_id = envelope.field("request_id").to_string();
        let link_key =
            (!request_id.is_empty()).then(|| format!("permission:{request_id}"));

        let verdict = self
            .one_shot(
                envelope,
                event_class,
                &content,
                "[permission_reviewed]",
                "permission_request",
                link_key.as_deref(),
                audit,
            )
            .await?;

        if self.enforce() && verdict.is_blocking() {
            let reason = verdict.reason_or("Permission request blocked by policy.");
            return self
                .refuse(&envelope.hook_name, &envelope.session_id, reason, audit)
                .await;
        }
        Ok(Decision::Allow)
    }

    /// SessionEnd: force-close everything the session left open, drop its
    /// cursors, record the lifecycle event. Never blocks.
    pub(super) async fn handle_session_end(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        let session_id = envelope.session_id.clone();
        self.close_all_for_session(&session_id, "[session_end]", audit)
            .await?;
        self.store.clear_cursors(&session_id)?;

        let content = json!({
            "hook_event_name": "SessionEnd",
            "session_id": session_id,
            "reason": envelope.value("reason"),
        });
        self.one_shot(
            envelope,
            EventClass::AgentAgent,
            &content,
            "[session_closed]",
            "session_end",
            None,
            audit,
        )
        .await?;
        Ok(Decision::Allow)
    }
}
