//! Stop-boundary handlers: transcript-derived model turns and prompt closure.

use super::Mediator;
use crate::audit::AuditLog;
use crate::classify::{self, EventClass};
use crate::decision::Decision;
use crate::envelope::HookEnvelope;
use crate::policy::payload::{base_metadata, create_payload, update_payload};
use crate::state::{OpenEvent, now_epoch};
use crate::transcript;
use serde_json::json;
use std::path::Path;

impl Mediator {
    /// Stop: emit any model turns past the cursor, then close the session's
    /// prompt pair with the final assistant text.
    pub(super) async fn handle_stop(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        if envelope.flag("stop_hook_active") {
            return Ok(Decision::Allow);
        }

        if let Some(decision) = self.emit_transcript_turns(envelope, audit).await? {
            return Ok(decision);
        }

        if let Some(decision) = self.close_prompt_pair(envelope, audit).await? {
            return Ok(decision);
        }
        Ok(Decision::Allow)
    }

    /// SubagentStop: same shape as Stop, scoped to the subagent's transcript,
    /// plus an agent↔agent capture of its final turn.
    pub(super) async fn handle_subagent_stop(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Decision> {
        if envelope.flag("stop_hook_active") {
            return Ok(Decision::Allow);
        }

        if let Some(decision) = self.emit_transcript_turns(envelope, audit).await? {
            return Ok(decision);
        }

        if let Some(decision) = self.close_prompt_pair(envelope, audit).await? {
            return Ok(decision);
        }

        let final_turn = envelope
            .transcript_path
            .as_deref()
            .and_then(|path| read_last_turn(Path::new(path)));
        if let Some(turn) = final_turn
            && (!turn.input.is_empty() || !turn.output.is_empty())
        {
            let content = json!({
                "agent_id": envelope.value("agent_id"),
                "llm_input": self.cap(&turn.input),
                "llm_output": self.cap(&turn.output),
            });
            let verdict = self
                .one_shot(
                    envelope,
                    EventClass::AgentAgent,
                    &content,
                    "[subagent_stop_captured]",
                    "subagent_stop",
                    None,
                    audit,
                )
                .await?;
            if self.enforce() && verdict.is_blocking() {
                let reason = verdict.reason_or("Subagent result blocked by policy.");
                return self
                    .refuse(&envelope.hook_name, &envelope.session_id, reason, audit)
                    .await;
            }
        }
        Ok(Decision::Allow)
    }

    /// Close the `prompt:<session>` pair with the newest assistant text.
    async fn close_prompt_pair(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Option<Decision>> {
        let session_id = envelope.session_id.clone();
        let link_key = format!("prompt:{session_id}");
        let Some(event_id) = self.store.pop_link(&session_id, &link_key)? else {
            return Ok(None);
        };
        let Some(open_event) = self.store.get_open_event(&event_id)? else {
            return Ok(None);
        };

        let final_text = envelope
            .transcript_path
            .as_deref()
            .and_then(|path| read_last_turn(Path::new(path)))
            .map(|turn| turn.output)
            .filter(|output| !output.is_empty())
            .unwrap_or_else(|| "No response".to_string());

        let payload = update_payload(
            &self.config,
            open_event.event_id.clone(),
            open_event.event_class,
            self.cap(&final_text),
            &open_event.session_id,
            open_event.metadata.clone(),
        );
        let verdict = self.client.update(&payload, audit).await;
        self.store.remove_open_event(&open_event.event_id)?;

        if self.enforce() && verdict.is_blocking() {
            let reason = verdict.reason_or("Final response blocked by policy.");
            let decision = self
                .refuse(&envelope.hook_name, &session_id, reason, audit)
                .await?;
            return Ok(Some(decision));
        }
        Ok(None)
    }

    /// Emit every transcript turn past the cursor as an agt_llm observation.
    ///
    /// The cursor advances with each turn actually emitted, so a mid-batch
    /// failure resumes exactly where it left off. Local-only mode writes
    /// synthetic audit records and never POSTs.
    async fn emit_transcript_turns(
        &mut self,
        envelope: &HookEnvelope,
        audit: &AuditLog,
    ) -> anyhow::Result<Option<Decision>> {
        let Some(transcript_path) = envelope.transcript_path.clone() else {
            return Ok(None);
        };
        let session_id = envelope.session_id.clone();

        let cursor = self.store.cursor(&session_id, &transcript_path)?;
        let pending = match transcript::turns_after(Path::new(&transcript_path), cursor) {
            Ok(pending) => pending,
            Err(err) => {
                // Unreadable transcript: leave the cursor so nothing is skipped.
                tracing::warn!(error = %err, "transcript unreadable; no turns emitted");
                return Ok(None);
            }
        };
        if pending.is_empty() {
            return Ok(None);
        }

        audit.trace(
            "llm_turn_scan",
            json!({
                "transcript_path": transcript_path,
                "cursor": cursor,
                "turns_pending": pending.len(),
            }),
        );

        let local_only = self.config.llm_transcript_local_only;
        for turn in pending {
            let mut metadata =
                base_metadata(&self.config, &envelope.hook_name, &session_id);
            metadata.insert("source".into(), json!("transcript_turn"));
            metadata.insert("transcript_path".into(), json!(transcript_path));
            metadata.insert("llm_turn_index".into(), json!(turn.index));

            let input = self.cap(&turn.input);
            let output = self.cap(&turn.output);

            if local_only {
                let create = create_payload(
                    &self.config,
                    EventClass::AgentLlm,
                    input,
                    &session_id,
                    metadata.clone(),
                );
                let update = update_payload(
                    &self.config,
                    format!("local-llm-{}", turn.index),
                    EventClass::AgentLlm,
                    output,
                    &session_id,
                    metadata,
                );
                let reason = "transcript reconstruction (local-only mode)";
                audit.append_synthetic(&serde_json::to_value(&create)?, "llm_local_only", reason);
                audit.append_synthetic(&serde_json::to_value(&update)?, "llm_local_only", reason);
                self.store
                    .set_cursor(&session_id, &transcript_path, turn.index as i64)?;
                continue;
            }

            let create = create_payload(
                &self.config,
                EventClass::AgentLlm,
                input.clone(),
                &session_id,
                metadata.clone(),
            );
            let create_verdict = self.client.create(&create, audit).await;
            if create_verdict.event_id.is_empty() {
                // CREATE failed; leave the cursor so this turn is retried.
                break;
            }

            self.store.insert_open_event(
                &OpenEvent {
                    event_id: create_verdict.event_id.clone(),
                    event_class: EventClass::AgentLlm,
                    session_id: session_id.clone(),
                    hook_name: envelope.hook_name.clone(),
                    input_content: input,
                    metadata: metadata.clone(),
                    created_at: now_epoch(),
                },
                Some(&format!("llm:{}", turn.index)),
            )?;

            let closing_output = if create_verdict.is_blocking() {
                self.cap(&create_verdict.reason_or("Model input blocked by policy."))
            } else {
                output
            };
            let update = update_payload(
                &self.config,
                create_verdict.event_id.clone(),
                EventClass::AgentLlm,
                closing_output,
                &session_id,
                metadata,
            );
            let update_verdict = self.client.update(&update, audit).await;
            self.store.remove_open_event(&create_verdict.event_id)?;
            self.store
                .set_cursor(&session_id, &transcript_path, turn.index as i64)?;

            let blocking = create_verdict.is_blocking() || update_verdict.is_blocking();
            if self.enforce()
                && blocking
                && classify::is_block_capable(&envelope.hook_name)
            {
                let reason = if update_verdict.is_blocking() {
                    update_verdict.reason_or("Model output blocked by policy.")
                } else {
                    create_verdict.reason_or("Model input blocked by policy.")
                };
                let decision = self
                    .refuse(&envelope.hook_name, &session_id, reason, audit)
                    .await?;
                return Ok(Some(decision));
            }
        }
        Ok(None)
    }
}

/// The newest turn, or `None` when the transcript is absent or unreadable;
/// closing paths fall back to placeholder text rather than failing.
fn read_last_turn(path: &Path) -> Option<crate::transcript::Turn> {
    match transcript::last_turn(path) {
        Ok(turn) => turn,
        Err(err) => {
            tracing::warn!(error = %err, "transcript unreadable; no final turn");
            None
        }
    }
}
