use super::{OpenEvent, StateStore, metadata_from_json, now_epoch};
use crate::classify::EventClass;
use anyhow::Context;
use rusqlite::{OptionalExtension, Row, params};

fn row_to_open_event(row: &Row<'_>) -> rusqlite::Result<OpenEvent> {
    let class_raw: String = row.get(1)?;
    let metadata_raw: String = row.get(5)?;
    Ok(OpenEvent {
        event_id: row.get(0)?,
        // Unknown class strings land in the telemetry bucket rather than erroring.
        event_class: EventClass::from_wire(&class_raw).unwrap_or(EventClass::AgentAgent),
        session_id: row.get(2)?,
        hook_name: row.get(3)?,
        input_content: row.get(4)?,
        metadata: metadata_from_json(&metadata_raw),
        created_at: row.get(6)?,
    })
}

const OPEN_EVENT_COLUMNS: &str =
    "event_id, event_class, session_id, hook_name, input_content, metadata_json, created_at";

impl StateStore {
    /// Insert an open event and, when given, its pairing link in one
    /// transaction. Replaces any stale row under the same key.
    pub fn insert_open_event(
        &mut self,
        event: &OpenEvent,
        link_key: Option<&str>,
    ) -> anyhow::Result<()> {
        let Some(conn) = self.connection_mut() else {
            return Ok(());
        };
        let metadata_json =
            serde_json::to_string(&event.metadata).context("serialize event metadata")?;
        let tx = conn.transaction().context("begin open-event transaction")?;
        tx.execute(
            "INSERT OR REPLACE INTO open_events VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.event_class.as_wire(),
                event.session_id,
                event.hook_name,
                event.input_content,
                metadata_json,
                event.created_at,
            ],
        )
        .context("insert open event")?;
        if let Some(key) = link_key {
            tx.execute(
                "INSERT OR REPLACE INTO links VALUES (?1, ?2, ?3, ?4)",
                params![event.session_id, key, event.event_id, now_epoch()],
            )
            .context("insert link")?;
        }
        tx.commit().context("commit open event")?;
        Ok(())
    }

    pub fn get_open_event(&self, event_id: &str) -> anyhow::Result<Option<OpenEvent>> {
        let Some(conn) = self.connection() else {
            return Ok(None);
        };
        conn.query_row(
            &format!("SELECT {OPEN_EVENT_COLUMNS} FROM open_events WHERE event_id = ?1"),
            params![event_id],
            row_to_open_event,
        )
        .optional()
        .context("query open event")
    }

    /// Remove an open event and any links pointing at it.
    pub fn remove_open_event(&mut self, event_id: &str) -> anyhow::Result<()> {
        let Some(conn) = self.connection_mut() else {
            return Ok(());
        };
        let tx = conn.transaction().context("begin close transaction")?;
        tx.execute(
            "DELETE FROM open_events WHERE event_id = ?1",
            params![event_id],
        )
        .context("delete open event")?;
        tx.execute("DELETE FROM links WHERE event_id = ?1", params![event_id])
            .context("delete event links")?;
        tx.commit().context("commit close")?;
        Ok(())
    }

    pub fn get_link(&self, session_id: &str, link_key: &str) -> anyhow::Result<Option<String>> {
        let Some(conn) = self.connection() else {
            return Ok(None);
        };
        conn.query_row(
            "SELECT event_id FROM links WHERE session_id = ?1 AND link_key = ?2",
            params![session_id, link_key],
            |row| row.get(0),
        )
        .optional()
        .context("query link")
    }

    /// Fetch and delete a link in one step.
    pub fn pop_link(&mut self, session_id: &str, link_key: &str) -> anyhow::Result<Option<String>> {
        let Some(conn) = self.connection_mut() else {
            return Ok(None);
        };
        let tx = conn.transaction().context("begin pop-link transaction")?;
        let event_id: Option<String> = tx
            .query_row(
                "SELECT event_id FROM links WHERE session_id = ?1 AND link_key = ?2",
                params![session_id, link_key],
                |row| row.get(0),
            )
            .optional()
            .context("query link for pop")?;
        if event_id.is_some() {
            tx.execute(
                "DELETE FROM links WHERE session_id = ?1 AND link_key = ?2",
                params![session_id, link_key],
            )
            .context("delete popped link")?;
        }
        tx.commit().context("commit pop-link")?;
        Ok(event_id)
    }

    /// Fetch and delete every open event (and link) for a session.
    pub fn drain_session(&mut self, session_id: &str) -> anyhow::Result<Vec<OpenEvent>> {
        let Some(conn) = self.connection_mut() else {
            return Ok(Vec::new());
        };
        let tx = conn.transaction().context("begin drain transaction")?;
        let events = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {OPEN_EVENT_COLUMNS} FROM open_events WHERE session_id = ?1
                     ORDER BY created_at"
                ))
                .context("prepare drain query")?;
            let rows = stmt
                .query_map(params![session_id], row_to_open_event)
                .context("query session open events")?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row.context("read open event row")?);
            }
            events
        };
        tx.execute(
            "DELETE FROM open_events WHERE session_id = ?1",
            params![session_id],
        )
        .context("delete session open events")?;
        tx.execute(
            "DELETE FROM links WHERE session_id = ?1",
            params![session_id],
        )
        .context("delete session links")?;
        tx.commit().context("commit drain")?;
        Ok(events)
    }
}
