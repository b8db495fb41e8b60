//! Durable cross-invocation state.
//!
//! Every hook event arrives in a fresh child process, so all pairing state
//! lives in a single SQLite file under the state directory: open INPUT events
//! awaiting their OUTPUT, the link keys that pair them, and per-transcript
//! cursors. Each invocation's critical section is short; SQLite's
//! per-transaction isolation is all the cross-process coordination needed.

mod cursors;
mod open_events;
mod schema;

use crate::classify::EventClass;
use crate::error::StateError;
use anyhow::Context;
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

/// Rows older than this are pruned opportunistically on each invocation.
pub const OPEN_EVENT_TTL_SECONDS: i64 = 1800;

/// One unclosed INPUT event.
#[derive(Debug, Clone)]
pub struct OpenEvent {
    pub event_id: String,
    pub event_class: EventClass,
    pub session_id: String,
    pub hook_name: String,
    pub input_content: String,
    pub metadata: Map<String, Value>,
    pub created_at: i64,
}

/// Handle over the embedded store.
///
/// When the underlying file cannot be opened the store degrades to a
/// stateless stub: writes become no-ops and reads come back empty, so the
/// invocation still completes one-shot and fail-open.
pub struct StateStore {
    conn: Option<Connection>,
}

impl StateStore {
    /// Open (or create) the database under `state_dir`.
    pub fn open(db_path: &Path) -> Self {
        match Self::try_open(db_path) {
            Ok(conn) => Self { conn: Some(conn) },
            Err(err) => {
                tracing::warn!(
                    path = %db_path.display(),
                    error = %err,
                    "state store unavailable; degrading to stateless operation"
                );
                Self { conn: None }
            }
        }
    }

    fn try_open(db_path: &Path) -> Result<Connection, StateError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| StateError::Open(format!("create state directory: {err}")))?;
        }
        let conn = Connection::open(db_path)
            .map_err(|err| StateError::Open(format!("open state database: {err}")))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|err| StateError::Sqlite(err.to_string()))?;
        schema::init_schema(&conn).map_err(|err| StateError::Sqlite(err.to_string()))?;
        Ok(conn)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| StateError::Open(format!("open in-memory state: {err}")))?;
        schema::init_schema(&conn).map_err(|err| StateError::Sqlite(err.to_string()))?;
        Ok(Self { conn: Some(conn) })
    }

    pub fn is_degraded(&self) -> bool {
        self.conn.is_none()
    }

    /// Delete rows past their TTL. Links die with their open event; cursors
    /// age out on their own update time.
    pub fn prune_stale(&mut self, ttl_seconds: i64) -> anyhow::Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(());
        };
        let threshold = now_epoch() - ttl_seconds;
        let tx = conn.transaction().context("begin prune transaction")?;
        tx.execute(
            "DELETE FROM links WHERE event_id IN
               (SELECT event_id FROM open_events WHERE created_at < ?1)",
            rusqlite::params![threshold],
        )
        .context("prune stale links")?;
        tx.execute(
            "DELETE FROM open_events WHERE created_at < ?1",
            rusqlite::params![threshold],
        )
        .context("prune stale open events")?;
        tx.execute(
            "DELETE FROM transcript_cursors WHERE updated_at < ?1",
            rusqlite::params![threshold],
        )
        .context("prune stale cursors")?;
        tx.commit().context("commit prune")?;
        Ok(())
    }

    fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.conn.as_mut()
    }
}

pub(crate) fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

fn metadata_from_json(raw: &str) -> Map<String, Value> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event(event_id: &str, session: &str) -> OpenEvent {
        let mut metadata = Map::new();
        metadata.insert("user_id".into(), json!("tester"));
        OpenEvent {
            event_id: event_id.into(),
            event_class: EventClass::AgentTool,
            session_id: session.into(),
            hook_name: "PreToolUse".into(),
            input_content: "{\"tool_name\":\"Bash\"}".into(),
            metadata,
            created_at: now_epoch(),
        }
    }

    #[test]
    fn open_event_round_trips() {
        let mut store = StateStore::in_memory().unwrap();
        store
            .insert_open_event(&sample_event("evt-1", "s1"), Some("tool:t1"))
            .unwrap();

        let fetched = store.get_open_event("evt-1").unwrap().unwrap();
        assert_eq!(fetched.event_class, EventClass::AgentTool);
        assert_eq!(fetched.hook_name, "PreToolUse");
        assert_eq!(fetched.metadata["user_id"], json!("tester"));
    }

    #[test]
    fn links_are_session_scoped() {
        let mut store = StateStore::in_memory().unwrap();
        store
            .insert_open_event(&sample_event("evt-a", "session-a"), Some("tool:t1"))
            .unwrap();
        store
            .insert_open_event(&sample_event("evt-b", "session-b"), Some("tool:t1"))
            .unwrap();

        // Identical tool_use_ids in different sessions never collide.
        assert_eq!(
            store.pop_link("session-a", "tool:t1").unwrap().as_deref(),
            Some("evt-a")
        );
        assert_eq!(
            store.get_link("session-b", "tool:t1").unwrap().as_deref(),
            Some("evt-b")
        );
    }

    #[test]
    fn pop_link_removes_the_row() {
        let mut store = StateStore::in_memory().unwrap();
        store
            .insert_open_event(&sample_event("evt-1", "s1"), Some("tool:t1"))
            .unwrap();
        assert!(store.pop_link("s1", "tool:t1").unwrap().is_some());
        assert!(store.pop_link("s1", "tool:t1").unwrap().is_none());
    }

    #[test]
    fn drain_returns_and_clears_session_rows() {
        let mut store = StateStore::in_memory().unwrap();
        store
            .insert_open_event(&sample_event("evt-1", "s1"), Some("tool:t1"))
            .unwrap();
        store
            .insert_open_event(&sample_event("evt-2", "s1"), Some("prompt:s1"))
            .unwrap();
        store
            .insert_open_event(&sample_event("evt-3", "s2"), None)
            .unwrap();

        let drained = store.drain_session("s1").unwrap();
        assert_eq!(drained.len(), 2);
        assert!(store.get_open_event("evt-1").unwrap().is_none());
        assert!(store.get_link("s1", "tool:t1").unwrap().is_none());
        // Other sessions are untouched.
        assert!(store.get_open_event("evt-3").unwrap().is_some());
    }

    #[test]
    fn cursors_default_to_minus_one_and_persist() {
        let mut store = StateStore::in_memory().unwrap();
        assert_eq!(store.cursor("s1", "/tmp/t.jsonl").unwrap(), -1);
        store.set_cursor("s1", "/tmp/t.jsonl", 4).unwrap();
        assert_eq!(store.cursor("s1", "/tmp/t.jsonl").unwrap(), 4);
        // Scoped by path as well as session.
        assert_eq!(store.cursor("s1", "/tmp/other.jsonl").unwrap(), -1);
    }

    #[test]
    fn clear_cursors_is_session_scoped() {
        let mut store = StateStore::in_memory().unwrap();
        store.set_cursor("s1", "/tmp/t.jsonl", 2).unwrap();
        store.set_cursor("s2", "/tmp/t.jsonl", 7).unwrap();
        store.clear_cursors("s1").unwrap();
        assert_eq!(store.cursor("s1", "/tmp/t.jsonl").unwrap(), -1);
        assert_eq!(store.cursor("s2", "/tmp/t.jsonl").unwrap(), 7);
    }

    #[test]
    fn prune_removes_only_aged_rows() {
        let mut store = StateStore::in_memory().unwrap();
        let mut old = sample_event("evt-old", "s1");
        old.created_at = now_epoch() - 10_000;
        store.insert_open_event(&old, Some("tool:old")).unwrap();
        store
            .insert_open_event(&sample_event("evt-new", "s1"), Some("tool:new"))
            .unwrap();

        store.prune_stale(OPEN_EVENT_TTL_SECONDS).unwrap();
        assert!(store.get_open_event("evt-old").unwrap().is_none());
        assert!(store.get_link("s1", "tool:old").unwrap().is_none());
        assert!(store.get_open_event("evt-new").unwrap().is_some());
    }

    #[test]
    fn unopenable_path_reports_open_error_then_degrades() {
        let dir = tempfile::tempdir().unwrap();
        // A file where a directory is needed makes the path uncreatable.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let db_path = blocker.join("nested").join("mediator.db");

        let err = StateStore::try_open(&db_path).unwrap_err();
        assert!(matches!(err, StateError::Open(_)));

        let store = StateStore::open(&db_path);
        assert!(store.is_degraded());
    }

    #[test]
    fn degraded_store_is_inert_but_ok() {
        let mut store = StateStore { conn: None };
        assert!(store.is_degraded());
        store
            .insert_open_event(&sample_event("evt-1", "s1"), Some("tool:t1"))
            .unwrap();
        assert!(store.get_open_event("evt-1").unwrap().is_none());
        assert!(store.drain_session("s1").unwrap().is_empty());
        assert_eq!(store.cursor("s1", "p").unwrap(), -1);
        store.set_cursor("s1", "p", 3).unwrap();
        store.prune_stale(60).unwrap();
    }
}
