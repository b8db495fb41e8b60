use anyhow::Context;
use rusqlite::Connection;

pub(super) fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS open_events (
            event_id      TEXT PRIMARY KEY,
            event_class   TEXT NOT NULL,
            session_id    TEXT NOT NULL,
            hook_name     TEXT NOT NULL,
            input_content TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            created_at    INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_open_events_session
            ON open_events(session_id);
        CREATE INDEX IF NOT EXISTS idx_open_events_created
            ON open_events(created_at);

        CREATE TABLE IF NOT EXISTS links (
            session_id TEXT NOT NULL,
            link_key   TEXT NOT NULL,
            event_id   TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (session_id, link_key)
        );
        CREATE INDEX IF NOT EXISTS idx_links_event ON links(event_id);

        CREATE TABLE IF NOT EXISTS transcript_cursors (
            session_id      TEXT NOT NULL,
            transcript_path TEXT NOT NULL,
            last_turn_idx   INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL,
            PRIMARY KEY (session_id, transcript_path)
        );",
    )
    .context("initialize state schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, table_name: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                rusqlite::params![table_name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn init_schema_creates_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        for table in ["open_events", "links", "transcript_cursors"] {
            assert!(table_exists(&conn, table));
        }
    }

    #[test]
    fn init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }
}
