use super::{StateStore, now_epoch};
use anyhow::Context;
use rusqlite::{OptionalExtension, params};

impl StateStore {
    /// Last emitted turn index for `(session, transcript)`, `-1` when none.
    pub fn cursor(&self, session_id: &str, transcript_path: &str) -> anyhow::Result<i64> {
        let Some(conn) = self.connection() else {
            return Ok(-1);
        };
        let idx: Option<i64> = conn
            .query_row(
                "SELECT last_turn_idx FROM transcript_cursors
                 WHERE session_id = ?1 AND transcript_path = ?2",
                params![session_id, transcript_path],
                |row| row.get(0),
            )
            .optional()
            .context("query transcript cursor")?;
        Ok(idx.unwrap_or(-1))
    }

    pub fn set_cursor(
        &mut self,
        session_id: &str,
        transcript_path: &str,
        last_turn_idx: i64,
    ) -> anyhow::Result<()> {
        let Some(conn) = self.connection_mut() else {
            return Ok(());
        };
        conn.execute(
            "INSERT OR REPLACE INTO transcript_cursors VALUES (?1, ?2, ?3, ?4)",
            params![session_id, transcript_path, last_turn_idx, now_epoch()],
        )
        .context("set transcript cursor")?;
        Ok(())
    }

    pub fn clear_cursors(&mut self, session_id: &str) -> anyhow::Result<()> {
        let Some(conn) = self.connection_mut() else {
            return Ok(());
        };
        conn.execute(
            "DELETE FROM transcript_cursors WHERE session_id = ?1",
            params![session_id],
        )
        .context("clear session cursors")?;
        Ok(())
    }
}
