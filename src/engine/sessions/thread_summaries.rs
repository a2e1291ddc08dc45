// Paw Agent Engine — Thread Summary storage
// One row per thread, overwritten by each compaction pass.

use super::SessionStore;
use crate::atoms::error::EngineResult;
use crate::atoms::types::ThreadSummary;
use rusqlite::{params, OptionalExtension};

impl SessionStore {
    pub fn save_thread_summary(&self, summary: &ThreadSummary) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO thread_summaries (thread_id, short_summary, long_summary, covers_through_message_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(thread_id) DO UPDATE SET
                short_summary = excluded.short_summary,
                long_summary = excluded.long_summary,
                covers_through_message_id = excluded.covers_through_message_id,
                created_at = datetime('now')",
            params![summary.thread_id, summary.short_summary, summary.long_summary, summary.covers_through_message_id],
        )?;
        Ok(())
    }

    pub fn get_thread_summary(&self, thread_id: &str) -> EngineResult<Option<ThreadSummary>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT thread_id, short_summary, long_summary, covers_through_message_id, created_at
             FROM thread_summaries WHERE thread_id = ?1",
            params![thread_id],
            |row| {
                Ok(ThreadSummary {
                    thread_id: row.get(0)?,
                    short_summary: row.get(1)?,
                    long_summary: row.get(2)?,
                    covers_through_message_id: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(crate::atoms::error::EngineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn save_then_overwrite() {
        let conn = Connection::open_in_memory().unwrap();
        crate::engine::sessions::schema_for_testing(&conn);
        let store = SessionStore { conn: parking_lot::Mutex::new(conn) };
        let s1 = ThreadSummary {
            thread_id: "t1".into(), short_summary: "a".into(), long_summary: "aa".into(),
            covers_through_message_id: "m1".into(), created_at: String::new(),
        };
        store.save_thread_summary(&s1).unwrap();
        let s2 = ThreadSummary {
            thread_id: "t1".into(), short_summary: "b".into(), long_summary: "bb".into(),
            covers_through_message_id: "m2".into(), created_at: String::new(),
        };
        store.save_thread_summary(&s2).unwrap();
        let got = store.get_thread_summary("t1").unwrap().unwrap();
        assert_eq!(got.short_summary, "b");
        assert_eq!(got.covers_through_message_id, "m2");
    }
}
