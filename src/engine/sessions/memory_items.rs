// Paw Agent Engine — Memory Service storage
//
// Backing store for `engine::memory_service`: thread-scoped, optionally
// chunked items with an embedding, full-text index, and recency. Kept
// separate from `memories.rs` (the simpler agent-scoped memory table used
// by `engine::memory`) the same way `state_store.rs` stays separate from
// both — each storage concern gets its own file under `impl SessionStore`.

use super::embedding::{bytes_to_f32_vec, cosine_similarity};
use super::SessionStore;
use crate::atoms::error::EngineResult;
use rusqlite::params;
use serde_json::Value;

#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryItem {
    pub id: String,
    pub thread_id: String,
    pub text: String,
    pub metadata: Value,
    pub chunk_group_id: String,
    pub chunk_index: u32,
    pub chunk_total: u32,
    pub continued: bool,
    pub created_at: String,
    #[serde(skip)]
    pub bm25_score: Option<f64>,
    #[serde(skip)]
    pub vector_score: Option<f64>,
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryItem> {
    let metadata: String = row.get(3)?;
    Ok(MemoryItem {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        text: row.get(2)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
        chunk_group_id: row.get(4)?,
        chunk_index: row.get::<_, i64>(5)? as u32,
        chunk_total: row.get::<_, i64>(6)? as u32,
        continued: row.get::<_, i32>(7)? != 0,
        created_at: row.get(8)?,
        bm25_score: None,
        vector_score: None,
    })
}

const ITEM_COLUMNS: &str =
    "id, thread_id, text, metadata, chunk_group_id, chunk_index, chunk_total, continued, created_at";

impl SessionStore {
    /// Insert one memory item (one chunk). `embedding` is the raw f32 vector,
    /// stored as bytes; `None` when no embedding client is configured.
    #[allow(clippy::too_many_arguments)]
    pub fn store_memory_item(
        &self,
        id: &str,
        thread_id: &str,
        text: &str,
        metadata: &Value,
        embedding: Option<&[f32]>,
        chunk_group_id: &str,
        chunk_index: u32,
        chunk_total: u32,
        continued: bool,
    ) -> EngineResult<()> {
        let conn = self.conn.lock();
        let embedding_bytes = embedding.map(super::f32_vec_to_bytes);
        let metadata_json = serde_json::to_string(metadata)?;
        conn.execute(
            "INSERT INTO memory_items (id, thread_id, text, metadata, embedding, chunk_group_id,
                                        chunk_index, chunk_total, continued)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                id, thread_id, text, metadata_json, embedding_bytes,
                chunk_group_id, chunk_index, chunk_total, continued as i32,
            ],
        )?;
        conn.execute(
            "INSERT INTO memory_items_fts (id, thread_id, text) VALUES (?1, ?2, ?3)",
            params![id, thread_id, text],
        )
        .ok();
        Ok(())
    }

    /// BM25 full-text search scoped to `thread_id`, most-relevant first.
    pub fn memory_items_search_bm25(&self, thread_id: &str, query: &str, limit: usize) -> EngineResult<Vec<MemoryItem>> {
        let conn = self.conn.lock();
        let fts_query = query.replace('"', "\"\"").split_whitespace().collect::<Vec<_>>().join(" OR ");
        if fts_query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT m.{cols}, rank FROM memory_items_fts f
             JOIN memory_items m ON m.id = f.id
             WHERE memory_items_fts MATCH ?1 AND f.thread_id = ?2
             ORDER BY rank LIMIT ?3",
            cols = ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![fts_query, thread_id, limit as i64], |row| {
            let mut item = row_to_item(row)?;
            let rank: f64 = row.get(9)?;
            item.bm25_score = Some(-rank);
            Ok(item)
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Vector similarity search scoped to `thread_id`. Scans every item
    /// with an embedding in the thread — acceptable at thread scope, where
    /// item counts stay small relative to the corpus-wide `memories` table.
    pub fn memory_items_search_vector(&self, thread_id: &str, query_embedding: &[f32], limit: usize) -> EngineResult<Vec<MemoryItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols}, embedding FROM memory_items WHERE thread_id = ?1 AND embedding IS NOT NULL",
            cols = ITEM_COLUMNS
        ))?;
        let mut scored: Vec<MemoryItem> = stmt
            .query_map(params![thread_id], |row| {
                let mut item = row_to_item(row)?;
                let blob: Vec<u8> = row.get(9)?;
                let stored = bytes_to_f32_vec(&blob);
                item.vector_score = Some(cosine_similarity(query_embedding, &stored));
                Ok(item)
            })?
            .filter_map(|r| r.ok())
            .collect();
        scored.sort_by(|a, b| b.vector_score.partial_cmp(&a.vector_score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Most recent items in the thread, newest first — the recency source
    /// for the Memory Service's three-way RRF fusion.
    pub fn memory_items_recent(&self, thread_id: &str, limit: usize) -> EngineResult<Vec<MemoryItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM memory_items WHERE thread_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            cols = ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![thread_id, limit as i64], row_to_item)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// All chunks of a chunk-group, in order — used to stitch a hit back
    /// into its surrounding chunks before it's placed in the prompt.
    pub fn memory_items_by_group(&self, chunk_group_id: &str) -> EngineResult<Vec<MemoryItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM memory_items WHERE chunk_group_id = ?1 ORDER BY chunk_index ASC",
            cols = ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![chunk_group_id], row_to_item)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn memory_item_by_id(&self, id: &str) -> EngineResult<Option<MemoryItem>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {cols} FROM memory_items WHERE id = ?1", cols = ITEM_COLUMNS),
            params![id],
            row_to_item,
        )
        .map(Some)
        .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e) })
        .map_err(crate::atoms::error::EngineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn store() -> SessionStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::engine::sessions::schema_for_testing(&conn);
        SessionStore { conn: parking_lot::Mutex::new(conn) }
    }

    #[test]
    fn bm25_search_scoped_to_thread() {
        let store = store();
        store.store_memory_item("m1", "t1", "the rollout deadline is Friday", &Value::Null, None, "g1", 0, 1, false).unwrap();
        store.store_memory_item("m2", "t2", "the rollout deadline is Friday", &Value::Null, None, "g2", 0, 1, false).unwrap();
        let hits = store.memory_items_search_bm25("t1", "rollout deadline", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1");
    }

    #[test]
    fn group_chunks_returned_in_order() {
        let store = store();
        store.store_memory_item("c2", "t1", "part two", &Value::Null, None, "g1", 1, 2, true).unwrap();
        store.store_memory_item("c1", "t1", "part one", &Value::Null, None, "g1", 0, 2, false).unwrap();
        let chunks = store.memory_items_by_group("g1").unwrap();
        assert_eq!(chunks.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["c1", "c2"]);
    }

    #[test]
    fn recent_orders_newest_first() {
        let store = store();
        store.store_memory_item("m1", "t1", "first", &Value::Null, None, "g1", 0, 1, false).unwrap();
        store.store_memory_item("m2", "t1", "second", &Value::Null, None, "g2", 0, 1, false).unwrap();
        let recent = store.memory_items_recent("t1", 10).unwrap();
        assert_eq!(recent[0].id, "m2");
    }
}
