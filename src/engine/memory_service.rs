// Paw Agent Engine — Memory Service
//
// Durable, per-thread episodic memory with hybrid search. Distinct from
// `engram/` (the three-tier episodic/semantic/procedural system with its
// own auto-tuned RRF fusion in `engram::hybrid_search`) — this module
// fixes its fusion weights and `rrf_k` so a given query over a given
// thread always ranks the same way, which the engram fusion's
// auto-detected weighting does not guarantee.

use crate::atoms::error::EngineResult;
use crate::engine::events::EventWrite;
use crate::engine::memory::EmbeddingClient;
use crate::engine::providers::AnyProvider;
use crate::engine::sessions::{MemoryItem, SessionStore};
use crate::atoms::types::ThreadSummary;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

const RRF_K: f64 = 60.0;
const WEIGHT_VECTOR: f64 = 0.40;
const WEIGHT_BM25: f64 = 0.35;
const WEIGHT_RECENCY: f64 = 0.25;

/// A fused, chunk-group-stitched hit returned by `search`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryHit {
    pub id: String,
    pub text: String,
    pub metadata: Value,
    pub score: f64,
}

fn chunk_group_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    format!("mcg_{}", hex_prefix(&digest, 24))
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for b in bytes {
        if out.len() >= chars {
            break;
        }
        out.push_str(&format!("{:02x}", b));
    }
    out.truncate(chars);
    out
}

/// Best-effort embedding: remote client first, then a deterministic
/// hash-seeded pseudo-embedding so writes never block on an unreachable
/// embedding endpoint.
async fn embed_best_effort(client: Option<&EmbeddingClient>, text: &str) -> Vec<f32> {
    if let Some(c) = client {
        if let Ok(v) = c.embed(text).await {
            return v;
        }
    }
    pseudo_embedding(text)
}

/// Deterministic fallback embedding: hash the text into a fixed-size
/// vector so cosine similarity is still well-defined when no real
/// embedding endpoint is reachable.
fn pseudo_embedding(text: &str) -> Vec<f32> {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| (*b as f32 / 255.0) * 2.0 - 1.0).collect()
}

/// Write one memory item. Splits into multiple chunks first if
/// `|text| > chunk_size`, so `write` is just `write_chunked` with the
/// text's own length as the chunk size.
pub async fn write(
    store: &SessionStore,
    embedding_client: Option<&EmbeddingClient>,
    thread_id: &str,
    text: &str,
    metadata: Value,
) -> EngineResult<Vec<String>> {
    write_chunked(store, embedding_client, thread_id, text, metadata, text.len().max(1)).await
}

/// `write_chunked(thread_id, text, metadata, chunk_size)`: splits `text`
/// into `chunk_size`-character pieces when it exceeds that size, giving
/// each chunk a shared `chunk_group_id` and its position within the
/// group so reads can reassemble them.
pub async fn write_chunked(
    store: &SessionStore,
    embedding_client: Option<&EmbeddingClient>,
    thread_id: &str,
    text: &str,
    metadata: Value,
    chunk_size: usize,
) -> EngineResult<Vec<String>> {
    let chunk_size = chunk_size.max(1);
    let group_id = chunk_group_id(text);
    let chunks: Vec<&str> = if text.len() <= chunk_size {
        vec![text]
    } else {
        text.as_bytes()
            .chunks(chunk_size)
            .map(|b| std::str::from_utf8(b).unwrap_or(""))
            .collect()
    };
    let chunk_total = chunks.len() as u32;
    let mut ids = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let id = Uuid::new_v4().to_string();
        let embedding = embed_best_effort(embedding_client, chunk).await;
        store.store_memory_item(
            &id,
            thread_id,
            chunk,
            &metadata,
            Some(&embedding),
            &group_id,
            i as u32,
            chunk_total,
            i > 0,
        )?;
        ids.push(id);
    }
    Ok(ids)
}

fn rrf_scores(ranked_ids: &[String], weight: f64, scores: &mut HashMap<String, f64>) {
    for (rank, id) in ranked_ids.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += weight / (RRF_K + (rank as f64 + 1.0));
    }
}

/// `search(thread_id, limit, query)`: Reciprocal Rank Fusion over vector,
/// BM25, and recency rankings, each capped at `pool = max(3*limit, 15)`,
/// with chunk-group stitching and an emitted `memory.retrieve` event.
pub async fn search(
    store: &SessionStore,
    embedding_client: Option<&EmbeddingClient>,
    thread_id: &str,
    query: &str,
    limit: usize,
    trace_id: &str,
) -> EngineResult<Vec<MemoryHit>> {
    let pool = (3 * limit).max(15);
    let query_present = !query.trim().is_empty();

    let mut items_by_id: HashMap<String, MemoryItem> = HashMap::new();
    let mut fused: HashMap<String, f64> = HashMap::new();

    if query_present {
        let query_embedding = embed_best_effort(embedding_client, query).await;
        let vector_hits = store.memory_items_search_vector(thread_id, &query_embedding, pool)?;
        let vector_ids: Vec<String> = vector_hits.iter().map(|m| m.id.clone()).collect();
        rrf_scores(&vector_ids, WEIGHT_VECTOR, &mut fused);
        for item in vector_hits {
            items_by_id.insert(item.id.clone(), item);
        }

        let bm25_hits = store.memory_items_search_bm25(thread_id, query, pool)?;
        let bm25_ids: Vec<String> = bm25_hits.iter().map(|m| m.id.clone()).collect();
        rrf_scores(&bm25_ids, WEIGHT_BM25, &mut fused);
        for item in bm25_hits {
            items_by_id.entry(item.id.clone()).or_insert(item);
        }
    }

    let recent_hits = store.memory_items_recent(thread_id, pool)?;
    let recent_ids: Vec<String> = recent_hits.iter().map(|m| m.id.clone()).collect();
    rrf_scores(&recent_ids, WEIGHT_RECENCY, &mut fused);
    for item in recent_hits {
        items_by_id.entry(item.id.clone()).or_insert(item);
    }

    let mut ranked: Vec<(String, f64)> = fused.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));

    // Stitch chunk-group hits: the primary id for a group is its smallest
    // chunk_index; later chunks of an already-seen group are dropped.
    let mut seen_groups = std::collections::HashSet::new();
    let mut hits = Vec::with_capacity(limit);
    for (id, score) in ranked {
        let Some(item) = items_by_id.get(&id) else { continue };
        if !seen_groups.insert(item.chunk_group_id.clone()) {
            continue;
        }
        let group = store.memory_items_by_group(&item.chunk_group_id)?;
        let primary = group.into_iter().min_by_key(|c| c.chunk_index).unwrap_or_else(|| item.clone());
        let stitched_text = if primary.chunk_total > 1 {
            store
                .memory_items_by_group(&item.chunk_group_id)?
                .into_iter()
                .map(|c| c.text)
                .collect::<Vec<_>>()
                .join("")
        } else {
            primary.text.clone()
        };
        hits.push(MemoryHit { id: primary.id, text: stitched_text, metadata: primary.metadata, score });
        if hits.len() >= limit {
            break;
        }
    }

    store.write_event(EventWrite {
        trace_id,
        span_id: &Uuid::new_v4().to_string(),
        parent_span_id: None,
        event_type: "memory.retrieve",
        payload: json!({ "result_count": hits.len(), "query_present": query_present, "limit": limit }),
    })?;

    Ok(hits)
}

/// `compact_thread(thread_id, llm_summarize)`: summarize the most recent
/// 50 messages into a `ThreadSummary`, via the fallback provider when
/// `llm_summarize` is set, otherwise a plain truncation.
pub async fn compact_thread(
    store: &SessionStore,
    fallback_provider: Option<&AnyProvider>,
    thread_id: &str,
    llm_summarize: bool,
) -> EngineResult<ThreadSummary> {
    let messages = store.get_messages(thread_id, 50)?;
    let covers_through = messages.last().map(|m| m.id.clone()).unwrap_or_default();
    let joined: String = messages.iter().map(|m| format!("{}: {}\n", m.role, m.content)).collect();

    let (short_summary, long_summary) = if llm_summarize {
        if let Some(provider) = fallback_provider {
            summarize_with_provider(provider, &joined).await
        } else {
            truncate_summary(&joined)
        }
    } else {
        truncate_summary(&joined)
    };

    let summary = ThreadSummary {
        thread_id: thread_id.to_string(),
        short_summary,
        long_summary,
        covers_through_message_id: covers_through,
        created_at: String::new(),
    };
    store.save_thread_summary(&summary)?;
    store.write_event(EventWrite {
        trace_id: &Uuid::new_v4().to_string(),
        span_id: &Uuid::new_v4().to_string(),
        parent_span_id: None,
        event_type: "memory.compact",
        payload: json!({ "thread_id": thread_id, "llm_summarize": llm_summarize }),
    })?;
    Ok(summary)
}

fn truncate_summary(joined: &str) -> (String, String) {
    let short = truncate_to_chars(joined, 240);
    let long = truncate_to_chars(joined, 800);
    (short, long)
}

fn truncate_to_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect::<String>() + "…"
    }
}

async fn summarize_with_provider(provider: &AnyProvider, joined: &str) -> (String, String) {
    use crate::atoms::types::{Message, MessageContent, Role};
    let prompt = format!(
        "Summarize the following conversation in two parts, separated by a line with just '---':\n\
         1) at most 3 sentences\n2) at most 10 sentences\n\n{}",
        joined
    );
    let messages = vec![Message {
        role: Role::User,
        content: MessageContent::Text(prompt),
        tool_calls: None,
        tool_call_id: None,
        name: None,
    }];
    match provider.chat_stream(&messages, &[], "default", Some(0.2), None).await {
        Ok(chunks) => {
            let text: String = chunks.iter().filter_map(|c| c.delta_text.as_deref()).collect();
            match text.split_once("---") {
                Some((short, long)) => (short.trim().to_string(), long.trim().to_string()),
                None => truncate_summary(&text),
            }
        }
        Err(_) => truncate_summary(joined),
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

    #[tokio::test]
    async fn write_chunked_splits_long_text() {
        let store = store();
        let text = "a".repeat(25);
        let ids = write_chunked(&store, None, "t1", &text, Value::Null, 10).await.unwrap();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn write_short_text_is_single_chunk() {
        let store = store();
        let ids = write(&store, None, "t1", "short note", Value::Null).await.unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn search_recency_ranks_newest_first_with_empty_query() {
        let store = store();
        write(&store, None, "t1", "first", Value::Null).await.unwrap();
        write(&store, None, "t1", "second", Value::Null).await.unwrap();
        let hits = search(&store, None, "t1", "", 5, "trace-1").await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].text, "second");
    }

    #[tokio::test]
    async fn search_stitches_chunk_group_into_one_hit() {
        let store = store();
        let text = "x".repeat(25);
        write_chunked(&store, None, "t1", &text, Value::Null, 10).await.unwrap();
        let hits = search(&store, None, "t1", "", 5, "trace-1").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text.len(), 25);
    }

    #[tokio::test]
    async fn compact_thread_without_llm_truncates() {
        use crate::atoms::types::StoredMessage;
        let store = store();
        store.add_message(&StoredMessage {
            id: "m1".into(), session_id: "t1".into(), role: "user".into(), content: "hello".into(),
            tool_calls_json: None, tool_call_id: None, name: None, created_at: String::new(),
        }).unwrap();
        let summary = compact_thread(&store, None, "t1", false).await.unwrap();
        assert_eq!(summary.covers_through_message_id, "m1");
    }
}
