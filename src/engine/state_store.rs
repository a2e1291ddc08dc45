// Paw Agent Engine — Structured State Store
//
// Supersession-aware knowledge extracted from conversations: decisions,
// preferences, facts. Distinct from the Memory Service (engram/) in that
// every item here is typed, has a lifecycle status, and participates in a
// merge lattice on upsert rather than being appended chunk-by-chunk.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{
    Confidence, ConsistencyReport, StateGraph, StateItem, StateItemType, StateRelation, StateStatus,
    StateTier, SupersessionEvidence,
};
use crate::engine::sessions::SessionStore;
use chrono::Utc;
use log::info;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};

const SEARCH_STATE_RRF_K: f64 = 60.0;
/// Reserved for the vector ranking source once `search_state` takes a
/// query-embedding parameter; not yet wired into the fused score.
#[allow(dead_code)]
const SEARCH_STATE_WEIGHT_VECTOR: f64 = 0.50;
const SEARCH_STATE_WEIGHT_BM25: f64 = 0.30;
const SEARCH_STATE_WEIGHT_RECENCY: f64 = 0.20;

/// `uid = hash(type_tag ∥ normalized(text))[:16]`: deterministic so the
/// same extracted fact always maps to the same `(uid, thread_id)` row,
/// letting re-extraction land on `upsert_state_item`'s merge path instead
/// of creating duplicate items.
pub fn generate_uid(type_tag: StateItemType, text: &str) -> String {
    let normalized: String = text.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(type_str(type_tag).as_bytes());
    hasher.update(b"\x00");
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for b in digest.iter() {
        if hex.len() >= 16 {
            break;
        }
        hex.push_str(&format!("{:02x}", b));
    }
    hex.truncate(16);
    hex
}

fn tier_prior(tier: StateTier) -> f64 {
    match tier {
        StateTier::Working => 0.040,
        StateTier::Episodic => 0.025,
        StateTier::SemanticLongterm => 0.010,
        StateTier::Procedural => 0.010,
    }
}

fn tier_rank(tier: StateTier) -> u8 {
    match tier {
        StateTier::Procedural => 3,
        StateTier::SemanticLongterm => 2,
        StateTier::Episodic => 1,
        StateTier::Working => 0,
    }
}

/// Filters accepted by `search_state`.
#[derive(Debug, Clone, Default)]
pub struct StateSearchFilters {
    pub type_tags: Option<Vec<StateItemType>>,
    pub tiers: Option<Vec<StateTier>>,
}

/// Score band within which a candidate is treated as conflicting with an
/// incumbent item rather than clearly distinct or clearly identical.
pub const CONFLICT_THRESHOLD: f64 = 0.55;
pub const MERGE_THRESHOLD: f64 = 0.85;

/// Replacement verbs that, combined with a conflict-band score and a
/// user-authored ref, trigger supersession instead of a bare conflict flag.
const REPLACEMENT_VERBS: &[&str] = &["instead", "replaced", "switched", "changed to", "no longer"];

/// Status lattice used by the merge-on-upsert rule: `Active` is the weakest
/// status, `Closed` the strongest — a merge never demotes an item out of
/// a stronger state purely because a weaker-status duplicate arrived.
fn resolve_status(existing: StateStatus, incoming: StateStatus) -> StateStatus {
    fn rank(s: StateStatus) -> u8 {
        match s {
            StateStatus::Active => 0,
            StateStatus::Open => 1,
            StateStatus::Superseded => 2,
            StateStatus::Closed => 3,
        }
    }
    if rank(incoming) >= rank(existing) { incoming } else { existing }
}

fn union_preserving_order(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for v in existing.iter().chain(incoming.iter()) {
        if seen.insert(v.as_str()) {
            out.push(v.clone());
        }
    }
    out
}

/// Merge `incoming` into `existing` per the upsert merge policy: status via
/// lattice, tags/refs unioned preserving insertion order, confidence and
/// last_seen_at take the max, pinned/conflict are sticky-OR, and an
/// existing `replaced_by` is never cleared by a merge.
pub fn merge(existing: &StateItem, incoming: &StateItem) -> StateItem {
    StateItem {
        uid: existing.uid.clone(),
        thread_id: existing.thread_id.clone(),
        agent_id: existing.agent_id.clone(),
        type_tag: existing.type_tag,
        text: incoming.text.clone(),
        status: resolve_status(existing.status, incoming.status),
        topic_tags: union_preserving_order(&existing.topic_tags, &incoming.topic_tags),
        refs: union_preserving_order(&existing.refs, &incoming.refs),
        confidence: existing.confidence.max(incoming.confidence),
        replaced_by: existing.replaced_by.clone().or_else(|| incoming.replaced_by.clone()),
        supersession_evidence: existing.supersession_evidence.clone().or_else(|| incoming.supersession_evidence.clone()),
        conflict: existing.conflict || incoming.conflict,
        pinned: existing.pinned || incoming.pinned,
        tier: existing.tier,
        importance_score: existing.importance_score.max(incoming.importance_score),
        access_count: existing.access_count + incoming.access_count,
        last_seen_at: if incoming.last_seen_at > existing.last_seen_at { incoming.last_seen_at.clone() } else { existing.last_seen_at.clone() },
        created_at: existing.created_at.clone(),
    }
}

/// Decide whether `incoming` supersedes `incumbent`, conflicts with it, or
/// is unrelated, given their similarity `score` in `[0, 1]`.
///
/// - `score >= MERGE_THRESHOLD`: treated as the same item by the caller
///   (an upsert, not a supersession decision).
/// - `score` in `[CONFLICT_THRESHOLD, MERGE_THRESHOLD)` with a replacement
///   verb in `candidate_text` and at least one ref to a user-role message:
///   supersession.
/// - Same band without those signals: conflict.
/// - Below `CONFLICT_THRESHOLD`: unrelated.
#[derive(Debug, Clone, PartialEq)]
pub enum SupersessionDecision {
    Supersedes { trigger: String },
    Conflict,
    Unrelated,
}

pub fn decide_supersession(score: f64, candidate_text: &str, ref_is_user_message: bool) -> SupersessionDecision {
    if score < CONFLICT_THRESHOLD || score >= MERGE_THRESHOLD {
        return SupersessionDecision::Unrelated;
    }
    let lower = candidate_text.to_lowercase();
    let trigger = REPLACEMENT_VERBS.iter().find(|v| lower.contains(**v));
    match (trigger, ref_is_user_message) {
        (Some(verb), true) => SupersessionDecision::Supersedes { trigger: verb.to_string() },
        _ => SupersessionDecision::Conflict,
    }
}

/// Background tiering rule: pinned items promote to `Procedural`; high
/// importance or frequently accessed items promote to `SemanticLongterm`;
/// otherwise age buckets the item into `Working`/`Episodic`/`SemanticLongterm`.
pub fn compute_tier(pinned: bool, importance_score: f64, access_count: u64, age_days: i64) -> StateTier {
    if pinned {
        return StateTier::Procedural;
    }
    if importance_score >= 0.75 || access_count >= 10 {
        return StateTier::SemanticLongterm;
    }
    if age_days <= 14 {
        StateTier::Working
    } else if age_days <= 60 {
        StateTier::Episodic
    } else {
        StateTier::SemanticLongterm
    }
}

impl SessionStore {
    /// Upsert a state item per `(uid, thread_id)`. Inserts if absent,
    /// otherwise merges per the lattice in `merge()`.
    pub fn upsert_state_item(&self, item: &StateItem) -> EngineResult<()> {
        let conn = self.conn.lock();
        let existing: Option<StateItem> = conn
            .query_row(
                "SELECT uid, thread_id, agent_id, type_tag, text, status, topic_tags, refs, confidence,
                        replaced_by, supersession_evidence, conflict, pinned, tier,
                        importance_score, access_count, last_seen_at, created_at
                 FROM state_items WHERE uid = ?1 AND thread_id = ?2",
                params![item.uid, item.thread_id],
                row_to_state_item,
            )
            .optional()?;

        let merged = match existing {
            Some(existing) => merge(&existing, item),
            None => item.clone(),
        };

        conn.execute(
            "INSERT INTO state_items (uid, thread_id, agent_id, type_tag, text, status, topic_tags, refs,
                                      confidence, replaced_by, supersession_evidence, conflict,
                                      pinned, tier, importance_score, access_count, last_seen_at, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
             ON CONFLICT(uid, thread_id) DO UPDATE SET
                text = excluded.text, status = excluded.status, topic_tags = excluded.topic_tags,
                refs = excluded.refs, confidence = excluded.confidence, replaced_by = excluded.replaced_by,
                supersession_evidence = excluded.supersession_evidence, conflict = excluded.conflict,
                pinned = excluded.pinned, tier = excluded.tier, importance_score = excluded.importance_score,
                access_count = excluded.access_count, last_seen_at = excluded.last_seen_at",
            params![
                merged.uid, merged.thread_id, merged.agent_id, type_str(merged.type_tag), merged.text,
                status_str(merged.status), serde_json::to_string(&merged.topic_tags)?,
                serde_json::to_string(&merged.refs)?, confidence_str(merged.confidence),
                merged.replaced_by, merged.supersession_evidence.as_ref().map(serde_json::to_string).transpose()?,
                merged.conflict as i32, merged.pinned as i32, tier_str(merged.tier),
                merged.importance_score, merged.access_count as i64, merged.last_seen_at, merged.created_at,
            ],
        )?;
        conn.execute(
            "INSERT INTO state_items_fts (uid, thread_id, text) VALUES (?1, ?2, ?3)",
            params![merged.uid, merged.thread_id, merged.text],
        )
        .ok();
        Ok(())
    }

    /// `searchState(thread_id, query, filters, k, min_score, actor_id)`:
    /// fusion across state items restricted by `type_tag`/`tier`, with
    /// weights `(0.50, 0.30, 0.20)` for (vector, bm25, recency) and tier
    /// priors added to the fused score before the `min_score` cutoff.
    /// `actor_id` is accepted for the caller's audit trail; this function
    /// does not itself filter by it.
    pub fn search_state(
        &self,
        thread_id: &str,
        query: &str,
        filters: &StateSearchFilters,
        k: usize,
        min_score: f64,
        _actor_id: &str,
    ) -> EngineResult<Vec<StateItem>> {
        let pool = (3 * k).max(15);
        let conn = self.conn.lock();

        let mut items_by_uid: HashMap<String, StateItem> = HashMap::new();
        let mut fused: HashMap<String, f64> = HashMap::new();

        if !query.trim().is_empty() {
            let fts_query = query.replace('"', "\"\"").split_whitespace().collect::<Vec<_>>().join(" OR ");
            if !fts_query.trim().is_empty() {
                let mut stmt = conn.prepare(
                    "SELECT s.uid, s.thread_id, s.agent_id, s.type_tag, s.text, s.status, s.topic_tags, s.refs,
                            s.confidence, s.replaced_by, s.supersession_evidence, s.conflict, s.pinned, s.tier,
                            s.importance_score, s.access_count, s.last_seen_at, s.created_at
                     FROM state_items_fts f JOIN state_items s ON s.uid = f.uid AND s.thread_id = f.thread_id
                     WHERE state_items_fts MATCH ?1 AND s.thread_id = ?2
                     ORDER BY rank LIMIT ?3",
                )?;
                let rows = stmt.query_map(params![fts_query, thread_id, pool as i64], row_to_state_item)?;
                let bm25_ids: Vec<String> = rows
                    .filter_map(|r| r.ok())
                    .enumerate()
                    .map(|(rank, item)| {
                        *fused.entry(item.uid.clone()).or_insert(0.0) +=
                            SEARCH_STATE_WEIGHT_BM25 / (SEARCH_STATE_RRF_K + (rank as f64 + 1.0));
                        let uid = item.uid.clone();
                        items_by_uid.insert(uid.clone(), item);
                        uid
                    })
                    .collect();
                let _ = bm25_ids;
            }
        }

        let mut stmt = conn.prepare(
            "SELECT uid, thread_id, agent_id, type_tag, text, status, topic_tags, refs, confidence,
                    replaced_by, supersession_evidence, conflict, pinned, tier,
                    importance_score, access_count, last_seen_at, created_at
             FROM state_items WHERE thread_id = ?1 ORDER BY last_seen_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![thread_id, pool as i64], row_to_state_item)?;
        for (rank, item) in rows.filter_map(|r| r.ok()).enumerate() {
            *fused.entry(item.uid.clone()).or_insert(0.0) +=
                SEARCH_STATE_WEIGHT_RECENCY / (SEARCH_STATE_RRF_K + (rank as f64 + 1.0));
            items_by_uid.entry(item.uid.clone()).or_insert(item);
        }

        // Vector ranking: no query embedding input in this signature, so
        // it only contributes when items themselves carry a stored
        // embedding and the caller has none to rank against — currently a
        // no-op source until a query-embedding parameter is added.

        let mut scored: Vec<(String, f64, StateTier, String)> = fused
            .into_iter()
            .filter_map(|(uid, score)| {
                let item = items_by_uid.get(&uid)?;
                if let Some(types) = &filters.type_tags {
                    if !types.contains(&item.type_tag) {
                        return None;
                    }
                }
                if let Some(tiers) = &filters.tiers {
                    if !tiers.contains(&item.tier) {
                        return None;
                    }
                }
                let total = score + tier_prior(item.tier);
                if total < min_score * 0.05 {
                    return None;
                }
                Some((uid, total, item.tier, item.last_seen_at.clone()))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| tier_rank(b.2).cmp(&tier_rank(a.2)))
                .then_with(|| b.3.cmp(&a.3))
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored.into_iter().filter_map(|(uid, _, _, _)| items_by_uid.remove(&uid)).collect())
    }

    /// Apply a supersession decision: mark `incumbent_uid` superseded,
    /// pointing at `new_item`, and insert `new_item` without the conflict
    /// flag (supersession resolves the conflict, it doesn't carry it forward).
    pub fn apply_supersession(
        &self,
        incumbent_uid: &str,
        thread_id: &str,
        new_item: &StateItem,
        evidence: SupersessionEvidence,
    ) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE state_items SET status = ?1, replaced_by = ?2, supersession_evidence = ?3
             WHERE uid = ?4 AND thread_id = ?5",
            params![
                status_str(StateStatus::Superseded),
                new_item.uid,
                serde_json::to_string(&evidence)?,
                incumbent_uid,
                thread_id,
            ],
        )?;
        drop(conn);
        let mut clean = new_item.clone();
        clean.conflict = false;
        self.upsert_state_item(&clean)?;
        info!("[state-store] {} superseded by {} ({})", incumbent_uid, new_item.uid, evidence.trigger);
        Ok(())
    }

    /// Bounded BFS over `state_relations`, depth capped at 5.
    pub fn traverse(&self, uid: &str, thread_id: &str, depth: u32, relation_types: Option<&[String]>) -> EngineResult<StateGraph> {
        let depth = depth.min(5);
        let conn = self.conn.lock();
        let mut visited = HashSet::new();
        let mut frontier = VecDeque::new();
        frontier.push_back((uid.to_string(), 0u32));
        visited.insert(uid.to_string());

        let mut nodes = Vec::new();
        let mut edges = Vec::new();

        while let Some((current, current_depth)) = frontier.pop_front() {
            if let Some(item) = conn
                .query_row(
                    "SELECT uid, thread_id, agent_id, type_tag, text, status, topic_tags, refs, confidence,
                            replaced_by, supersession_evidence, conflict, pinned, tier,
                            importance_score, access_count, last_seen_at, created_at
                     FROM state_items WHERE uid = ?1 AND thread_id = ?2",
                    params![current, thread_id],
                    row_to_state_item,
                )
                .optional()?
            {
                nodes.push(item);
            }

            if current_depth >= depth {
                continue;
            }

            let mut stmt = conn.prepare(
                "SELECT source_uid, target_uid, relation_type FROM state_relations WHERE source_uid = ?1",
            )?;
            let rows = stmt.query_map(params![current], |row| {
                Ok(StateRelation {
                    source_uid: row.get(0)?,
                    target_uid: row.get(1)?,
                    relation_type: row.get(2)?,
                })
            })?;
            for rel in rows.flatten() {
                if let Some(types) = relation_types {
                    if !types.contains(&rel.relation_type) {
                        continue;
                    }
                }
                if visited.insert(rel.target_uid.clone()) {
                    frontier.push_back((rel.target_uid.clone(), current_depth + 1));
                }
                edges.push(rel);
            }
        }

        Ok(StateGraph { nodes, edges })
    }

    /// `1 - conflicted/total` over the `sample_size` most recent state
    /// items in `thread_id`.
    pub fn evaluate_consistency(&self, thread_id: &str, sample_size: usize) -> EngineResult<ConsistencyReport> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT conflict FROM state_items WHERE thread_id = ?1 ORDER BY last_seen_at DESC LIMIT ?2",
        )?;
        let rows: Vec<bool> = stmt
            .query_map(params![thread_id, sample_size as i64], |row| Ok(row.get::<_, i32>(0)? != 0))?
            .filter_map(|r| r.ok())
            .collect();
        let total = rows.len();
        let conflicted = rows.iter().filter(|c| **c).count();
        let score = if total == 0 { 1.0 } else { 1.0 - (conflicted as f64 / total as f64) };
        Ok(ConsistencyReport { thread_id: thread_id.to_string(), sample_size: total, conflicted, score })
    }

    /// Background tiering maintenance: recompute `tier` for every item in
    /// a thread from its current pin/importance/access/age signals.
    pub fn retier_thread(&self, thread_id: &str, now: chrono::DateTime<Utc>) -> EngineResult<u64> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT uid, pinned, importance_score, access_count, created_at FROM state_items WHERE thread_id = ?1",
        )?;
        let rows: Vec<(String, bool, f64, i64, String)> = stmt
            .query_map(params![thread_id], |row| {
                Ok((row.get(0)?, row.get::<_, i32>(1)? != 0, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let mut updated = 0u64;
        for (uid, pinned, importance, access_count, created_at) in rows {
            let age_days = created_at
                .parse::<chrono::DateTime<Utc>>()
                .map(|t| (now - t).num_days())
                .unwrap_or(0);
            let tier = compute_tier(pinned, importance, access_count as u64, age_days);
            conn.execute(
                "UPDATE state_items SET tier = ?1 WHERE uid = ?2 AND thread_id = ?3",
                params![tier_str(tier), uid, thread_id],
            )?;
            updated += 1;
        }
        Ok(updated)
    }
}

fn status_str(s: StateStatus) -> &'static str {
    match s {
        StateStatus::Active => "active",
        StateStatus::Open => "open",
        StateStatus::Superseded => "superseded",
        StateStatus::Closed => "closed",
    }
}

fn parse_status(s: &str) -> StateStatus {
    match s {
        "open" => StateStatus::Open,
        "superseded" => StateStatus::Superseded,
        "closed" => StateStatus::Closed,
        _ => StateStatus::Active,
    }
}

fn confidence_str(c: Confidence) -> &'static str {
    match c {
        Confidence::Low => "low",
        Confidence::Medium => "medium",
        Confidence::High => "high",
    }
}

fn parse_confidence(s: &str) -> Confidence {
    match s {
        "high" => Confidence::High,
        "medium" => Confidence::Medium,
        _ => Confidence::Low,
    }
}

fn tier_str(t: StateTier) -> &'static str {
    match t {
        StateTier::Working => "working",
        StateTier::Episodic => "episodic",
        StateTier::SemanticLongterm => "semantic_longterm",
        StateTier::Procedural => "procedural",
    }
}

fn parse_tier(s: &str) -> StateTier {
    match s {
        "episodic" => StateTier::Episodic,
        "semantic_longterm" => StateTier::SemanticLongterm,
        "procedural" => StateTier::Procedural,
        _ => StateTier::Working,
    }
}

fn type_str(t: StateItemType) -> &'static str {
    match t {
        StateItemType::Decision => "decision",
        StateItemType::Constraint => "constraint",
        StateItemType::Action => "action",
        StateItemType::Question => "question",
        StateItemType::Risk => "risk",
        StateItemType::Failure => "failure",
    }
}

fn parse_type(s: &str) -> StateItemType {
    match s {
        "constraint" => StateItemType::Constraint,
        "action" => StateItemType::Action,
        "question" => StateItemType::Question,
        "risk" => StateItemType::Risk,
        "failure" => StateItemType::Failure,
        _ => StateItemType::Decision,
    }
}

fn row_to_state_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<StateItem> {
    let topic_tags: String = row.get(6)?;
    let refs: String = row.get(7)?;
    let evidence: Option<String> = row.get(10)?;
    Ok(StateItem {
        uid: row.get(0)?,
        thread_id: row.get(1)?,
        agent_id: row.get(2)?,
        type_tag: parse_type(&row.get::<_, String>(3)?),
        text: row.get(4)?,
        status: parse_status(&row.get::<_, String>(5)?),
        topic_tags: serde_json::from_str(&topic_tags).unwrap_or_default(),
        refs: serde_json::from_str(&refs).unwrap_or_default(),
        confidence: parse_confidence(&row.get::<_, String>(8)?),
        replaced_by: row.get(9)?,
        supersession_evidence: evidence.and_then(|e| serde_json::from_str(&e).ok()),
        conflict: row.get::<_, i32>(11)? != 0,
        pinned: row.get::<_, i32>(12)? != 0,
        tier: parse_tier(&row.get::<_, String>(13)?),
        importance_score: row.get(14)?,
        access_count: row.get::<_, i64>(15)? as u64,
        last_seen_at: row.get(16)?,
        created_at: row.get(17)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(uid: &str, status: StateStatus, confidence: Confidence, last_seen: &str) -> StateItem {
        StateItem {
            uid: uid.to_string(),
            thread_id: "t1".to_string(),
            agent_id: "main".to_string(),
            type_tag: StateItemType::Decision,
            text: "use PostgreSQL".to_string(),
            status,
            topic_tags: vec!["db".to_string()],
            refs: vec!["m1".to_string()],
            confidence,
            replaced_by: None,
            supersession_evidence: None,
            conflict: false,
            pinned: false,
            tier: StateTier::Working,
            importance_score: 0.1,
            access_count: 1,
            last_seen_at: last_seen.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn merge_takes_max_confidence_and_last_seen() {
        let existing = item("s1", StateStatus::Active, Confidence::Low, "2026-01-01T00:00:00Z");
        let incoming = item("s1", StateStatus::Active, Confidence::High, "2026-01-02T00:00:00Z");
        let merged = merge(&existing, &incoming);
        assert_eq!(merged.confidence, Confidence::High);
        assert_eq!(merged.last_seen_at, "2026-01-02T00:00:00Z");
    }

    #[test]
    fn merge_unions_tags_preserving_order() {
        let mut existing = item("s1", StateStatus::Active, Confidence::Low, "2026-01-01T00:00:00Z");
        existing.topic_tags = vec!["a".to_string(), "b".to_string()];
        let mut incoming = item("s1", StateStatus::Active, Confidence::Low, "2026-01-01T00:00:00Z");
        incoming.topic_tags = vec!["b".to_string(), "c".to_string()];
        let merged = merge(&existing, &incoming);
        assert_eq!(merged.topic_tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_never_demotes_superseded() {
        let mut existing = item("s1", StateStatus::Superseded, Confidence::Low, "2026-01-01T00:00:00Z");
        existing.replaced_by = Some("s2".to_string());
        let incoming = item("s1", StateStatus::Active, Confidence::Low, "2026-01-02T00:00:00Z");
        let merged = merge(&existing, &incoming);
        assert_eq!(merged.status, StateStatus::Superseded);
        assert_eq!(merged.replaced_by, Some("s2".to_string()));
    }

    #[test]
    fn supersession_requires_verb_and_user_ref() {
        let decision = decide_supersession(0.7, "actually let's switch to MySQL instead", true);
        assert!(matches!(decision, SupersessionDecision::Supersedes { .. }));
    }

    #[test]
    fn conflict_band_without_verb_is_conflict_not_supersession() {
        let decision = decide_supersession(0.7, "MySQL is also worth considering", true);
        assert_eq!(decision, SupersessionDecision::Conflict);
    }

    #[test]
    fn high_score_is_unrelated_to_supersession_decision() {
        let decision = decide_supersession(0.95, "switched to MySQL instead", true);
        assert_eq!(decision, SupersessionDecision::Unrelated);
    }

    #[test]
    fn tiering_promotes_pinned_to_procedural() {
        assert_eq!(compute_tier(true, 0.1, 0, 1), StateTier::Procedural);
    }

    #[test]
    fn tiering_promotes_high_importance_regardless_of_age() {
        assert_eq!(compute_tier(false, 0.8, 0, 1), StateTier::SemanticLongterm);
    }

    #[test]
    fn tiering_buckets_by_age_when_unpinned_and_low_importance() {
        assert_eq!(compute_tier(false, 0.1, 0, 10), StateTier::Working);
        assert_eq!(compute_tier(false, 0.1, 0, 40), StateTier::Episodic);
        assert_eq!(compute_tier(false, 0.1, 0, 90), StateTier::SemanticLongterm);
    }

    #[test]
    fn uid_is_deterministic_and_type_scoped() {
        let a = generate_uid(StateItemType::Decision, "use PostgreSQL");
        let b = generate_uid(StateItemType::Decision, "  use   postgresql ");
        let c = generate_uid(StateItemType::Constraint, "use PostgreSQL");
        assert_eq!(a, b, "normalization should make whitespace/case-insensitive duplicates collide");
        assert_ne!(a, c, "different type_tag must not collide");
    }

    fn store_with_items() -> SessionStore {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::engine::sessions::schema_for_testing(&conn);
        let store = SessionStore { conn: parking_lot::Mutex::new(conn) };
        store.upsert_state_item(&item("s1", StateStatus::Active, Confidence::High, "2026-01-02T00:00:00Z")).unwrap();
        store
    }

    #[test]
    fn search_state_finds_by_text_within_thread() {
        let store = store_with_items();
        let hits = store.search_state("t1", "postgresql", &StateSearchFilters::default(), 5, 0.0, "actor-1").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uid, "s1");
    }

    #[test]
    fn search_state_filters_by_type_tag() {
        let store = store_with_items();
        let filters = StateSearchFilters { type_tags: Some(vec![StateItemType::Risk]), tiers: None };
        let hits = store.search_state("t1", "postgresql", &filters, 5, 0.0, "actor-1").unwrap();
        assert!(hits.is_empty());
    }
}
