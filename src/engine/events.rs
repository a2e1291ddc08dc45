// Paw Agent Engine — Event Writer (audit log)
//
// Every notable thing the engine does — a step starting, a tool call
// finishing, a provider falling back, a policy decision — is written here
// as a dotted-type event carrying two JSON payloads: the raw one, and a
// redacted copy safe to display or export. Redaction happens at write
// time, not read time, so a leak can never come from a caller forgetting
// to redact.

use crate::atoms::error::EngineResult;
use crate::engine::sessions::SessionStore;
use serde_json::Value;
use uuid::Uuid;

/// Keys whose values are replaced with `"[REDACTED]"` in the redacted
/// payload, matched case-insensitively against JSON object keys at any
/// depth.
const REDACTED_KEYS: &[&str] = &["password", "token", "secret", "authorization", "api_key"];

const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

/// Recursively replace values at keys matching `REDACTED_KEYS`.
fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let key_matches = REDACTED_KEYS.iter().any(|r| k.eq_ignore_ascii_case(r));
                out.insert(k.clone(), if key_matches { Value::String(REDACTED_PLACEHOLDER.to_string()) } else { redact(v) });
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// One audit-log entry to be written. `parent_span_id` is `None` for the
/// root event of a trace.
pub struct EventWrite<'a> {
    pub trace_id: &'a str,
    pub span_id: &'a str,
    pub parent_span_id: Option<&'a str>,
    /// Dotted event type, e.g. `agent.step.start`, `tool.call.end`,
    /// `model.fallback`, `policy.decision`, `schedule.error`.
    pub event_type: &'a str,
    pub payload: Value,
}

impl SessionStore {
    /// Write one event. Redaction is computed here, once, so every reader
    /// of `payload_redacted` gets a value that is safe to show.
    pub fn write_event(&self, event: EventWrite<'_>) -> EngineResult<String> {
        let id = Uuid::new_v4().to_string();
        let redacted = redact(&event.payload);
        let raw_json = serde_json::to_string(&event.payload)?;
        let redacted_json = serde_json::to_string(&redacted)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO events (id, trace_id, span_id, parent_span_id, event_type, payload_raw, payload_redacted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![id, event.trace_id, event.span_id, event.parent_span_id, event.event_type, raw_json, redacted_json],
        )?;
        Ok(id)
    }

    /// Full-text search over redacted event payloads, most recent first.
    pub fn search_events(&self, query: &str, limit: u32) -> EngineResult<Vec<(String, String, String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT e.id, e.event_type, e.payload_redacted, e.created_at
             FROM events_fts f JOIN events e ON e.rowid = f.rowid
             WHERE events_fts MATCH ?1
             ORDER BY e.created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![query, limit], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// All events for one trace, in commit order — `(created_at, id)`
    /// ordering is the totally-ordered view the ordering guarantee
    /// promises for a single trace.
    pub fn events_for_trace(&self, trace_id: &str) -> EngineResult<Vec<(String, String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, event_type, payload_redacted FROM events
             WHERE trace_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![trace_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_matching_keys_at_any_depth() {
        let input = json!({
            "user": "alice",
            "password": "hunter2",
            "nested": {"api_key": "sk-abc", "note": "keep me"},
            "list": [{"token": "t1"}, {"ok": true}],
        });
        let out = redact(&input);
        assert_eq!(out["password"], json!(REDACTED_PLACEHOLDER));
        assert_eq!(out["nested"]["api_key"], json!(REDACTED_PLACEHOLDER));
        assert_eq!(out["nested"]["note"], json!("keep me"));
        assert_eq!(out["list"][0]["token"], json!(REDACTED_PLACEHOLDER));
        assert_eq!(out["list"][1]["ok"], json!(true));
        assert_eq!(out["user"], json!("alice"));
    }

    #[test]
    fn redaction_is_case_insensitive() {
        let input = json!({"Authorization": "Bearer xyz"});
        let out = redact(&input);
        assert_eq!(out["Authorization"], json!(REDACTED_PLACEHOLDER));
    }

    #[test]
    fn non_matching_object_is_unchanged() {
        let input = json!({"a": 1, "b": "two"});
        assert_eq!(redact(&input), input);
    }
}
