// Paw Agent Engine — Command Interpreter support
//
// Thin persistence helpers backing `engine::commands`. Kept separate from
// the dispatcher so the interpreter itself stays pure dispatch logic and
// this file stays pure storage, mirroring the split between `routing.rs`
// (policy) and `sessions::*` (storage) elsewhere in the engine.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::ApprovalAction;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use super::SessionStore;

const UNLOCK_CODE_MAX_AGE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize)]
pub struct KbEntry {
    pub id: String,
    pub text: String,
    pub created_at: String,
}

fn approval_action_str(action: ApprovalAction) -> &'static str {
    match action {
        ApprovalAction::HostExecSudo => "host.exec.sudo",
        ApprovalAction::HostExecSystemctl => "host.exec.systemctl",
        ApprovalAction::HostExecProtectedPath => "host.exec.protected_path",
        ApprovalAction::SelfupdateApply => "selfupdate.apply",
    }
}

impl SessionStore {
    // ── Thread settings & roster ───────────────────────────────────────

    pub fn set_thread_setting(&self, thread_id: &str, key: &str, value: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO thread_settings (thread_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(thread_id, key) DO UPDATE SET value = excluded.value",
            params![thread_id, key, value],
        )?;
        Ok(())
    }

    pub fn set_roster_entry(&self, thread_id: &str, agent_id: &str, enabled: bool) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO thread_roster (thread_id, agent_id, enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(thread_id, agent_id) DO UPDATE SET enabled = excluded.enabled",
            params![thread_id, agent_id, enabled as i32],
        )?;
        Ok(())
    }

    // ── Thread lifecycle ────────────────────────────────────────────────

    /// Create a fresh thread for the same `(user, channel)` as `thread_id`,
    /// for `/new`. The old thread is left as-is; nothing reads it as
    /// "current" once the caller starts addressing the new one.
    pub fn create_sibling_thread(&self, thread_id: &str, user_id: &str) -> EngineResult<String> {
        let conn = self.conn.lock();
        let channel_id: String = conn
            .query_row("SELECT channel_id FROM threads WHERE id = ?1", params![thread_id], |r| r.get(0))
            .map_err(|_| EngineError::Other(format!("thread not found: {}", thread_id)))?;
        let new_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO threads (id, channel_id, user_id) VALUES (?1, ?2, ?3)",
            params![new_id, channel_id, user_id],
        )?;
        Ok(new_id)
    }

    pub fn enqueue_compaction(&self, thread_id: &str) -> EngineResult<()> {
        self.set_thread_setting(thread_id, "compaction_requested_at", &chrono::Utc::now().to_rfc3339())
    }

    // ── Onboarding ──────────────────────────────────────────────────────

    pub fn reset_onboarding(&self, user_id: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO onboarding_state (user_id, state) VALUES (?1, '{}')
             ON CONFLICT(user_id) DO UPDATE SET state = '{}', updated_at = datetime('now')",
            params![user_id],
        )?;
        Ok(())
    }

    // ── Lockdown & restart ───────────────────────────────────────────────

    pub fn is_lockdown_active(&self) -> EngineResult<bool> {
        let conn = self.conn.lock();
        let active: i64 = conn.query_row("SELECT lockdown_active FROM system_state WHERE id = 1", [], |r| r.get(0))?;
        Ok(active != 0)
    }

    pub fn clear_lockdown(&self) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE system_state SET lockdown_active = 0, lockdown_reason = NULL,
                readyz_fail_streak = 0, rollback_count = 0, host_exec_fail_streak = 0,
                updated_at = datetime('now') WHERE id = 1",
            [],
        )?;
        Ok(())
    }

    pub fn set_restart_flag(&self) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO engine_config (key, value) VALUES ('restart_requested', ?1)",
            params![chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// The `code file is fresh` check for `/unlock`: the code file must
    /// exist, have been written within `UNLOCK_CODE_MAX_AGE`, and its
    /// trimmed contents must match `code`.
    pub fn unlock_code_is_fresh(&self, code: &str) -> EngineResult<bool> {
        let path = crate::engine::paths::unlock_code_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Ok(false),
        };
        let metadata = std::fs::metadata(&path)?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let age = SystemTime::now().duration_since(modified).unwrap_or(Duration::MAX);
        Ok(age <= UNLOCK_CODE_MAX_AGE && contents.trim() == code)
    }

    // ── Approvals ────────────────────────────────────────────────────────

    pub fn create_approval(&self, action: ApprovalAction, requested_by: &str) -> EngineResult<String> {
        let conn = self.conn.lock();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO approvals (id, action, requested_by, status) VALUES (?1, ?2, ?3, 'pending')",
            params![id, approval_action_str(action), requested_by],
        )?;
        Ok(id)
    }

    /// Atomically consume a pending approval for `action`: only a row in
    /// `approved` status transitions to `consumed` and returns `true`.
    pub fn consume_approval(&self, approval_id: &str) -> EngineResult<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE approvals SET status = 'consumed', resolved_at = datetime('now')
             WHERE id = ?1 AND status = 'approved'",
            params![approval_id],
        )?;
        Ok(updated > 0)
    }

    // ── Knowledge base ───────────────────────────────────────────────────

    pub fn kb_add(&self, thread_id: &str, text: &str) -> EngineResult<String> {
        let conn = self.conn.lock();
        let id = Uuid::new_v4().to_string();
        conn.execute("INSERT INTO kb_entries (id, thread_id, text) VALUES (?1, ?2, ?3)", params![id, thread_id, text])?;
        Ok(id)
    }

    pub fn kb_list(&self, thread_id: &str) -> EngineResult<Vec<KbEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, text, created_at FROM kb_entries WHERE thread_id = ?1 ORDER BY created_at DESC")?;
        let rows = stmt.query_map(params![thread_id], |row| {
            Ok(KbEntry { id: row.get(0)?, text: row.get(1)?, created_at: row.get(2)? })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn kb_search(&self, thread_id: &str, query: &str) -> EngineResult<Vec<KbEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT k.id, k.text, k.created_at FROM kb_entries_fts f
             JOIN kb_entries k ON k.rowid = f.rowid
             WHERE f.text MATCH ?1 AND k.thread_id = ?2
             ORDER BY k.created_at DESC",
        )?;
        let rows = stmt.query_map(params![query, thread_id], |row| {
            Ok(KbEntry { id: row.get(0)?, text: row.get(1)?, created_at: row.get(2)? })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn kb_get(&self, id: &str) -> EngineResult<Option<KbEntry>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT id, text, created_at FROM kb_entries WHERE id = ?1", params![id], |row| {
            Ok(KbEntry { id: row.get(0)?, text: row.get(1)?, created_at: row.get(2)? })
        })
        .optional()
        .map_err(EngineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn store_with_thread() -> (SessionStore, String, String) {
        let conn = Connection::open_in_memory().unwrap();
        crate::engine::sessions::schema_for_testing(&conn);
        let store = SessionStore { conn: parking_lot::Mutex::new(conn) };
        let channel_id = "chan-1".to_string();
        let user_id = "user-1".to_string();
        {
            let conn = store.conn.lock();
            conn.execute("INSERT INTO channels (id, kind, label) VALUES (?1, 'web', 'web')", params![channel_id]).unwrap();
            conn.execute("INSERT INTO users (id, external_id) VALUES (?1, ?1)", params![user_id]).unwrap();
        }
        let thread_id = "thread-1".to_string();
        {
            let conn = store.conn.lock();
            conn.execute(
                "INSERT INTO threads (id, channel_id, user_id) VALUES (?1, ?2, ?3)",
                params![thread_id, channel_id, user_id],
            )
            .unwrap();
        }
        (store, thread_id, user_id)
    }

    #[test]
    fn thread_setting_roundtrips_and_overwrites() {
        let (store, thread_id, _) = store_with_thread();
        store.set_thread_setting(&thread_id, "verbose", "1").unwrap();
        store.set_thread_setting(&thread_id, "verbose", "0").unwrap();
        let conn = store.conn.lock();
        let value: String = conn
            .query_row("SELECT value FROM thread_settings WHERE thread_id = ?1 AND key = 'verbose'", params![thread_id], |r| r.get(0))
            .unwrap();
        assert_eq!(value, "0");
    }

    #[test]
    fn create_sibling_thread_shares_channel() {
        let (store, thread_id, user_id) = store_with_thread();
        let new_id = store.create_sibling_thread(&thread_id, &user_id).unwrap();
        assert_ne!(new_id, thread_id);
    }

    #[test]
    fn kb_add_list_search_get_roundtrip() {
        let (store, thread_id, _) = store_with_thread();
        let id = store.kb_add(&thread_id, "rust is great for systems work").unwrap();
        let listed = store.kb_list(&thread_id).unwrap();
        assert_eq!(listed.len(), 1);
        let found = store.kb_search(&thread_id, "systems").unwrap();
        assert_eq!(found.len(), 1);
        let got = store.kb_get(&id).unwrap();
        assert!(got.is_some());
    }

    #[test]
    fn lockdown_clears_counters() {
        let (store, _, _) = store_with_thread();
        {
            let conn = store.conn.lock();
            conn.execute("UPDATE system_state SET lockdown_active = 1, readyz_fail_streak = 3 WHERE id = 1", []).unwrap();
        }
        assert!(store.is_lockdown_active().unwrap());
        store.clear_lockdown().unwrap();
        assert!(!store.is_lockdown_active().unwrap());
    }

    #[test]
    fn approval_create_and_consume_requires_approved_status() {
        let (store, _, user_id) = store_with_thread();
        let id = store.create_approval(ApprovalAction::HostExecSudo, &user_id).unwrap();
        // Still pending: consume must fail.
        assert!(!store.consume_approval(&id).unwrap());
        {
            let conn = store.conn.lock();
            conn.execute("UPDATE approvals SET status = 'approved' WHERE id = ?1", params![id]).unwrap();
        }
        assert!(store.consume_approval(&id).unwrap());
    }
}
