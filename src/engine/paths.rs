// Paw Agent Engine — Filesystem Layout
//
// Every module that needs a stable on-disk location goes through here
// instead of recomputing `~/.paw/...` locally, so moving the base
// directory (e.g. for tests, or a future `PAW_HOME` override) is a
// one-file change.

use std::path::PathBuf;

/// Root of all engine-owned state: `~/.paw/`.
pub fn base_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".paw")
}

/// Path to the engine's primary SQLite database.
pub fn engine_db_path() -> PathBuf {
    base_dir().join("engine.db")
}

/// Per-agent workspace directory, matching `workspace::ensure_workspace`'s
/// `~/.paw/agent-workspaces/{id}/` layout.
pub fn agent_workspace_dir(agent_id: &str) -> PathBuf {
    let safe_id = agent_id.replace(|c: char| !c.is_alphanumeric() && c != '-' && c != '_', "_");
    base_dir().join("agent-workspaces").join(safe_id)
}

/// Path to the freshness-checked unlock-code file consulted by `/unlock`.
pub fn unlock_code_path() -> PathBuf {
    base_dir().join("unlock_code")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_db_path_is_under_base_dir() {
        assert!(engine_db_path().starts_with(base_dir()));
    }

    #[test]
    fn agent_workspace_dir_sanitizes_unsafe_characters() {
        let p = agent_workspace_dir("agent/../evil");
        assert!(!p.to_string_lossy().contains(".."));
    }
}
