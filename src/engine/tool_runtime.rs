// Paw Agent Engine — Tool Runtime
//
// Registered tool invocation with per-caller permission and approval
// checks. Each handler takes the engine's own state directly — there is
// no host application sitting between the step engine and its tools.

use crate::atoms::error::EngineResult;
use crate::atoms::types::{ApprovalAction, Task, TaskAgent, ToolDefinition};
use crate::engine::state::EngineState;
use log::{info, warn};
use std::time::Duration;

/// Sensitive paths agents must never read or write, checked against the
/// canonicalized path.
const SENSITIVE_PATHS: &[&str] = &[
    ".ssh",
    ".gnupg",
    ".aws/credentials",
    ".config/gcloud",
    ".npmrc",
    ".docker/config.json",
    ".kube/config",
    "/etc/shadow",
    "/etc/passwd",
    "/etc/sudoers",
];

/// Actions under the host-exec approval namespace: a pending `Approval`
/// row must exist in `approved` status and gets consumed atomically.
const GATED_ACTIONS: &[(&str, ApprovalAction)] = &[
    ("sudo ", ApprovalAction::HostExecSudo),
    ("systemctl", ApprovalAction::HostExecSystemctl),
];

pub fn builtin_definitions() -> Vec<ToolDefinition> {
    use crate::atoms::types::FunctionDefinition;
    let simple = |name: &str, description: &str, params: serde_json::Value| ToolDefinition {
        tool_type: "function".into(),
        function: FunctionDefinition {
            name: name.into(),
            description: description.into(),
            parameters: params,
        },
    };
    vec![
        simple(
            "exec",
            "Execute a shell command in the agent's workspace. Returns stdout and stderr.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "timeout": {"type": "integer", "description": "Seconds, default 120, max 600"}
                },
                "required": ["command"]
            }),
        ),
        simple(
            "fetch",
            "Make an HTTP request to a URL and return the response body.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "method": {"type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"]},
                    "headers": {"type": "object"},
                    "body": {}
                },
                "required": ["url"]
            }),
        ),
        simple(
            "read_file",
            "Read a file from the agent's workspace.",
            serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        ),
        simple(
            "write_file",
            "Write a file in the agent's workspace, creating parent directories as needed.",
            serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}, "content": {"type": "string"}}, "required": ["path", "content"]}),
        ),
        simple(
            "list_directory",
            "List entries in a directory under the agent's workspace.",
            serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        ),
        simple(
            "soul_read",
            "Read one of the agent's own persona files (IDENTITY.md, SOUL.md, USER.md, AGENTS.md, TOOLS.md).",
            serde_json::json!({"type": "object", "properties": {"file_name": {"type": "string"}}, "required": ["file_name"]}),
        ),
        simple(
            "soul_write",
            "Update one of the agent's own persona files.",
            serde_json::json!({"type": "object", "properties": {"file_name": {"type": "string"}, "content": {"type": "string"}}, "required": ["file_name", "content"]}),
        ),
        simple("soul_list", "List the agent's persona files.", serde_json::json!({"type": "object", "properties": {}})),
        simple(
            "memory_store",
            "Store a fact in long-term memory for later recall via memory_search.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "category": {"type": "string"},
                    "importance": {"type": "number"}
                },
                "required": ["content"]
            }),
        ),
        simple(
            "memory_search",
            "Search long-term memory for facts relevant to a query.",
            serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}, "limit": {"type": "integer"}}, "required": ["query"]}),
        ),
        simple(
            "create_task",
            "Create a task on the task board, optionally recurring on a cron schedule.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "priority": {"type": "string"},
                    "cron_schedule": {"type": "string"}
                },
                "required": ["title", "description"]
            }),
        ),
        simple("list_tasks", "List tasks on the task board.", serde_json::json!({"type": "object", "properties": {}})),
        simple(
            "update_task",
            "Update a task's status.",
            serde_json::json!({"type": "object", "properties": {"task_id": {"type": "string"}, "status": {"type": "string"}}, "required": ["task_id", "status"]}),
        ),
    ]
}

/// Dispatch a single tool call by name. Returns `Ok(output)` on success or
/// `Err(message)` on a tool-level failure — both are turned into synthetic
/// `[tool_result]` turns by the caller, never propagated as a step failure.
pub async fn execute(state: &EngineState, agent_id: &str, name: &str, args: &serde_json::Value) -> Result<String, String> {
    info!("[tool_runtime] executing '{}' for agent={}", name, agent_id);
    match name {
        "exec" => exec(state, agent_id, args).await,
        "fetch" => fetch(args).await,
        "read_file" => read_file(agent_id, args),
        "write_file" => write_file(agent_id, args),
        "list_directory" => list_directory(agent_id, args),
        "soul_read" => soul_read(state, agent_id, args),
        "soul_write" => soul_write(state, agent_id, args),
        "soul_list" => soul_list(state, agent_id),
        "memory_store" => memory_store(state, agent_id, args).await,
        "memory_search" => memory_search(state, agent_id, args).await,
        "create_task" => create_task(state, args),
        "list_tasks" => list_tasks(state),
        "update_task" => update_task(state, args),
        _ => Err(format!("Unknown tool: {}", name)),
    }
}

fn workspace_path(agent_id: &str, raw_path: &str) -> Result<std::path::PathBuf, String> {
    let resolved = if std::path::Path::new(raw_path).is_absolute() {
        std::path::PathBuf::from(raw_path)
    } else {
        let ws = crate::engine::paths::agent_workspace_dir(agent_id);
        std::fs::create_dir_all(&ws).map_err(|e| e.to_string())?;
        ws.join(raw_path)
    };
    let path_str = resolved.to_string_lossy().to_lowercase();
    for sensitive in SENSITIVE_PATHS {
        if path_str.contains(&sensitive.to_lowercase()) {
            return Err(format!("access to '{}' is blocked by security policy", raw_path));
        }
    }
    if raw_path.contains("..") {
        let ws = crate::engine::paths::agent_workspace_dir(agent_id);
        if let (Ok(canon_ws), Ok(canon)) = (ws.canonicalize(), resolved.canonicalize()) {
            if !canon.starts_with(&canon_ws) && !std::path::Path::new(raw_path).is_absolute() {
                return Err(format!("path '{}' escapes the agent workspace", raw_path));
            }
        }
    }
    Ok(resolved)
}

async fn exec(state: &EngineState, agent_id: &str, args: &serde_json::Value) -> Result<String, String> {
    let command = args["command"].as_str().ok_or("exec: missing 'command'")?;

    for (marker, action) in GATED_ACTIONS {
        if command.contains(marker) {
            let approval_id = args["approval_id"].as_str().ok_or_else(|| {
                format!("exec: '{}' requires approval action '{:?}' — request one via the command interpreter first", marker.trim(), action)
            })?;
            let consumed = state.store.consume_approval(approval_id).map_err(|e| e.to_string())?;
            if !consumed {
                return Err(format!("exec: approval '{}' is not in approved status", approval_id));
            }
        }
    }

    let workspace = crate::engine::paths::agent_workspace_dir(agent_id);
    std::fs::create_dir_all(&workspace).map_err(|e| e.to_string())?;
    let timeout_secs = args["timeout"].as_u64().unwrap_or(120).min(600);

    let mut child = tokio::process::Command::new("sh")
        .args(["-c", command])
        .current_dir(&workspace)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn process: {}", e))?;
    child.kill_on_drop(true);

    let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| e.to_string())?,
        Err(_) => return Err(format!("exec: command timed out after {}s", timeout_secs)),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(format!("exit_code={}\nstdout:\n{}\nstderr:\n{}", output.status.code().unwrap_or(-1), stdout, stderr))
}

async fn fetch(args: &serde_json::Value) -> Result<String, String> {
    let url = args["url"].as_str().ok_or("fetch: missing 'url'")?;
    let method = args["method"].as_str().unwrap_or("GET");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| e.to_string())?;
    let mut req = client.request(method.parse().map_err(|_| format!("fetch: invalid method '{}'", method))?, url);
    if let Some(headers) = args["headers"].as_object() {
        for (k, v) in headers {
            if let Some(v) = v.as_str() {
                req = req.header(k, v);
            }
        }
    }
    if let Some(body) = args.get("body") {
        req = match body.as_str() {
            Some(s) => req.body(s.to_string()),
            None => req.json(body),
        };
    }
    let resp = req.send().await.map_err(|e| e.to_string())?;
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let truncated = text.chars().take(20_000).collect::<String>();
    Ok(format!("status={}\n{}", status.as_u16(), truncated))
}

fn read_file(agent_id: &str, args: &serde_json::Value) -> Result<String, String> {
    let path = args["path"].as_str().ok_or("read_file: missing 'path'")?;
    let resolved = workspace_path(agent_id, path)?;
    std::fs::read_to_string(&resolved).map_err(|e| format!("read_file: {}", e))
}

fn write_file(agent_id: &str, args: &serde_json::Value) -> Result<String, String> {
    let path = args["path"].as_str().ok_or("write_file: missing 'path'")?;
    let content = args["content"].as_str().ok_or("write_file: missing 'content'")?;
    let resolved = workspace_path(agent_id, path)?;
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    std::fs::write(&resolved, content).map_err(|e| e.to_string())?;
    Ok(format!("Wrote {} bytes to {}", content.len(), path))
}

fn list_directory(agent_id: &str, args: &serde_json::Value) -> Result<String, String> {
    let path = args["path"].as_str().unwrap_or(".");
    let resolved = workspace_path(agent_id, path)?;
    let entries = std::fs::read_dir(&resolved).map_err(|e| format!("list_directory: {}", e))?;
    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let kind = if entry.path().is_dir() { "/" } else { "" };
        names.push(format!("{}{}", entry.file_name().to_string_lossy(), kind));
    }
    names.sort();
    Ok(names.join("\n"))
}

fn soul_read(state: &EngineState, agent_id: &str, args: &serde_json::Value) -> Result<String, String> {
    let file_name = args["file_name"].as_str().ok_or("soul_read: missing 'file_name'")?;
    match state.store.get_agent_file(agent_id, file_name).map_err(|e| e.to_string())? {
        Some(file) => Ok(format!("# {}\n\n{}", file.file_name, file.content)),
        None => Ok(format!("File '{}' does not exist yet. Create it with soul_write.", file_name)),
    }
}

const ALLOWED_SOUL_FILES: &[&str] = &["IDENTITY.md", "SOUL.md", "USER.md", "AGENTS.md", "TOOLS.md"];

fn soul_write(state: &EngineState, agent_id: &str, args: &serde_json::Value) -> Result<String, String> {
    let file_name = args["file_name"].as_str().ok_or("soul_write: missing 'file_name'")?;
    let content = args["content"].as_str().ok_or("soul_write: missing 'content'")?;
    if !ALLOWED_SOUL_FILES.contains(&file_name) {
        return Err(format!("soul_write: '{}' is not an allowed soul file", file_name));
    }
    state.store.set_agent_file(agent_id, file_name, content).map_err(|e| e.to_string())?;
    Ok(format!("Updated {}.", file_name))
}

fn soul_list(state: &EngineState, agent_id: &str) -> Result<String, String> {
    let files = state.store.list_agent_files(agent_id).map_err(|e| e.to_string())?;
    if files.is_empty() {
        return Ok("No soul files exist yet.".into());
    }
    let mut out = String::from("Soul files:\n");
    for f in &files {
        out.push_str(&format!("- {} ({} bytes)\n", f.file_name, f.content.len()));
    }
    Ok(out)
}

async fn memory_store(state: &EngineState, agent_id: &str, args: &serde_json::Value) -> Result<String, String> {
    let content = args["content"].as_str().ok_or("memory_store: missing 'content'")?;
    let category = args["category"].as_str().unwrap_or("general");
    let importance = (args["importance"].as_f64().unwrap_or(0.5) * 10.0).round().clamp(0.0, 10.0) as u8;
    let embedding_client = state.embedding_client();
    crate::engine::memory::store_memory(&state.store, content, category, importance, embedding_client.as_ref(), Some(agent_id))
        .await
        .map_err(|e| e.to_string())
}

async fn memory_search(state: &EngineState, agent_id: &str, args: &serde_json::Value) -> Result<String, String> {
    let query = args["query"].as_str().ok_or("memory_search: missing 'query'")?;
    let limit = args["limit"].as_u64().unwrap_or(5) as usize;
    let embedding_client = state.embedding_client();
    let results = crate::engine::memory::search_memories(&state.store, query, limit, 0.0, embedding_client.as_ref(), Some(agent_id))
        .await
        .map_err(|e| e.to_string())?;
    if results.is_empty() {
        return Ok("No relevant memories found.".into());
    }
    let mut out = String::new();
    for m in &results {
        out.push_str(&format!("- [{}] {}\n", m.category, m.content));
    }
    Ok(out)
}

fn create_task(state: &EngineState, args: &serde_json::Value) -> Result<String, String> {
    let title = args["title"].as_str().ok_or("create_task: missing 'title'")?;
    let description = args["description"].as_str().ok_or("create_task: missing 'description'")?;
    let priority = args["priority"].as_str().unwrap_or("medium").to_string();
    let agent_id = args["agent_id"].as_str().unwrap_or("default").to_string();
    let cron_schedule = args["cron_schedule"].as_str().map(String::from);
    let cron_enabled = cron_schedule.is_some();
    let now = chrono::Utc::now().to_rfc3339();

    let task = Task {
        id: uuid::Uuid::new_v4().to_string(),
        title: title.to_string(),
        description: description.to_string(),
        status: if cron_enabled { "assigned".into() } else { "inbox".into() },
        priority,
        assigned_agent: Some(agent_id.clone()),
        assigned_agents: vec![TaskAgent { agent_id: agent_id.clone(), role: "lead".into() }],
        session_id: None,
        cron_schedule,
        cron_enabled,
        last_run_at: None,
        next_run_at: if cron_enabled { Some(now.clone()) } else { None },
        created_at: now.clone(),
        updated_at: now,
        model: None,
        event_trigger: None,
        persistent: false,
    };
    state.store.create_task(&task)?;
    Ok(format!("Task created: {} ({})", title, task.id))
}

fn list_tasks(state: &EngineState) -> Result<String, String> {
    let tasks = state.store.list_tasks()?;
    if tasks.is_empty() {
        return Ok("No tasks.".into());
    }
    let mut out = String::new();
    for t in &tasks {
        out.push_str(&format!("- [{}] {} ({})\n", t.status, t.title, t.id));
    }
    Ok(out)
}

fn update_task(state: &EngineState, args: &serde_json::Value) -> Result<String, String> {
    let task_id = args["task_id"].as_str().ok_or("update_task: missing 'task_id'")?;
    let status = args["status"].as_str().ok_or("update_task: missing 'status'")?;
    let mut tasks = state.store.list_tasks()?;
    let task = tasks.iter_mut().find(|t| t.id == task_id).ok_or("update_task: task not found")?;
    task.status = status.to_string();
    task.updated_at = chrono::Utc::now().to_rfc3339();
    state.store.update_task(task)?;
    Ok(format!("Task {} set to {}", task_id, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_path_rejects_ssh_dir() {
        let result = workspace_path("agent1", "/root/.ssh/id_rsa");
        assert!(result.is_err());
    }

    #[test]
    fn workspace_path_allows_relative_path() {
        let result = workspace_path("agent1", "notes.md");
        assert!(result.is_ok());
    }

    #[test]
    fn builtin_definitions_cover_core_tools() {
        let defs = builtin_definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.function.name.as_str()).collect();
        for expected in ["exec", "fetch", "read_file", "memory_store", "memory_search", "create_task"] {
            assert!(names.contains(&expected), "missing tool: {}", expected);
        }
    }
}
