// Paw Agent Engine — Command Interpreter
//
// Slash-commands on the latest user message are meta-operations that
// never touch the model: parse the first token, dispatch, return a
// human string or a JSON string for the engine to persist verbatim as
// the assistant's reply. Admin-gated commands are rejected before
// dispatch, not inside each handler, so the gate can't be forgotten.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{ApprovalAction, SchedulerBacklog};
use crate::engine::sessions::SessionStore;
use serde_json::json;

/// A parsed slash-command, ready to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Verbose(bool),
    Group { enable: bool, agent: String },
    New,
    Compact,
    OnboardingReset,
    Status,
    LogsTrace { trace_id: String },
    LogsSearch { query: String },
    Kb { op: KbOp },
    Unlock { code: String },
    Restart,
    Approve { action: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum KbOp {
    Add(String),
    List,
    Search(String),
    Get(String),
}

impl Command {
    /// True for commands restricted to admins; checked by the caller
    /// before `execute` so a denied command never reaches a handler.
    pub fn requires_admin(&self) -> bool {
        matches!(self, Command::Unlock { .. } | Command::Restart | Command::Approve { .. })
    }
}

/// Parse the first token of a message as a slash-command. Returns `None`
/// for ordinary conversational text, which the caller routes to the
/// model as usual.
pub fn parse(text: &str) -> Option<Result<Command, String>> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    let result = match head {
        "verbose" => match args.first() {
            Some(&"on") => Ok(Command::Verbose(true)),
            Some(&"off") => Ok(Command::Verbose(false)),
            _ => Err("usage: /verbose on|off".to_string()),
        },
        "group" => {
            if args.len() < 2 {
                Err("usage: /group on|off <agent>".to_string())
            } else {
                match args[0] {
                    "on" => Ok(Command::Group { enable: true, agent: args[1].to_string() }),
                    "off" => {
                        if args[1] == "main" {
                            Err("main cannot be disabled".to_string())
                        } else {
                            Ok(Command::Group { enable: false, agent: args[1].to_string() })
                        }
                    }
                    _ => Err("usage: /group on|off <agent>".to_string()),
                }
            }
        }
        "new" => Ok(Command::New),
        "compact" => Ok(Command::Compact),
        "onboarding" => {
            if args.first() == Some(&"reset") {
                Ok(Command::OnboardingReset)
            } else {
                Err("usage: /onboarding reset".to_string())
            }
        }
        "status" => Ok(Command::Status),
        "logs" => match args.first() {
            Some(&"trace") => args
                .get(1)
                .map(|id| Command::LogsTrace { trace_id: id.to_string() })
                .ok_or_else(|| "usage: /logs trace <id>".to_string()),
            Some(&"search") if args.len() >= 2 => Ok(Command::LogsSearch { query: args[1..].join(" ") }),
            _ => Err("usage: /logs trace <id> | /logs search <q>".to_string()),
        },
        "kb" => match args.first() {
            Some(&"add") if args.len() >= 2 => Ok(Command::Kb { op: KbOp::Add(args[1..].join(" ")) }),
            Some(&"list") => Ok(Command::Kb { op: KbOp::List }),
            Some(&"search") if args.len() >= 2 => Ok(Command::Kb { op: KbOp::Search(args[1..].join(" ")) }),
            Some(&"get") if args.len() >= 2 => Ok(Command::Kb { op: KbOp::Get(args[1].to_string()) }),
            _ => Err("usage: /kb add|list|search|get ...".to_string()),
        },
        "unlock" => args
            .first()
            .map(|c| Command::Unlock { code: c.to_string() })
            .ok_or_else(|| "usage: /unlock <code>".to_string()),
        "restart" => Ok(Command::Restart),
        "approve" => args
            .first()
            .map(|a| Command::Approve { action: a.to_string() })
            .ok_or_else(|| "usage: /approve <action>".to_string()),
        other => Err(format!("unrecognized command: /{}", other)),
    };
    Some(result)
}

/// Everything a command handler needs, gathered up front so handlers stay
/// pure functions of `(Command, &CommandContext)`.
pub struct CommandContext<'a> {
    pub store: &'a SessionStore,
    pub thread_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub provider_health: crate::engine::provider_router::HealthReport,
    pub scheduler_backlog: SchedulerBacklog,
    pub active_agents: Vec<String>,
    pub in_flight: u32,
    pub max_concurrent: u32,
}

/// Dispatch a parsed command. Returns the string to persist as the
/// assistant's reply — either a short human string or a JSON string.
pub fn execute(cmd: &Command, ctx: &CommandContext<'_>) -> EngineResult<String> {
    if cmd.requires_admin() && !ctx.is_admin {
        return Err(EngineError::Auth("admin required".to_string()));
    }

    match cmd {
        Command::Verbose(on) => {
            ctx.store.set_thread_setting(&ctx.thread_id, "verbose", if *on { "1" } else { "0" })?;
            Ok(format!("verbose {}", if *on { "enabled" } else { "disabled" }))
        }
        Command::Group { enable, agent } => {
            ctx.store.set_roster_entry(&ctx.thread_id, agent, *enable)?;
            Ok(format!("{} {}", if *enable { "enabled" } else { "disabled" }, agent))
        }
        Command::New => {
            let new_thread_id = ctx.store.create_sibling_thread(&ctx.thread_id, &ctx.user_id)?;
            Ok(format!("started new thread {}", new_thread_id))
        }
        Command::Compact => {
            ctx.store.enqueue_compaction(&ctx.thread_id)?;
            Ok("compaction enqueued".to_string())
        }
        Command::OnboardingReset => {
            ctx.store.reset_onboarding(&ctx.user_id)?;
            Ok("onboarding state reset".to_string())
        }
        Command::Status => Ok(json!({
            "providers": { "primary": ctx.provider_health.primary, "fallback": ctx.provider_health.fallback },
            "scheduler": { "dispatchable_total": ctx.scheduler_backlog.dispatchable_total, "deferred_total": ctx.scheduler_backlog.deferred_total },
            "active_agents": ctx.active_agents,
            "queue": { "in_flight": ctx.in_flight, "max_concurrent": ctx.max_concurrent },
        })
        .to_string()),
        Command::LogsTrace { trace_id } => {
            let events = ctx.store.events_for_trace(trace_id)?;
            Ok(json!(events
                .into_iter()
                .map(|(id, event_type, payload)| json!({
                    "id": id, "event_type": event_type,
                    "payload": serde_json::from_str::<serde_json::Value>(&payload).unwrap_or(serde_json::Value::Null)
                }))
                .collect::<Vec<_>>())
            .to_string())
        }
        Command::LogsSearch { query } => {
            let hits = ctx.store.search_events(query, 50)?;
            Ok(json!(hits
                .into_iter()
                .map(|(id, event_type, payload, created_at)| json!({
                    "id": id, "event_type": event_type,
                    "payload": serde_json::from_str::<serde_json::Value>(&payload).unwrap_or(serde_json::Value::Null),
                    "created_at": created_at
                }))
                .collect::<Vec<_>>())
            .to_string())
        }
        Command::Kb { op } => execute_kb(op, ctx),
        Command::Unlock { code } => {
            if ctx.store.unlock_code_is_fresh(code)? {
                ctx.store.clear_lockdown()?;
                Ok("lockdown cleared".to_string())
            } else {
                Err(EngineError::Security("unlock code invalid or expired".to_string()))
            }
        }
        Command::Restart => {
            if ctx.store.is_lockdown_active()? {
                Err(EngineError::Security("restart denied: lockdown active".to_string()))
            } else {
                ctx.store.set_restart_flag()?;
                Ok("restart flag set".to_string())
            }
        }
        Command::Approve { action } => {
            let action = ApprovalAction::from_str_loose(action)
                .ok_or_else(|| EngineError::Config(format!("unknown approval action: {}", action)))?;
            let id = ctx.store.create_approval(action, &ctx.user_id)?;
            Ok(format!("approval {} created for {}", id, action_name(action)))
        }
    }
}

fn action_name(action: ApprovalAction) -> &'static str {
    match action {
        ApprovalAction::HostExecSudo => "host.exec.sudo",
        ApprovalAction::HostExecSystemctl => "host.exec.systemctl",
        ApprovalAction::HostExecProtectedPath => "host.exec.protected_path",
        ApprovalAction::SelfupdateApply => "selfupdate.apply",
    }
}

fn execute_kb(op: &KbOp, ctx: &CommandContext<'_>) -> EngineResult<String> {
    match op {
        KbOp::Add(text) => {
            let id = ctx.store.kb_add(&ctx.thread_id, text)?;
            Ok(format!("added {}", id))
        }
        KbOp::List => Ok(json!(ctx.store.kb_list(&ctx.thread_id)?).to_string()),
        KbOp::Search(q) => Ok(json!(ctx.store.kb_search(&ctx.thread_id, q)?).to_string()),
        KbOp::Get(id) => match ctx.store.kb_get(id)? {
            Some(entry) => Ok(json!(entry).to_string()),
            None => Err(EngineError::Other(format!("kb entry not found: {}", id))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verbose_toggle() {
        assert_eq!(parse("/verbose on"), Some(Ok(Command::Verbose(true))));
        assert_eq!(parse("/verbose off"), Some(Ok(Command::Verbose(false))));
    }

    #[test]
    fn rejects_disabling_main_in_group_command() {
        assert_eq!(parse("/group off main"), Some(Err("main cannot be disabled".to_string())));
    }

    #[test]
    fn parses_logs_trace_and_search() {
        assert_eq!(parse("/logs trace abc123"), Some(Ok(Command::LogsTrace { trace_id: "abc123".to_string() })));
        assert_eq!(parse("/logs search deploy failure"), Some(Ok(Command::LogsSearch { query: "deploy failure".to_string() })));
    }

    #[test]
    fn non_slash_text_is_not_a_command() {
        assert_eq!(parse("hello there"), None);
    }

    #[test]
    fn admin_commands_are_flagged() {
        assert!(Command::Restart.requires_admin());
        assert!(Command::Approve { action: "host.exec.sudo".to_string() }.requires_admin());
        assert!(!Command::Status.requires_admin());
    }

    #[test]
    fn unrecognized_command_is_an_error() {
        match parse("/frobnicate") {
            Some(Err(msg)) => assert!(msg.contains("frobnicate")),
            other => panic!("expected error, got {:?}", other),
        }
    }
}
