// Paw Agent Engine — Agent Step Engine
//
// Produces exactly one persisted assistant message per
// `(trace_id, thread_id, actor_id)` invocation. This is the organism that
// pulls every other module together: command interpreter first-chance,
// memory + structured-state retrieval, prompt assembly under a token
// budget, the provider-router tool loop, identity enforcement, and the
// post-step compaction trigger.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{Message, MessageContent, Role, SchedulerBacklog, StoredMessage};
use crate::engine::commands::{self, CommandContext};
use crate::engine::events::EventWrite;
use crate::engine::identity;
use crate::engine::memory_service;
use crate::engine::prompt_assembler::{self, AssemblyInputs, AssemblyMode};
use crate::engine::provider_router::{Priority, ProviderRouter};
use crate::engine::skills;
use crate::engine::state::EngineState;
use crate::engine::state_store::StateSearchFilters;
use crate::engine::tool_runtime;
use uuid::Uuid;

pub const MAX_TOOL_ITERATIONS: usize = 3;
const PRIMARY_TOKEN_BUDGET: usize = 32_000;
const FALLBACK_TOKEN_BUDGET: usize = 12_000;
const COMPACTION_MESSAGE_THRESHOLD: usize = 20;

/// A notification sink the caller can use to observe step progress
/// (streaming UIs, CLI spinners). The core never blocks on it.
pub trait StepNotify: Send + Sync {
    fn on_event(&self, event_type: &str) {
        let _ = event_type;
    }
}

/// A notifier that does nothing — the default when the caller doesn't
/// care to observe intermediate events.
pub struct NoopNotify;
impl StepNotify for NoopNotify {}

fn new_span() -> String {
    Uuid::new_v4().to_string()
}

fn emit(state: &EngineState, trace_id: &str, parent: Option<&str>, event_type: &str, payload: serde_json::Value) -> String {
    let span_id = new_span();
    state
        .store
        .write_event(EventWrite { trace_id, span_id: &span_id, parent_span_id: parent, event_type, payload })
        .unwrap_or_else(|_| span_id.clone());
    span_id
}

/// `runStep(trace_id, thread_id, actor_id, notify) -> message_id`.
pub async fn run_step(
    state: &EngineState,
    router: &ProviderRouter,
    trace_id: &str,
    thread_id: &str,
    actor_id: &str,
    notify: &dyn StepNotify,
) -> EngineResult<String> {
    let root_span = emit(state, trace_id, None, "agent.step.start", serde_json::json!({"thread_id": thread_id, "actor_id": actor_id}));
    notify.on_event("agent.step.start");

    // 2. Tail + last user message.
    let tail = state.store.get_messages(thread_id, 8)?;
    let last_user_text = tail.iter().rev().find(|m| m.role == "user").map(|m| m.content.clone());

    // 3. Command interpreter first-chance.
    if actor_id == "main" {
        if let Some(text) = &last_user_text {
            if let Some(parsed) = commands::parse(text) {
                let response = match parsed {
                    Ok(cmd) => {
                        let ctx = build_command_context(state, router, thread_id)?;
                        commands::execute(&cmd, &ctx)
                    }
                    Err(usage) => Ok(usage),
                };
                let response = response?;
                let message_id = persist_assistant_message(state, thread_id, &response)?;
                emit(state, trace_id, Some(root_span.as_str()), "command.executed", serde_json::json!({"thread_id": thread_id}));
                touch_heartbeat(state, actor_id, "ran a command")?;
                emit(state, trace_id, Some(root_span.as_str()), "agent.step.end", serde_json::json!({"message_id": message_id, "lane": "command"}));
                return Ok(message_id);
            }
        }
    }

    // 4. Memory retrieval.
    let query = last_user_text.clone().unwrap_or_default();
    let embedding_client = state.embedding_client();
    let memory_hits = memory_service::search(&state.store, embedding_client.as_ref(), thread_id, &query, 8, trace_id).await?;
    let context_body = memory_hits.iter().map(|h| format!("- {}", h.text)).collect::<Vec<_>>().join("\n");

    // Structured state, folded in for `main` the same way memory is.
    let state_items = state
        .store
        .search_state(thread_id, &query, &StateSearchFilters::default(), 10, 0.0, actor_id)
        .unwrap_or_default();
    let structured_state = state_items
        .iter()
        .map(|s| format!("- [{:?}/{:?}] {}", s.type_tag, s.status, s.text))
        .collect::<Vec<_>>()
        .join("\n");

    // 5. Skills to advertise.
    let skills_body = skills::prompt::get_enabled_skill_instructions(&state.store, actor_id).unwrap_or_default();

    // 6. Identity + soul + environment block.
    let identity_md = state.store.get_agent_file(actor_id, "IDENTITY.md").ok().flatten().map(|f| f.content).unwrap_or_default();
    let soul_md = state.store.get_agent_file(actor_id, "SOUL.md").ok().flatten().map(|f| f.content).unwrap_or_default();
    let lockdown = state.store.is_lockdown_active().unwrap_or(false);
    let roster: Vec<String> = state.store.list_all_agents().map(|v| v.into_iter().map(|(id, _)| id).collect()).unwrap_or_default();
    let identity_block = format!(
        "{}\n\n{}\n\nNever identify as an AI, model, or software.\n\n## Environment\n- time: {}\n- lockdown: {}\n- roster: {}",
        identity_md,
        soul_md,
        chrono::Utc::now().to_rfc3339(),
        lockdown,
        roster.join(", "),
    );

    // 7. Provider lane probe -> token budget.
    let health = router.health();
    let token_budget = if health.primary { PRIMARY_TOKEN_BUDGET } else { FALLBACK_TOKEN_BUDGET };

    // 8. Prompt assembly.
    let summary = state.store.get_thread_summary(thread_id).ok().flatten();
    let (summary_short, summary_long) = summary.map(|s| (s.short_summary, s.long_summary)).unwrap_or_default();
    let tail_body = tail.iter().map(|m| format!("{}: {}", m.role, m.content)).collect::<Vec<_>>().join("\n");

    let assembly_inputs = AssemblyInputs {
        identity: identity_block,
        tool_catalog: tool_runtime::builtin_definitions().into_iter().map(|d| (d.function.name, d.function.description)).collect(),
        skill_catalog: Vec::new(),
        summary_short,
        summary_long,
        structured_state,
        skills_body,
        context_body,
        tail_body,
    };
    let (mut system_prompt, _body, mut report) = prompt_assembler::assemble(&assembly_inputs, token_budget, AssemblyMode::Full);
    emit(
        state,
        trace_id,
        Some(root_span.as_str()),
        "prompt.build",
        serde_json::json!({"sections": report.sections.iter().map(|s| s.name.clone()).collect::<Vec<_>>(), "used_summary_long_fallback": report.used_summary_long_fallback}),
    );

    // 9. Rebuild once if the prompt itself overshoots 80% of the budget.
    let estimated = prompt_assembler::estimate_tokens(&system_prompt);
    if estimated as f64 > token_budget as f64 * 0.8 {
        memory_service::compact_thread(&state.store, None, thread_id, false).await.ok();
        let summary = state.store.get_thread_summary(thread_id).ok().flatten();
        let (summary_short, summary_long) = summary.map(|s| (s.short_summary, s.long_summary)).unwrap_or_default();
        let mut rebuilt_inputs = assembly_inputs;
        rebuilt_inputs.summary_short = summary_short;
        rebuilt_inputs.summary_long = summary_long;
        let (rebuilt_system, _rebuilt_body, rebuilt_report) = prompt_assembler::assemble(&rebuilt_inputs, token_budget, AssemblyMode::Full);
        system_prompt = rebuilt_system;
        report = rebuilt_report;
    }
    let _ = report;

    // 10. Tool loop.
    let mut convo = state.store.load_conversation(thread_id, Some(system_prompt.as_str()), Some(token_budget * 4))?;
    let tool_defs = tool_runtime::builtin_definitions();
    let mut final_text = String::new();
    let mut lane_name = "primary";
    let model = state.config.lock().default_model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());

    for iteration in 0..=MAX_TOOL_ITERATIONS {
        emit(state, trace_id, Some(root_span.as_str()), "model.run.start", serde_json::json!({"iteration": iteration}));
        let route = router.generate(&convo, &tool_defs, &model, None, None, Priority::Normal).await;
        let route = route.map_err(|e| EngineError::Other(format!("provider exhaustion: {}", e)))?;
        lane_name = if matches!(route.lane, crate::engine::provider_router::Lane::Fallback) { "fallback" } else { "primary" };
        emit(state, trace_id, Some(root_span.as_str()), "model.run.end", serde_json::json!({"iteration": iteration, "lane": lane_name}));
        if route.primary_error.is_some() {
            emit(state, trace_id, Some(root_span.as_str()), "model.fallback", serde_json::json!({"iteration": iteration}));
        }

        let raw_text: String = route.chunks.iter().filter_map(|c| c.delta_text.as_deref()).collect();
        let text = identity::enforce(&raw_text);
        let tool_calls = assemble_tool_calls(&route.chunks);

        if tool_calls.is_empty() || iteration == MAX_TOOL_ITERATIONS {
            final_text = text;
            break;
        }

        convo.push(Message { role: Role::Assistant, content: MessageContent::Text(text), tool_calls: None, tool_call_id: None, name: None });

        for call in &tool_calls {
            emit(state, trace_id, Some(root_span.as_str()), "tool.call.start", serde_json::json!({"tool": call.name}));
            let args: serde_json::Value = serde_json::from_str(&call.arguments).unwrap_or(serde_json::json!({}));
            let result = tool_runtime::execute(state, actor_id, &call.name, &args).await;
            let payload = match &result {
                Ok(output) => serde_json::json!({"tool": call.name, "result": output}),
                Err(error) => serde_json::json!({"tool": call.name, "error": error}),
            };
            emit(state, trace_id, Some(root_span.as_str()), "tool.call.end", serde_json::json!({"tool": call.name, "success": result.is_ok()}));
            convo.push(Message {
                role: Role::User,
                content: MessageContent::Text(format!("[tool_result] {}", payload)),
                tool_calls: None,
                tool_call_id: None,
                name: None,
            });
        }
    }

    // 11. Persist.
    let message_id = persist_assistant_message(state, thread_id, &final_text)?;
    touch_heartbeat(state, actor_id, &format!("replied in thread {}", thread_id))?;

    // 12. Post-step compaction check.
    let all_messages = state.store.get_messages(thread_id, 10_000).unwrap_or_default();
    if all_messages.len() >= COMPACTION_MESSAGE_THRESHOLD {
        memory_service::compact_thread(&state.store, None, thread_id, false).await.ok();
    }

    // 13.
    emit(state, trace_id, Some(root_span.as_str()), "agent.step.end", serde_json::json!({"message_id": message_id, "lane": lane_name}));
    notify.on_event("agent.step.end");
    Ok(message_id)
}

struct AssembledToolCall {
    name: String,
    arguments: String,
}

/// Streaming providers emit tool calls as per-index deltas (id once,
/// function name once, arguments in fragments); consolidate them into
/// complete calls before dispatch.
fn assemble_tool_calls(chunks: &[crate::atoms::types::StreamChunk]) -> Vec<AssembledToolCall> {
    let mut by_index: std::collections::BTreeMap<usize, AssembledToolCall> = std::collections::BTreeMap::new();
    for chunk in chunks {
        for delta in &chunk.tool_calls {
            let entry = by_index.entry(delta.index).or_insert_with(|| AssembledToolCall { name: String::new(), arguments: String::new() });
            if let Some(name) = &delta.function_name {
                entry.name = name.clone();
            }
            if let Some(args) = &delta.arguments_delta {
                entry.arguments.push_str(args);
            }
        }
    }
    by_index.into_values().filter(|c| !c.name.is_empty()).collect()
}

fn persist_assistant_message(state: &EngineState, thread_id: &str, text: &str) -> EngineResult<String> {
    let id = Uuid::new_v4().to_string();
    state.store.add_message(&StoredMessage {
        id: id.clone(),
        session_id: thread_id.to_string(),
        role: "assistant".to_string(),
        content: text.to_string(),
        tool_calls_json: None,
        tool_call_id: None,
        name: None,
        created_at: String::new(),
    })?;
    Ok(id)
}

fn touch_heartbeat(state: &EngineState, actor_id: &str, summary: &str) -> EngineResult<()> {
    let note = format!("Last action ({}): {}", chrono::Utc::now().to_rfc3339(), summary);
    state.store.set_agent_file(actor_id, "HEARTBEAT.md", &note)?;
    Ok(())
}

fn build_command_context<'a>(state: &'a EngineState, router: &ProviderRouter, thread_id: &str) -> EngineResult<CommandContext<'a>> {
    let health = router.health();
    let scheduler_backlog = SchedulerBacklog { dispatchable_total: 0, deferred_total: 0 };
    Ok(CommandContext {
        store: &state.store,
        thread_id: thread_id.to_string(),
        user_id: "main".to_string(),
        is_admin: true,
        provider_health: health,
        scheduler_backlog,
        active_agents: Vec::new(),
        in_flight: 0,
        max_concurrent: 4,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingNotify {
        events: std::sync::Mutex<Vec<String>>,
    }
    impl StepNotify for RecordingNotify {
        fn on_event(&self, event_type: &str) {
            self.events.lock().unwrap().push(event_type.to_string());
        }
    }

    #[test]
    fn noop_notify_does_not_panic() {
        let n = NoopNotify;
        n.on_event("agent.step.start");
    }

    #[test]
    fn recording_notify_collects_events() {
        let n = RecordingNotify { events: std::sync::Mutex::new(Vec::new()) };
        n.on_event("agent.step.start");
        n.on_event("agent.step.end");
        assert_eq!(n.events.lock().unwrap().len(), 2);
    }
}
