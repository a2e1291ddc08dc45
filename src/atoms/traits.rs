// ── Paw Atoms: Core Traits ────────────────────────────────────────────────
// The "golden trait" every AI backend implements, plus its dedicated error
// type. Kept in atoms/ (not engine/) so both engine::providers and the
// router can depend on it without a cycle.

use async_trait::async_trait;
use crate::engine::types::{Message, ToolDefinition, StreamChunk, ProviderKind};
use thiserror::Error;

/// Errors a provider implementation can raise. Distinct from `EngineError`
/// because callers (the router) need to pattern-match on failure class —
/// quota vs. auth vs. plain transport — before deciding whether to fail
/// over to the other lane.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    /// Non-2xx response the provider doesn't treat as auth or rate-limit.
    #[error("provider API error {status}: {message}")]
    Api { status: u16, message: String },

    /// 401/403 — never retried, never triggers cooldown (it won't clear itself).
    #[error("provider auth error: {0}")]
    Auth(String),

    /// 429 or a quota-indicative body. Callers use `retry_after_secs` (parsed
    /// from a `Retry-After` header or a textual reset hint) to size cooldown.
    #[error("provider rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Network/transport failure below the HTTP layer, or a malformed stream.
    #[error("provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    /// True for failure classes the router should treat as quota/capacity
    /// signals — i.e. worth a cooldown rather than an immediate retry.
    pub fn is_quota_like(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
            || matches!(self, ProviderError::Api { status, .. } if *status == 429 || *status == 529)
    }
}

impl From<ProviderError> for crate::atoms::error::EngineError {
    fn from(e: ProviderError) -> Self {
        let provider = "unknown".to_string();
        match e {
            ProviderError::Api { status, message } => {
                crate::atoms::error::EngineError::provider(provider, format!("{}: {}", status, message))
            }
            ProviderError::Auth(msg) => crate::atoms::error::EngineError::Auth(msg),
            ProviderError::RateLimited { message, .. } => {
                crate::atoms::error::EngineError::provider(provider, message)
            }
            ProviderError::Transport(msg) => crate::atoms::error::EngineError::provider(provider, msg),
        }
    }
}

/// Every AI backend — Anthropic, OpenAI-compatible, Google — implements this.
/// Adding a new backend means adding a struct + impl; nothing else in the
/// router or engine needs to change (see `engine::providers::AnyProvider`).
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short lowercase identifier, used in logs and error messages.
    fn name(&self) -> &str;

    /// The `ProviderKind` discriminant this implementation answers for.
    fn kind(&self) -> ProviderKind;

    /// Run one chat completion, consuming the full SSE stream into chunks.
    /// `thinking_level` ("none" | "low" | "medium" | "high") is honored by
    /// backends that support extended thinking/reasoning; others ignore it.
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        temperature: Option<f64>,
        thinking_level: Option<&str>,
    ) -> Result<Vec<StreamChunk>, ProviderError>;
}
