// Paw Agent Engine — Provider Router
//
// Presents a single `generate()` call over a primary/fallback pair of
// providers. Tracks primary health so a quota error on one call doesn't
// have to be rediscovered on the next — it trips a cooldown the way
// `http::CircuitBreaker` trips on repeated transport failures, except the
// router's state also knows the *reason* and *until* a retry is worth
// trying again.

use crate::atoms::traits::ProviderError;
use crate::engine::providers::AnyProvider;
use crate::engine::types::{Message, ProviderConfig, StreamChunk, ToolDefinition};
use log::{info, warn};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Default cooldown applied when a quota error carries no parseable
/// retry window of its own.
pub const DEFAULT_QUOTA_COOLDOWN_SECS: u64 = 300;

/// Which lane actually produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Primary,
    Fallback,
}

/// Primary-provider health, mirrored for the fallback when it exists.
#[derive(Debug, Clone, PartialEq)]
enum Health {
    Healthy,
    Cooldown { until: Instant, reason: String },
    Unhealthy,
}

struct LaneState {
    health: Mutex<Health>,
}

impl LaneState {
    fn new() -> Self {
        LaneState { health: Mutex::new(Health::Healthy) }
    }

    /// Resolve COOLDOWN back to HEALTHY once its window has passed, and
    /// report whether the lane can currently be tried.
    fn is_available(&self) -> bool {
        let mut health = self.health.lock();
        match &*health {
            Health::Healthy => true,
            Health::Unhealthy => false,
            Health::Cooldown { until, .. } => {
                if Instant::now() >= *until {
                    *health = Health::Healthy;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn trip_cooldown(&self, reason: String, retry_after_secs: Option<u64>) {
        let secs = retry_after_secs.unwrap_or(DEFAULT_QUOTA_COOLDOWN_SECS);
        let until = Instant::now() + Duration::from_secs(secs);
        warn!("[provider-router] cooldown engaged for {}s: {}", secs, reason);
        *self.health.lock() = Health::Cooldown { until, reason };
    }

    fn mark_unhealthy(&self) {
        *self.health.lock() = Health::Unhealthy;
    }

    fn mark_healthy(&self) {
        *self.health.lock() = Health::Healthy;
    }

    fn snapshot(&self) -> Health {
        self.health.lock().clone()
    }
}

/// Relative priority the caller assigns a request; reserved for future
/// token-budget-aware lane selection (see `health()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    Low,
}

/// Result of a successful `generate()` call: the chunks plus which lane
/// produced them and the primary's error if the router had to fail over.
pub struct RouteResponse {
    pub chunks: Vec<StreamChunk>,
    pub lane: Lane,
    pub primary_error: Option<ProviderError>,
}

/// Health snapshot returned by `health()`.
pub struct HealthReport {
    pub primary: bool,
    pub fallback: bool,
}

/// Routes chat completions over a primary provider with an optional
/// fallback, tracking quota cooldowns so repeated calls during a known
/// cooldown window skip straight to the fallback.
pub struct ProviderRouter {
    primary: AnyProvider,
    primary_state: LaneState,
    fallback: Option<AnyProvider>,
    fallback_state: LaneState,
}

impl ProviderRouter {
    pub fn new(primary_config: &ProviderConfig, fallback_config: Option<&ProviderConfig>) -> Self {
        ProviderRouter {
            primary: AnyProvider::from_config(primary_config),
            primary_state: LaneState::new(),
            fallback: fallback_config.map(AnyProvider::from_config),
            fallback_state: LaneState::new(),
        }
    }

    /// Cheap, cached-free health probe. The step engine uses this to decide
    /// token budget before committing to a generation call — it does not
    /// make a network request, only reports the router's own state.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            primary: self.primary_state.is_available(),
            fallback: self.fallback.is_some() && self.fallback_state.is_available(),
        }
    }

    /// Run one chat completion, preferring the primary unless it is in
    /// cooldown or marked unhealthy. A quota-classified error encountered
    /// mid-call trips the primary's cooldown and retries once against the
    /// fallback within the same call.
    pub async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        temperature: Option<f64>,
        thinking_level: Option<&str>,
        _priority: Priority,
    ) -> Result<RouteResponse, ProviderError> {
        if self.primary_state.is_available() {
            match self.primary.chat_stream(messages, tools, model, temperature, thinking_level).await {
                Ok(chunks) => {
                    self.primary_state.mark_healthy();
                    return Ok(RouteResponse { chunks, lane: Lane::Primary, primary_error: None });
                }
                Err(err) => {
                    self.classify_and_record(&self.primary_state, &err);
                    if let Some(fallback) = &self.fallback {
                        info!("[provider-router] primary failed ({}); trying fallback {}", err, fallback.name());
                        if self.fallback_state.is_available() {
                            let chunks = fallback
                                .chat_stream(messages, tools, model, temperature, thinking_level)
                                .await
                                .map_err(|fallback_err| {
                                    self.classify_and_record(&self.fallback_state, &fallback_err);
                                    fallback_err
                                })?;
                            self.fallback_state.mark_healthy();
                            return Ok(RouteResponse { chunks, lane: Lane::Fallback, primary_error: Some(err) });
                        }
                    }
                    return Err(err);
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            if self.fallback_state.is_available() {
                let chunks = fallback
                    .chat_stream(messages, tools, model, temperature, thinking_level)
                    .await
                    .map_err(|err| {
                        self.classify_and_record(&self.fallback_state, &err);
                        err
                    })?;
                self.fallback_state.mark_healthy();
                return Ok(RouteResponse { chunks, lane: Lane::Fallback, primary_error: None });
            }
        }

        Err(ProviderError::Transport("no provider lane available".to_string()))
    }

    fn classify_and_record(&self, lane: &LaneState, err: &ProviderError) {
        match err {
            ProviderError::Auth(_) => lane.mark_unhealthy(),
            _ if err.is_quota_like() => {
                let retry_after = match err {
                    ProviderError::RateLimited { retry_after_secs, .. } => *retry_after_secs,
                    _ => None,
                }
                .or_else(|| parse_reset_hint(&err.to_string()));
                lane.trip_cooldown(err.to_string(), retry_after);
            }
            _ => {}
        }
    }
}

/// Best-effort parse of a textual retry hint such as "reset after 1h30m" or
/// "try again in 45s" that some providers embed in a 429 body instead of
/// (or in addition to) a `Retry-After` header. Returns `None` if nothing
/// recognizable is found, leaving the caller to fall back to the default.
fn parse_reset_hint(text: &str) -> Option<u64> {
    let lower = text.to_lowercase();
    let idx = lower.find("after ").map(|i| i + 6).or_else(|| lower.find("in "))?;
    let tail = &lower[idx..];
    let mut total_secs: u64 = 0;
    let mut num = String::new();
    let mut found = false;
    for ch in tail.chars() {
        if ch.is_ascii_digit() {
            num.push(ch);
        } else if matches!(ch, 'h' | 'm' | 's') && !num.is_empty() {
            let n: u64 = num.parse().ok()?;
            total_secs += match ch {
                'h' => n * 3600,
                'm' => n * 60,
                's' => n,
                _ => 0,
            };
            num.clear();
            found = true;
        } else if found {
            break;
        } else if !ch.is_whitespace() {
            break;
        }
    }
    if found { Some(total_secs) } else { None }
}

#[cfg(test)]
mod reset_hint_tests {
    use super::parse_reset_hint;

    #[test]
    fn parses_combined_hours_minutes() {
        assert_eq!(parse_reset_hint("quota exceeded, reset after 1h30m"), Some(5400));
    }

    #[test]
    fn parses_seconds_only() {
        assert_eq!(parse_reset_hint("try again in 45s"), Some(45));
    }

    #[test]
    fn none_when_no_hint_present() {
        assert_eq!(parse_reset_hint("quota exceeded"), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_by_default() {
        let state = LaneState::new();
        assert!(state.is_available());
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let state = LaneState::new();
        state.trip_cooldown("quota exceeded".to_string(), Some(0));
        // retry_after 0 means the cooldown window is effectively already over
        std::thread::sleep(Duration::from_millis(5));
        assert!(state.is_available());
    }

    #[test]
    fn unhealthy_stays_unavailable_until_reset() {
        let state = LaneState::new();
        state.mark_unhealthy();
        assert!(!state.is_available());
        state.mark_healthy();
        assert!(state.is_available());
    }

    #[test]
    fn is_quota_like_classifies_429_and_529() {
        let e = ProviderError::Api { status: 429, message: "rate limited".into() };
        assert!(e.is_quota_like());
        let e = ProviderError::Api { status: 529, message: "overloaded".into() };
        assert!(e.is_quota_like());
        let e = ProviderError::Api { status: 500, message: "server error".into() };
        assert!(!e.is_quota_like());
    }
}
