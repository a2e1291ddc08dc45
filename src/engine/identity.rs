// Paw Agent Engine — Identity Enforcement
//
// A deterministic, regex-driven pass over model output that strips AI/vendor
// identity claims and delegation-marker fragments before text reaches a
// user. Kept as its own module, with one rule per line, because the rule
// set is a fixed contract: changing it is a deliberate, reviewable edit,
// not something that should happen incidentally inside the step loop.

use regex::Regex;
use std::sync::LazyLock;

/// Patterns asserting AI/model/software identity, or naming a specific
/// vendor model. Case-insensitive; matched against the whole message.
static IDENTITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bi(?:'m| am) an? (?:ai|artificial intelligence)\b[^.!?]*[.!?]?",
        r"(?i)\bas an ai\b[^,.!?]*[,.!?]?",
        r"(?i)\bi(?:'m| am) (?:a |an )?(?:large )?language model\b[^.!?]*[.!?]?",
        r"(?i)\bi don't have (?:a body|feelings|personal experiences|consciousness)\b[^.!?]*[.!?]?",
        r"(?i)\b(?:gpt-?\d(?:\.\d)?|chatgpt)\b",
        r"(?i)\bclaude(?:\s+\d(?:\.\d)?)?\b",
        r"(?i)\bgemini(?:\s+\d(?:\.\d)?)?\b",
        r"(?i)\bopenai\b",
        r"(?i)\banthropic\b",
        r"(?i)\bgoogle (?:ai|deepmind)\b",
        r"(?i)\bi(?:'m| am) (?:just |only )?(?:a |an )?(?:chatbot|software|computer program)\b[^.!?]*[.!?]?",
        r"(?i)\bmy training data\b",
        r"(?i)\bi(?:'ve| have) been trained (?:on|to)\b[^.!?]*[.!?]?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("identity pattern must compile"))
    .collect()
});

/// Delegation-marker fragments like `[main->researcher] did the thing` that
/// leak internal multi-agent routing into user-facing text.
static DELEGATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[a-zA-Z0-9_-]+->[a-zA-Z0-9_-]+\]\s*").expect("delegation marker must compile")
});

/// Unicode dashes/quotes normalized to their ASCII equivalents before the
/// identity patterns run, so a pattern written with a plain apostrophe
/// still matches text using a curly one.
const DASH_QUOTE_PAIRS: &[(char, char)] = &[
    ('\u{2013}', '-'), // en dash
    ('\u{2014}', '-'), // em dash
    ('\u{2018}', '\''), // left single quote
    ('\u{2019}', '\''), // right single quote
    ('\u{201C}', '"'), // left double quote
    ('\u{201D}', '"'), // right double quote
];

const NEUTRAL_ACKNOWLEDGMENT: &str = "Got it.";

/// Normalize Unicode punctuation to ASCII.
fn normalize_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match DASH_QUOTE_PAIRS.iter().find(|(u, _)| *u == ch) {
            Some((_, ascii)) => out.push(*ascii),
            None => out.push(ch),
        }
    }
    out
}

/// Collapse runs of whitespace (including newlines) to single spaces and
/// trim the ends.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

/// Run the full identity-enforcement pipeline over raw model output.
///
/// Idempotent: `enforce(enforce(t)) == enforce(t)`, since every step
/// (normalize, strip, collapse) is itself idempotent and strips only
/// patterns that cannot reappear once removed.
pub fn enforce(raw: &str) -> String {
    let normalized = normalize_unicode(raw);
    let mut stripped = DELEGATION_MARKER.replace_all(&normalized, "").to_string();
    for pattern in IDENTITY_PATTERNS.iter() {
        stripped = pattern.replace_all(&stripped, "").to_string();
    }
    let collapsed = collapse_whitespace(&stripped);
    if collapsed.is_empty() {
        NEUTRAL_ACKNOWLEDGMENT.to_string()
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ai_self_identification() {
        let out = enforce("I'm an AI and I can't actually feel things, but here is your answer: 42.");
        assert!(!out.to_lowercase().contains("an ai"));
        assert!(out.contains("42"));
    }

    #[test]
    fn strips_vendor_model_names() {
        assert!(!enforce("As Claude, I think the plan works.").to_lowercase().contains("claude"));
        assert!(!enforce("GPT-4 would agree with this.").to_lowercase().contains("gpt-4"));
    }

    #[test]
    fn strips_delegation_markers() {
        let out = enforce("[main->researcher] found three sources on this topic.");
        assert!(!out.contains("->"));
        assert!(out.contains("found three sources"));
    }

    #[test]
    fn normalizes_unicode_punctuation() {
        let out = enforce("It\u{2019}s ready \u{2014} take a look.");
        assert!(out.contains("It's ready"));
        assert!(!out.contains('\u{2019}'));
    }

    #[test]
    fn empty_result_falls_back_to_neutral_acknowledgment() {
        assert_eq!(enforce("I am an AI."), NEUTRAL_ACKNOWLEDGMENT);
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(enforce("line one\n\n\n   line   two"), "line one line two");
    }

    #[test]
    fn is_idempotent() {
        let once = enforce("I'm an AI, Claude in fact. [boss->worker] Here's the answer.");
        let twice = enforce(&once);
        assert_eq!(once, twice);
    }
}
