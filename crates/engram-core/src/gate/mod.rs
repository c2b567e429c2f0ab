//! Attention Gate
//!
//! Real-time admission filter for auto-capture. Pure and synchronous - no
//! I/O, no model calls - so it can sit directly on the message path. Text
//! that passes is retained as-is; scoring and categorization are deferred
//! to the sleep cycle.
//!
//! Two variants share one noise-pattern table: the user-message gate and a
//! stricter assistant-message gate (assistants produce more code and tool
//! markup, neither of which is a memory).

use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// LIMITS
// ============================================================================

const USER_MIN_CHARS: usize = 30;
const USER_MAX_CHARS: usize = 2000;
const USER_MIN_WORDS: usize = 8;

const ASSISTANT_MIN_CHARS: usize = 30;
const ASSISTANT_MAX_CHARS: usize = 1000;
const ASSISTANT_MIN_WORDS: usize = 10;

/// More than this many emoji codepoints and the text is decoration, not
/// information
const MAX_EMOJI: usize = 3;

/// Context the engine itself injected into the conversation; capturing it
/// back would echo memories into memories
const INJECTED_CONTEXT_MARKERS: [&str; 2] = ["<relevant-memories>", "<core-memory-refresh>"];

/// Assistant tool-protocol markup
const TOOL_MARKUP_MARKERS: [&str; 3] = ["<tool_result>", "<tool_use>", "<function_call>"];

// ============================================================================
// NOISE PATTERNS
// ============================================================================

/// Ordered (pattern, label) table evaluated top to bottom.
///
/// The label is only for logging; the first match rejects.
static NOISE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"(?i)^\s*(hi|hey|hello|yo|howdy|good\s+(morning|afternoon|evening|night))[\s.,!?]*$",
            "greeting",
        ),
        (
            r"(?i)^\s*(ok(ay)?|yes|yep|yeah|yup|no|nope|sure|right|alright|fine|thanks|thank\s+you|thx|ty|got\s+it|sounds\s+good|makes\s+sense|will\s+do|done|agreed|exactly|correct|perfect|great|nice|cool|awesome)[\s.,!?]*$",
            "acknowledgment",
        ),
        (
            r"(?i)^\s*\w+\s+\w+[\s.,!?]*$",
            "two-word affirmation",
        ),
        (
            r"(?i)^\s*(ok(ay)?\s+)?(let\s+me|let's|lemme|i'll\s+just|gonna|one\s+(sec|moment|minute))\b[\w\s.,!?']{0,40}$",
            "deictic filler",
        ),
        (
            r"(?i)^\s*(hmm+|hm+|huh|uh+|um+|lol|lmao|rofl|haha+|heh+|wow|whoa|oops|ugh|meh|yay|nah)[\s.,!?]*$",
            "filler",
        ),
        (r"^[^\w]*$", "no word content"),
        (r"^\s*<[a-zA-Z_!/?][^>]*>", "markup"),
        (
            r"(?i)\b(session\s+(start(ed)?|resum(e|ed)|reset)|heartbeat|cron\s+job|background\s+task|keep-?alive)\b",
            "system string",
        ),
    ]
    .into_iter()
    .map(|(pattern, label)| {
        (
            Regex::new(pattern).expect("noise pattern is valid"),
            label,
        )
    })
    .collect()
});

fn matches_noise(text: &str) -> Option<&'static str> {
    NOISE_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(text))
        .map(|(_, label)| *label)
}

// ============================================================================
// GATE CHECKS
// ============================================================================

fn is_emoji(c: char) -> bool {
    matches!(
        c,
        '\u{1F000}'..='\u{1FAFF}' | '\u{2600}'..='\u{27BF}' | '\u{2B00}'..='\u{2BFF}'
    )
}

fn emoji_count(text: &str) -> usize {
    text.chars().filter(|c| is_emoji(*c)).count()
}

/// Fraction of characters sitting inside triple-backtick fences
fn fenced_code_fraction(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let mut inside = false;
    let mut fenced_chars = 0usize;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            inside = !inside;
            fenced_chars += line.len();
        } else if inside {
            fenced_chars += line.len();
        }
    }

    fenced_chars as f64 / text.len() as f64
}

fn shared_checks(text: &str, min_chars: usize, max_chars: usize, min_words: usize) -> bool {
    let trimmed = text.trim();

    if trimmed.len() < min_chars || trimmed.len() > max_chars {
        return false;
    }
    if trimmed.split_whitespace().count() < min_words {
        return false;
    }
    if INJECTED_CONTEXT_MARKERS.iter().any(|m| trimmed.contains(m)) {
        return false;
    }
    if let Some(label) = matches_noise(trimmed) {
        tracing::debug!("Attention gate rejected text as {}", label);
        return false;
    }
    if emoji_count(trimmed) > MAX_EMOJI {
        return false;
    }

    true
}

/// Whether a user message is worth retaining
pub fn passes_attention_gate(text: &str) -> bool {
    shared_checks(text, USER_MIN_CHARS, USER_MAX_CHARS, USER_MIN_WORDS)
}

/// Whether an assistant message is worth retaining.
///
/// Stricter than the user gate: tighter length bounds, and rejects
/// tool-protocol markup and code-dominated messages outright.
pub fn passes_attention_gate_assistant(text: &str) -> bool {
    let trimmed = text.trim();

    if TOOL_MARKUP_MARKERS.iter().any(|m| trimmed.contains(m)) {
        return false;
    }
    if fenced_code_fraction(trimmed) > 0.5 {
        return false;
    }

    shared_checks(
        text,
        ASSISTANT_MIN_CHARS,
        ASSISTANT_MAX_CHARS,
        ASSISTANT_MIN_WORDS,
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substantive_preference_passes() {
        assert!(passes_attention_gate(
            "I prefer using TypeScript over JavaScript for all new projects"
        ));
    }

    #[test]
    fn test_short_acks_rejected() {
        assert!(!passes_attention_gate("ok"));
        assert!(!passes_attention_gate("thanks!"));
        assert!(!passes_attention_gate("sounds good"));
    }

    #[test]
    fn test_length_bounds() {
        assert!(!passes_attention_gate("too short to matter"));
        let long = "word ".repeat(500);
        assert!(!passes_attention_gate(&long));
    }

    #[test]
    fn test_min_word_count() {
        // 31 chars but only 4 words
        assert!(!passes_attention_gate("antidisestablishmentarianism is rather long"));
    }

    #[test]
    fn test_deictic_phrases_rejected() {
        assert!(!passes_attention_gate("ok let me test it out"));
        assert!(!passes_attention_gate("let's see what happens here now"));
    }

    #[test]
    fn test_injected_context_rejected() {
        let text = "<relevant-memories> the user prefers dark roast coffee every single morning </relevant-memories>";
        assert!(!passes_attention_gate(text));
        assert!(!passes_attention_gate_assistant(text));
    }

    #[test]
    fn test_system_strings_rejected() {
        assert!(!passes_attention_gate(
            "session resumed from checkpoint after the background task finished running"
        ));
    }

    #[test]
    fn test_excessive_emoji_rejected() {
        assert!(!passes_attention_gate(
            "this is such great news for everyone involved \u{1F389}\u{1F389}\u{1F389}\u{1F389}"
        ));
        // Up to three is fine
        assert!(passes_attention_gate(
            "I decided we will migrate the billing service to the new region \u{1F389}"
        ));
    }

    #[test]
    fn test_assistant_gate_rejects_tool_markup() {
        assert!(!passes_attention_gate_assistant(
            "<tool_result> the command completed successfully with exit code zero </tool_result>"
        ));
    }

    #[test]
    fn test_assistant_gate_rejects_code_dominated() {
        let text = "Here is the fix you asked about today my friend:\n```\nfn main() {\n    println!(\"hello\");\n    println!(\"world\");\n    println!(\"again\");\n}\n```";
        assert!(!passes_attention_gate_assistant(text));
    }

    #[test]
    fn test_assistant_gate_accepts_prose() {
        assert!(passes_attention_gate_assistant(
            "The user decided to standardize on PostgreSQL for all new services going forward"
        ));
    }

    #[test]
    fn test_assistant_stricter_word_count() {
        // 9 words: passes the user gate, fails the assistant gate
        let text = "the deployment pipeline now requires approval from two reviewers";
        assert!(passes_attention_gate(text));
        assert!(!passes_attention_gate_assistant(text));
    }
}
