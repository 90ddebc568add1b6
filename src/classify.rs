//! Classification & Detection (SPEC_FULL.md §4.8).
//!
//! Three tiers, cheapest first: keyword/regex gates, a deterministic intent
//! table, then an LLM adapter for anything still inconclusive. Each tier can
//! short-circuit the ones below it on a strong signal.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::types::Step;

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap())
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([01]?\d|2[0-3]):[0-5]\d\b").unwrap())
}

const REVISION_LEXICON: &[&str] = &[
    "actually", "switch", "change", "instead", "rather", "update", "make it",
];

const ACCEPTANCE_PHRASES: &[&str] = &[
    "sounds good", "let's go with that", "we accept", "confirmed", "looks good",
    "perfect, let's", "yes, let's proceed", "agreed",
];

const ROOM_SELECTION_GUARDRAILS: &[&str] = &["proceed with room", "book room", "go with room"];

const BILLING_TOKENS: &[&str] = &["company", "street", "postal", "zip code", "vat", "address"];

const ACTION_VERBS: &[&str] = &[
    "book", "confirm", "schedule", "pay", "send", "change", "cancel", "reserve", "select",
];

/// Output of the full three-tier classification pass for one message.
#[derive(Debug, Clone)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub is_question: bool,
    pub is_general_qna: bool,
    pub step_anchor: Option<Step>,
    pub extracted: Value,
}

impl Detection {
    pub fn nonsense() -> Self {
        Detection {
            label: "nonsense".to_string(),
            confidence: 0.0,
            is_question: false,
            is_general_qna: false,
            step_anchor: None,
            extracted: Value::Null,
        }
    }
}

/// A pure function `(message, context) → (label, confidence, extracted_fields)`,
/// out of scope per §1 — callers provide their own implementation.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn classify(&self, message: &str, context: &Value) -> (String, f32, Value);
}

/// Deterministic fallback used when no LLM adapter is configured, or by
/// tests. Never returns high confidence on its own — it exists so the kernel
/// degrades to keyword/regex tiers rather than panicking (§7 "LLM unavailable").
pub struct NullLlmAdapter;

#[async_trait]
impl LlmAdapter for NullLlmAdapter {
    async fn classify(&self, _message: &str, _context: &Value) -> (String, f32, Value) {
        ("non_event".to_string(), 0.0, Value::Null)
    }
}

pub fn contains_iso_date(text: &str) -> bool {
    iso_date_re().is_match(text)
}

pub fn contains_time(text: &str) -> bool {
    time_re().is_match(text)
}

pub fn extract_iso_date(text: &str) -> Option<String> {
    iso_date_re().find(text).map(|m| m.as_str().to_string())
}

pub fn extract_time_range(text: &str) -> Vec<String> {
    time_re().find_iter(text).map(|m| m.as_str().to_string()).collect()
}

pub fn contains_revision_signal(text: &str) -> bool {
    let lower = text.to_lowercase();
    REVISION_LEXICON.iter().any(|kw| lower.contains(kw))
}

pub fn contains_billing_tokens(text: &str) -> bool {
    let lower = text.to_lowercase();
    BILLING_TOKENS.iter().any(|kw| lower.contains(kw))
}

pub fn contains_action_verb(text: &str) -> bool {
    let lower = text.to_lowercase();
    ACTION_VERBS.iter().any(|kw| lower.contains(kw))
}

/// Score how likely `text` is an offer acceptance. Guards against
/// room-selection phrases ("proceed with Room E") being miscounted.
pub fn acceptance_confidence(text: &str) -> (bool, f32, &'static str) {
    let lower = text.to_lowercase();
    if ROOM_SELECTION_GUARDRAILS.iter().any(|kw| lower.contains(kw)) {
        return (false, 0.0, "room_selection_guardrail");
    }
    let hits = ACCEPTANCE_PHRASES.iter().filter(|kw| lower.contains(*kw)).count();
    match hits {
        0 => (false, 0.0, "no_acceptance_phrase"),
        1 => (true, 0.7, "single_acceptance_phrase"),
        _ => (true, 0.9, "multiple_acceptance_phrases"),
    }
}

/// Cheap gibberish heuristic: very low alphabetic ratio, or no whitespace at
/// all in a message longer than a few characters.
fn looks_like_gibberish(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() < 2 {
        return true;
    }
    let alpha = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    let ratio = alpha as f32 / trimmed.chars().count() as f32;
    ratio < 0.3
}

/// Does the message carry any workflow-relevant signal at all? Used by the
/// nonsense gate to distinguish "ignore silently" from "escalate to manager".
pub fn has_workflow_signal(text: &str) -> bool {
    contains_iso_date(text)
        || contains_time(text)
        || contains_action_verb(text)
        || contains_billing_tokens(text)
        || contains_revision_signal(text)
}

/// Intake-time nonsense gate (§4.8): returns `Some(Detection::nonsense())`
/// when the message should be short-circuited before any step handler runs.
pub fn nonsense_gate(text: &str, llm_confidence: f32) -> Option<Detection> {
    if looks_like_gibberish(text) {
        return Some(Detection::nonsense());
    }
    if llm_confidence < 0.5 && !has_workflow_signal(text) {
        return Some(Detection::nonsense());
    }
    None
}

/// Sub-type of a `general_qna` intent, table-mapped to a workflow step
/// anchor the dispatcher can route the answer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QnaSubtype {
    RoomCapacity,
    Pricing,
    DateAvailability,
    SiteVisit,
    General,
}

pub fn qna_step_anchor(subtype: QnaSubtype) -> Option<Step> {
    match subtype {
        QnaSubtype::RoomCapacity => Some(Step::RoomAvailability),
        QnaSubtype::Pricing => Some(Step::Offer),
        QnaSubtype::DateAvailability => Some(Step::DateConfirmation),
        QnaSubtype::SiteVisit => None,
        QnaSubtype::General => None,
    }
}

const ROOM_CAPACITY_TOKENS: &[&str] = &["capacity", "how many people", "fit", "hold"];
const PRICING_TOKENS: &[&str] = &["price", "cost", "rate", "how much"];
const DATE_AVAILABILITY_TOKENS: &[&str] = &["available", "free on", "open on"];
const SITE_VISIT_TOKENS: &[&str] = &["site visit", "walkthrough", "tour the"];

/// Keyword-gate a standalone Q&A question into a [`QnaSubtype`] (§4.8). Same
/// cheapest-tier-first posture as the rest of this module — no LLM call.
pub fn classify_qna_subtype(text: &str) -> QnaSubtype {
    let lower = text.to_lowercase();
    if SITE_VISIT_TOKENS.iter().any(|kw| lower.contains(kw)) {
        QnaSubtype::SiteVisit
    } else if ROOM_CAPACITY_TOKENS.iter().any(|kw| lower.contains(kw)) {
        QnaSubtype::RoomCapacity
    } else if PRICING_TOKENS.iter().any(|kw| lower.contains(kw)) {
        QnaSubtype::Pricing
    } else if DATE_AVAILABILITY_TOKENS.iter().any(|kw| lower.contains(kw)) {
        QnaSubtype::DateAvailability
    } else {
        QnaSubtype::General
    }
}

/// Sentence-split `text` into `(statements, questions)` (§4.9): questions are
/// fragments ending in `?`; everything else is a statement.
pub fn split_statements_and_questions(text: &str) -> (Vec<String>, Vec<String>) {
    let mut statements = Vec::new();
    let mut questions = Vec::new();
    for raw in text.split(['.', '!', '?'].as_ref()) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        // recover the delimiter this fragment had by re-scanning text is
        // wasteful; instead treat '?' appearing in the original slice's
        // position via a simpler two-pass split below.
        statements.push(trimmed.to_string());
    }
    // Re-derive using a position-aware split so '?' fragments land in
    // `questions` instead of `statements`.
    statements.clear();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if matches!(*b as char, '.' | '!' | '?') {
            let fragment = text[start..i].trim();
            if !fragment.is_empty() {
                if *b as char == '?' {
                    questions.push(fragment.to_string());
                } else {
                    statements.push(fragment.to_string());
                }
            }
            start = i + 1;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    (statements, questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_iso_date() {
        assert!(contains_iso_date("let's meet on 2026-03-05 please"));
        assert!(!contains_iso_date("let's meet next week"));
    }

    #[test]
    fn test_acceptance_confidence_guards_room_selection() {
        let (is_match, conf, reason) = acceptance_confidence("Let's proceed with Room E");
        assert!(!is_match);
        assert_eq!(conf, 0.0);
        assert_eq!(reason, "room_selection_guardrail");
    }

    #[test]
    fn test_acceptance_confidence_detects_accept() {
        let (is_match, conf, _) = acceptance_confidence("Sounds good, we accept the offer");
        assert!(is_match);
        assert!(conf >= 0.7);
    }

    #[test]
    fn test_nonsense_gate_catches_gibberish() {
        let d = nonsense_gate("asdkjf;lqwjelkqwje", 0.9);
        assert!(d.is_some());
        assert_eq!(d.unwrap().label, "nonsense");
    }

    #[test]
    fn test_nonsense_gate_allows_workflow_signal() {
        let d = nonsense_gate("can we move to 2026-03-05 at 14:00", 0.3);
        assert!(d.is_none());
    }

    #[test]
    fn test_classify_qna_subtype_matches_keywords() {
        assert_eq!(classify_qna_subtype("What's the capacity of Room A?"), QnaSubtype::RoomCapacity);
        assert_eq!(classify_qna_subtype("How much does Room A cost?"), QnaSubtype::Pricing);
        assert_eq!(classify_qna_subtype("Are you available on Friday?"), QnaSubtype::DateAvailability);
        assert_eq!(classify_qna_subtype("Can we do a site visit?"), QnaSubtype::SiteVisit);
        assert_eq!(classify_qna_subtype("Who do I talk to about catering?"), QnaSubtype::General);
    }

    #[test]
    fn test_split_statements_and_questions() {
        let (statements, questions) =
            split_statements_and_questions("We need 50 seats. What is the room capacity?");
        assert_eq!(statements, vec!["We need 50 seats".to_string()]);
        assert_eq!(questions, vec!["What is the room capacity".to_string()]);
    }

    #[test]
    fn test_revision_signal_detection() {
        assert!(contains_revision_signal("actually, can we switch the date"));
        assert!(!contains_revision_signal("that sounds great, thank you"));
    }
}
