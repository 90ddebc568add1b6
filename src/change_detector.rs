//! Change Detector + DAG Router (SPEC_FULL.md §4.4).

use serde_json::Value;

use crate::classify::{contains_iso_date, contains_revision_signal};
use crate::types::{EventRecord, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Date,
    Room,
    Requirements,
    Products,
}

#[derive(Debug, Clone)]
pub struct EnhancedResult {
    pub is_change: bool,
    pub change_type: Option<ChangeType>,
}

/// Arguments the detector needs beyond the event record itself, gathered by
/// the calling step handler from the turn's classification pass.
pub struct DetectionContext<'a> {
    pub is_question: bool,
    pub is_general_qna: bool,
    pub acceptance_confidence: f32,
    pub new_room_name: Option<&'a str>,
    pub new_participants: Option<u32>,
    pub product_change: bool,
}

impl<'a> DetectionContext<'a> {
    /// Build from a classifier's structured `extracted` payload — the same
    /// `preferred_room` / `participants` fields `capture::capture_from_extracted`
    /// reads, plus `products` for a catering/equipment change — so Room,
    /// Requirements, and Products changes are reachable outside tests instead
    /// of only the regex-detected Date change.
    pub fn from_extracted(
        extracted: &'a Value,
        is_question: bool,
        is_general_qna: bool,
        acceptance_confidence: f32,
    ) -> Self {
        DetectionContext {
            is_question,
            is_general_qna,
            acceptance_confidence,
            new_room_name: extracted.get("preferred_room").and_then(|v| v.as_str()),
            new_participants: extracted.get("participants").and_then(|v| v.as_u64()).map(|n| n as u32),
            product_change: extracted.get("products").is_some_and(|v| !v.is_null()),
        }
    }
}

/// Dual-condition change detection: a revision signal in the text AND a
/// specific, textually-present target.
pub fn detect_change_type(
    event: &EventRecord,
    message_text: &str,
    ctx: &DetectionContext,
) -> EnhancedResult {
    if ctx.is_question || ctx.is_general_qna {
        return EnhancedResult { is_change: false, change_type: None };
    }
    if ctx.acceptance_confidence >= 0.7 {
        return EnhancedResult { is_change: false, change_type: None };
    }
    if !contains_revision_signal(message_text) {
        return EnhancedResult { is_change: false, change_type: None };
    }

    // While a site visit is mid-proposal, a date in the message is answering
    // "when can you visit," not renegotiating the event date — suppress Date
    // detection for that one status only. Once a visit is merely Proposed or
    // already Scheduled, a dated revision still means the event date.
    let site_visit_active = event.site_visit_state.status == crate::types::SiteVisitStatus::DatePending;

    if !site_visit_active {
        if let Some(new_date) = crate::classify::extract_iso_date(message_text) {
            if event.chosen_date.as_deref() != Some(new_date.as_str())
                && contains_iso_date(message_text)
            {
                return EnhancedResult { is_change: true, change_type: Some(ChangeType::Date) };
            }
        }
    }

    if let Some(room_name) = ctx.new_room_name {
        if event.locked_room_id.as_deref() != Some(room_name) {
            return EnhancedResult { is_change: true, change_type: Some(ChangeType::Room) };
        }
    }

    if let Some(participants) = ctx.new_participants {
        if event.requirements.participants != Some(participants) {
            return EnhancedResult { is_change: true, change_type: Some(ChangeType::Requirements) };
        }
    }

    if ctx.product_change {
        return EnhancedResult { is_change: true, change_type: Some(ChangeType::Products) };
    }

    EnhancedResult { is_change: false, change_type: None }
}

#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub next_step: Step,
    pub updated_caller_step: Option<Step>,
    pub needs_reeval: bool,
    pub skip_reason: Option<String>,
}

/// Route a detected change to its target step per the DAG in §4.4, updating
/// the event's hashes/locks and preserving the deepest `caller_step`.
pub fn route_change_on_updated_variable(
    event: &mut EventRecord,
    change_type: ChangeType,
    from_step: Step,
) -> RouteDecision {
    let next_step = match change_type {
        ChangeType::Date => {
            event.room_eval_hash = None;
            event.date_confirmed = false;
            Step::DateConfirmation
        }
        ChangeType::Requirements => {
            event.locked_room_id = None;
            event.room_eval_hash = None;
            if event.date_confirmed {
                Step::RoomAvailability
            } else {
                Step::DateConfirmation
            }
        }
        ChangeType::Room => {
            event.locked_room_id = None;
            Step::RoomAvailability
        }
        ChangeType::Products => Step::Offer,
    };

    if next_step < from_step {
        event.negotiation_pending_decision = None;
    }

    if event.caller_step.is_none() {
        event.caller_step = Some(from_step);
    }

    RouteDecision {
        next_step,
        updated_caller_step: event.caller_step,
        needs_reeval: true,
        skip_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventRecord;

    fn sample_event() -> EventRecord {
        let mut e = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        e.current_step = Step::Offer;
        e.chosen_date = Some("2026-03-05".to_string());
        e.date_confirmed = true;
        e.locked_room_id = Some("room-a".to_string());
        e.room_eval_hash = Some("hash1".to_string());
        e
    }

    #[test]
    fn test_date_change_detected_and_routes_to_step2() {
        let mut event = sample_event();
        let ctx = DetectionContext {
            is_question: false,
            is_general_qna: false,
            acceptance_confidence: 0.0,
            new_room_name: None,
            new_participants: None,
            product_change: false,
        };
        let result = detect_change_type(&event, "actually can we switch to 2026-04-10", &ctx);
        assert!(result.is_change);
        assert_eq!(result.change_type, Some(ChangeType::Date));

        let decision = route_change_on_updated_variable(&mut event, ChangeType::Date, Step::Offer);
        assert_eq!(decision.next_step, Step::DateConfirmation);
        assert!(event.room_eval_hash.is_none());
        assert!(!event.date_confirmed);
        assert_eq!(event.locked_room_id.as_deref(), Some("room-a"));
        assert_eq!(event.caller_step, Some(Step::Offer));
    }

    #[test]
    fn test_question_suppresses_change_detection() {
        let event = sample_event();
        let ctx = DetectionContext {
            is_question: true,
            is_general_qna: false,
            acceptance_confidence: 0.0,
            new_room_name: None,
            new_participants: None,
            product_change: false,
        };
        let result = detect_change_type(&event, "actually what date did we pick?", &ctx);
        assert!(!result.is_change);
    }

    #[test]
    fn test_acceptance_shortcircuits_change_detection() {
        let event = sample_event();
        let ctx = DetectionContext {
            is_question: false,
            is_general_qna: false,
            acceptance_confidence: 0.9,
            new_room_name: None,
            new_participants: None,
            product_change: false,
        };
        let result = detect_change_type(&event, "actually, sounds good, we accept", &ctx);
        assert!(!result.is_change);
    }

    #[test]
    fn test_caller_step_preserved_across_chained_detours() {
        let mut event = sample_event();
        event.caller_step = Some(Step::Negotiation);
        let decision = route_change_on_updated_variable(&mut event, ChangeType::Room, Step::Offer);
        assert_eq!(decision.updated_caller_step, Some(Step::Negotiation));
    }
}
