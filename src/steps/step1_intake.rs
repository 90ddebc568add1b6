//! Step 1 — Intake (SPEC_FULL.md §4.3.1).
//!
//! Does not run the shared `pre_gate` change detour every other step runs:
//! before intake has completed once there is no chosen date, locked room,
//! or offer yet for a message to diverge from, so change detection has
//! nothing to compare against. The nonsense gate already runs centrally in
//! `turn_runner` before this handler is reached.

use uuid::Uuid;

use crate::capture;
use crate::classify::Detection;
use crate::types::{Database, DraftMessage, EventRecord, EventStatus, Step};
use crate::util::stable_hash;

use super::{StepContext, StepOutcome};

/// Locate an existing in-progress event for this client, or create a new
/// one. A prior event is reused unless it is terminal (confirmed/cancelled)
/// or the client names a different date on what reads as a fresh inquiry.
pub fn find_or_create_event(
    db: &mut Database,
    client_email: &str,
    thread_id: &str,
    mentions_new_date: bool,
) -> String {
    if let Some(existing) = db
        .events
        .iter()
        .find(|e| e.client_email == client_email && e.thread_id == thread_id && !e.is_terminal())
    {
        if !mentions_new_date {
            return existing.event_id.clone();
        }
    }

    let event_id = format!("evt-{}", Uuid::new_v4());
    let event = EventRecord::new(event_id.clone(), thread_id.to_string(), client_email.to_string());
    db.events.push(event);
    event_id
}

pub fn handle(event: &mut EventRecord, ctx: &StepContext) -> StepOutcome {
    let confidence = ctx.detection.confidence;
    let has_existing_progress = event.current_step > Step::Intake || !event.audit.is_empty();

    if confidence < 0.85 && !has_existing_progress {
        event.thread_state = crate::types::ThreadState::AwaitingManagerReview;
        return StepOutcome::halt_with(DraftMessage::new(
            "manual_review_queued",
            "Thanks for reaching out — one of our team members will follow up shortly to confirm the details.",
        ));
    }

    if let Some(billing) = ctx.detection.extracted.get("billing") {
        if let Some(company) = billing.get("company").and_then(|v| v.as_str()) {
            capture::capture(
                event,
                ctx.message.msg_id.as_deref().unwrap_or("m"),
                "billing.company",
                serde_json::json!(company),
            );
        }
    }

    if let Some(participants) = ctx.detection.extracted.get("participants").and_then(|v| v.as_u64()) {
        event.requirements.participants = Some(participants as u32);
    }

    event.requirements_hash = Some(stable_hash(&event.requirements));
    event.status = EventStatus::Open;
    event.record_transition("system", Step::Intake, Step::DateConfirmation, "intake complete");

    StepOutcome::continue_turn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::types::InboundMessage;

    fn message(body: &str) -> InboundMessage {
        InboundMessage {
            msg_id: Some("m1".into()),
            from_email: "client@example.com".into(),
            from_name: None,
            subject: None,
            body: body.to_string(),
            ts: None,
            thread_id: Some("t1".into()),
            session_id: None,
            extras: Default::default(),
        }
    }

    #[test]
    fn test_find_or_create_event_reuses_in_progress() {
        let mut db = Database::default();
        let id1 = find_or_create_event(&mut db, "c@x.com", "t1", false);
        let id2 = find_or_create_event(&mut db, "c@x.com", "t1", false);
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_low_confidence_new_event_halts_for_review() {
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        let catalog = InMemoryCatalog::new(vec![], vec![]);
        let msg = message("hey");
        let detection = Detection {
            label: "unclear".into(),
            confidence: 0.2,
            is_question: false,
            is_general_qna: false,
            step_anchor: None,
            extracted: serde_json::Value::Null,
        };
        let db = Database::default();
        let ctx = StepContext { db: &db, catalog: &catalog, message: &msg, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(outcome.halt);
        assert_eq!(event.thread_state, crate::types::ThreadState::AwaitingManagerReview);
    }

    #[test]
    fn test_high_confidence_advances_to_date_confirmation() {
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        let catalog = InMemoryCatalog::new(vec![], vec![]);
        let msg = message("We'd like to book a room for 50 people");
        let detection = Detection {
            label: "new_inquiry".into(),
            confidence: 0.95,
            is_question: false,
            is_general_qna: false,
            step_anchor: None,
            extracted: serde_json::Value::Null,
        };
        let db = Database::default();
        let ctx = StepContext { db: &db, catalog: &catalog, message: &msg, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(!outcome.halt);
        assert_eq!(event.current_step, Step::DateConfirmation);
        assert!(event.requirements_hash.is_some());
    }
}
