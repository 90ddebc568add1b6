//! Step 5 — Negotiation (SPEC_FULL.md §4.3.5).

use crate::change_detector::{self, DetectionContext};
use crate::classify;
use crate::confirmation_gate;
use crate::types::{DraftMessage, EventRecord, OfferStatus, Step, TaskType};

use super::{HilRequest, StepContext, StepOutcome};

const COUNTER_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NegotiationIntent {
    Accept,
    Decline,
    Counter,
    Change,
    Clarification,
    RoomSelection,
}

fn classify_negotiation(body: &str) -> NegotiationIntent {
    let lower = body.to_lowercase();
    let (is_accept, conf, _) = classify::acceptance_confidence(body);
    if is_accept && conf >= 0.7 {
        return NegotiationIntent::Accept;
    }
    if lower.contains("proceed with room") || lower.contains("book room") {
        return NegotiationIntent::RoomSelection;
    }
    if lower.contains("decline") || lower.contains("not interested") || lower.contains("no thanks") {
        return NegotiationIntent::Decline;
    }
    if lower.contains("can you") && (lower.contains("lower") || lower.contains("discount") || lower.contains("reduce")) {
        return NegotiationIntent::Counter;
    }
    if classify::contains_revision_signal(body) {
        return NegotiationIntent::Change;
    }
    NegotiationIntent::Clarification
}

pub fn handle(event: &mut EventRecord, ctx: &StepContext) -> StepOutcome {
    match classify_negotiation(&ctx.message.body) {
        NegotiationIntent::Accept => {
            event.offer_accepted = true;
            let status = confirmation_gate::evaluate(event);
            if status.ready_for_hil {
                let offer_id = event.current_offer_id.clone().unwrap_or_default();
                StepOutcome::continue_turn()
                    .with_hil_request(HilRequest {
                        step: Step::Negotiation,
                        signature: format!("step5:{offer_id}"),
                        draft: "Client accepted the offer and both billing and deposit are complete.".to_string(),
                        task_type: TaskType::HilOfferAcceptance,
                    })
                    .halted()
            } else if let Some(prompt) = confirmation_gate::next_prompt(&status) {
                StepOutcome::halt_with(DraftMessage::new("gate_prompt", prompt))
            } else {
                StepOutcome::continue_turn()
            }
        }
        NegotiationIntent::Decline => {
            event.offer_status = Some(OfferStatus::Declined);
            event.record_transition("system", Step::Negotiation, Step::Confirmation, "client declined offer");
            StepOutcome::continue_turn()
        }
        NegotiationIntent::Counter => {
            event.negotiation_state.counter_count += 1;
            if event.negotiation_state.counter_count >= COUNTER_THRESHOLD {
                event.thread_state = crate::types::ThreadState::AwaitingManagerReview;
                StepOutcome::halt_with(DraftMessage::new(
                    "counter_escalated",
                    "I've passed your request along to our events manager to review the pricing — they'll follow up shortly.",
                ))
            } else {
                StepOutcome::halt_with(DraftMessage::new(
                    "counter_ack",
                    "Thanks for the feedback — let me see what flexibility we have and get back to you.",
                ))
            }
        }
        NegotiationIntent::Change => {
            let (_, acceptance_confidence, _) = classify::acceptance_confidence(&ctx.message.body);
            let detection_ctx = DetectionContext::from_extracted(
                &ctx.detection.extracted,
                ctx.detection.is_question,
                ctx.detection.is_general_qna,
                acceptance_confidence,
            );
            let result = change_detector::detect_change_type(event, &ctx.message.body, &detection_ctx);
            if let Some(change_type) = result.change_type {
                let decision = change_detector::route_change_on_updated_variable(event, change_type, Step::Negotiation);
                event.current_step = decision.next_step;
                return StepOutcome::continue_turn().with_draft(DraftMessage::new(
                    "detour_ack",
                    "Got it, updating that for you — let me re-check the details.",
                ));
            }
            StepOutcome::halt_with(DraftMessage::new(
                "negotiation_clarify",
                "Just to make sure I understand — would you like to accept the current offer, request a change, or ask a question about it?",
            ))
        }
        NegotiationIntent::RoomSelection | NegotiationIntent::Clarification => {
            StepOutcome::halt_with(DraftMessage::new(
                "negotiation_clarify",
                "Just to make sure I understand — would you like to accept the current offer, request a change, or ask a question about it?",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::classify::Detection;
    use crate::types::{BillingDetails, Database, DepositInfo, InboundMessage};

    fn msg(body: &str) -> InboundMessage {
        InboundMessage {
            msg_id: None,
            from_email: "c@x.com".into(),
            from_name: None,
            subject: None,
            body: body.to_string(),
            ts: None,
            thread_id: None,
            session_id: None,
            extras: Default::default(),
        }
    }

    #[test]
    fn test_counter_escalates_at_threshold() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("can you lower the price a bit?");
        let detection = Detection::nonsense();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        event.negotiation_state.counter_count = 2;
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(outcome.halt);
        assert_eq!(event.negotiation_state.counter_count, 3);
        assert_eq!(event.thread_state, crate::types::ThreadState::AwaitingManagerReview);
    }

    #[test]
    fn test_accept_with_complete_gate_enqueues_hil() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("sounds good, we accept the offer");
        let detection = Detection::nonsense();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        event.current_offer_id = Some("offer-1".into());
        event.billing_details = BillingDetails {
            company: Some("Acme".into()),
            street: Some("1 Main".into()),
            postal_code: Some("10001".into()),
            city: Some("NYC".into()),
            country: Some("US".into()),
            vat: None,
        };
        event.deposit_info = DepositInfo { required: false, ..Default::default() };
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(outcome.halt);
        assert!(outcome.hil_request.is_some());
    }

    #[test]
    fn test_decline_routes_to_confirmation() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("Thanks but we'll decline for now");
        let detection = Detection::nonsense();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(!outcome.halt);
        assert_eq!(event.current_step, Step::Confirmation);
    }

    #[test]
    fn test_date_change_detours_to_date_confirmation_preserving_caller_step() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("Actually can we move it to 2026-06-17?");
        let detection = Detection::nonsense();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        event.current_step = Step::Negotiation;
        event.chosen_date = Some("2026-06-10".to_string());
        event.date_confirmed = true;
        event.locked_room_id = Some("room-a".into());
        event.room_eval_hash = Some("hash1".into());
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(!outcome.halt);
        assert_eq!(event.current_step, Step::DateConfirmation);
        assert_eq!(event.caller_step, Some(Step::Negotiation));
        assert!(event.room_eval_hash.is_none());
        assert!(!event.date_confirmed);
        assert_eq!(event.locked_room_id.as_deref(), Some("room-a"));
    }
}
