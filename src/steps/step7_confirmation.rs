//! Step 7 — Confirmation (SPEC_FULL.md §4.3.7).

use chrono::Utc;

use crate::change_detector::{self, DetectionContext};
use crate::classify;
use crate::site_visit;
use crate::types::{DraftMessage, EventRecord, EventStatus, Step};

use super::{StepContext, StepOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfirmationIntent {
    Confirm,
    DepositPaid,
    Reserve,
    SiteVisit,
    Decline,
    Change,
    Question,
}

fn classify_confirmation(body: &str, deposit_just_paid: bool) -> ConfirmationIntent {
    let lower = body.to_lowercase();
    if deposit_just_paid || lower.contains("paid the deposit") {
        return ConfirmationIntent::DepositPaid;
    }
    if lower.contains('?') {
        return ConfirmationIntent::Question;
    }
    if lower.contains("site visit") || lower.contains("tour the venue") {
        return ConfirmationIntent::SiteVisit;
    }
    if lower.contains("decline") || lower.contains("cancel") {
        return ConfirmationIntent::Decline;
    }
    if lower.contains("hold") || lower.contains("option") || lower.contains("reserve") {
        return ConfirmationIntent::Reserve;
    }
    if lower.contains("actually") || lower.contains("change") || lower.contains("instead") {
        return ConfirmationIntent::Change;
    }
    ConfirmationIntent::Confirm
}

pub fn handle(event: &mut EventRecord, ctx: &StepContext) -> StepOutcome {
    let deposit_just_paid = ctx.message.extras.deposit_just_paid;

    match classify_confirmation(&ctx.message.body, deposit_just_paid) {
        ConfirmationIntent::Confirm => {
            event.status = EventStatus::Confirmed;
            event.record_transition("system", Step::Confirmation, Step::Confirmation, "booking confirmed");
            StepOutcome::halt_with(DraftMessage::new(
                "booking_confirmed",
                format!(
                    "You're all set — your event on {} is confirmed. We'll follow up with final details shortly.",
                    event.chosen_date.as_deref().unwrap_or("the requested date")
                ),
            ))
        }
        ConfirmationIntent::DepositPaid => {
            if !event.deposit_info.paid {
                event.deposit_info.paid = true;
                event.deposit_info.paid_at = Some(Utc::now());
            }
            StepOutcome::halt_with(DraftMessage::new(
                "deposit_received",
                "Thanks, we've recorded your deposit payment.",
            ))
        }
        ConfirmationIntent::Reserve => {
            event.deposit_info.required = true;
            event.deposit_info.due_date = Some(
                (Utc::now() + chrono::Duration::days(7)).format("%Y-%m-%d").to_string(),
            );
            StepOutcome::halt_with(DraftMessage::new(
                "option_held",
                "We've placed an option on the date. The deposit is due within 7 days to convert it to a confirmed booking.",
            ))
        }
        ConfirmationIntent::SiteVisit => {
            if !site_visit::is_intercepting(event) {
                let slots = site_visit::propose_slots(ctx.db, Utc::now().date_naive(), &event.event_id);
                site_visit::start_visit(event, Step::Confirmation, slots.clone());
                return StepOutcome::halt_with(DraftMessage::new(
                    "site_visit_slots",
                    format!("Happy to arrange a visit. Available slots: {}.", slots.join(", ")),
                ));
            }
            StepOutcome::continue_turn()
        }
        ConfirmationIntent::Decline => {
            event.status = EventStatus::Cancelled;
            event.record_transition("system", Step::Confirmation, Step::Confirmation, "client declined at confirmation");
            StepOutcome::halt_with(DraftMessage::new(
                "booking_cancelled",
                "Understood — we've cancelled this booking. Let us know if you'd like to revisit in the future.",
            ))
        }
        ConfirmationIntent::Change => {
            let (_, acceptance_confidence, _) = classify::acceptance_confidence(&ctx.message.body);
            let detection_ctx = DetectionContext::from_extracted(
                &ctx.detection.extracted,
                ctx.detection.is_question,
                ctx.detection.is_general_qna,
                acceptance_confidence,
            );
            let result = change_detector::detect_change_type(event, &ctx.message.body, &detection_ctx);
            if let Some(change_type) = result.change_type {
                let decision = change_detector::route_change_on_updated_variable(event, change_type, Step::Confirmation);
                event.current_step = decision.next_step;
                return StepOutcome::continue_turn().with_draft(DraftMessage::new(
                    "detour_ack",
                    "Got it, updating that for you — let me re-check the details.",
                ));
            }
            StepOutcome::halt_with(DraftMessage::new(
                "change_clarify",
                "Could you clarify what you'd like to change about the booking?",
            ))
        }
        ConfirmationIntent::Question => StepOutcome::halt_with(DraftMessage::new(
            "confirmation_qna",
            "Happy to help — could you tell me a bit more about what you'd like to know?",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::classify::Detection;
    use crate::types::{Database, InboundMessage, MessageExtras};

    fn msg(body: &str, deposit_just_paid: bool) -> InboundMessage {
        InboundMessage {
            msg_id: None,
            from_email: "c@x.com".into(),
            from_name: None,
            subject: None,
            body: body.to_string(),
            ts: None,
            thread_id: None,
            session_id: None,
            extras: MessageExtras { deposit_just_paid, ..Default::default() },
        }
    }

    #[test]
    fn test_confirm_sets_status_confirmed() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("Yes, let's confirm!", false);
        let detection = Detection::nonsense();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        event.chosen_date = Some("2026-05-01".to_string());
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(outcome.halt);
        assert_eq!(event.status, EventStatus::Confirmed);
    }

    #[test]
    fn test_deposit_paid_twice_is_idempotent() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        let detection = Detection::nonsense();

        let m1 = msg("I have paid the deposit.", true);
        let ctx1 = StepContext { db: &db, catalog: &cat, message: &m1, detection: &detection };
        handle(&mut event, &ctx1);
        let first_paid_at = event.deposit_info.paid_at;

        let m2 = msg("I have paid the deposit.", true);
        let ctx2 = StepContext { db: &db, catalog: &cat, message: &m2, detection: &detection };
        handle(&mut event, &ctx2);

        assert!(event.deposit_info.paid);
        assert_eq!(event.deposit_info.paid_at, first_paid_at);
    }

    #[test]
    fn test_decline_cancels_booking() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("We'd like to cancel, please", false);
        let detection = Detection::nonsense();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(outcome.halt);
        assert_eq!(event.status, EventStatus::Cancelled);
    }
}
