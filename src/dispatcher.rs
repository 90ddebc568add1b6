//! Step Dispatcher (SPEC_FULL.md §4.2).
//!
//! Drives one event through as many step handlers as a single turn allows:
//! the site-visit interceptor runs first if a visit is awaiting a date, then
//! the numbered step handler for `event.current_step`, looping on
//! `StepOutcome::halt == false` up to a small bound so a routing bug can
//! never spin a turn forever.

use std::path::Path;

use chrono::Utc;

use crate::capture;
use crate::catalog::DomainCatalog;
use crate::classify::Detection;
use crate::hil;
use crate::site_visit::{self, ScheduleOutcome};
use crate::steps::{step1_intake, step2_date_confirmation, step3_room_availability, step4_offer, step5_negotiation, step6_transition, step7_confirmation, StepContext, StepOutcome};
use crate::types::{Database, DraftMessage, EventRecord, InboundMessage, Step};
use crate::util::stable_hash;
use crate::audit;

/// Hard bound on step handoffs within one turn (7 steps, generous headroom
/// for a detour or two, never an unbounded loop).
const MAX_ITERATIONS: u32 = 6;

/// Record a deposit payment the moment it's reported, regardless of which
/// step currently owns the turn (§4.5's gate is order-independent the same
/// way Capture is: a client can pay before Negotiation's accept-gate asks
/// for it). Step 7 still owns the client-facing "deposit received" reply for
/// the case where the event has already reached Confirmation.
fn record_deposit_if_paid(event: &mut EventRecord, message: &InboundMessage) {
    let reported = message.extras.deposit_just_paid || message.body.to_lowercase().contains("paid the deposit");
    if reported && !event.deposit_info.paid {
        event.deposit_info.paid = true;
        event.deposit_info.paid_at = Some(Utc::now());
    }
}

fn dispatch_step(event: &mut EventRecord, ctx: &StepContext) -> StepOutcome {
    match event.current_step {
        Step::Intake => step1_intake::handle(event, ctx),
        Step::DateConfirmation => step2_date_confirmation::handle(event, ctx),
        Step::RoomAvailability => step3_room_availability::handle(event, ctx),
        Step::Offer => step4_offer::handle(event, ctx),
        Step::Negotiation => step5_negotiation::handle(event, ctx),
        Step::Transition => step6_transition::handle(event, ctx),
        Step::Confirmation => step7_confirmation::handle(event, ctx),
    }
}

/// Parse a client's reply against the proposed site-visit slots and either
/// schedule, flag a conflict, or ask them to pick one of the offered times.
fn handle_site_visit_interception(db: &Database, event: &mut EventRecord, message: &InboundMessage) -> StepOutcome {
    let body = message.body.trim();
    let matched = event
        .site_visit_state
        .proposed_slots
        .iter()
        .find(|slot| body.contains(slot.as_str()))
        .cloned();

    let Some(slot) = matched else {
        return StepOutcome::halt_with(DraftMessage::new(
            "site_visit_clarify",
            format!(
                "Which of these times works for your visit: {}?",
                event.site_visit_state.proposed_slots.join(", ")
            ),
        ));
    };

    let mut parts = slot.splitn(2, ' ');
    let date_iso = parts.next().unwrap_or_default().to_string();
    let time_slot = parts.next().unwrap_or_default().to_string();

    match site_visit::schedule(db, event, date_iso.clone(), time_slot.clone()) {
        ScheduleOutcome::Scheduled => StepOutcome::halt_with(DraftMessage::new(
            "site_visit_scheduled",
            format!("You're booked for a site visit on {date_iso} at {time_slot}."),
        )),
        ScheduleOutcome::Conflict => StepOutcome::halt_with(DraftMessage::new(
            "site_visit_conflict",
            "That date is already booked for another event — could you pick one of the other proposed times?",
        )),
    }
}

/// Run `event_id` through as many step handlers as this turn allows,
/// applying any HIL enqueue a handler requested and returning the draft
/// replies produced along the way. `db` must already be the caller's
/// exclusively-held, locked tenant document (see `persistence::load_locked`).
pub fn run_dispatch(
    db: &mut Database,
    event_id: &str,
    catalog: &dyn DomainCatalog,
    message: &InboundMessage,
    detection: &Detection,
    debug: bool,
    state_dir: &Path,
) -> Vec<DraftMessage> {
    let Some(idx) = db.events.iter().position(|e| e.event_id == event_id) else {
        log::warn!("dispatcher: event {event_id} not found");
        return Vec::new();
    };
    let mut event = db.events.remove(idx);
    let mut drafts = Vec::new();

    for _ in 0..MAX_ITERATIONS {
        capture::capture_from_extracted(&mut event, message.msg_id.as_deref().unwrap_or("m"), &detection.extracted);
        capture::promote(&mut event);
        // Keep requirements_hash in sync so Step 4's staleness check (room_eval_hash
        // vs requirements_hash) reflects facts captured after Step 1, not just at intake.
        event.requirements_hash = Some(stable_hash(&event.requirements));
        record_deposit_if_paid(&mut event, message);

        let outcome = if site_visit::is_intercepting(&event) {
            handle_site_visit_interception(db, &mut event, message)
        } else {
            let ctx = StepContext { db: &*db, catalog, message, detection };
            dispatch_step(&mut event, &ctx)
        };

        if debug {
            audit::write_step_snapshot(state_dir, &event.event_id, event.current_step.as_u8(), &event);
        }

        if let Some(req) = outcome.hil_request {
            hil::enqueue_approval(db, &mut event, req.step, req.signature, req.draft, req.task_type);
        }

        drafts.extend(outcome.drafts);

        if outcome.halt {
            break;
        }
    }

    if site_visit::event_date_collides_with_scheduled_visit(db, event.chosen_date.as_deref().unwrap_or("")) {
        log::info!(
            "event {} booked on a date with a scheduled site visit; manager notification warranted",
            event.event_id
        );
    }

    db.events.push(event);
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::classify::Detection;
    use crate::types::{EventRecord, MessageExtras, Step};

    fn msg(body: &str) -> InboundMessage {
        InboundMessage {
            msg_id: Some("m1".into()),
            from_email: "c@x.com".into(),
            from_name: None,
            subject: None,
            body: body.to_string(),
            ts: None,
            thread_id: Some("t1".into()),
            session_id: None,
            extras: MessageExtras::default(),
        }
    }

    #[test]
    fn test_dispatch_advances_through_intake_and_date_confirmation() {
        let mut db = Database::default();
        db.events.push(EventRecord::new("e1".into(), "t1".into(), "c@x.com".into()));
        let catalog = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("We'd like to book an event for 50 people on 2026-05-10 at 14:00");
        let detection = Detection {
            label: "new_inquiry".into(),
            confidence: 0.95,
            is_question: false,
            is_general_qna: false,
            step_anchor: None,
            extracted: serde_json::Value::Null,
        };

        let drafts = run_dispatch(&mut db, "e1", &catalog, &m, &detection, false, Path::new("/tmp"));

        let event = db.find_event("e1").unwrap();
        assert_eq!(event.current_step, Step::RoomAvailability);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].topic, "no_rooms_available");
    }

    #[test]
    fn test_dispatch_returns_empty_for_missing_event() {
        let mut db = Database::default();
        let catalog = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("hello");
        let detection = Detection::nonsense();
        let drafts = run_dispatch(&mut db, "missing", &catalog, &m, &detection, false, Path::new("/tmp"));
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_dispatch_respects_max_iterations_without_panicking() {
        let mut db = Database::default();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        event.current_step = Step::Intake;
        db.events.push(event);
        let catalog = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("asdkfjaslkdfj");
        let detection = Detection::nonsense();
        let _ = run_dispatch(&mut db, "e1", &catalog, &m, &detection, false, Path::new("/tmp"));
        assert!(db.find_event("e1").is_some());
    }

    #[test]
    fn test_site_visit_interception_schedules_on_matching_slot() {
        let mut db = Database::default();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        site_visit::start_visit(&mut event, Step::Confirmation, vec!["2026-06-01 10:00".to_string()]);
        event.current_step = Step::Confirmation;
        db.events.push(event);
        let catalog = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("2026-06-01 10:00 works for us");
        let detection = Detection::nonsense();
        let drafts = run_dispatch(&mut db, "e1", &catalog, &m, &detection, false, Path::new("/tmp"));
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].topic, "site_visit_scheduled");
        let updated = db.find_event("e1").unwrap();
        assert_eq!(updated.site_visit_state.status, crate::types::SiteVisitStatus::Scheduled);
    }
}
