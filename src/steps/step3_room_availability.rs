//! Step 3 — Room Availability (SPEC_FULL.md §4.3.3).

use crate::types::{DraftMessage, EventRecord, Step};
use crate::util::stable_hash;

use super::{StepContext, StepOutcome};

pub fn handle(event: &mut EventRecord, ctx: &StepContext) -> StepOutcome {
    if let Some(outcome) = super::pre_gate(event, ctx, Step::RoomAvailability) {
        return outcome;
    }

    // Same hash domain as `requirements_hash` (stable_hash over `Requirements`
    // alone) so Step 4's staleness check — `room_eval_hash == requirements_hash`
    // — actually compares like with like. Date changes are handled separately:
    // a detour back from a later step clears `room_eval_hash` explicitly.
    let eval_hash = stable_hash(&event.requirements);

    if let Some(room_id) = &event.locked_room_id {
        let still_valid = event.room_eval_hash.as_deref() == Some(eval_hash.as_str())
            || ctx
                .catalog
                .room_by_id(room_id)
                .map(|r| r.capacity >= event.requirements.participants.unwrap_or(0))
                .unwrap_or(false);
        if still_valid {
            event.room_eval_hash = Some(eval_hash);
            event.record_transition("system", Step::RoomAvailability, Step::Offer, "locked room still valid");
            return StepOutcome::continue_turn();
        }
    }

    let participants = event.requirements.participants.unwrap_or(1);
    let features = event.requirements.special_requirements.clone();
    let mut rooms = ctx.catalog.rooms_for(participants, &features);

    if let Some(name) = &event.requirements.preferred_room {
        if let Some(picked) = rooms.iter().find(|r| &r.name == name).cloned() {
            event.locked_room_id = Some(picked.room_id.clone());
            event.room_eval_hash = Some(eval_hash);
            event.record_transition("system", Step::RoomAvailability, Step::Offer, "preferred room locked");
            return StepOutcome::continue_turn();
        }
    }

    if rooms.is_empty() {
        return StepOutcome::halt_with(DraftMessage::new(
            "no_rooms_available",
            "I don't have a room that fits that group size right now — would a different date or a smaller group work?",
        ));
    }

    rooms.truncate(5);
    let listing = rooms
        .iter()
        .map(|r| format!("{} (up to {})", r.name, r.capacity))
        .collect::<Vec<_>>()
        .join(", ");

    StepOutcome::halt_with(DraftMessage::new(
        "room_options",
        format!("Here are some rooms that could work: {listing}. Which would you like to book?"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, Room};
    use crate::classify::Detection;
    use crate::types::{Database, InboundMessage};

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(
            vec![Room {
                room_id: "room-a".into(),
                name: "Room A".into(),
                capacity: 40,
                features: vec![],
                base_rate: 500.0,
            }],
            vec![],
        )
    }

    fn msg() -> InboundMessage {
        InboundMessage {
            msg_id: None,
            from_email: "c@x.com".into(),
            from_name: None,
            subject: None,
            body: "ok".into(),
            ts: None,
            thread_id: None,
            session_id: None,
            extras: Default::default(),
        }
    }

    #[test]
    fn test_lists_rooms_when_no_preference() {
        let db = Database::default();
        let cat = catalog();
        let m = msg();
        let detection = Detection::nonsense();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        event.requirements.participants = Some(30);
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(outcome.halt);
    }

    #[test]
    fn test_locks_preferred_room_and_advances() {
        let db = Database::default();
        let cat = catalog();
        let m = msg();
        let detection = Detection::nonsense();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        event.requirements.participants = Some(30);
        event.requirements.preferred_room = Some("Room A".to_string());
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(!outcome.halt);
        assert_eq!(event.locked_room_id.as_deref(), Some("room-a"));
        assert_eq!(event.current_step, Step::Offer);
    }
}
