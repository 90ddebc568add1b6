//! Step 4 — Offer (SPEC_FULL.md §4.3.4).

use chrono::Utc;

use crate::classify;
use crate::types::{DraftMessage, EventRecord, Offer, OfferLineItem, Step, ThreadState};

use super::{StepContext, StepOutcome};

const DEFAULT_ROOM_RATE: f64 = 500.0;

struct Preconditions {
    date_confirmed: bool,
    room_locked_and_fresh: bool,
    capacity_present: bool,
    products_ready: bool,
}

fn check_preconditions(event: &EventRecord) -> Preconditions {
    Preconditions {
        date_confirmed: event.date_confirmed,
        room_locked_and_fresh: event.locked_room_id.is_some()
            && event.room_eval_hash.is_some()
            && event.room_eval_hash == event.requirements_hash,
        capacity_present: event.requirements.participants.is_some(),
        products_ready: !event.products.is_empty()
            || !event.selected_catering.is_empty()
            || event.deferred_intents.iter().any(|i| i == "products_skipped"),
    }
}

fn owner_step_for_failure(p: &Preconditions) -> Step {
    if !p.date_confirmed {
        Step::DateConfirmation
    } else if !p.room_locked_and_fresh {
        Step::RoomAvailability
    } else {
        Step::Offer
    }
}

pub fn handle(event: &mut EventRecord, ctx: &StepContext) -> StepOutcome {
    let (is_acceptance, confidence, _) = classify::acceptance_confidence(&ctx.message.body);
    if is_acceptance && confidence >= 0.7 {
        event.negotiation_pending_decision = Some("accept".to_string());
        event.record_transition("system", Step::Offer, Step::Negotiation, "acceptance routed to negotiation");
        return StepOutcome::continue_turn();
    }

    if let Some(outcome) = super::pre_gate(event, ctx, Step::Offer) {
        return outcome;
    }

    let skip_tokens = ["no extras", "nothing else", "that's all"];
    let lower = ctx.message.body.to_lowercase();
    if skip_tokens.iter().any(|t| lower.contains(t))
        && !event.deferred_intents.iter().any(|i| i == "products_skipped")
    {
        event.deferred_intents.push("products_skipped".to_string());
    }

    let pre = check_preconditions(event);
    if !(pre.date_confirmed && pre.room_locked_and_fresh && pre.capacity_present && pre.products_ready) {
        let owner = owner_step_for_failure(&pre);
        if owner != Step::Offer {
            event.caller_step.get_or_insert(Step::Offer);
            event.current_step = owner;
            return StepOutcome::continue_turn();
        }
        return StepOutcome::halt_with(DraftMessage::new(
            "offer_blocked",
            "Before I can put together pricing, could you confirm whether you'd like catering or equipment add-ons, or should I proceed without extras?",
        ));
    }

    let room_rate = ctx
        .catalog
        .room_by_id(event.locked_room_id.as_deref().unwrap_or(""))
        .map(|r| r.base_rate)
        .unwrap_or(DEFAULT_ROOM_RATE);
    let participants = event.requirements.participants.unwrap_or(0) as f64;

    let mut line_items = vec![OfferLineItem {
        description: "Room rental".to_string(),
        quantity: 1.0,
        unit_price: room_rate,
        per_person: false,
        subtotal: room_rate,
    }];

    for product_name in &event.selected_catering {
        if let Some(p) = ctx.catalog.product_by_name(product_name) {
            let quantity = if p.per_person { participants } else { 1.0 };
            line_items.push(OfferLineItem {
                description: p.name,
                quantity,
                unit_price: p.unit_price,
                per_person: p.per_person,
                subtotal: quantity * p.unit_price,
            });
        }
    }

    let subtotal: f64 = line_items.iter().map(|i| i.subtotal).sum();
    event.offer_sequence += 1;
    let offer = Offer {
        offer_id: format!("offer-{}", event.offer_sequence),
        version: event.offer_sequence,
        line_items,
        subtotal,
        currency: "USD".to_string(),
        created_at: Utc::now(),
    };

    event.deposit_info.required = true;
    event.deposit_info.amount = Some((subtotal * ctx.catalog.default_deposit_fraction() * 100.0).round() / 100.0);

    let draft = DraftMessage::new(
        "offer",
        format!(
            "Here's your offer: ${subtotal:.2} total. A deposit of ${:.2} is due to hold the date.",
            event.deposit_info.amount.unwrap_or(0.0)
        ),
    );

    event.current_offer_id = Some(offer.offer_id.clone());
    event.offers.push(offer);
    event.thread_state = ThreadState::AwaitingClient;
    event.record_transition("system", Step::Offer, Step::Negotiation, "offer composed");

    StepOutcome::halt_with(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, Room};
    use crate::classify::Detection;
    use crate::types::{Database, InboundMessage};

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

    fn ready_event() -> EventRecord {
        let mut e = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        e.current_step = Step::Offer;
        e.date_confirmed = true;
        e.locked_room_id = Some("room-a".into());
        e.requirements_hash = Some("h1".into());
        e.room_eval_hash = Some("h1".into());
        e.requirements.participants = Some(40);
        e.deferred_intents.push("products_skipped".to_string());
        e
    }

    #[test]
    fn test_offer_composed_when_preconditions_met() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(
            vec![Room { room_id: "room-a".into(), name: "Room A".into(), capacity: 50, features: vec![], base_rate: 500.0 }],
            vec![],
        );
        let m = msg("looking forward to details");
        let detection = Detection::nonsense();
        let mut event = ready_event();
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(outcome.halt);
        assert_eq!(event.offers.len(), 1);
        assert!(event.deposit_info.required);
    }

    #[test]
    fn test_detours_when_room_not_locked() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("ready to go");
        let detection = Detection::nonsense();
        let mut event = ready_event();
        event.locked_room_id = None;
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(!outcome.halt);
        assert_eq!(event.current_step, Step::RoomAvailability);
    }

    #[test]
    fn test_acceptance_message_routes_to_negotiation() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let m = msg("sounds good, we accept the offer");
        let detection = Detection::nonsense();
        let mut event = ready_event();
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(!outcome.halt);
        assert_eq!(event.current_step, Step::Negotiation);
    }
}
