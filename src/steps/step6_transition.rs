//! Step 6 — Transition (SPEC_FULL.md §4.3.6).
//!
//! Minimal bridge between negotiation and confirmation, reached once HIL
//! has approved an offer (see `hil::approve`, which already advances the
//! event past this step for the offer-acceptance path). A handler still
//! exists for the case where something lands an event here directly.

use crate::types::{EventRecord, Step};

use super::{StepContext, StepOutcome};

pub fn handle(event: &mut EventRecord, ctx: &StepContext) -> StepOutcome {
    if let Some(outcome) = super::pre_gate(event, ctx, Step::Transition) {
        return outcome;
    }

    event.record_transition("system", Step::Transition, Step::Confirmation, "transition ready");
    StepOutcome::continue_turn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::classify::Detection;
    use crate::types::{Database, InboundMessage};

    #[test]
    fn test_transition_advances_to_confirmation() {
        let db = Database::default();
        let cat = InMemoryCatalog::new(vec![], vec![]);
        let m = InboundMessage {
            msg_id: None,
            from_email: "c@x.com".into(),
            from_name: None,
            subject: None,
            body: String::new(),
            ts: None,
            thread_id: None,
            session_id: None,
            extras: Default::default(),
        };
        let detection = Detection::nonsense();
        let mut event = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        event.current_step = Step::Transition;
        let ctx = StepContext { db: &db, catalog: &cat, message: &m, detection: &detection };
        let outcome = handle(&mut event, &ctx);
        assert!(!outcome.halt);
        assert_eq!(event.current_step, Step::Confirmation);
    }
}
