//! Step Handlers (SPEC_FULL.md §4.3). One module per numbered step; each
//! exposes a `handle` function sharing the common shape described in
//! §4.3's preamble: change/Q&A gating before business logic (via
//! `pre_gate`, below), thread_state/audit/persist bookkeeping after. The
//! nonsense gate runs once centrally in `turn_runner` before any step
//! handler is reached (§4.8). Step 1 is the one exception to `pre_gate`:
//! before intake has run at least once there is nothing locked in yet for
//! a message to "change" against, so Step 1 runs its own confidence gate
//! directly instead (see its module doc comment).

pub mod step1_intake;
pub mod step2_date_confirmation;
pub mod step3_room_availability;
pub mod step4_offer;
pub mod step5_negotiation;
pub mod step6_transition;
pub mod step7_confirmation;

use serde_json::Value;

use crate::catalog::DomainCatalog;
use crate::change_detector::{self, DetectionContext};
use crate::classify::{self, Detection};
use crate::types::{Database, DraftMessage, EventRecord, InboundMessage, Step, TaskType};

/// A HIL enqueue a step handler wants performed. Step handlers only see an
/// immutable `Database` (for reload-from-disk checks); the actual
/// `db.tasks` mutation happens in the dispatcher, which owns `&mut Database`.
pub struct HilRequest {
    pub step: Step,
    pub signature: String,
    pub draft: String,
    pub task_type: TaskType,
}

/// What a step handler (or the site-visit interceptor) returns to the
/// dispatcher.
pub struct StepOutcome {
    /// Stop iterating — the turn is done after this step.
    pub halt: bool,
    /// Draft replies produced by this step (possibly none, e.g. on detour).
    pub drafts: Vec<DraftMessage>,
    /// Arbitrary structured payload merged into the turn's response.
    pub payload: Value,
    /// A HIL enqueue the dispatcher should perform after this step returns.
    pub hil_request: Option<HilRequest>,
}

impl StepOutcome {
    pub fn halt_with(draft: DraftMessage) -> Self {
        StepOutcome { halt: true, drafts: vec![draft], payload: Value::Null, hil_request: None }
    }

    pub fn continue_turn() -> Self {
        StepOutcome { halt: false, drafts: Vec::new(), payload: Value::Null, hil_request: None }
    }

    pub fn with_draft(mut self, draft: DraftMessage) -> Self {
        self.drafts.push(draft);
        self
    }

    pub fn with_hil_request(mut self, request: HilRequest) -> Self {
        self.hil_request = Some(request);
        self
    }

    /// Stop iterating this turn even though the outcome was built from
    /// `continue_turn()` — used when handing off to HIL leaves nothing left
    /// for this step to usefully re-process on the same message.
    pub fn halted(mut self) -> Self {
        self.halt = true;
        self
    }
}

/// Everything a step handler needs, bundled so handler signatures stay
/// small as the set of collaborators grows.
pub struct StepContext<'a> {
    pub db: &'a Database,
    pub catalog: &'a dyn DomainCatalog,
    pub message: &'a InboundMessage,
    pub detection: &'a Detection,
}

/// Shared pre-business-logic gating every step handler runs (SPEC_FULL.md
/// §4.3's preamble, before business logic): detour on a mid-workflow change
/// before this step's own logic sees the message, then answer a general
/// Q&A message in place instead of advancing the workflow. Returns `Some`
/// when the step should return immediately with that outcome; `None` means
/// the message is workflow-relevant business logic for `from_step` itself.
pub fn pre_gate(event: &mut EventRecord, ctx: &StepContext, from_step: Step) -> Option<StepOutcome> {
    let (_, acceptance_confidence, _) = classify::acceptance_confidence(&ctx.message.body);
    let detection_ctx = DetectionContext::from_extracted(
        &ctx.detection.extracted,
        ctx.detection.is_question,
        ctx.detection.is_general_qna,
        acceptance_confidence,
    );
    let result = change_detector::detect_change_type(event, &ctx.message.body, &detection_ctx);
    if let Some(change_type) = result.change_type {
        let decision = change_detector::route_change_on_updated_variable(event, change_type, from_step);
        event.current_step = decision.next_step;
        return Some(StepOutcome::continue_turn().with_draft(DraftMessage::new(
            "detour_ack",
            "Got it, updating that for you — let me re-check the details.",
        )));
    }

    if ctx.detection.is_general_qna {
        return Some(StepOutcome::halt_with(DraftMessage::new(
            "qna_answer",
            "Happy to help — could you tell me a bit more about what you'd like to know?",
        )));
    }

    None
}
