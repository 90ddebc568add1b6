//! Core data model: the per-tenant `Database` and the values it holds.
//!
//! Everything here is plain serializable data — no behavior. Behavior lives
//! in the step handlers, the change detector, the gate, and the HIL engine,
//! all of which borrow these types mutably for the duration of one turn.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One of the seven workflow stages. Stored as a small integer on the wire
/// (the source system's own convention) but handled as an enum everywhere
/// in Rust so an out-of-range step can't be constructed by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Step {
    Intake = 1,
    DateConfirmation = 2,
    RoomAvailability = 3,
    Offer = 4,
    Negotiation = 5,
    Transition = 6,
    Confirmation = 7,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Intake,
        Step::DateConfirmation,
        Step::RoomAvailability,
        Step::Offer,
        Step::Negotiation,
        Step::Transition,
        Step::Confirmation,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<Step> {
        Step::try_from(self.as_u8() + 1).ok()
    }
}

impl TryFrom<u8> for Step {
    type Error = String;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Step::Intake),
            2 => Ok(Step::DateConfirmation),
            3 => Ok(Step::RoomAvailability),
            4 => Ok(Step::Offer),
            5 => Ok(Step::Negotiation),
            6 => Ok(Step::Transition),
            7 => Ok(Step::Confirmation),
            other => Err(format!("step {other} is out of range 1..=7")),
        }
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> u8 {
        step.as_u8()
    }
}

/// Closed set of thread states an event can be in (I-THREAD-STATE: kept as a
/// single enum rather than the source's string/enum mix; display string is
/// the serialized form so the UI boundary is unaffected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ThreadState {
    #[default]
    InProgress,
    AwaitingClient,
    AwaitingClientResponse,
    WaitingOnHIL,
    AwaitingManagerReview,
}

/// Terminal status of an event once Step 7 resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum EventStatus {
    #[default]
    Open,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SiteVisitStatus {
    #[default]
    Idle,
    Proposed,
    DatePending,
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestedWindow {
    pub date: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    pub participants: Option<u32>,
    pub layout: Option<String>,
    pub preferred_room: Option<String>,
    pub special_requirements: Vec<String>,
    pub event_duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DepositInfo {
    pub required: bool,
    pub amount: Option<f64>,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BillingDetails {
    pub company: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub vat: Option<String>,
}

impl BillingDetails {
    /// Required fields per §4.5: company, street, postal_code, city, country. VAT optional.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.company.as_deref().unwrap_or("").trim().is_empty() {
            missing.push("company");
        }
        if self.street.as_deref().unwrap_or("").trim().is_empty() {
            missing.push("street");
        }
        if self.postal_code.as_deref().unwrap_or("").trim().is_empty() {
            missing.push("postal_code");
        }
        if self.city.as_deref().unwrap_or("").trim().is_empty() {
            missing.push("city");
        }
        if self.country.as_deref().unwrap_or("").trim().is_empty() {
            missing.push("country");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BillingRequirements {
    pub awaiting_billing_for_accept: bool,
    pub last_missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferLineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub per_person: bool,
    pub subtotal: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub offer_id: String,
    pub version: u32,
    pub line_items: Vec<OfferLineItem>,
    pub subtotal: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationState {
    pub counter_count: u32,
    pub manual_review_task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SiteVisitState {
    pub status: SiteVisitStatus,
    pub date_iso: Option<String>,
    pub time_slot: Option<String>,
    pub proposed_slots: Vec<String>,
    pub initiated_at_step: Option<Step>,
    pub has_event_conflict: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PendingConfirmationKind {
    DateConfirmation,
    BillingPrompt,
    DepositPrompt,
    OfferAcceptance,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationState {
    pub pending: Option<PendingConfirmationKind>,
    pub last_response_type: Option<String>,
}

/// One outstanding human-in-the-loop approval request attached to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingHilRequest {
    pub task_id: String,
    pub signature: String,
    pub step: Step,
    pub draft: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HilHistoryEntry {
    pub task_id: String,
    pub signature: String,
    pub decision: String,
    pub manager_notes: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub actor: String,
    pub from_step: Step,
    pub to_step: Step,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DateProposalHistory {
    pub attempts: u32,
    pub proposed_dates: Vec<String>,
}

/// The central aggregate per client inquiry. See SPEC_FULL.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: String,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub client_email: String,

    pub current_step: Step,
    pub caller_step: Option<Step>,
    pub subflow_group: Option<String>,
    pub thread_state: ThreadState,
    pub status: EventStatus,

    pub chosen_date: Option<String>,
    pub date_confirmed: bool,
    pub requested_window: Option<RequestedWindow>,
    pub locked_room_id: Option<String>,
    pub requirements: Requirements,
    pub requirements_hash: Option<String>,
    pub room_eval_hash: Option<String>,

    pub offers: Vec<Offer>,
    pub current_offer_id: Option<String>,
    pub offer_sequence: u32,
    pub offer_accepted: bool,
    pub offer_status: Option<OfferStatus>,
    pub products: Vec<String>,
    pub selected_catering: Vec<String>,
    pub pricing_inputs: Value,
    pub deposit_info: DepositInfo,
    pub billing_details: BillingDetails,
    pub billing_requirements: BillingRequirements,

    pub captured: Value,
    pub captured_sources: Vec<String>,
    pub deferred_intents: Vec<String>,

    pub negotiation_state: NegotiationState,
    pub negotiation_pending_decision: Option<String>,

    pub site_visit_state: SiteVisitState,
    pub confirmation_state: ConfirmationState,

    pub pending_hil_requests: Vec<PendingHilRequest>,
    pub hil_history: Vec<HilHistoryEntry>,

    pub audit: Vec<AuditEntry>,
    pub logs: Vec<String>,

    pub candidate_dates: Vec<String>,
    pub date_proposal_attempts: u32,
    pub date_proposal_history: DateProposalHistory,
    pub pending_date_confirmation: Option<String>,
    pub pending_future_confirmation: Option<String>,
    pub pending_time_request: bool,
}

impl EventRecord {
    pub fn new(event_id: String, thread_id: String, client_email: String) -> Self {
        let now = Utc::now();
        EventRecord {
            event_id,
            thread_id,
            created_at: now,
            updated_at: now,
            client_email,
            current_step: Step::Intake,
            caller_step: None,
            subflow_group: None,
            thread_state: ThreadState::InProgress,
            status: EventStatus::Open,
            chosen_date: None,
            date_confirmed: false,
            requested_window: None,
            locked_room_id: None,
            requirements: Requirements::default(),
            requirements_hash: None,
            room_eval_hash: None,
            offers: Vec::new(),
            current_offer_id: None,
            offer_sequence: 0,
            offer_accepted: false,
            offer_status: None,
            products: Vec::new(),
            selected_catering: Vec::new(),
            pricing_inputs: Value::Null,
            deposit_info: DepositInfo::default(),
            billing_details: BillingDetails::default(),
            billing_requirements: BillingRequirements::default(),
            captured: Value::Object(Default::default()),
            captured_sources: Vec::new(),
            deferred_intents: Vec::new(),
            negotiation_state: NegotiationState::default(),
            negotiation_pending_decision: None,
            site_visit_state: SiteVisitState::default(),
            confirmation_state: ConfirmationState::default(),
            pending_hil_requests: Vec::new(),
            hil_history: Vec::new(),
            audit: Vec::new(),
            logs: Vec::new(),
            candidate_dates: Vec::new(),
            date_proposal_attempts: 0,
            date_proposal_history: DateProposalHistory::default(),
            pending_date_confirmation: None,
            pending_future_confirmation: None,
            pending_time_request: false,
        }
    }

    /// Append one audit entry and bump `updated_at`. Audit is append-only
    /// (invariant 7); this is the only way callers should record a transition.
    pub fn record_transition(&mut self, actor: &str, from: Step, to: Step, reason: &str) {
        self.audit.push(AuditEntry {
            ts: Utc::now(),
            actor: actor.to_string(),
            from_step: from,
            to_step: to,
            reason: reason.to_string(),
        });
        self.current_step = to;
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, EventStatus::Confirmed | EventStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub name: Option<String>,
    pub org: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientHistoryEntry {
    pub msg_id: String,
    pub ts: DateTime<Utc>,
    pub intent: String,
    pub confidence: f32,
    pub captured_snapshot: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub email: String,
    pub profile: ClientProfile,
    pub history: Vec<ClientHistoryEntry>,
    pub event_ids: Vec<String>,
    pub last_seen_at: DateTime<Utc>,
}

impl ClientRecord {
    pub fn new(email: String) -> Self {
        ClientRecord {
            email,
            profile: ClientProfile::default(),
            history: Vec::new(),
            event_ids: Vec::new(),
            last_seen_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Approved,
    Rejected,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    HilAiReplyApproval,
    HilOfferAcceptance,
    ManualReview,
    ManagerNotification,
}

/// Opaque kind-tagged record for HIL and routing queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub client_id: String,
    pub event_id: String,
    pub payload: Value,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `{events[], clients{email→ClientRecord}, tasks[], config}` — one document
/// per tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub events: Vec<EventRecord>,
    pub clients: HashMap<String, ClientRecord>,
    pub tasks: Vec<Task>,
    pub config: Value,
    #[serde(default)]
    pub schema_version: u32,
}

impl Database {
    pub fn find_event(&self, event_id: &str) -> Option<&EventRecord> {
        self.events.iter().find(|e| e.event_id == event_id)
    }

    pub fn find_event_mut(&mut self, event_id: &str) -> Option<&mut EventRecord> {
        self.events.iter_mut().find(|e| e.event_id == event_id)
    }

    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn find_task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.task_id == task_id)
    }

    /// Events of this tenant with a confirmed date, for site-visit conflict
    /// checks (invariant 6) — excludes cancelled events.
    pub fn confirmed_event_dates(&self) -> impl Iterator<Item = &str> {
        self.events
            .iter()
            .filter(|e| e.status != EventStatus::Cancelled)
            .filter_map(|e| e.chosen_date.as_deref())
    }
}

/// Inbound message delivered into a turn. See SPEC_FULL.md §4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default)]
    pub msg_id: Option<String>,
    pub from_email: String,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub extras: MessageExtras,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageExtras {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub deposit_just_paid: bool,
    #[serde(default)]
    pub hil_approve_step: Option<Step>,
    #[serde(default)]
    pub hil_decision: Option<String>,
}

/// One draft reply surfaced by a turn. The string `topic` is kept (rather
/// than a tagged enum) because it flows verbatim to the UI (I-DRAFT-TOPIC).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMessage {
    pub topic: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extras: Value,
}

impl DraftMessage {
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        DraftMessage {
            topic: topic.into(),
            body: body.into(),
            extras: Value::Null,
        }
    }
}

/// Output of a turn: never throws on recoverable errors (SPEC_FULL.md §4.1).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub action: String,
    pub event_id: Option<String>,
    pub thread_state: Option<ThreadState>,
    pub draft_messages: Vec<DraftMessage>,
    pub payload: Value,
}

impl TurnResult {
    pub fn silent(action: impl Into<String>) -> Self {
        TurnResult {
            action: action.into(),
            event_id: None,
            thread_state: None,
            draft_messages: Vec::new(),
            payload: Value::Null,
        }
    }
}
