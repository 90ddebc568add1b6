//! HIL Task Engine (SPEC_FULL.md §4.6).

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::KernelError;
use crate::types::{
    Database, DraftMessage, EventRecord, HilHistoryEntry, PendingHilRequest, SiteVisitState, Step,
    Task, TaskStatus, TaskType, ThreadState,
};

/// Enqueue an AI-reply approval task, deduped by `signature = step:offer_id`
/// (or any caller-chosen signature). Returns the existing task id if one is
/// already outstanding for this signature.
pub fn enqueue_approval(
    db: &mut Database,
    event: &mut EventRecord,
    step: Step,
    signature: String,
    draft: String,
    task_type: TaskType,
) -> String {
    if let Some(existing) = event
        .pending_hil_requests
        .iter()
        .find(|r| r.signature == signature)
    {
        return existing.task_id.clone();
    }

    let task_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    db.tasks.push(Task {
        task_id: task_id.clone(),
        task_type,
        status: TaskStatus::Pending,
        client_id: crate::util::person_id_from_email(&event.client_email),
        event_id: event.event_id.clone(),
        payload: json!({ "draft": draft, "step": step.as_u8(), "signature": signature }),
        notes: None,
        created_at: now,
        updated_at: now,
    });

    event.pending_hil_requests.push(PendingHilRequest {
        task_id: task_id.clone(),
        signature,
        step,
        draft,
        thread_id: event.thread_id.clone(),
    });
    event.thread_state = ThreadState::WaitingOnHIL;
    task_id
}

/// Transition any prior HIL tasks from other steps to `done` when a later
/// step takes ownership of the acceptance flow (§4.6 dedup).
pub fn supersede_other_steps(db: &mut Database, event: &mut EventRecord, owning_step: Step) {
    let now = Utc::now();
    for task in db.tasks.iter_mut().filter(|t| t.event_id == event.event_id) {
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Done;
            task.updated_at = now;
        }
    }
    event
        .pending_hil_requests
        .retain(|r| r.step == owning_step);
}

pub enum ApprovalEffect {
    /// Emit this draft as the outbound reply.
    EmitDraft(DraftMessage),
    /// Offer acceptance approved; event advanced to Step 7.
    OfferAccepted(DraftMessage),
}

/// Approve a pending HIL task and apply its effects back into the event.
pub fn approve(
    db: &mut Database,
    task_id: &str,
    manager_notes: Option<String>,
    edited_message: Option<String>,
) -> Result<ApprovalEffect, KernelError> {
    let task = db
        .find_task(task_id)
        .ok_or_else(|| KernelError::HilNotFound(task_id.to_string()))?
        .clone();

    if task.status != TaskStatus::Pending {
        // already-processed approval is a no-op per §8 "replaying the same
        // approved HIL twice does not double-emit"
        let body = task
            .payload
            .get("draft")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        return Ok(ApprovalEffect::EmitDraft(DraftMessage {
            topic: "hil_already_processed".to_string(),
            body,
            extras: json!({ "skipped": true }),
        }));
    }

    let signature = task
        .payload
        .get("signature")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let draft = edited_message.unwrap_or_else(|| {
        task.payload
            .get("draft")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    });

    let now = Utc::now();
    let effect = match task.task_type {
        TaskType::HilAiReplyApproval | TaskType::ManualReview | TaskType::ManagerNotification => {
            let event = db
                .find_event_mut(&task.event_id)
                .ok_or_else(|| KernelError::EventNotFound(task.event_id.clone()))?;
            event.pending_hil_requests.retain(|r| r.task_id != task_id);
            event.hil_history.push(HilHistoryEntry {
                task_id: task_id.to_string(),
                signature,
                decision: "approved".to_string(),
                manager_notes,
                at: now,
            });
            event.thread_state = ThreadState::AwaitingClientResponse;
            ApprovalEffect::EmitDraft(DraftMessage::new("hil_reply", draft))
        }
        TaskType::HilOfferAcceptance => {
            let event = db
                .find_event_mut(&task.event_id)
                .ok_or_else(|| KernelError::EventNotFound(task.event_id.clone()))?;
            event.offer_status = Some(crate::types::OfferStatus::Accepted);
            event.offer_accepted = true;
            event.negotiation_pending_decision = None;
            event.site_visit_state = SiteVisitState {
                status: crate::types::SiteVisitStatus::Proposed,
                ..Default::default()
            };
            event.record_transition("hil", event.current_step, Step::Transition, "offer approved via HIL");
            event.record_transition("hil", Step::Transition, Step::Confirmation, "auto-advance after transition");
            event.pending_hil_requests.retain(|r| r.task_id != task_id);
            event.hil_history.push(HilHistoryEntry {
                task_id: task_id.to_string(),
                signature,
                decision: "approved".to_string(),
                manager_notes,
                at: now,
            });
            event.thread_state = ThreadState::AwaitingClientResponse;
            ApprovalEffect::OfferAccepted(DraftMessage::new("offer_accepted", draft))
        }
    };

    if let Some(t) = db.find_task_mut(task_id) {
        t.status = TaskStatus::Done;
        t.updated_at = now;
    }

    Ok(effect)
}

/// Reject a pending HIL task: compose a manager-declined body, clear the
/// pending decision, and drop the event back to `AwaitingClient`.
pub fn reject(
    db: &mut Database,
    task_id: &str,
    manager_notes: Option<String>,
) -> Result<DraftMessage, KernelError> {
    let task = db
        .find_task(task_id)
        .ok_or_else(|| KernelError::HilNotFound(task_id.to_string()))?
        .clone();

    if task.status != TaskStatus::Pending {
        return Ok(DraftMessage {
            topic: "hil_already_processed".to_string(),
            body: String::new(),
            extras: json!({ "skipped": true }),
        });
    }

    let signature = task
        .payload
        .get("signature")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let now = Utc::now();
    let event = db
        .find_event_mut(&task.event_id)
        .ok_or_else(|| KernelError::EventNotFound(task.event_id.clone()))?;
    event.pending_hil_requests.retain(|r| r.task_id != task_id);
    event.negotiation_pending_decision = None;
    event.thread_state = ThreadState::AwaitingClient;
    event.hil_history.push(HilHistoryEntry {
        task_id: task_id.to_string(),
        signature,
        decision: "rejected".to_string(),
        manager_notes,
        at: now,
    });

    if let Some(t) = db.find_task_mut(task_id) {
        t.status = TaskStatus::Rejected;
        t.updated_at = now;
    }

    Ok(DraftMessage::new(
        "hil_rejected",
        "Thanks for your patience — we weren't able to proceed with that request as written. A member of our team will follow up shortly.",
    ))
}
