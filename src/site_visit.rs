//! Site-Visit Subsystem (SPEC_FULL.md §4.10).
//!
//! Venue-wide: no room is held for a site visit. States:
//! `idle → date_pending → scheduled → completed|cancelled`.

use crate::types::{Database, EventRecord, SiteVisitState, SiteVisitStatus, Step};

const DEFAULT_SLOT_HOURS: [&str; 3] = ["10:00", "14:00", "16:00"];

/// Does the tenant already have an event booked on `date_iso`? Hard-blocks a
/// site visit from being scheduled there.
pub fn has_event_conflict(db: &Database, date_iso: &str, excluding_event: &str) -> bool {
    db.events
        .iter()
        .filter(|e| e.event_id != excluding_event)
        .any(|e| e.chosen_date.as_deref() == Some(date_iso))
}

/// Propose up to 3 weekday slots starting from `anchor_offset_days` from
/// today, skipping any day with an event conflict.
pub fn propose_slots(db: &Database, anchor: chrono::NaiveDate, excluding_event: &str) -> Vec<String> {
    let mut slots = Vec::new();
    let mut day = anchor;
    let mut checked = 0;
    while slots.len() < 3 && checked < 30 {
        checked += 1;
        let is_weekday = !matches!(
            day.format("%A").to_string().as_str(),
            "Saturday" | "Sunday"
        );
        let date_iso = day.format("%Y-%m-%d").to_string();
        if is_weekday && !has_event_conflict(db, &date_iso, excluding_event) {
            for hour in DEFAULT_SLOT_HOURS {
                slots.push(format!("{date_iso} {hour}"));
                if slots.len() >= 3 {
                    break;
                }
            }
        }
        day = day.succ_opt().unwrap_or(day);
    }
    slots
}

/// Start a new site-visit flow on an event currently idle.
pub fn start_visit(event: &mut EventRecord, initiated_at_step: Step, proposed_slots: Vec<String>) {
    event.site_visit_state = SiteVisitState {
        status: SiteVisitStatus::DatePending,
        date_iso: None,
        time_slot: None,
        proposed_slots,
        initiated_at_step: Some(initiated_at_step),
        has_event_conflict: false,
    };
}

pub enum ScheduleOutcome {
    Scheduled,
    Conflict,
}

/// Attempt to schedule the visit at `date_iso`/`time_slot`. Hard-blocks on a
/// same-tenant event conflict; the reverse (an event booked on a day with a
/// scheduled visit) is allowed elsewhere and only raises a manager-notification task.
pub fn schedule(
    db: &Database,
    event: &mut EventRecord,
    date_iso: String,
    time_slot: String,
) -> ScheduleOutcome {
    if has_event_conflict(db, &date_iso, &event.event_id) {
        event.site_visit_state.has_event_conflict = true;
        return ScheduleOutcome::Conflict;
    }
    event.site_visit_state.status = SiteVisitStatus::Scheduled;
    event.site_visit_state.date_iso = Some(date_iso);
    event.site_visit_state.time_slot = Some(time_slot);
    event.site_visit_state.has_event_conflict = false;
    ScheduleOutcome::Scheduled
}

/// Does booking the event itself on `date_iso` collide with a scheduled site
/// visit for this tenant? Non-blocking — caller should enqueue a
/// manager-notification task, not refuse the booking.
pub fn event_date_collides_with_scheduled_visit(db: &Database, date_iso: &str) -> bool {
    db.events.iter().any(|e| {
        e.site_visit_state.status == SiteVisitStatus::Scheduled
            && e.site_visit_state.date_iso.as_deref() == Some(date_iso)
    })
}

pub fn complete(event: &mut EventRecord) {
    event.site_visit_state.status = SiteVisitStatus::Completed;
}

pub fn cancel(event: &mut EventRecord) {
    event.site_visit_state.status = SiteVisitStatus::Cancelled;
}

/// Is the event currently inside an active site-visit flow that should
/// intercept the next step handler?
pub fn is_intercepting(event: &EventRecord) -> bool {
    event.site_visit_state.status == SiteVisitStatus::DatePending
}
