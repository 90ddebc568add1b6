//! Step 2 — Date Confirmation (SPEC_FULL.md §4.3.2).

use chrono::{NaiveDate, Utc};

use crate::candidate_dates::{self, DatePreferences};
use crate::classify;
use crate::types::{DraftMessage, EventRecord, RequestedWindow, Step};

use super::{StepContext, StepOutcome};

const DEFAULT_WINDOW: (&str, &str) = ("14:00", "18:00");

pub fn handle(event: &mut EventRecord, ctx: &StepContext) -> StepOutcome {
    if let Some(outcome) = super::pre_gate(event, ctx, Step::DateConfirmation) {
        return outcome;
    }

    let body = &ctx.message.body;
    let date = classify::extract_iso_date(body);
    let times = classify::extract_time_range(body);

    match date {
        None => {
            let today = Utc::now().date_naive();
            let forbidden: Vec<String> = ctx.db.confirmed_event_dates().map(str::to_string).collect();
            let candidates = candidate_dates::propose_candidates(
                today,
                &DatePreferences::default(),
                &forbidden,
                event.date_proposal_attempts,
            );
            let escalate = candidate_dates::record_attempt(&mut event.date_proposal_history, &candidates);
            event.date_proposal_attempts += 1;
            event.candidate_dates = candidates.clone();

            if escalate {
                event.thread_state = crate::types::ThreadState::AwaitingManagerReview;
                return StepOutcome::halt_with(DraftMessage::new(
                    "date_escalation",
                    "We're having trouble landing on a date together — looping in a team member to help coordinate.",
                ));
            }

            let (prose, _rows) = candidate_dates::render_candidates(&candidates, "18:00-22:00");
            StepOutcome::halt_with(DraftMessage::new("date_candidates", prose))
        }
        Some(iso_date) => {
            let parsed = NaiveDate::parse_from_str(&iso_date, "%Y-%m-%d").ok();
            if let Some(parsed) = parsed {
                if candidate_dates::is_past(parsed, Utc::now().date_naive()) {
                    event.pending_future_confirmation = Some(iso_date.clone());
                    return StepOutcome::halt_with(DraftMessage::new(
                        "date_in_past",
                        format!(
                            "That date ({iso_date}) has already passed — would you like to move to the next matching weekday next year?"
                        ),
                    ));
                }
            }

            if times.is_empty() {
                event.requested_window = Some(RequestedWindow {
                    date: iso_date.clone(),
                    start: None,
                    end: None,
                    hash: None,
                });
                event.pending_time_request = true;

                if event.date_proposal_attempts >= 2 {
                    event.chosen_date = Some(iso_date.clone());
                    event.date_confirmed = true;
                    event.requested_window = Some(RequestedWindow {
                        date: iso_date,
                        start: Some(DEFAULT_WINDOW.0.to_string()),
                        end: Some(DEFAULT_WINDOW.1.to_string()),
                        hash: None,
                    });
                    event.record_transition("system", Step::DateConfirmation, Step::RoomAvailability, "default window applied after two rounds");
                    return StepOutcome::continue_turn();
                }

                event.date_proposal_attempts += 1;
                return StepOutcome::halt_with(DraftMessage::new(
                    "time_request",
                    format!("Great, {iso_date} works — what time works best for you?"),
                ));
            }

            let start = times[0].clone();
            let end = times.get(1).cloned();
            event.requested_window = Some(RequestedWindow {
                date: iso_date.clone(),
                start: Some(start.clone()),
                end: end.clone(),
                hash: None,
            });

            let first_offer = event.date_proposal_attempts == 0;
            if first_offer {
                event.chosen_date = Some(iso_date);
                event.date_confirmed = true;
                event.record_transition("system", Step::DateConfirmation, Step::RoomAvailability, "date auto-accepted");
                StepOutcome::continue_turn()
            } else {
                event.pending_date_confirmation = Some(iso_date);
                StepOutcome::halt_with(DraftMessage::new(
                    "date_pending_confirmation",
                    "Just to confirm — should I lock in that date and time?",
                ))
            }
        }
    }
}
