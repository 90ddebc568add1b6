//! Candidate Date Engine (SPEC_FULL.md §4.11).

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::types::DateProposalHistory;

#[derive(Debug, Clone, Default)]
pub struct DatePreferences {
    pub weekdays: Vec<Weekday>,
    pub mentioned_dates: Vec<NaiveDate>,
    pub week_scope: Option<(NaiveDate, NaiveDate)>,
}

/// Generate up to 5 ISO candidate dates, prioritized per §4.11, skipping
/// anything in `forbidden` (already-booked or already-proposed).
pub fn propose_candidates(
    today: NaiveDate,
    prefs: &DatePreferences,
    forbidden: &[String],
    attempt: u32,
) -> Vec<String> {
    let horizon_days = 45 + (attempt as i64 * 45).min(135);
    let mut candidates = Vec::new();

    // Tier 1: dates explicitly mentioned in the message.
    for d in &prefs.mentioned_dates {
        push_if_allowed(&mut candidates, *d, forbidden);
    }

    // Tier 2: week-scope bound, filtered by preferred weekdays if any.
    if let Some((start, end)) = prefs.week_scope {
        let mut day = start;
        while day <= end && candidates.len() < 5 {
            if prefs.weekdays.is_empty() || prefs.weekdays.contains(&day.weekday()) {
                push_if_allowed(&mut candidates, day, forbidden);
            }
            day = day.succ_opt().unwrap_or(day);
        }
    }

    // Tier 3: preferred weekdays within the horizon.
    if !prefs.weekdays.is_empty() {
        let mut day = today;
        let end = today.checked_add_days(Days::new(horizon_days as u64)).unwrap_or(today);
        while day <= end && candidates.len() < 5 {
            if prefs.weekdays.contains(&day.weekday()) {
                push_if_allowed(&mut candidates, day, forbidden);
            }
            day = day.succ_opt().unwrap_or(day);
        }
    }

    // Tier 4: fallback horizon expansion, any weekday.
    let mut day = today;
    let end = today.checked_add_days(Days::new(horizon_days as u64)).unwrap_or(today);
    while day <= end && candidates.len() < 5 {
        push_if_allowed(&mut candidates, day, forbidden);
        day = day.succ_opt().unwrap_or(day);
    }

    candidates.truncate(5);
    candidates
}

fn push_if_allowed(candidates: &mut Vec<String>, date: NaiveDate, forbidden: &[String]) {
    let iso = date.format("%Y-%m-%d").to_string();
    if !forbidden.contains(&iso) && !candidates.contains(&iso) {
        candidates.push(iso);
    }
}

/// Render a candidate list as prose plus machine-readable action rows.
pub fn render_candidates(candidates: &[String], default_slot: &str) -> (String, Vec<(String, String)>) {
    let prose = if candidates.is_empty() {
        "I wasn't able to find any open dates in the near term — could you share a rough month or week you're targeting?".to_string()
    } else {
        format!(
            "Here are some available dates: {}.",
            candidates.join(", ")
        )
    };
    let rows = candidates
        .iter()
        .map(|d| (d.clone(), default_slot.to_string()))
        .collect();
    (prose, rows)
}

/// Record an attempt in the proposal history. Returns `true` when the
/// attempt count has reached the HIL escalation threshold (≥3).
pub fn record_attempt(history: &mut DateProposalHistory, proposed: &[String]) -> bool {
    history.attempts += 1;
    for d in proposed {
        if !history.proposed_dates.contains(d) {
            history.proposed_dates.push(d.clone());
        }
    }
    history.attempts >= 3
}

/// Is `date` in the past relative to `today`? Used to trigger the
/// pending-future-confirmation flow ("would you like to move to next year?").
pub fn is_past(date: NaiveDate, today: NaiveDate) -> bool {
    date < today
}

/// Next occurrence of the same month/day, one year ahead.
pub fn next_year_same_date(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year() + 1, date.month(), date.day())
}
