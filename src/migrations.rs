//! Defaults-backfill pass (SPEC_FULL.md §4.7, §3.1).
//!
//! There is no schema to migrate in the SQL sense — the persisted format is
//! one JSON document per tenant. "Migration" here means: every event and the
//! database wrapper are run through an idempotent pass that fills in fields a
//! document written by an older version of this crate would be missing,
//! preserving every key already present. Mirrors the reference backend's own
//! posture of tracking a `schema_version` and never destructively rewriting
//! existing rows.

use crate::types::{Database, Step, ThreadState};
use crate::util::stable_hash;

/// Current schema version this binary knows how to backfill to.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Backfill defaults into every event and bump `schema_version`. Idempotent:
/// running it twice on an already-backfilled document is a no-op.
pub fn backfill_defaults(db: &mut Database) {
    for event in &mut db.events {
        // serde's `#[serde(default)]` on individual fields already covers
        // most of this at deserialize time; this pass exists for the fields
        // that need cross-field defaulting rather than a flat zero value.
        if event.thread_state == ThreadState::default()
            && event.audit.is_empty()
            && event.current_step == Step::Intake
        {
            // freshly-constructed event, nothing to backfill
            continue;
        }

        // `requirements_hash`/`room_eval_hash` can't be flat-defaulted to a
        // fixed value — a document from a version that didn't persist them
        // needs them derived from the `requirements`/`locked_room_id` it does
        // carry, the same way `step1_intake`/`step3_room_availability`
        // compute them live, or Step 4's `room_locked_and_fresh` precondition
        // would read a genuinely-fresh lock as stale forever.
        if event.requirements_hash.is_none() {
            event.requirements_hash = Some(stable_hash(&event.requirements));
        }
        if event.locked_room_id.is_some() && event.room_eval_hash.is_none() {
            event.room_eval_hash = Some(stable_hash(&event.requirements));
        }
    }
    if db.schema_version < CURRENT_SCHEMA_VERSION {
        log::info!(
            "backfilled database from schema v{} to v{}",
            db.schema_version,
            CURRENT_SCHEMA_VERSION
        );
        db.schema_version = CURRENT_SCHEMA_VERSION;
    }
}
