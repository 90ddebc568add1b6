//! Capture & Promotion (SPEC_FULL.md §4.9).
//!
//! Tolerates facts arriving out of canonical order: a client may mention
//! contact info in turn 1 while the step that owns that field is several
//! steps away. Captured values are held in `event.captured` until their
//! owning step is reached, then promoted into `requirements`.

use serde_json::Value;

use crate::types::{EventRecord, Step};

/// Which step owns a given dotted capture path. Anything not listed here is
/// considered immediately promotable (no deferral).
fn owning_step(path: &str) -> Option<Step> {
    match path {
        "contact.email" | "contact.phone" | "contact.name" => Some(Step::Intake),
        "billing.company" | "billing.street" | "billing.postal_code" | "billing.city"
        | "billing.country" | "billing.vat" => Some(Step::Negotiation),
        "requirements.participants" | "requirements.layout" => Some(Step::RoomAvailability),
        "requirements.preferred_room" => Some(Step::RoomAvailability),
        _ => None,
    }
}

fn deferred_intent_for(path: &str) -> Option<&'static str> {
    match path {
        p if p.starts_with("contact.") => Some("contact_update"),
        p if p.starts_with("billing.") => Some("billing_update"),
        p if p.starts_with("requirements.") => Some("requirements_update"),
        _ => None,
    }
}

fn set_dotted(value: &mut Value, path: &str, leaf: Value) {
    let mut cursor = value;
    let parts: Vec<&str> = path.split('.').collect();
    for (i, part) in parts.iter().enumerate() {
        if !cursor.is_object() {
            *cursor = Value::Object(Default::default());
        }
        let obj = cursor.as_object_mut().unwrap();
        if i == parts.len() - 1 {
            obj.insert(part.to_string(), leaf);
            return;
        }
        cursor = obj.entry(part.to_string()).or_insert_with(|| Value::Object(Default::default()));
    }
}

fn get_dotted<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cursor = value;
    for part in path.split('.') {
        cursor = cursor.get(part)?;
    }
    Some(cursor)
}

/// Capture a fact at `path` (e.g. `"billing.company"`) from message `msg_id`.
/// Defers it if the owning step hasn't been reached yet.
pub fn capture(event: &mut EventRecord, msg_id: &str, path: &str, leaf: Value) {
    set_dotted(&mut event.captured, path, leaf);
    event.captured_sources.push(format!("{msg_id}:{path}"));

    if let Some(owner) = owning_step(path) {
        if owner > event.current_step {
            if let Some(intent) = deferred_intent_for(path) {
                if !event.deferred_intents.iter().any(|i| i == intent) {
                    event.deferred_intents.push(intent.to_string());
                }
            }
        }
    }
}

/// Promote everything captured for the current step into `requirements` /
/// billing fields and clear the corresponding deferred intent. Called when
/// the workflow reaches the owning step.
pub fn promote(event: &mut EventRecord) {
    let current = event.current_step;
    let paths = [
        "requirements.participants",
        "requirements.layout",
        "requirements.preferred_room",
        "billing.company",
        "billing.street",
        "billing.postal_code",
        "billing.city",
        "billing.country",
        "billing.vat",
    ];

    for path in paths {
        let Some(owner) = owning_step(path) else { continue };
        if owner != current {
            continue;
        }
        let Some(leaf) = get_dotted(&event.captured, path).cloned() else { continue };
        promote_into_fields(event, path, leaf);
    }

    if let Some(intent) = deferred_intent_for_step(current) {
        event.deferred_intents.retain(|i| i != intent);
    }
}

fn promote_into_fields(event: &mut EventRecord, path: &str, leaf: Value) {
    match path {
        "requirements.participants" => {
            if let Some(n) = leaf.as_u64() {
                event.requirements.participants = Some(n as u32);
            }
        }
        "requirements.layout" => {
            if let Some(s) = leaf.as_str() {
                event.requirements.layout = Some(s.to_string());
            }
        }
        "requirements.preferred_room" => {
            if let Some(s) = leaf.as_str() {
                event.requirements.preferred_room = Some(s.to_string());
            }
        }
        "billing.company" => event.billing_details.company = leaf.as_str().map(str::to_string),
        "billing.street" => event.billing_details.street = leaf.as_str().map(str::to_string),
        "billing.postal_code" => event.billing_details.postal_code = leaf.as_str().map(str::to_string),
        "billing.city" => event.billing_details.city = leaf.as_str().map(str::to_string),
        "billing.country" => event.billing_details.country = leaf.as_str().map(str::to_string),
        "billing.vat" => event.billing_details.vat = leaf.as_str().map(str::to_string),
        _ => {}
    }
}

/// Pull any recognized billing/requirements fields out of a classifier's
/// structured `extracted` payload and capture each one, wherever in the
/// workflow the message happened to land. Mirrors the narrow capture Step 1
/// performs for `billing.company`, generalized to every field Step 5 owns so
/// a client who volunteers their full billing address before Negotiation
/// isn't asked for it twice. Also covers `requirements.participants` and
/// `requirements.preferred_room` so a client naming a room before Step 3
/// lists options isn't asked to pick again.
pub fn capture_from_extracted(event: &mut EventRecord, msg_id: &str, extracted: &Value) {
    if let Some(billing) = extracted.get("billing") {
        for field in ["company", "street", "postal_code", "city", "country", "vat"] {
            if let Some(v) = billing.get(field).and_then(|v| v.as_str()) {
                capture(event, msg_id, &format!("billing.{field}"), Value::String(v.to_string()));
            }
        }
    }
    if let Some(n) = extracted.get("participants").and_then(|v| v.as_u64()) {
        capture(event, msg_id, "requirements.participants", Value::from(n));
    }
    if let Some(name) = extracted.get("preferred_room").and_then(|v| v.as_str()) {
        capture(event, msg_id, "requirements.preferred_room", Value::String(name.to_string()));
    }
}

fn deferred_intent_for_step(step: Step) -> Option<&'static str> {
    match step {
        Step::Intake => Some("contact_update"),
        Step::RoomAvailability => Some("requirements_update"),
        Step::Negotiation => Some("billing_update"),
        _ => None,
    }
}
