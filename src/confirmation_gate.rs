//! Confirmation Gate (SPEC_FULL.md §4.5).
//!
//! Order-independent check that an accepted offer has both billing complete
//! and deposit paid before the event can route to HIL for final approval.

use crate::types::EventRecord;

#[derive(Debug, Clone)]
pub struct GateStatus {
    pub ready_for_hil: bool,
    pub billing_complete: bool,
    pub billing_missing: Vec<&'static str>,
    pub deposit_required: bool,
    pub deposit_paid: bool,
    pub deposit_amount: Option<f64>,
    pub offer_accepted: bool,
}

/// Evaluate the gate for `event`. Deposit state needs no separate reload
/// here: `dispatcher::record_deposit_if_paid` already records a reported
/// deposit payment onto `event` on every turn regardless of which step owns
/// it (the same order-independence this gate itself provides for billing),
/// so `event.deposit_info` is already current by the time this runs.
pub fn evaluate(event: &mut EventRecord) -> GateStatus {
    let billing_missing = event.billing_details.missing_fields();
    let billing_complete = billing_missing.is_empty();
    let deposit_required = event.deposit_info.required;
    let deposit_paid = !deposit_required || event.deposit_info.paid;
    let offer_accepted = event.offer_accepted;

    GateStatus {
        ready_for_hil: offer_accepted && billing_complete && deposit_paid,
        billing_complete,
        billing_missing,
        deposit_required,
        deposit_paid,
        deposit_amount: event.deposit_info.amount,
        offer_accepted,
    }
}

/// Prioritized prompt: billing first, then deposit, then nothing.
pub fn next_prompt(status: &GateStatus) -> Option<String> {
    if !status.billing_complete {
        return Some(format!(
            "To finalize, we still need your billing details: {}.",
            status.billing_missing.join(", ")
        ));
    }
    if status.deposit_required && !status.deposit_paid {
        let amount = status
            .deposit_amount
            .map(|a| format!("${a:.2}"))
            .unwrap_or_else(|| "the deposit".to_string());
        return Some(format!("Please submit {amount} to confirm your booking."));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BillingDetails, DepositInfo};

    fn accepted_event() -> EventRecord {
        let mut e = EventRecord::new("e1".into(), "t1".into(), "c@x.com".into());
        e.offer_accepted = true;
        e
    }

    #[test]
    fn test_gate_not_ready_without_billing() {
        let mut event = accepted_event();
        let status = evaluate(&mut event);
        assert!(!status.ready_for_hil);
        assert!(!status.billing_complete);
        assert!(next_prompt(&status).unwrap().contains("billing"));
    }

    #[test]
    fn test_gate_ready_when_billing_and_deposit_satisfied() {
        let mut event = accepted_event();
        event.billing_details = BillingDetails {
            company: Some("Acme".into()),
            street: Some("1 Main St".into()),
            postal_code: Some("10001".into()),
            city: Some("NYC".into()),
            country: Some("US".into()),
            vat: None,
        };
        event.deposit_info = DepositInfo { required: false, ..Default::default() };
        let status = evaluate(&mut event);
        assert!(status.ready_for_hil);
        assert!(next_prompt(&status).is_none());
    }

    #[test]
    fn test_gate_blocks_on_unpaid_required_deposit() {
        let mut event = accepted_event();
        event.billing_details = BillingDetails {
            company: Some("Acme".into()),
            street: Some("1 Main St".into()),
            postal_code: Some("10001".into()),
            city: Some("NYC".into()),
            country: Some("US".into()),
            vat: None,
        };
        event.deposit_info.required = true;
        event.deposit_info.paid = false;

        let status = evaluate(&mut event);
        assert!(!status.deposit_paid);
        assert!(!status.ready_for_hil);
        assert!(next_prompt(&status).unwrap().contains("deposit"));
    }
}
