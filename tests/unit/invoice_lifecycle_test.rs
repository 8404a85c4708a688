// Invoice state machine: issued, partially paid, overdue, paid, cancelled,
// and the monetary invariants that hold across every transition.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{date, tuition_invoice};
use rust_decimal_macros::dec;
use temaripay::modules::invoices::models::{FeeCategory, InvoiceLine, InvoiceStatus};

fn invoice() -> temaripay::modules::invoices::models::Invoice {
    tuition_invoice(
        "INV-1",
        "student-1",
        1,
        dec!(1000),
        date(2023, 9, 11),
        date(2023, 10, 11),
    )
}

#[test]
fn test_full_lifecycle_issued_to_paid_via_overdue() {
    let mut inv = invoice();
    assert_eq!(inv.status, InvoiceStatus::Issued);

    inv.apply_late_fee(dec!(150)).unwrap();
    assert_eq!(inv.status, InvoiceStatus::Overdue);
    assert_eq!(inv.net_amount(), dec!(1150));

    inv.register_allocation(dec!(500)).unwrap();
    assert_eq!(inv.status, InvoiceStatus::PartiallyPaid);

    // A later sweep can push a partially paid invoice back to overdue
    inv.apply_late_fee(dec!(200)).unwrap();
    assert_eq!(inv.status, InvoiceStatus::Overdue);
    assert_eq!(inv.net_amount(), dec!(1200));

    inv.register_allocation(dec!(700)).unwrap();
    assert_eq!(inv.status, InvoiceStatus::Paid);
    assert_eq!(inv.remaining_balance(), dec!(0));
    inv.validate_invariants().unwrap();
}

#[test]
fn test_terminal_states_are_frozen() {
    let mut paid = invoice();
    paid.register_allocation(dec!(1000)).unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert!(paid.register_allocation(dec!(1)).is_err());
    assert!(paid.apply_late_fee(dec!(50)).is_err());
    assert!(paid.rollback_late_fee().is_err());
    assert!(paid.cancel().is_err());

    let mut cancelled = invoice();
    cancelled.cancel().unwrap();
    assert!(cancelled.register_allocation(dec!(1)).is_err());
    assert!(cancelled.apply_late_fee(dec!(50)).is_err());
}

#[test]
fn test_cancel_requires_issued_and_unpaid() {
    let mut overdue = invoice();
    overdue.apply_late_fee(dec!(50)).unwrap();
    assert!(overdue.cancel().is_err());

    let mut partial = invoice();
    partial.register_allocation(dec!(10)).unwrap();
    assert!(partial.cancel().is_err());
}

#[test]
fn test_discount_reduces_net_but_not_total() {
    let lines = vec![
        InvoiceLine::new("INV-2", FeeCategory::Tuition, "Tuition", dec!(900), None).unwrap(),
        InvoiceLine::new("INV-2", FeeCategory::Transport, "Bus", dec!(100), None).unwrap(),
    ];
    let inv = temaripay::modules::invoices::models::Invoice::new(
        "INV-2",
        "student-1",
        date(2023, 9, 11),
        date(2023, 10, 11),
        lines,
        dec!(200),
        temaripay::modules::invoices::models::InvoiceMetadata {
            billing_plan_id: "plan-1".to_string(),
            period_index: 1,
            sequence_index: 1,
            carried_into: None,
        },
    )
    .unwrap();

    assert_eq!(inv.total_amount, dec!(1000));
    assert_eq!(inv.net_amount(), dec!(800));
    assert_eq!(inv.line_categories().len(), 2);
}

#[test]
fn test_lowering_fee_to_paid_amount_closes_invoice() {
    let mut inv = invoice();
    inv.apply_late_fee(dec!(150)).unwrap();
    inv.register_allocation(dec!(1100)).unwrap();
    assert_eq!(inv.status, InvoiceStatus::PartiallyPaid);

    // Fee reassessed down to exactly the gap; the invoice is now settled
    inv.apply_late_fee(dec!(100)).unwrap();
    assert_eq!(inv.status, InvoiceStatus::Paid);
    assert_eq!(inv.remaining_balance(), dec!(0));
    inv.validate_invariants().unwrap();
}

#[test]
fn test_rollback_clamp_keeps_paid_within_net() {
    let mut inv = invoice();
    inv.apply_late_fee(dec!(150)).unwrap();
    inv.register_allocation(dec!(1080)).unwrap();

    inv.rollback_late_fee().unwrap();
    // 80 of the payment went to the fee and stays booked as fee
    assert_eq!(inv.late_fee_amount, dec!(80));
    assert_eq!(inv.status, InvoiceStatus::Paid);
    inv.validate_invariants().unwrap();
}

#[test]
fn test_status_for_paid_projection() {
    let mut inv = invoice();
    assert_eq!(inv.status_for_paid(dec!(0)), InvoiceStatus::Issued);
    assert_eq!(inv.status_for_paid(dec!(500)), InvoiceStatus::PartiallyPaid);
    assert_eq!(inv.status_for_paid(dec!(1000)), InvoiceStatus::Paid);

    inv.apply_late_fee(dec!(100)).unwrap();
    assert_eq!(inv.status_for_paid(dec!(0)), InvoiceStatus::Overdue);
    assert_eq!(inv.status_for_paid(dec!(1100)), InvoiceStatus::Paid);
}
