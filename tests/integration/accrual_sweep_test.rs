// Accrual sweep over the in-memory store: idempotence, stacking writes,
// deactivation rollback and the carried-invoice freeze.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{
    allocator, date, fixed_rule, invoice_service, percentage_rule, rule_service, store, sweep,
    tuition_invoice,
};
use rust_decimal_macros::dec;
use temaripay::core::AppError;
use temaripay::modules::invoices::models::InvoiceStatus;
use temaripay::modules::invoices::repositories::{AccrualUpdate, InvoiceRepository};
use temaripay::modules::late_fees::repositories::LateFeeRuleRepository;
use temaripay::modules::late_fees::services::accrual_sweep::CancelFlag;
use temaripay::modules::payments::models::PaymentMethod;

#[tokio::test]
async fn test_sweep_accrues_stacked_fee_on_overdue_invoice() {
    let store = store();
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-1",
            "student-1",
            1,
            dec!(1000),
            date(2023, 9, 11),
            date(2023, 10, 11),
        ))
        .await
        .unwrap();
    LateFeeRuleRepository::create(&*store, &fixed_rule(dec!(50), 10))
        .await
        .unwrap();
    LateFeeRuleRepository::create(&*store, &percentage_rule(dec!(10), 10))
        .await
        .unwrap();

    let summary = sweep(&store)
        .run(date(2023, 10, 20), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(summary.applied, 1);
    assert!(summary.errors.is_empty());

    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.late_fee_amount, dec!(150));
    assert_eq!(inv.status, InvoiceStatus::Overdue);
    assert_eq!(inv.net_amount(), dec!(1150));
}

#[tokio::test]
async fn test_sweep_is_idempotent() {
    let store = store();
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-1",
            "student-1",
            1,
            dec!(1000),
            date(2023, 9, 11),
            date(2023, 10, 11),
        ))
        .await
        .unwrap();
    LateFeeRuleRepository::create(&*store, &fixed_rule(dec!(50), 10))
        .await
        .unwrap();

    let runner = sweep(&store);
    let first = runner.run(date(2023, 11, 1), &CancelFlag::new()).await.unwrap();
    assert_eq!(first.applied, 1);

    // Same date, same rules: nothing to rewrite
    let second = runner.run(date(2023, 11, 1), &CancelFlag::new()).await.unwrap();
    assert_eq!(second.applied, 0);
    assert_eq!(second.skipped, 1);

    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.late_fee_amount, dec!(50));
}

#[tokio::test]
async fn test_sweep_leaves_undue_invoices_alone() {
    let store = store();
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-1",
            "student-1",
            1,
            dec!(1000),
            date(2023, 9, 11),
            date(2023, 10, 11),
        ))
        .await
        .unwrap();
    LateFeeRuleRepository::create(&*store, &fixed_rule(dec!(50), 10))
        .await
        .unwrap();

    let summary = sweep(&store)
        .run(date(2023, 10, 11), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(summary.applied, 0);

    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.late_fee_amount, dec!(0));
    assert_eq!(inv.status, InvoiceStatus::Issued);
}

#[tokio::test]
async fn test_sweep_skips_carried_invoices() {
    let store = store();
    let mut carried = tuition_invoice(
        "INV-1",
        "student-1",
        1,
        dec!(1000),
        date(2023, 9, 11),
        date(2023, 10, 11),
    );
    carried.metadata.carried_into = Some("INV-3".to_string());
    InvoiceRepository::create(&*store, &carried).await.unwrap();
    LateFeeRuleRepository::create(&*store, &fixed_rule(dec!(50), 10))
        .await
        .unwrap();

    let summary = sweep(&store)
        .run(date(2023, 12, 1), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(summary.applied, 0);
    assert_eq!(summary.skipped, 1);

    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.late_fee_amount, dec!(0));
}

#[tokio::test]
async fn test_deactivating_last_applicable_rule_rolls_fee_back() {
    let store = store();
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-1",
            "student-1",
            1,
            dec!(1000),
            date(2023, 9, 11),
            date(2023, 10, 11),
        ))
        .await
        .unwrap();
    let rule = fixed_rule(dec!(50), 10);
    LateFeeRuleRepository::create(&*store, &rule).await.unwrap();

    let runner = sweep(&store);
    runner.run(date(2023, 11, 1), &CancelFlag::new()).await.unwrap();
    assert_eq!(
        store
            .find_by_number("INV-1")
            .await
            .unwrap()
            .unwrap()
            .late_fee_amount,
        dec!(50)
    );

    rule_service(&store)
        .deactivate_rule(&rule.id, "registrar")
        .await
        .unwrap();

    let summary = runner.run(date(2023, 11, 2), &CancelFlag::new()).await.unwrap();
    assert_eq!(summary.rolled_back, 1);

    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.late_fee_amount, dec!(0));
    assert_eq!(inv.status, InvoiceStatus::Issued);
}

#[tokio::test]
async fn test_deactivation_with_surviving_rule_reassesses_instead() {
    let store = store();
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-1",
            "student-1",
            1,
            dec!(1000),
            date(2023, 9, 11),
            date(2023, 10, 11),
        ))
        .await
        .unwrap();
    let flat = fixed_rule(dec!(50), 10);
    let percent = percentage_rule(dec!(10), 10);
    LateFeeRuleRepository::create(&*store, &flat).await.unwrap();
    LateFeeRuleRepository::create(&*store, &percent).await.unwrap();

    let runner = sweep(&store);
    runner.run(date(2023, 11, 1), &CancelFlag::new()).await.unwrap();
    assert_eq!(
        store
            .find_by_number("INV-1")
            .await
            .unwrap()
            .unwrap()
            .late_fee_amount,
        dec!(150)
    );

    store.set_active(&flat.id, false).await.unwrap();

    // The percentage rule still applies, so the fee shrinks rather than
    // disappearing
    let summary = runner.run(date(2023, 11, 2), &CancelFlag::new()).await.unwrap();
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.rolled_back, 0);

    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.late_fee_amount, dec!(100));
    assert_eq!(inv.status, InvoiceStatus::Overdue);
}

#[tokio::test]
async fn test_active_rule_cap_enforced() {
    let store = store();
    let service = rule_service(&store);

    service
        .create_rule(fixed_rule(dec!(50), 10), "registrar")
        .await
        .unwrap();
    service
        .create_rule(percentage_rule(dec!(10), 10), "registrar")
        .await
        .unwrap();

    let result = service
        .create_rule(fixed_rule(dec!(25), 5), "registrar")
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    // Deactivating one frees a slot
    let rules = service.list_rules().await.unwrap();
    service
        .deactivate_rule(&rules[0].id, "registrar")
        .await
        .unwrap();
    service
        .create_rule(fixed_rule(dec!(25), 5), "registrar")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_student_overview_freshens_fees_before_reading() {
    let store = store();
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-1",
            "student-1",
            1,
            dec!(1000),
            date(2023, 9, 11),
            date(2023, 10, 11),
        ),
    )
    .await
    .unwrap();
    LateFeeRuleRepository::create(&*store, &fixed_rule(dec!(50), 10))
        .await
        .unwrap();

    let overview = invoice_service(&store)
        .student_overview("student-1", None, date(2023, 11, 1))
        .await
        .unwrap();

    // The read triggered an accrual pass, so the fee is already visible
    assert_eq!(overview.invoices.len(), 1);
    assert_eq!(overview.invoices[0].late_fee_amount, "50.00");
    assert_eq!(overview.invoices[0].status, "overdue");
    assert_eq!(overview.total_outstanding, "1050.00");
}

#[tokio::test]
async fn test_stale_accrual_write_cannot_resurrect_paid_invoice() {
    let store = store();
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-1",
            "student-1",
            1,
            dec!(1000),
            date(2023, 9, 11),
            date(2023, 10, 11),
        ))
        .await
        .unwrap();

    // Snapshot taken before the payment lands, the way a running sweep
    // would have read it
    let stale = store.find_by_number("INV-1").await.unwrap().unwrap();

    allocator(&store)
        .record_payment("student-1", "1000.00", PaymentMethod::Cash, None, "cashier")
        .await
        .unwrap();

    let result = InvoiceRepository::apply_accrual(
        &*store,
        "INV-1",
        &AccrualUpdate {
            expected_late_fee: stale.late_fee_amount,
            expected_paid: stale.paid_amount,
            late_fee_amount: dec!(50),
            status: InvoiceStatus::Overdue,
        },
    )
    .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.status, InvoiceStatus::Paid);
    assert_eq!(inv.late_fee_amount, dec!(0));
}

#[tokio::test]
async fn test_rejected_accrual_write_leaves_row_untouched() {
    let store = store();
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-1",
            "student-1",
            1,
            dec!(1000),
            date(2023, 9, 11),
            date(2023, 10, 11),
        ))
        .await
        .unwrap();
    LateFeeRuleRepository::create(&*store, &fixed_rule(dec!(50), 10))
        .await
        .unwrap();

    sweep(&store)
        .run(date(2023, 11, 1), &CancelFlag::new())
        .await
        .unwrap();
    allocator(&store)
        .record_payment("student-1", "1020.00", PaymentMethod::Cash, None, "cashier")
        .await
        .unwrap();

    // Zeroing the fee here would push paid above net; the write must fail
    // without half-applying
    let result = InvoiceRepository::apply_accrual(
        &*store,
        "INV-1",
        &AccrualUpdate {
            expected_late_fee: dec!(50),
            expected_paid: dec!(1020),
            late_fee_amount: dec!(0),
            status: InvoiceStatus::Issued,
        },
    )
    .await;
    assert!(result.is_err());

    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.late_fee_amount, dec!(50));
    assert_eq!(inv.paid_amount, dec!(1020));
    assert_eq!(inv.status, InvoiceStatus::PartiallyPaid);
}

#[tokio::test]
async fn test_cancelled_flag_stops_before_any_write() {
    let store = store();
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-1",
            "student-1",
            1,
            dec!(1000),
            date(2023, 9, 11),
            date(2023, 10, 11),
        ))
        .await
        .unwrap();
    LateFeeRuleRepository::create(&*store, &fixed_rule(dec!(50), 10))
        .await
        .unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();
    let summary = sweep(&store).run(date(2023, 11, 1), &cancel).await.unwrap();
    assert_eq!(summary.scanned, 0);
    assert_eq!(summary.applied, 0);

    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.late_fee_amount, dec!(0));
}
