// Payment recording and oldest-due-first allocation, including the
// reject-overpayment rule and conservation of money across allocations.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{allocator, date, invoice_service, store, tuition_invoice};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use temaripay::core::AppError;
use temaripay::modules::invoices::models::InvoiceStatus;
use temaripay::modules::invoices::repositories::InvoiceRepository;
use temaripay::modules::payments::models::PaymentMethod;
use temaripay::modules::payments::repositories::PaymentRepository;
use temaripay::testing::InMemoryStore;
use std::sync::Arc;

async fn seed_two_invoices(store: &Arc<InMemoryStore>) {
    // Period 1 due first, period 2 a month later
    InvoiceRepository::create(
        &**store,
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
    InvoiceRepository::create(
        &**store,
        &tuition_invoice(
            "INV-2",
            "student-1",
            2,
            dec!(1000),
            date(2023, 10, 11),
            date(2023, 11, 10),
        ),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_allocation_walks_oldest_due_first() {
    let store = store();
    seed_two_invoices(&store).await;

    let outcome = allocator(&store)
        .record_payment("student-1", "1500.00", PaymentMethod::Cash, None, "cashier")
        .await
        .unwrap();

    assert_eq!(outcome.receipt_no, "RCT-000001");
    assert_eq!(outcome.allocations.len(), 2);
    assert_eq!(outcome.allocations[0].invoice_no, "INV-1");
    assert_eq!(outcome.allocations[0].amount, "1000.00");
    assert_eq!(outcome.allocations[1].invoice_no, "INV-2");
    assert_eq!(outcome.allocations[1].amount, "500.00");
    assert_eq!(outcome.unallocated_remainder, "0.00");

    let first = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(first.status, InvoiceStatus::Paid);
    let second = store.find_by_number("INV-2").await.unwrap().unwrap();
    assert_eq!(second.status, InvoiceStatus::PartiallyPaid);
    assert_eq!(second.remaining_balance(), dec!(500));
}

#[tokio::test]
async fn test_exact_payment_settles_everything() {
    let store = store();
    seed_two_invoices(&store).await;

    allocator(&store)
        .record_payment(
            "student-1",
            "2000.00",
            PaymentMethod::BankTransfer,
            Some("slip-881".to_string()),
            "cashier",
        )
        .await
        .unwrap();

    for invoice_no in ["INV-1", "INV-2"] {
        let inv = store.find_by_number(invoice_no).await.unwrap().unwrap();
        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert_eq!(inv.remaining_balance(), dec!(0));
    }
}

#[tokio::test]
async fn test_overpayment_rejected_before_any_write() {
    let store = store();
    seed_two_invoices(&store).await;

    let result = allocator(&store)
        .record_payment("student-1", "2000.01", PaymentMethod::Cash, None, "cashier")
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    // Nothing moved: no payment, no allocations, balances intact
    assert!(store.find_by_receipt("RCT-000001").await.unwrap().is_none());
    let inv = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(inv.paid_amount, dec!(0));
    assert_eq!(inv.status, InvoiceStatus::Issued);
}

#[tokio::test]
async fn test_payment_without_open_invoices_rejected() {
    let store = store();
    let result = allocator(&store)
        .record_payment("student-9", "100.00", PaymentMethod::Cash, None, "cashier")
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_malformed_amounts_rejected() {
    let store = store();
    seed_two_invoices(&store).await;
    let allocator = allocator(&store);

    for bad in ["0.00", "-5", "12.345", "1,50", "abc"] {
        let result = allocator
            .record_payment("student-1", bad, PaymentMethod::Cash, None, "cashier")
            .await;
        assert!(result.is_err(), "amount '{}' should be rejected", bad);
    }
}

#[tokio::test]
async fn test_receipt_numbers_are_monotonic() {
    let store = store();
    seed_two_invoices(&store).await;
    let allocator = allocator(&store);

    let first = allocator
        .record_payment("student-1", "100.00", PaymentMethod::Cash, None, "cashier")
        .await
        .unwrap();
    let second = allocator
        .record_payment("student-1", "100.00", PaymentMethod::MobileMoney, None, "cashier")
        .await
        .unwrap();

    assert_eq!(first.receipt_no, "RCT-000001");
    assert_eq!(second.receipt_no, "RCT-000002");
    assert!(store
        .find_by_receipt("RCT-000002")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_carried_invoice_never_receives_money() {
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
    InvoiceRepository::create(
        &*store,
        &tuition_invoice(
            "INV-3",
            "student-1",
            3,
            dec!(2000),
            date(2023, 11, 10),
            date(2023, 12, 10),
        ),
    )
    .await
    .unwrap();

    let outcome = allocator(&store)
        .record_payment("student-1", "500.00", PaymentMethod::Cash, None, "cashier")
        .await
        .unwrap();

    assert_eq!(outcome.allocations.len(), 1);
    assert_eq!(outcome.allocations[0].invoice_no, "INV-3");
    let frozen = store.find_by_number("INV-1").await.unwrap().unwrap();
    assert_eq!(frozen.paid_amount, dec!(0));
}

#[tokio::test]
async fn test_cancel_refused_once_money_has_moved() {
    let store = store();
    seed_two_invoices(&store).await;
    let service = invoice_service(&store);

    allocator(&store)
        .record_payment("student-1", "100.00", PaymentMethod::Cash, None, "cashier")
        .await
        .unwrap();

    // INV-1 took the allocation; INV-2 is still untouched and cancellable
    let refused = service.cancel("INV-1", "registrar").await;
    assert!(matches!(refused, Err(AppError::Conflict(_))));

    service.cancel("INV-2", "registrar").await.unwrap();
    let cancelled = store.find_by_number("INV-2").await.unwrap().unwrap();
    assert_eq!(cancelled.status, InvoiceStatus::Cancelled);

    assert!(matches!(
        service.cancel("INV-404", "registrar").await,
        Err(AppError::NotFound(_))
    ));
}

proptest! {
    /// Money is conserved: however a payment splits, the allocations sum to
    /// the payment amount and no invoice ends up over its net amount.
    #[test]
    fn prop_allocations_conserve_payment(
        first_balance in 1u32..=3000,
        second_balance in 1u32..=3000,
        pay_cents in 1u64..=600_000,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let store = store();
            InvoiceRepository::create(
                &*store,
                &tuition_invoice(
                    "INV-1",
                    "student-1",
                    1,
                    Decimal::from(first_balance),
                    date(2023, 9, 11),
                    date(2023, 10, 11),
                ),
            )
            .await
            .unwrap();
            InvoiceRepository::create(
                &*store,
                &tuition_invoice(
                    "INV-2",
                    "student-1",
                    2,
                    Decimal::from(second_balance),
                    date(2023, 10, 11),
                    date(2023, 11, 10),
                ),
            )
            .await
            .unwrap();

            let amount = Decimal::new(pay_cents as i64, 2);
            let total = Decimal::from(first_balance) + Decimal::from(second_balance);
            let result = allocator(&store)
                .record_payment(
                    "student-1",
                    &format!("{:.2}", amount),
                    PaymentMethod::Cash,
                    None,
                    "cashier",
                )
                .await;

            if amount > total {
                prop_assert!(result.is_err());
            } else {
                let outcome = result.unwrap();
                let allocated: Decimal = outcome
                    .allocations
                    .iter()
                    .map(|a| a.amount.parse::<Decimal>().unwrap())
                    .sum();
                prop_assert_eq!(allocated, amount);

                for invoice_no in ["INV-1", "INV-2"] {
                    let inv = store.find_by_number(invoice_no).await.unwrap().unwrap();
                    prop_assert!(inv.paid_amount <= inv.net_amount());
                    inv.validate_invariants().unwrap();
                }
            }
            Ok(())
        })?;
    }
}
