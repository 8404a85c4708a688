use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditEvent, AuditSink};
use crate::core::{money, AppError, Result};
use crate::modules::invoices::repositories::InvoiceRepository;
use crate::modules::payments::models::{Payment, PaymentAllocation, PaymentMethod};
use crate::modules::payments::repositories::{InvoicePaymentUpdate, PaymentRepository};

/// One allocation as reported back to the cashier
#[derive(Debug, Clone, Serialize)]
pub struct AllocationView {
    pub invoice_no: String,
    pub amount: String,
    pub invoice_status: String,
}

/// Result of recording a payment
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub receipt_no: String,
    pub student_id: String,
    pub amount: String,
    pub allocations: Vec<AllocationView>,
    /// Always "0.00": a payment exceeding the student's total outstanding is
    /// rejected before any write, so nothing is ever left unallocated. The
    /// field keeps the receipt shape stable for a future credit balance.
    pub unallocated_remainder: String,
}

/// Applies payments to a student's open invoices oldest due date first
///
/// The whole payment either allocates fully or is rejected; there are no
/// partial writes. Each invoice takes the smaller of its remaining balance
/// and what is left of the payment.
pub struct PaymentAllocator {
    invoices: Arc<dyn InvoiceRepository>,
    payments: Arc<dyn PaymentRepository>,
    audit: Arc<dyn AuditSink>,
}

impl PaymentAllocator {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        payments: Arc<dyn PaymentRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            invoices,
            payments,
            audit,
        }
    }

    /// Record a payment of `amount` (a decimal string) for `student_id` and
    /// allocate it across the student's open invoices
    pub async fn record_payment(
        &self,
        student_id: &str,
        amount: &str,
        method: PaymentMethod,
        reference: Option<String>,
        actor_id: &str,
    ) -> Result<AllocationOutcome> {
        let amount = money::parse_amount(amount)?;
        if amount == Decimal::ZERO {
            return Err(AppError::validation("Payment amount must be positive"));
        }

        let open = self.invoices.list_open_for_student(student_id).await?;
        let allocatable: Vec<_> = open.iter().filter(|i| i.is_allocatable()).collect();

        if allocatable.is_empty() {
            return Err(AppError::conflict(format!(
                "Student '{}' has no open invoices to pay",
                student_id
            )));
        }

        // Reject before writing anything rather than leave a dangling
        // remainder; the school does not keep student credit balances
        let total_outstanding: Decimal =
            allocatable.iter().map(|i| i.remaining_balance()).sum();
        if amount > total_outstanding {
            return Err(AppError::conflict(format!(
                "Payment {} exceeds outstanding balance {} for student '{}'",
                money::format_amount(amount),
                money::format_amount(total_outstanding),
                student_id
            )));
        }

        let sequence = self.payments.next_receipt_sequence().await?;
        let receipt_no = Payment::format_receipt_no(sequence);
        let payment = Payment::new(&receipt_no, student_id, amount, method, reference)?;

        let mut remaining = amount;
        let mut allocations = Vec::new();
        let mut updates = Vec::new();
        let mut views = Vec::new();

        for invoice in &allocatable {
            if remaining == Decimal::ZERO {
                break;
            }
            let take = remaining.min(invoice.remaining_balance());

            let mut updated = (*invoice).clone();
            updated.register_allocation(take)?;

            allocations.push(PaymentAllocation::new(&receipt_no, &invoice.invoice_no, take)?);
            updates.push(InvoicePaymentUpdate {
                invoice_no: invoice.invoice_no.clone(),
                expected_paid: invoice.paid_amount,
                paid_amount: updated.paid_amount,
                status: updated.status,
            });
            views.push(AllocationView {
                invoice_no: invoice.invoice_no.clone(),
                amount: money::format_amount(take),
                invoice_status: updated.status.to_string(),
            });
            remaining -= take;
        }

        self.payments
            .create_with_allocations(&payment, &allocations, &updates)
            .await?;

        info!(
            receipt_no = %receipt_no,
            student_id = %student_id,
            amount = %amount,
            invoices = allocations.len(),
            "payment recorded"
        );
        self.audit
            .record(AuditEvent::new(
                "Payment",
                &receipt_no,
                "recorded",
                actor_id,
                None,
                Some(serde_json::json!({
                    "student_id": student_id,
                    "amount": amount,
                    "allocations": allocations
                        .iter()
                        .map(|a| serde_json::json!({
                            "invoice_no": a.invoice_no,
                            "amount": a.amount,
                        }))
                        .collect::<Vec<_>>(),
                })),
            ))
            .await;

        Ok(AllocationOutcome {
            receipt_no,
            student_id: student_id.to_string(),
            amount: money::format_amount(amount),
            allocations: views,
            unallocated_remainder: money::format_amount(Decimal::ZERO),
        })
    }
}
