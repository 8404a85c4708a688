use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditEvent, AuditSink};
use crate::core::{money, AppError, Result};
use crate::modules::invoices::models::Invoice;
use crate::modules::invoices::repositories::InvoiceRepository;
use crate::modules::late_fees::services::accrual_sweep::{AccrualSweep, CancelFlag};
use crate::modules::payments::repositories::PaymentRepository;
use crate::modules::roster::StudentRoster;

/// One invoice as presented over the API, amounts as 2-dp decimal strings
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceView {
    pub invoice_no: String,
    pub student_id: String,
    pub period_index: u32,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: String,
    pub total_amount: String,
    pub discount_amount: String,
    pub late_fee_amount: String,
    pub net_amount: String,
    pub paid_amount: String,
    pub remaining_balance: String,
    pub carried_into: Option<String>,
}

impl InvoiceView {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        Self {
            invoice_no: invoice.invoice_no.clone(),
            student_id: invoice.student_id.clone(),
            period_index: invoice.metadata.period_index,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            status: invoice.status.to_string(),
            total_amount: money::format_amount(invoice.total_amount),
            discount_amount: money::format_amount(invoice.discount_amount),
            late_fee_amount: money::format_amount(invoice.late_fee_amount),
            net_amount: money::format_amount(invoice.net_amount()),
            paid_amount: money::format_amount(invoice.paid_amount),
            remaining_balance: money::format_amount(invoice.remaining_balance()),
            carried_into: invoice.metadata.carried_into.clone(),
        }
    }
}

/// A student's full billing position
#[derive(Debug, Clone, Serialize)]
pub struct StudentOverview {
    pub student_id: String,
    pub invoices: Vec<InvoiceView>,
    /// Sum of remaining balances over allocatable invoices
    pub total_outstanding: String,
}

/// Billing position of every billable student in a class
#[derive(Debug, Clone, Serialize)]
pub struct ClassOverview {
    pub class_id: String,
    pub students: Vec<StudentOverview>,
    pub total_outstanding: String,
}

/// Read and administrative operations over invoices
pub struct InvoiceService {
    invoices: Arc<dyn InvoiceRepository>,
    payments: Arc<dyn PaymentRepository>,
    roster: Arc<dyn StudentRoster>,
    sweep: Arc<AccrualSweep>,
    audit: Arc<dyn AuditSink>,
}

impl InvoiceService {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        payments: Arc<dyn PaymentRepository>,
        roster: Arc<dyn StudentRoster>,
        sweep: Arc<AccrualSweep>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            invoices,
            payments,
            roster,
            sweep,
            audit,
        }
    }

    pub async fn find(&self, invoice_no: &str) -> Result<InvoiceView> {
        let invoice = self
            .invoices
            .find_by_number(invoice_no)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Invoice '{}' not found", invoice_no)))?;
        Ok(InvoiceView::from_invoice(&invoice))
    }

    /// A student's invoices with fees freshened first, so the overview never
    /// shows stale accruals. A failed sweep degrades to stale-but-consistent
    /// data rather than failing the read.
    pub async fn student_overview(
        &self,
        student_id: &str,
        period_index: Option<u32>,
        as_of: NaiveDate,
    ) -> Result<StudentOverview> {
        if let Err(e) = self.sweep.run(as_of, &CancelFlag::new()).await {
            tracing::warn!(error = %e, "pre-read sweep failed, serving stored fees");
        }
        self.student_position(student_id, period_index).await
    }

    /// Overview across every billable student of a class, one sweep up front
    pub async fn class_overview(
        &self,
        class_id: &str,
        period_index: Option<u32>,
        as_of: NaiveDate,
    ) -> Result<ClassOverview> {
        if let Err(e) = self.sweep.run(as_of, &CancelFlag::new()).await {
            tracing::warn!(error = %e, "pre-read sweep failed, serving stored fees");
        }

        let roster = self.roster.list_billable_students(class_id).await?;
        let mut students = Vec::with_capacity(roster.len());
        let mut total = Decimal::ZERO;
        for student in &roster {
            let position = self
                .student_position(&student.student_id, period_index)
                .await?;
            total += position
                .total_outstanding
                .parse::<Decimal>()
                .unwrap_or(Decimal::ZERO);
            students.push(position);
        }

        Ok(ClassOverview {
            class_id: class_id.to_string(),
            students,
            total_outstanding: money::format_amount(total),
        })
    }

    async fn student_position(
        &self,
        student_id: &str,
        period_index: Option<u32>,
    ) -> Result<StudentOverview> {
        let mut invoices = self.invoices.list_for_student(student_id).await?;
        if let Some(period) = period_index {
            invoices.retain(|i| i.metadata.period_index == period);
        }
        let total_outstanding: Decimal = invoices
            .iter()
            .filter(|i| i.is_allocatable())
            .map(|i| i.remaining_balance())
            .sum();

        Ok(StudentOverview {
            student_id: student_id.to_string(),
            invoices: invoices.iter().map(InvoiceView::from_invoice).collect(),
            total_outstanding: money::format_amount(total_outstanding),
        })
    }

    /// Administrative cancel. Refused once any payment has been allocated,
    /// even a since-cancelled one; cancellation is for mistaken issuance, not
    /// reversal of a live ledger entry.
    pub async fn cancel(&self, invoice_no: &str, actor_id: &str) -> Result<()> {
        let invoice = self
            .invoices
            .find_by_number(invoice_no)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Invoice '{}' not found", invoice_no)))?;

        let allocations = self.payments.allocations_for_invoice(invoice_no).await?;
        if !allocations.is_empty() {
            return Err(AppError::conflict(format!(
                "Invoice '{}' has payment allocations and cannot be cancelled",
                invoice_no
            )));
        }

        self.invoices.cancel(invoice_no).await?;
        info!(invoice_no = %invoice_no, actor_id = %actor_id, "invoice cancelled");
        self.audit
            .record(AuditEvent::new(
                "Invoice",
                invoice_no,
                "cancelled",
                actor_id,
                Some(serde_json::json!({"status": invoice.status})),
                Some(serde_json::json!({"status": "cancelled"})),
            ))
            .await;
        Ok(())
    }
}
