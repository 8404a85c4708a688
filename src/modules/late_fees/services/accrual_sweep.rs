use chrono::NaiveDate;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditSink};
use crate::core::Result;
use crate::modules::invoices::models::Invoice;
use crate::modules::invoices::repositories::{AccrualUpdate, InvoiceRepository};
use crate::modules::late_fees::repositories::LateFeeRuleRepository;
use crate::modules::late_fees::services::fee_evaluator::FeeEvaluator;

/// Cooperative cancellation for a running sweep
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A per-invoice failure recorded by the sweep instead of aborting it
#[derive(Debug, Clone, Serialize)]
pub struct SweepError {
    pub invoice_no: String,
    pub message: String,
}

/// Outcome of one sweep run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub scanned: usize,
    pub applied: usize,
    pub rolled_back: usize,
    pub skipped: usize,
    pub errors: Vec<SweepError>,
}

/// Recomputes late fees across all open invoices
///
/// The sweep is idempotent: it rewrites each invoice's cumulative fee from
/// scratch and skips the write when the stored value already matches exactly.
/// One failing invoice never aborts the run.
pub struct AccrualSweep {
    invoices: Arc<dyn InvoiceRepository>,
    rules: Arc<dyn LateFeeRuleRepository>,
    audit: Arc<dyn AuditSink>,
}

impl AccrualSweep {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        rules: Arc<dyn LateFeeRuleRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            invoices,
            rules,
            audit,
        }
    }

    /// Run a full sweep as of `as_of`
    pub async fn run(&self, as_of: NaiveDate, cancel: &CancelFlag) -> Result<SweepSummary> {
        let rules = self.rules.list_all().await?;
        let open = self.invoices.list_open().await?;

        let mut summary = SweepSummary::default();
        info!(open_invoices = open.len(), %as_of, "starting accrual sweep");

        for invoice in &open {
            if cancel.is_cancelled() {
                info!(
                    scanned = summary.scanned,
                    applied = summary.applied,
                    "sweep cancelled, partial progress kept"
                );
                break;
            }
            summary.scanned += 1;

            // Carried invoices are frozen; their balance lives in a successor
            if invoice.metadata.carried_into.is_some() {
                summary.skipped += 1;
                continue;
            }

            match self.sweep_one(invoice, &rules, as_of).await {
                Ok(SweepAction::Applied) => summary.applied += 1,
                Ok(SweepAction::RolledBack) => summary.rolled_back += 1,
                Ok(SweepAction::Unchanged) => summary.skipped += 1,
                Err(e) => {
                    warn!(invoice_no = %invoice.invoice_no, error = %e, "sweep skipped invoice");
                    summary.errors.push(SweepError {
                        invoice_no: invoice.invoice_no.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = summary.scanned,
            applied = summary.applied,
            rolled_back = summary.rolled_back,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            "accrual sweep finished"
        );
        Ok(summary)
    }

    async fn sweep_one(
        &self,
        invoice: &Invoice,
        rules: &[crate::modules::late_fees::models::LateFeeRule],
        as_of: NaiveDate,
    ) -> Result<SweepAction> {
        let assessment = FeeEvaluator::assess(invoice, rules, as_of);

        if assessment.total > rust_decimal::Decimal::ZERO {
            // A payment may already cover more fee than today's rules assess;
            // the fee never drops below what paid money has been booked
            // against, or paid would exceed net
            let principal = invoice.total_amount - invoice.discount_amount;
            let floor = (invoice.paid_amount - principal).max(rust_decimal::Decimal::ZERO);
            let fee = assessment.total.max(floor);

            // Exact comparison: a matching stored fee means a previous run
            // already wrote today's value
            if invoice.late_fee_amount == fee {
                return Ok(SweepAction::Unchanged);
            }

            let mut updated = invoice.clone();
            updated.apply_late_fee(fee)?;
            self.invoices
                .apply_accrual(
                    &invoice.invoice_no,
                    &AccrualUpdate {
                        expected_late_fee: invoice.late_fee_amount,
                        expected_paid: invoice.paid_amount,
                        late_fee_amount: updated.late_fee_amount,
                        status: updated.status,
                    },
                )
                .await?;

            debug!(
                invoice_no = %invoice.invoice_no,
                fee = %assessment.total,
                rules = assessment.breakdown.len(),
                "late fee accrued"
            );
            self.audit
                .record(AuditEvent::new(
                    "Invoice",
                    &invoice.invoice_no,
                    "late_fee_accrued",
                    "system",
                    Some(serde_json::json!({
                        "late_fee_amount": invoice.late_fee_amount,
                        "status": invoice.status,
                    })),
                    Some(serde_json::json!({
                        "late_fee_amount": updated.late_fee_amount,
                        "status": updated.status,
                        "breakdown": assessment
                            .breakdown
                            .iter()
                            .map(|c| serde_json::json!({"rule_id": c.rule_id, "amount": c.amount}))
                            .collect::<Vec<_>>(),
                    })),
                ))
                .await;
            return Ok(SweepAction::Applied);
        }

        // A zero assessment over a non-zero stored fee is only honoured when
        // no active rule matches this invoice at all (deactivation rollback);
        // otherwise the stored fee stands.
        if invoice.late_fee_amount > rust_decimal::Decimal::ZERO
            && !FeeEvaluator::any_applicable_rule(invoice, rules)
        {
            let mut updated = invoice.clone();
            updated.rollback_late_fee()?;
            self.invoices
                .apply_accrual(
                    &invoice.invoice_no,
                    &AccrualUpdate {
                        expected_late_fee: invoice.late_fee_amount,
                        expected_paid: invoice.paid_amount,
                        late_fee_amount: updated.late_fee_amount,
                        status: updated.status,
                    },
                )
                .await?;

            self.audit
                .record(AuditEvent::new(
                    "Invoice",
                    &invoice.invoice_no,
                    "late_fee_rolled_back",
                    "system",
                    Some(serde_json::json!({
                        "late_fee_amount": invoice.late_fee_amount,
                        "status": invoice.status,
                    })),
                    Some(serde_json::json!({
                        "late_fee_amount": updated.late_fee_amount,
                        "status": updated.status,
                    })),
                ))
                .await;
            return Ok(SweepAction::RolledBack);
        }

        Ok(SweepAction::Unchanged)
    }
}

enum SweepAction {
    Applied,
    RolledBack,
    Unchanged,
}
