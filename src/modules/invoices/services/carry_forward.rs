use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditSink};
use crate::config::BillingConfig;
use crate::core::{AppError, Result};
use crate::modules::calendar::PeriodCalendar;
use crate::modules::invoices::models::{BillingPlan, Invoice, InvoiceLine, InvoiceMetadata};
use crate::modules::invoices::repositories::{BillingPlanRepository, InvoiceRepository};
use crate::modules::late_fees::repositories::LateFeeRuleRepository;
use crate::modules::late_fees::services::fee_evaluator::FeeEvaluator;
use crate::modules::roster::{AccountResolver, StudentRoster};

/// A per-student failure recorded during plan fan-out
#[derive(Debug, Clone, Serialize)]
pub struct GenerationError {
    pub student_id: String,
    pub message: String,
}

/// Outcome of generating one period's invoices for a whole plan
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationSummary {
    pub generated: usize,
    pub skipped_existing: usize,
    pub errors: Vec<GenerationError>,
}

/// Generates period invoices, folding each student's unresolved past-due
/// balances into the new invoice as carried-balance lines
///
/// A source invoice whose remainder has been carried is stamped with the
/// successor's number and frozen; its balance is owed exactly once, on the
/// new invoice.
pub struct CarryForwardGenerator {
    invoices: Arc<dyn InvoiceRepository>,
    plans: Arc<dyn BillingPlanRepository>,
    rules: Arc<dyn LateFeeRuleRepository>,
    roster: Arc<dyn StudentRoster>,
    accounts: Arc<dyn AccountResolver>,
    calendar: PeriodCalendar,
    billing: BillingConfig,
    audit: Arc<dyn AuditSink>,
}

impl CarryForwardGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        plans: Arc<dyn BillingPlanRepository>,
        rules: Arc<dyn LateFeeRuleRepository>,
        roster: Arc<dyn StudentRoster>,
        accounts: Arc<dyn AccountResolver>,
        calendar: PeriodCalendar,
        billing: BillingConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            invoices,
            plans,
            rules,
            roster,
            accounts,
            calendar,
            billing,
            audit,
        }
    }

    /// Register a billing plan the generator will bill from
    pub async fn create_plan(&self, plan: BillingPlan, actor_id: &str) -> Result<BillingPlan> {
        plan.validate()?;
        self.plans.create(&plan).await?;
        info!(plan_id = %plan.id, class_id = %plan.class_id, "billing plan created");
        self.audit
            .record(AuditEvent::new(
                "BillingPlan",
                &plan.id,
                "created",
                actor_id,
                None,
                Some(serde_json::to_value(&plan)?),
            ))
            .await;
        Ok(plan)
    }

    fn invoice_no(plan: &BillingPlan, student_id: &str, period_index: u32) -> String {
        format!("INV-{}-{}-P{:02}", plan.id, student_id, period_index)
    }

    /// Grace period applied to a freshly generated invoice's due date: the
    /// shortest grace among active rules, falling back to the configured
    /// default when no rule is active. Consumed exactly once, here.
    async fn effective_grace(&self) -> Result<i64> {
        let rules = self.rules.list_active().await?;
        Ok(FeeEvaluator::shortest_active_grace(&rules)
            .unwrap_or(self.billing.default_grace_days))
    }

    /// Generate one student's invoice for `period_index` under `plan`
    ///
    /// Past-due open invoices of the student that have not already been
    /// carried become carried-balance lines; the stored remainder includes
    /// any accrued late fee at collection time.
    pub async fn generate_for_student(
        &self,
        plan: &BillingPlan,
        student_id: &str,
        period_index: u32,
        as_of: NaiveDate,
    ) -> Result<Invoice> {
        plan.validate()?;
        if !plan.active {
            return Err(AppError::conflict(format!(
                "Billing plan '{}' is inactive",
                plan.id
            )));
        }
        if !plan.covers_period(period_index) {
            return Err(AppError::validation(format!(
                "Plan '{}' does not cover period {}",
                plan.id, period_index
            )));
        }
        if self
            .invoices
            .exists_for_period(student_id, &plan.id, period_index)
            .await?
        {
            return Err(AppError::conflict(format!(
                "Period {} invoice already exists for student '{}'",
                period_index, student_id
            )));
        }

        // Only this plan's earlier periods are collected; another plan's
        // balances belong to that plan's own successor invoice
        let open = self.invoices.list_open_for_student(student_id).await?;
        let carriable: Vec<&Invoice> = open
            .iter()
            .filter(|i| {
                i.metadata.billing_plan_id == plan.id
                    && i.metadata.period_index < period_index
                    && i.due_date < as_of
                    && i.metadata.carried_into.is_none()
                    && i.remaining_balance() > Decimal::ZERO
            })
            .collect();

        let invoice_no = Self::invoice_no(plan, student_id, period_index);
        let income_account = self.accounts.resolve_income_account(plan.category).await?;
        let carried_account = self
            .accounts
            .resolve_income_account(crate::modules::invoices::models::FeeCategory::CarriedBalance)
            .await?;

        let mut lines = vec![InvoiceLine::new(
            &invoice_no,
            plan.category,
            &format!("{} period {}", plan.name, period_index),
            plan.period_fee,
            income_account,
        )?];
        for source in &carriable {
            lines.push(InvoiceLine::carried_balance(
                &invoice_no,
                source.metadata.period_index,
                source.remaining_balance(),
                carried_account.clone(),
            )?);
        }

        let grace = self.effective_grace().await?;
        let due_date = self.calendar.due_date(period_index, grace)?;
        let invoice = Invoice::new(
            &invoice_no,
            student_id,
            as_of,
            due_date,
            lines,
            Decimal::ZERO,
            InvoiceMetadata {
                billing_plan_id: plan.id.clone(),
                period_index,
                sequence_index: period_index - plan.first_period + 1,
                carried_into: None,
            },
        )?;

        let sources: Vec<String> = carriable.iter().map(|i| i.invoice_no.clone()).collect();
        self.invoices.create_with_carry(&invoice, &sources).await?;

        info!(
            invoice_no = %invoice.invoice_no,
            student_id = %student_id,
            period = period_index,
            carried = sources.len(),
            total = %invoice.total_amount,
            "invoice generated"
        );
        self.audit
            .record(AuditEvent::new(
                "Invoice",
                &invoice.invoice_no,
                "generated",
                "system",
                None,
                Some(serde_json::json!({
                    "student_id": student_id,
                    "period_index": period_index,
                    "total_amount": invoice.total_amount,
                    "carried_sources": sources,
                })),
            ))
            .await;
        Ok(invoice)
    }

    /// Generate `period_index` invoices for every billable student in the
    /// plan's class. One failing student never aborts the batch; an existing
    /// invoice for the period counts as skipped, not failed.
    pub async fn generate_for_plan(
        &self,
        plan_id: &str,
        period_index: u32,
        as_of: NaiveDate,
    ) -> Result<GenerationSummary> {
        let plan = self
            .plans
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Billing plan '{}' not found", plan_id)))?;

        let students = self.roster.list_billable_students(&plan.class_id).await?;
        let mut summary = GenerationSummary::default();
        info!(
            plan_id = %plan_id,
            period = period_index,
            students = students.len(),
            "generating period invoices"
        );

        for student in &students {
            match self
                .generate_for_student(&plan, &student.student_id, period_index, as_of)
                .await
            {
                Ok(_) => summary.generated += 1,
                Err(AppError::Conflict(msg)) if msg.contains("already exists") => {
                    summary.skipped_existing += 1;
                }
                Err(e) => {
                    warn!(
                        student_id = %student.student_id,
                        error = %e,
                        "invoice generation failed for student"
                    );
                    summary.errors.push(GenerationError {
                        student_id: student.student_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            plan_id = %plan_id,
            generated = summary.generated,
            skipped = summary.skipped_existing,
            errors = summary.errors.len(),
            "period generation finished"
        );
        Ok(summary)
    }

    /// Rebuild a plan's invoices from scratch through `through_period`
    ///
    /// Every existing invoice of the plan is deleted together with its lines
    /// and allocations, then periods are regenerated sequentially so carried
    /// balances chain through the rebuilt sequence. Recorded payments against
    /// the plan are discarded; callers surface that loudly.
    pub async fn regenerate_plan(
        &self,
        plan_id: &str,
        through_period: u32,
        as_of: NaiveDate,
    ) -> Result<GenerationSummary> {
        let plan = self
            .plans
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Billing plan '{}' not found", plan_id)))?;
        plan.validate()?;
        if !plan.covers_period(through_period) {
            return Err(AppError::validation(format!(
                "Plan '{}' does not cover period {}",
                plan_id, through_period
            )));
        }

        let students = self.roster.list_billable_students(&plan.class_id).await?;
        let grace = self.effective_grace().await?;
        let income_account = self.accounts.resolve_income_account(plan.category).await?;
        let carried_account = self
            .accounts
            .resolve_income_account(crate::modules::invoices::models::FeeCategory::CarriedBalance)
            .await?;

        let mut summary = GenerationSummary::default();
        let mut rebuilt: Vec<Invoice> = Vec::new();

        for student in &students {
            let mut chain: Vec<Invoice> = Vec::new();
            for period_index in plan.first_period..=through_period {
                let invoice_no = Self::invoice_no(&plan, &student.student_id, period_index);
                let due_date = self.calendar.due_date(period_index, grace)?;

                let mut lines = vec![InvoiceLine::new(
                    &invoice_no,
                    plan.category,
                    &format!("{} period {}", plan.name, period_index),
                    plan.period_fee,
                    income_account.clone(),
                )?];

                // Carry within the rebuilt chain only; everything persisted
                // for this plan is about to be replaced
                let carried: Vec<(u32, Decimal)> = chain
                    .iter()
                    .filter(|i| {
                        i.metadata.period_index < period_index
                            && i.due_date < as_of
                            && i.metadata.carried_into.is_none()
                            && i.remaining_balance() > Decimal::ZERO
                    })
                    .map(|i| (i.metadata.period_index, i.remaining_balance()))
                    .collect();
                for (source_period, amount) in &carried {
                    lines.push(InvoiceLine::carried_balance(
                        &invoice_no,
                        *source_period,
                        *amount,
                        carried_account.clone(),
                    )?);
                }

                let invoice = Invoice::new(
                    &invoice_no,
                    &student.student_id,
                    as_of,
                    due_date,
                    lines,
                    Decimal::ZERO,
                    InvoiceMetadata {
                        billing_plan_id: plan.id.clone(),
                        period_index,
                        sequence_index: period_index - plan.first_period + 1,
                        carried_into: None,
                    },
                )?;

                for prior in chain.iter_mut() {
                    if carried.iter().any(|(p, _)| *p == prior.metadata.period_index) {
                        prior.metadata.carried_into = Some(invoice.invoice_no.clone());
                    }
                }
                chain.push(invoice);
                summary.generated += 1;
            }
            rebuilt.extend(chain);
        }

        self.invoices.replace_plan(plan_id, &rebuilt).await?;

        warn!(
            plan_id = %plan_id,
            through_period,
            invoices = rebuilt.len(),
            "plan regenerated, prior invoices and their allocations discarded"
        );
        self.audit
            .record(AuditEvent::new(
                "BillingPlan",
                plan_id,
                "regenerated",
                "system",
                None,
                Some(serde_json::json!({
                    "through_period": through_period,
                    "invoices": rebuilt.len(),
                })),
            ))
            .await;
        Ok(summary)
    }
}
