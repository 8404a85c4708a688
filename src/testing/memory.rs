//! In-memory persistence for the test suite and local development.
//!
//! Implements the same repository traits as the MySQL backends, with the
//! same optimistic-check and all-or-nothing semantics, so service-level
//! scenarios run without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::core::{AppError, Result};
use crate::modules::invoices::models::{BillingPlan, Invoice, InvoiceStatus};
use crate::modules::invoices::repositories::{
    AccrualUpdate, BillingPlanRepository, InvoiceRepository,
};
use crate::modules::late_fees::models::LateFeeRule;
use crate::modules::late_fees::repositories::LateFeeRuleRepository;
use crate::modules::payments::models::{Payment, PaymentAllocation};
use crate::modules::payments::repositories::{InvoicePaymentUpdate, PaymentRepository};
use crate::modules::roster::{AccountResolver, BillableStudent, StudentRoster};

/// One store backs all repository traits so cross-entity operations stay
/// consistent, mirroring the single MySQL schema.
#[derive(Default)]
pub struct InMemoryStore {
    invoices: Mutex<BTreeMap<String, Invoice>>,
    plans: Mutex<HashMap<String, BillingPlan>>,
    rules: Mutex<Vec<LateFeeRule>>,
    payments: Mutex<HashMap<String, Payment>>,
    allocations: Mutex<Vec<PaymentAllocation>>,
    receipt_seq: AtomicU64,
    students: Mutex<HashMap<String, Vec<BillableStudent>>>,
    accounts: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_student(&self, class_id: &str, student_id: &str, name: &str) {
        self.students
            .lock()
            .unwrap()
            .entry(class_id.to_string())
            .or_default()
            .push(BillableStudent {
                student_id: student_id.to_string(),
                name: name.to_string(),
            });
    }

    pub fn set_income_account(&self, category: &str, account_id: &str) {
        self.accounts
            .lock()
            .unwrap()
            .insert(category.to_string(), account_id.to_string());
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.lock().unwrap().len()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryStore {
    async fn create(&self, invoice: &Invoice) -> Result<()> {
        let mut invoices = self.invoices.lock().unwrap();
        if invoices.contains_key(&invoice.invoice_no) {
            return Err(AppError::conflict(format!(
                "Invoice '{}' already exists",
                invoice.invoice_no
            )));
        }
        invoices.insert(invoice.invoice_no.clone(), invoice.clone());
        Ok(())
    }

    async fn create_with_carry(
        &self,
        invoice: &Invoice,
        carried_sources: &[String],
    ) -> Result<()> {
        let mut invoices = self.invoices.lock().unwrap();
        if invoices.contains_key(&invoice.invoice_no) {
            return Err(AppError::conflict(format!(
                "Invoice '{}' already exists",
                invoice.invoice_no
            )));
        }

        // All checks before any mutation, matching the SQL transaction
        for source in carried_sources {
            match invoices.get(source) {
                Some(inv) if inv.metadata.carried_into.is_none() => {}
                Some(_) => {
                    return Err(AppError::conflict(format!(
                        "Invoice '{}' was already carried forward",
                        source
                    )))
                }
                None => {
                    return Err(AppError::not_found(format!(
                        "Invoice '{}' not found",
                        source
                    )))
                }
            }
        }

        for source in carried_sources {
            let inv = invoices.get_mut(source).unwrap();
            inv.metadata.carried_into = Some(invoice.invoice_no.clone());
            inv.updated_at = Utc::now();
        }
        invoices.insert(invoice.invoice_no.clone(), invoice.clone());
        Ok(())
    }

    async fn find_by_number(&self, invoice_no: &str) -> Result<Option<Invoice>> {
        Ok(self.invoices.lock().unwrap().get(invoice_no).cloned())
    }

    async fn list_open(&self) -> Result<Vec<Invoice>> {
        let mut open: Vec<Invoice> = self
            .invoices
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.status.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|i| i.due_date);
        Ok(open)
    }

    async fn list_for_student(&self, student_id: &str) -> Result<Vec<Invoice>> {
        let mut result: Vec<Invoice> = self
            .invoices
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.student_id == student_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.metadata.period_index.cmp(&a.metadata.period_index));
        Ok(result)
    }

    async fn list_open_for_student(&self, student_id: &str) -> Result<Vec<Invoice>> {
        let mut open: Vec<Invoice> = self
            .invoices
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.student_id == student_id && i.status.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|i| i.due_date);
        Ok(open)
    }

    async fn list_for_plan(&self, plan_id: &str) -> Result<Vec<Invoice>> {
        let mut result: Vec<Invoice> = self
            .invoices
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.metadata.billing_plan_id == plan_id)
            .cloned()
            .collect();
        result.sort_by_key(|i| i.metadata.period_index);
        Ok(result)
    }

    async fn exists_for_period(
        &self,
        student_id: &str,
        plan_id: &str,
        period_index: u32,
    ) -> Result<bool> {
        Ok(self.invoices.lock().unwrap().values().any(|i| {
            i.student_id == student_id
                && i.metadata.billing_plan_id == plan_id
                && i.metadata.period_index == period_index
                && i.status != InvoiceStatus::Cancelled
        }))
    }

    async fn apply_accrual(&self, invoice_no: &str, update: &AccrualUpdate) -> Result<()> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices.get_mut(invoice_no).ok_or_else(|| {
            AppError::not_found(format!("Invoice '{}' not found", invoice_no))
        })?;

        if invoice.late_fee_amount != update.expected_late_fee
            || invoice.paid_amount != update.expected_paid
        {
            return Err(AppError::conflict(format!(
                "Invoice '{}' changed concurrently during accrual",
                invoice_no
            )));
        }

        // Validate on a copy so a rejected write leaves the row untouched
        let mut updated = invoice.clone();
        updated.late_fee_amount = update.late_fee_amount;
        updated.status = update.status;
        updated.updated_at = Utc::now();
        updated.validate_invariants()?;
        *invoice = updated;
        Ok(())
    }

    async fn cancel(&self, invoice_no: &str) -> Result<()> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices.get_mut(invoice_no).ok_or_else(|| {
            AppError::not_found(format!("Invoice '{}' not found", invoice_no))
        })?;
        invoice.cancel()
    }

    async fn replace_plan(&self, plan_id: &str, new_invoices: &[Invoice]) -> Result<()> {
        let mut invoices = self.invoices.lock().unwrap();
        let mut allocations = self.allocations.lock().unwrap();

        let removed: Vec<String> = invoices
            .values()
            .filter(|i| i.metadata.billing_plan_id == plan_id)
            .map(|i| i.invoice_no.clone())
            .collect();
        for invoice_no in &removed {
            invoices.remove(invoice_no);
        }
        allocations.retain(|a| !removed.contains(&a.invoice_no));

        for invoice in new_invoices {
            invoices.insert(invoice.invoice_no.clone(), invoice.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl BillingPlanRepository for InMemoryStore {
    async fn create(&self, plan: &BillingPlan) -> Result<()> {
        let mut plans = self.plans.lock().unwrap();
        if plans.contains_key(&plan.id) {
            return Err(AppError::conflict(format!(
                "Billing plan '{}' already exists",
                plan.id
            )));
        }
        plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<BillingPlan>> {
        Ok(self.plans.lock().unwrap().get(id).cloned())
    }
}

#[async_trait]
impl LateFeeRuleRepository for InMemoryStore {
    async fn create(&self, rule: &LateFeeRule) -> Result<()> {
        self.rules.lock().unwrap().push(rule.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<LateFeeRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<LateFeeRule>> {
        Ok(self.rules.lock().unwrap().clone())
    }

    async fn list_active(&self) -> Result<Vec<LateFeeRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect())
    }

    async fn count_active(&self) -> Result<u64> {
        Ok(self.rules.lock().unwrap().iter().filter(|r| r.active).count() as u64)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::not_found(format!("Rule '{}' not found", id)))?;
        rule.active = active;
        rule.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn next_receipt_sequence(&self) -> Result<u64> {
        Ok(self.receipt_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn create_with_allocations(
        &self,
        payment: &Payment,
        new_allocations: &[PaymentAllocation],
        invoice_updates: &[InvoicePaymentUpdate],
    ) -> Result<()> {
        let mut payments = self.payments.lock().unwrap();
        let mut allocations = self.allocations.lock().unwrap();
        let mut invoices = self.invoices.lock().unwrap();

        if payments.contains_key(&payment.receipt_no) {
            return Err(AppError::conflict(format!(
                "Receipt '{}' already exists",
                payment.receipt_no
            )));
        }

        // Verify every optimistic check and invariant on copies before
        // touching anything, so a rejected payment leaves no partial write
        let mut staged: Vec<Invoice> = Vec::with_capacity(invoice_updates.len());
        for update in invoice_updates {
            let invoice = invoices.get(&update.invoice_no).ok_or_else(|| {
                AppError::not_found(format!("Invoice '{}' not found", update.invoice_no))
            })?;
            if invoice.paid_amount != update.expected_paid {
                return Err(AppError::conflict(format!(
                    "Invoice '{}' changed concurrently during allocation",
                    update.invoice_no
                )));
            }
            let mut updated = invoice.clone();
            updated.paid_amount = update.paid_amount;
            updated.status = update.status;
            updated.updated_at = Utc::now();
            updated.validate_invariants()?;
            staged.push(updated);
        }

        for updated in staged {
            invoices.insert(updated.invoice_no.clone(), updated);
        }

        payments.insert(payment.receipt_no.clone(), payment.clone());
        allocations.extend_from_slice(new_allocations);
        Ok(())
    }

    async fn find_by_receipt(&self, receipt_no: &str) -> Result<Option<Payment>> {
        Ok(self.payments.lock().unwrap().get(receipt_no).cloned())
    }

    async fn allocations_for_invoice(&self, invoice_no: &str) -> Result<Vec<PaymentAllocation>> {
        Ok(self
            .allocations
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.invoice_no == invoice_no)
            .cloned()
            .collect())
    }

    async fn cancel(&self, receipt_no: &str) -> Result<()> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments.get_mut(receipt_no).ok_or_else(|| {
            AppError::not_found(format!("Payment '{}' not found", receipt_no))
        })?;
        if payment.cancelled_at.is_some() {
            return Err(AppError::conflict(format!(
                "Payment '{}' is already cancelled",
                receipt_no
            )));
        }
        payment.cancelled_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl StudentRoster for InMemoryStore {
    async fn list_billable_students(&self, class_id: &str) -> Result<Vec<BillableStudent>> {
        Ok(self
            .students
            .lock()
            .unwrap()
            .get(class_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AccountResolver for InMemoryStore {
    async fn resolve_income_account(
        &self,
        category: crate::modules::invoices::models::FeeCategory,
    ) -> Result<Option<String>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(&category.to_string())
            .cloned())
    }
}
