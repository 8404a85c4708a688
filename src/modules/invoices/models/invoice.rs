use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::line_item::{FeeCategory, InvoiceLine};
use crate::core::{money, AppError, Result};

/// Invoice status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Created, nothing paid, no late fee accrued
    Issued,

    /// Some but not all of the net amount paid
    PartiallyPaid,

    /// A non-zero late fee has been accrued and the invoice is not fully paid
    Overdue,

    /// Fully paid, terminal
    Paid,

    /// Administratively cancelled before any payment, terminal
    Cancelled,
}

impl InvoiceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// States the accrual sweep and payment allocator operate on
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceStatus::Issued => write!(f, "issued"),
            InvoiceStatus::PartiallyPaid => write!(f, "partially_paid"),
            InvoiceStatus::Overdue => write!(f, "overdue"),
            InvoiceStatus::Paid => write!(f, "paid"),
            InvoiceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "issued" => Ok(InvoiceStatus::Issued),
            "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "paid" => Ok(InvoiceStatus::Paid),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            _ => Err(format!("Invalid invoice status: {}", s)),
        }
    }
}

/// Academic-period tag carried by every invoice
///
/// The carry-forward generator uses the plan/period pair to detect duplicate
/// generation and to find unresolved prior periods. `carried_into` is set on
/// an invoice whose remainder has been folded into a successor; such an
/// invoice is frozen out of allocation, carry collection and the sweep so the
/// balance is owed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceMetadata {
    pub billing_plan_id: String,
    pub period_index: u32,
    /// Position of this invoice within the plan's generated sequence
    pub sequence_index: u32,
    pub carried_into: Option<String>,
}

/// A student invoice with its owned line items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique invoice number
    pub invoice_no: String,
    pub student_id: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<InvoiceLine>,
    /// Sum of line amounts before adjustments
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    /// Cumulative accrued late fee, rewritten by the accrual sweep
    pub late_fee_amount: Decimal,
    /// Monotonically non-decreasing
    pub paid_amount: Decimal,
    pub status: InvoiceStatus,
    pub metadata: InvoiceMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Create a new invoice from its lines; always yields `Issued`
    pub fn new(
        invoice_no: &str,
        student_id: &str,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        lines: Vec<InvoiceLine>,
        discount_amount: Decimal,
        metadata: InvoiceMetadata,
    ) -> Result<Self> {
        if student_id.trim().is_empty() {
            return Err(AppError::validation("Student id cannot be empty"));
        }
        if lines.is_empty() {
            return Err(AppError::validation(
                "Invoice must have at least one line item",
            ));
        }
        money::validate_amount(discount_amount)?;

        let total_amount: Decimal = lines.iter().map(|l| l.amount).sum();
        if discount_amount > total_amount {
            return Err(AppError::validation(
                "Discount cannot exceed the invoice total",
            ));
        }

        let now = Utc::now();
        let invoice = Self {
            invoice_no: invoice_no.to_string(),
            student_id: student_id.to_string(),
            issue_date,
            due_date,
            lines,
            total_amount,
            discount_amount,
            late_fee_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            status: InvoiceStatus::Issued,
            metadata,
            created_at: now,
            updated_at: now,
        };
        invoice.validate_invariants()?;
        Ok(invoice)
    }

    /// Net amount owed: total + late fee - discount. Derived, never stored,
    /// so the identity cannot drift.
    pub fn net_amount(&self) -> Decimal {
        self.total_amount + self.late_fee_amount - self.discount_amount
    }

    pub fn remaining_balance(&self) -> Decimal {
        self.net_amount() - self.paid_amount
    }

    /// Whether the payment allocator may apply money to this invoice
    pub fn is_allocatable(&self) -> bool {
        self.status.is_open()
            && self.metadata.carried_into.is_none()
            && self.remaining_balance() > Decimal::ZERO
    }

    /// Categories billed by this invoice's lines, used for rule applicability
    pub fn line_categories(&self) -> Vec<FeeCategory> {
        let mut cats: Vec<FeeCategory> = self.lines.iter().map(|l| l.category).collect();
        cats.sort();
        cats.dedup();
        cats
    }

    /// Status after a successful allocation brought `paid_amount` to the
    /// given value; full payment forces `Paid` regardless of prior state
    pub fn status_for_paid(&self, paid: Decimal) -> InvoiceStatus {
        if paid >= self.net_amount() {
            InvoiceStatus::Paid
        } else if paid > Decimal::ZERO {
            InvoiceStatus::PartiallyPaid
        } else if self.late_fee_amount > Decimal::ZERO {
            InvoiceStatus::Overdue
        } else {
            InvoiceStatus::Issued
        }
    }

    /// Apply an allocation of `take` against the remaining balance
    pub fn register_allocation(&mut self, take: Decimal) -> Result<()> {
        if take <= Decimal::ZERO {
            return Err(AppError::validation("Allocation must be positive"));
        }
        if self.status.is_terminal() {
            return Err(AppError::conflict(format!(
                "Invoice '{}' is {} and cannot receive payments",
                self.invoice_no, self.status
            )));
        }
        let new_paid = self.paid_amount + take;
        if new_paid > self.net_amount() {
            return Err(AppError::conflict(format!(
                "Allocation would overpay invoice '{}'",
                self.invoice_no
            )));
        }
        self.status = self.status_for_paid(new_paid);
        self.paid_amount = new_paid;
        self.updated_at = Utc::now();
        self.validate_invariants()
    }

    /// Write a freshly assessed non-zero late fee; moves an open invoice to
    /// `Overdue`
    pub fn apply_late_fee(&mut self, fee: Decimal) -> Result<()> {
        if fee <= Decimal::ZERO {
            return Err(AppError::validation("Late fee must be positive"));
        }
        if self.status.is_terminal() {
            return Err(AppError::conflict(format!(
                "Invoice '{}' is {} and cannot accrue fees",
                self.invoice_no, self.status
            )));
        }
        self.late_fee_amount = fee;
        // Rewriting to a lower fee can close the gap to an existing payment
        self.status = if self.paid_amount >= self.net_amount() {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Overdue
        };
        self.updated_at = Utc::now();
        self.validate_invariants()
    }

    /// Roll back the accrued fee after the last producing rule was
    /// deactivated
    ///
    /// The fee is clamped so `paid_amount <= net_amount` still holds when
    /// part of an already-paid fee cannot be returned: whatever the student
    /// has paid beyond the principal stays accounted as fee.
    pub fn rollback_late_fee(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AppError::conflict(format!(
                "Invoice '{}' is {} and cannot roll back fees",
                self.invoice_no, self.status
            )));
        }
        let principal = self.total_amount - self.discount_amount;
        let clamped = (self.paid_amount - principal).max(Decimal::ZERO);
        self.late_fee_amount = clamped;
        self.status = if self.paid_amount >= self.net_amount() && self.paid_amount > Decimal::ZERO
        {
            InvoiceStatus::Paid
        } else if self.paid_amount > Decimal::ZERO {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::Issued
        };
        self.updated_at = Utc::now();
        self.validate_invariants()
    }

    /// Administrative cancel, only from `Issued` with no recorded payment
    pub fn cancel(&mut self) -> Result<()> {
        if self.status != InvoiceStatus::Issued {
            return Err(AppError::conflict(format!(
                "Invoice '{}' is {} and can only be cancelled while issued",
                self.invoice_no, self.status
            )));
        }
        if self.paid_amount > Decimal::ZERO {
            return Err(AppError::conflict(format!(
                "Invoice '{}' has recorded payments and cannot be cancelled",
                self.invoice_no
            )));
        }
        self.status = InvoiceStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enforce the monetary invariants: 0 <= paid <= net and net >= 0
    pub fn validate_invariants(&self) -> Result<()> {
        let net = self.net_amount();
        if net < Decimal::ZERO {
            return Err(AppError::internal(format!(
                "Invoice '{}' net amount is negative",
                self.invoice_no
            )));
        }
        if self.paid_amount < Decimal::ZERO || self.paid_amount > net {
            return Err(AppError::internal(format!(
                "Invoice '{}' paid amount {} outside [0, {}]",
                self.invoice_no, self.paid_amount, net
            )));
        }
        Ok(())
    }
}
