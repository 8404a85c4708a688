use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{money, AppError, Result};

/// Accepted payment methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    MobileMoney,
    Cheque,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::BankTransfer => write!(f, "bank_transfer"),
            PaymentMethod::MobileMoney => write!(f, "mobile_money"),
            PaymentMethod::Cheque => write!(f, "cheque"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "cheque" => Ok(PaymentMethod::Cheque),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

/// A received payment, immutable after creation except soft cancellation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Globally unique, monotonically assigned receipt number
    pub receipt_no: String,
    pub student_id: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    /// External reference: bank slip, mobile-money id, cheque number
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        receipt_no: &str,
        student_id: &str,
        amount: Decimal,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> Result<Self> {
        if student_id.trim().is_empty() {
            return Err(AppError::validation("Student id cannot be empty"));
        }
        money::validate_amount(amount)?;
        if amount == Decimal::ZERO {
            return Err(AppError::validation("Payment amount must be positive"));
        }

        Ok(Self {
            receipt_no: receipt_no.to_string(),
            student_id: student_id.to_string(),
            amount,
            method,
            reference,
            paid_at: Utc::now(),
            cancelled_at: None,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    /// Format a monotonic sequence value as a receipt number
    pub fn format_receipt_no(sequence: u64) -> String {
        format!("RCT-{:06}", sequence)
    }
}

/// Links exactly one payment to exactly one invoice
///
/// Created atomically with its payment and never mutated; the sum of a
/// payment's allocations always equals the payment amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub id: String,
    pub receipt_no: String,
    pub invoice_no: String,
    pub amount: Decimal,
}

impl PaymentAllocation {
    pub fn new(receipt_no: &str, invoice_no: &str, amount: Decimal) -> Result<Self> {
        money::validate_amount(amount)?;
        if amount == Decimal::ZERO {
            return Err(AppError::validation("Allocation amount must be positive"));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            receipt_no: receipt_no.to_string(),
            invoice_no: invoice_no.to_string(),
            amount,
        })
    }
}
