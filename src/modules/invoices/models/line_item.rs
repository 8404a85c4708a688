use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{money, AppError, Result};

/// Fee categories an invoice line can bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeCategory {
    Tuition,
    Registration,
    Transport,
    Boarding,
    LateFee,
    CarriedBalance,
}

impl std::fmt::Display for FeeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeeCategory::Tuition => write!(f, "tuition"),
            FeeCategory::Registration => write!(f, "registration"),
            FeeCategory::Transport => write!(f, "transport"),
            FeeCategory::Boarding => write!(f, "boarding"),
            FeeCategory::LateFee => write!(f, "late_fee"),
            FeeCategory::CarriedBalance => write!(f, "carried_balance"),
        }
    }
}

impl std::str::FromStr for FeeCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tuition" => Ok(FeeCategory::Tuition),
            "registration" => Ok(FeeCategory::Registration),
            "transport" => Ok(FeeCategory::Transport),
            "boarding" => Ok(FeeCategory::Boarding),
            "late_fee" => Ok(FeeCategory::LateFee),
            "carried_balance" => Ok(FeeCategory::CarriedBalance),
            _ => Err(format!("Invalid fee category: {}", s)),
        }
    }
}

/// A single billable line owned by exactly one invoice
///
/// Lines are immutable once the invoice is created; the only way to change
/// them is an explicit billing-plan regeneration, which recreates the
/// invoice wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: String,
    pub invoice_no: String,
    pub category: FeeCategory,
    pub description: String,
    pub amount: Decimal,
    /// Income account the line posts to, resolved at generation time
    pub income_account: Option<String>,
    /// For carried-balance lines, the period whose remainder this line
    /// re-bills
    pub carried_from_period: Option<u32>,
}

impl InvoiceLine {
    pub fn new(
        invoice_no: &str,
        category: FeeCategory,
        description: &str,
        amount: Decimal,
        income_account: Option<String>,
    ) -> Result<Self> {
        money::validate_amount(amount)?;
        if description.trim().is_empty() {
            return Err(AppError::validation("Line description cannot be empty"));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_no: invoice_no.to_string(),
            category,
            description: description.to_string(),
            amount,
            income_account,
            carried_from_period: None,
        })
    }

    /// Build a carried-balance line re-billing a prior period's remainder
    pub fn carried_balance(
        invoice_no: &str,
        source_period: u32,
        amount: Decimal,
        income_account: Option<String>,
    ) -> Result<Self> {
        let mut line = Self::new(
            invoice_no,
            FeeCategory::CarriedBalance,
            &format!("Carried balance from period {}", source_period),
            amount,
            income_account,
        )?;
        line.carried_from_period = Some(source_period);
        Ok(line)
    }
}
