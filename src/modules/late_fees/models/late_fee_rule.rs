use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Result};
use crate::modules::invoices::models::FeeCategory;

/// Business cap on simultaneously active rules, checked at creation time
pub const MAX_ACTIVE_RULES: u64 = 2;

/// How a rule's value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateFeeRuleType {
    /// Flat charge in birr
    FixedAmount,
    /// Percentage of the invoice total
    Percentage,
}

impl std::fmt::Display for LateFeeRuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LateFeeRuleType::FixedAmount => write!(f, "fixed_amount"),
            LateFeeRuleType::Percentage => write!(f, "percentage"),
        }
    }
}

impl std::str::FromStr for LateFeeRuleType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fixed_amount" => Ok(LateFeeRuleType::FixedAmount),
            "percentage" => Ok(LateFeeRuleType::Percentage),
            _ => Err(format!("Invalid late fee rule type: {}", s)),
        }
    }
}

/// A penalty rule, independent of any single invoice
///
/// The relationship to invoices is computed at evaluation time from the
/// category applicability, never stored as a foreign key. The rule's grace
/// period is consumed once, when an invoice's due date is computed at
/// creation; at sweep time every applicable active rule charges as soon as
/// the assessment date passes the stored due date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateFeeRule {
    pub id: String,
    pub name: String,
    pub rule_type: LateFeeRuleType,
    pub value: Decimal,
    pub grace_period_days: i64,
    /// Fee categories this rule penalizes
    pub applies_to: Vec<FeeCategory>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LateFeeRule {
    pub fn new(
        name: &str,
        rule_type: LateFeeRuleType,
        value: Decimal,
        grace_period_days: i64,
        applies_to: Vec<FeeCategory>,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(AppError::validation("Rule name cannot be empty"));
        }
        if value <= Decimal::ZERO {
            return Err(AppError::validation("Rule value must be positive"));
        }
        if rule_type == LateFeeRuleType::Percentage && value > Decimal::from(100) {
            return Err(AppError::validation(
                "Percentage rules cannot exceed 100",
            ));
        }
        if grace_period_days < 0 {
            return Err(AppError::validation("Grace period cannot be negative"));
        }
        if applies_to.is_empty() {
            return Err(AppError::validation(
                "Rule must apply to at least one fee category",
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            rule_type,
            value,
            grace_period_days,
            applies_to,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether the rule penalizes any of the given line categories
    pub fn applies_to_any(&self, categories: &[FeeCategory]) -> bool {
        categories.iter().any(|c| self.applies_to.contains(c))
    }
}
