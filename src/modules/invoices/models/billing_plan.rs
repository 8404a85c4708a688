use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::line_item::FeeCategory;
use crate::core::{money, AppError, Result};

/// An ordered sequence of billing periods for one fee structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingPlan {
    pub id: String,
    pub class_id: String,
    pub name: String,
    /// Category the recurring fee bills under
    pub category: FeeCategory,
    /// Fee due each period
    pub period_fee: Decimal,
    pub first_period: u32,
    pub period_count: u32,
    pub active: bool,
}

impl BillingPlan {
    pub fn validate(&self) -> Result<()> {
        money::validate_amount(self.period_fee)?;
        if self.period_fee == Decimal::ZERO {
            return Err(AppError::validation("Period fee must be positive"));
        }
        if self.first_period == 0 {
            return Err(AppError::validation("First period must be 1 or greater"));
        }
        if self.period_count == 0 {
            return Err(AppError::validation("Plan must cover at least one period"));
        }
        Ok(())
    }

    pub fn last_period(&self) -> u32 {
        self.first_period + self.period_count - 1
    }

    pub fn covers_period(&self, period_index: u32) -> bool {
        period_index >= self.first_period && period_index <= self.last_period()
    }
}
