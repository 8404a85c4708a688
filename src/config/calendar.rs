use chrono::NaiveDate;
use serde::Deserialize;
use std::env;

use crate::core::{AppError, Result};

/// Academic calendar configuration
///
/// The Ethiopian academic year is modeled as 12 billing periods of 30 days
/// plus the short intercalary period (Pagume, 5-6 days). The epoch is the
/// first day of the academic year and is injected rather than hardcoded so
/// tests can run against a synthetic year.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    /// First day of the academic year
    pub epoch: NaiveDate,
    /// Length of a regular billing period in days
    pub period_length_days: i64,
    /// Index of the short intercalary period, if the plan bills it
    pub short_period_index: Option<u32>,
    /// Length of the short period in days
    pub short_period_days: i64,
}

impl CalendarConfig {
    pub fn from_env() -> Result<Self> {
        let epoch_raw = env::var("ACADEMIC_YEAR_EPOCH")
            .map_err(|_| AppError::Configuration("ACADEMIC_YEAR_EPOCH not set".to_string()))?;
        let epoch = NaiveDate::parse_from_str(&epoch_raw, "%Y-%m-%d").map_err(|_| {
            AppError::Configuration(format!(
                "Invalid ACADEMIC_YEAR_EPOCH '{}', expected YYYY-MM-DD",
                epoch_raw
            ))
        })?;

        Ok(CalendarConfig {
            epoch,
            period_length_days: env::var("PERIOD_LENGTH_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| AppError::Configuration("Invalid PERIOD_LENGTH_DAYS".to_string()))?,
            short_period_index: Some(13),
            short_period_days: 5,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_length_days <= 0 {
            return Err(AppError::Configuration(
                "Period length must be positive".to_string(),
            ));
        }
        if self.short_period_days <= 0 || self.short_period_days > self.period_length_days {
            return Err(AppError::Configuration(
                "Short period length must be positive and shorter than a regular period"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Billing engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Grace period used for due dates when no late-fee rule is active
    pub default_grace_days: i64,
}

impl BillingConfig {
    pub fn from_env() -> Result<Self> {
        Ok(BillingConfig {
            default_grace_days: env::var("DEFAULT_GRACE_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| AppError::Configuration("Invalid DEFAULT_GRACE_DAYS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_grace_days < 0 {
            return Err(AppError::Configuration(
                "Default grace period cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}
