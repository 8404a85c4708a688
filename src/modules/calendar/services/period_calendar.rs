use chrono::{Duration, NaiveDate};

use crate::config::CalendarConfig;
use crate::core::{AppError, Result};

/// Maps academic-calendar period indexes to concrete dates
///
/// Periods are 1-based. Period N starts `(N - 1) * period_length_days` after
/// the configured epoch; the due date adds the grace period on top. All
/// functions are pure.
#[derive(Debug, Clone)]
pub struct PeriodCalendar {
    config: CalendarConfig,
}

impl PeriodCalendar {
    pub fn new(config: CalendarConfig) -> Self {
        Self { config }
    }

    /// First day of the given period
    pub fn period_start(&self, period_index: u32) -> Result<NaiveDate> {
        if period_index == 0 {
            return Err(AppError::validation(
                "Period index must be 1 or greater",
            ));
        }
        Ok(self.config.epoch
            + Duration::days((period_index as i64 - 1) * self.config.period_length_days))
    }

    /// Number of days in the given period
    pub fn period_length(&self, period_index: u32) -> Result<i64> {
        if period_index == 0 {
            return Err(AppError::validation(
                "Period index must be 1 or greater",
            ));
        }
        if self.config.short_period_index == Some(period_index) {
            Ok(self.config.short_period_days)
        } else {
            Ok(self.config.period_length_days)
        }
    }

    /// Due date for the given period: period start plus the grace period
    pub fn due_date(&self, period_index: u32, grace_period_days: i64) -> Result<NaiveDate> {
        if grace_period_days < 0 {
            return Err(AppError::validation("Grace period cannot be negative"));
        }
        Ok(self.period_start(period_index)? + Duration::days(grace_period_days))
    }

    /// Whole days `as_of` lies past `due_date`; zero or negative means not due
    pub fn days_past_due(due_date: NaiveDate, as_of: NaiveDate) -> i64 {
        (as_of - due_date).num_days()
    }
}
