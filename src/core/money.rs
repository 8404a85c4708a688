use rust_decimal::Decimal;
use std::str::FromStr;

use crate::core::error::{AppError, Result};

/// All amounts in the system are Ethiopian Birr with 2 decimal places.
/// Interfaces pass amounts as decimal strings, never floats, so repeated
/// sweep recomputation cannot drift.
pub const SCALE: u32 = 2;

/// Round an amount to the birr scale (banker's rounding, same as the
/// underlying decimal library default)
pub fn round(amount: Decimal) -> Decimal {
    amount.round_dp(SCALE)
}

/// Validate an amount for use in invoices and payments: non-negative and at
/// most 2 decimal places
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(AppError::validation("Amount cannot be negative"));
    }
    if amount.scale() > SCALE {
        return Err(AppError::validation(format!(
            "Amounts must have at most {} decimal places, got {}",
            SCALE,
            amount.scale()
        )));
    }
    Ok(())
}

/// Parse a decimal-string amount from an API payload
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let amount = Decimal::from_str(raw.trim())
        .map_err(|_| AppError::validation(format!("Invalid amount '{}'", raw)))?;
    validate_amount(amount)?;
    Ok(amount)
}

/// Format an amount for API responses, always with 2 decimal places
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount)
}
