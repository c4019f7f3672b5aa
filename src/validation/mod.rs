//! Checks applied to creation requests before anything is persisted.

use bigdecimal::{BigDecimal, Zero};
use thiserror::Error;

use crate::utils::amount;

pub const USER_ID_MAX_LEN: usize = 255;
pub const CURRENCY_MAX_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub type ValidationResult = Result<(), ValidationError>;

/// Trims the ends and drops control characters. Inner whitespace is kept so
/// distinct identifiers stay distinct.
pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control() || ch.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Non-blank and bounded in length. Length is counted in characters.
fn validate_text(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }
    Ok(())
}

pub fn validate_user_id(user_id: &str) -> ValidationResult {
    validate_text("user_id", user_id, USER_ID_MAX_LEN)
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    validate_text("currency", currency, CURRENCY_MAX_LEN)
}

/// Negative amounts are legal (refunds); only zero is rejected.
pub fn validate_non_zero_amount(amount: &BigDecimal) -> ValidationResult {
    if amount.is_zero() {
        return Err(ValidationError::new("amount", "must not be zero"));
    }
    Ok(())
}

/// Non-zero and within what the JSON wire format can carry.
pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    validate_non_zero_amount(amount)?;
    if amount::to_wire(amount).is_none() {
        return Err(ValidationError::new("amount", "is out of range"));
    }
    Ok(())
}
