//! Validation utilities for the Factory Flow Platform

use rust_decimal::Decimal;

/// Validate item code format (3-20 chars, uppercase alphanumeric with dashes)
pub fn validate_item_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 3 {
        return Err("Item code must be at least 3 characters");
    }
    if code.len() > 20 {
        return Err("Item code must be at most 20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Item code must be uppercase alphanumeric with dashes");
    }
    if code.starts_with('-') || code.ends_with('-') {
        return Err("Item code cannot start or end with a dash");
    }
    Ok(())
}

/// Validate batch code format (2-30 chars, no whitespace)
pub fn validate_batch_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 {
        return Err("Batch code must be at least 2 characters");
    }
    if code.len() > 30 {
        return Err("Batch code must be at most 30 characters");
    }
    if code.chars().any(|c| c.is_whitespace()) {
        return Err("Batch code cannot contain whitespace");
    }
    Ok(())
}

/// Validate a physical quantity is strictly positive
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a percentage lies in [0, 100]
pub fn validate_percent(percent: Decimal) -> Result<(), &'static str> {
    if percent < Decimal::ZERO || percent > Decimal::from(100) {
        return Err("Percentage must be between 0 and 100");
    }
    Ok(())
}

/// Validate a unit of measure (1-10 chars, lowercase alphanumeric)
pub fn validate_unit(unit: &str) -> Result<(), &'static str> {
    if unit.is_empty() || unit.len() > 10 {
        return Err("Unit must be 1-10 characters");
    }
    if !unit.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err("Unit must be lowercase alphanumeric");
    }
    Ok(())
}
