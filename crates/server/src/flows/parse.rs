//! Shared input parsing conventions for flow steps
//!
//! Quantities must be positive and bounded; decimals are only allowed
//! for continuous units. Dates accept ISO, day-first, and the
//! today/tomorrow shorthands.

use chrono::NaiveDate;

/// Parse and bound-check a quantity.
pub fn parse_quantity(text: &str, decimal: bool, max: f64) -> Result<f64, String> {
    let cleaned = text.trim().replace(',', "");
    let value: f64 = cleaned
        .parse()
        .map_err(|_| format!("'{}' is not a number.", text.trim()))?;

    if !value.is_finite() || value <= 0.0 {
        return Err("Quantity must be a positive number.".to_string());
    }
    if value > max {
        return Err(format!("Quantity must be at most {max}."));
    }
    if !decimal && value.fract() != 0.0 {
        return Err("Whole numbers only for this unit.".to_string());
    }
    Ok(value)
}

/// Parse a calendar date from the accepted formats.
pub fn parse_date(text: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    let cleaned = text.trim().to_ascii_lowercase();
    match cleaned.as_str() {
        "today" => return Ok(today),
        "tomorrow" => return Ok(today + chrono::Duration::days(1)),
        "yesterday" => return Ok(today - chrono::Duration::days(1)),
        _ => {}
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Ok(date);
        }
    }
    Err("Please send a date like 2026-08-23 or 23/08/2026 (or 'today').".to_string())
}
