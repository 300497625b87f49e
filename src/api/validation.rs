//! Field validators shared by the request handlers.
//!
//! Each validator returns the typed value or a message for the field. Handlers
//! run them through a `ValidationErrorBuilder` so every problem in a request
//! is reported at once.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_TEXT_LEN: usize = 2000;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MIN_AGE: i64 = 3;
pub const MAX_AGE: i64 = 5;

lazy_static! {
    /// Deliberately loose: one `@`, no whitespace, a dot in the domain
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Validate and normalize an email address
pub fn validate_email(email: Option<&str>) -> Result<String, String> {
    let email = email.map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(email.to_lowercase())
}

pub fn validate_password(password: Option<&str>) -> Result<String, String> {
    let password = password.unwrap_or_default();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(password.to_string())
}

/// A required, trimmed, non-empty string of at most `max` characters
pub fn required_text(label: &str, value: Option<&str>, max: usize) -> Result<String, String> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(format!("{} is required", label));
    }
    if value.chars().count() > max {
        return Err(format!("{} is too long (max {} characters)", label, max));
    }
    Ok(value.to_string())
}

/// An optional string. Blank input means "no value".
pub fn optional_text(label: &str, value: Option<&str>, max: usize) -> Result<Option<String>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => {
            Err(format!("{} is too long (max {} characters)", label, max))
        }
        Some(v) => Ok(Some(v.to_string())),
    }
}

pub fn validate_age(age: i64) -> Result<i64, String> {
    if !(MIN_AGE..=MAX_AGE).contains(&age) {
        return Err(format!("Age must be between {} and {}", MIN_AGE, MAX_AGE));
    }
    Ok(age)
}

/// Parse one of the enumerated text values (class, rating, ...)
pub fn parse_choice<T>(label: &str, value: Option<&str>) -> Result<T, String>
where
    T: FromStr<Err = String>,
{
    match value.map(str::trim) {
        None | Some("") => Err(format!("{} is required", label)),
        Some(v) => v.parse(),
    }
}

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(label: &str, value: Option<&str>) -> Result<NaiveDate, String> {
    match value.map(str::trim) {
        None | Some("") => Err(format!("{} is required", label)),
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map_err(|_| format!("{} must be a date in YYYY-MM-DD format", label)),
    }
}

pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), String> {
    if end <= start {
        return Err("End date must be after start date".to_string());
    }
    Ok(())
}

/// Run `f` only when the field was sent, keeping `None` for absent fields
pub fn if_present<T>(
    value: Option<&str>,
    f: impl FnOnce(Option<&str>) -> Result<T, String>,
) -> Result<Option<T>, String> {
    match value {
        None => Ok(None),
        Some(_) => f(value).map(Some),
    }
}
