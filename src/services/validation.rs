//! Input checks shared by the services

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email pattern is valid")
});

pub const MAX_EMAIL_LEN: usize = 254;

/// Syntactic address check; the domain needs at least one dot
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && EMAIL_PATTERN.is_match(email)
}

/// Trim and lowercase an address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Character-count range check; returns the message on failure
pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min {
        if min == 1 {
            return Err(format!("{} is required", field));
        }
        return Err(format!("{} must be at least {} characters", field, min));
    }
    if len > max {
        return Err(format!("{} must be at most {} characters", field, max));
    }
    Ok(())
}

pub const MAX_URL_LEN: usize = 2048;

/// Absolute http(s) URL or site-relative path; blank becomes `None`
pub fn clean_url(field: &str, value: Option<String>) -> Result<Option<String>, String> {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let lower = value.to_ascii_lowercase();
    let ok = lower.starts_with("https://")
        || lower.starts_with("http://")
        || (value.starts_with('/') && !value.starts_with("//"));
    if !ok || value.len() > MAX_URL_LEN || value.chars().any(char::is_whitespace) {
        return Err(format!("{} must be an http(s) URL or a site path", field));
    }
    Ok(Some(value))
}
