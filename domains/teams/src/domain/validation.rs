//! Input validation helpers

use std::collections::HashSet;

use enlist_common::{Error, Result};
use regex::Regex;
use validator::ValidateEmail;

lazy_static::lazy_static! {
    /// Team names: printable text, no control characters
    pub static ref TEAM_NAME_REGEX: Regex =
        Regex::new(r"^[^\p{Cc}]+$").unwrap();
}

/// Trim and check a team name; returns the stored form.
pub fn validate_team_name(name: &str, max_length: usize) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("Team name cannot be empty".to_string()));
    }
    if trimmed.chars().count() > max_length {
        return Err(Error::Validation(format!(
            "Team name must be at most {} characters",
            max_length
        )));
    }
    if !TEAM_NAME_REGEX.is_match(trimmed) {
        return Err(Error::Validation(
            "Team name contains control characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Canonical form used for every email comparison
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalize, validate and deduplicate invitee emails, keeping first-seen order.
pub fn dedupe_emails<S: AsRef<str>>(emails: &[S]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(emails.len());

    for raw in emails {
        let email = normalize_email(raw.as_ref());
        if !email.validate_email() {
            return Err(Error::Validation(format!(
                "Invalid email format: {}",
                raw.as_ref()
            )));
        }
        if seen.insert(email.clone()) {
            unique.push(email);
        }
    }

    Ok(unique)
}
