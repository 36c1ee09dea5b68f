//! Input validation utilities
//!
//! Each rule returns `Err(message)` for a violation. `collect` runs a batch of
//! rules and reports every violation at once.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{ApiError, ApiResult};

/// Validate email
pub fn validate_email(field: &str, email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err(format!("{field} should not be empty"));
    }

    if email.len() > 254 {
        return Err(format!("{field} must be at most 254 characters long"));
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err(format!("{field} must be an email"));
    }

    Ok(())
}

/// Character count of `value` must be within `min..=max`
pub fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();

    if len < min {
        return Err(format!(
            "{field} must be longer than or equal to {min} characters"
        ));
    }

    if len > max {
        return Err(format!(
            "{field} must be shorter than or equal to {max} characters"
        ));
    }

    Ok(())
}

/// Like `validate_length`, but an absent value passes
pub fn validate_optional_length(
    field: &str,
    value: Option<&str>,
    min: usize,
    max: usize,
) -> Result<(), String> {
    match value {
        Some(value) => validate_length(field, value, min, max),
        None => Ok(()),
    }
}

pub fn validate_not_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} should not be empty"));
    }
    Ok(())
}

/// Exactly six characters, as used by verification codes and OTPs
pub fn validate_code(field: &str, value: &str) -> Result<(), String> {
    if value.chars().count() != 6 {
        return Err(format!("{field} must be exactly 6 characters long"));
    }
    Ok(())
}

pub fn validate_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), String> {
    if !allowed.contains(&value) {
        return Err(format!(
            "{field} must be one of the following values: {}",
            allowed.join(", ")
        ));
    }
    Ok(())
}

/// Run every rule and turn the violations into a single 400 response
pub fn collect<I>(results: I) -> ApiResult<()>
where
    I: IntoIterator<Item = Result<(), String>>,
{
    let errors: Vec<String> = results.into_iter().filter_map(Result::err).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("email", "ada@example.com").is_ok());
        assert!(validate_email("email", "").is_err());
        assert_eq!(
            validate_email("email", "not-an-email").unwrap_err(),
            "email must be an email"
        );
    }

    #[test]
    fn test_validate_length_counts_chars() {
        assert!(validate_length("title", "héllo", 3, 5).is_ok());
        assert!(validate_length("title", "ab", 3, 25).is_err());
        assert!(validate_length("title", &"a".repeat(26), 3, 25).is_err());
    }

    #[test]
    fn test_optional_length_skips_absent_value() {
        assert!(validate_optional_length("username", None, 3, 80).is_ok());
        assert!(validate_optional_length("username", Some("ab"), 3, 80).is_err());
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("code", "123456").is_ok());
        assert!(validate_code("code", "12345").is_err());
        assert!(validate_code("code", "1234567").is_err());
    }

    #[test]
    fn test_validate_one_of() {
        let roles = ["user", "assistant", "system"];
        assert!(validate_one_of("role", "assistant", &roles).is_ok());
        assert!(validate_one_of("role", "admin", &roles).is_err());
    }

    #[test]
    fn test_collect_reports_every_violation() {
        let result = collect([
            validate_length("firstName", "A", 2, 64),
            validate_email("email", "nope"),
            validate_length("password", "Passw0rd!", 8, 16),
        ]);

        match result {
            Err(ApiError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
