// Settings validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable field checks
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{field} cannot be empty")));
        }
        Ok(())
    }

    pub fn in_range<T: PartialOrd + std::fmt::Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{field} must be between {min} and {max}, got {value}"
            )));
        }
        Ok(())
    }

    /// Case-insensitive membership check.
    pub fn one_of(value: &str, allowed: &[&str], field: &str) -> Result<()> {
        if !allowed.iter().any(|a| a.eq_ignore_ascii_case(value.trim())) {
            return Err(ConfigError::ValidationError(format!(
                "{field} must be one of {}, got '{value}'",
                allowed.join(", ")
            )));
        }
        Ok(())
    }

    /// Cookie and form field names: RFC 6265 token characters only.
    pub fn is_token_name(value: &str, max_len: usize, field: &str) -> Result<()> {
        Self::not_empty(value, field)?;
        if value.len() > max_len {
            return Err(ConfigError::ValidationError(format!(
                "{field} must be at most {max_len} characters"
            )));
        }
        let valid = value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
        if !valid {
            return Err(ConfigError::ValidationError(format!(
                "{field} contains characters not allowed in a cookie name"
            )));
        }
        Ok(())
    }
}
