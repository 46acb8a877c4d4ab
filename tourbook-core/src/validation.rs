//! Validation error types

use std::fmt;

/// Validation error for domain models.
///
/// The `Display` output is the message handed back to API clients, so it is
/// phrased for humans.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Required field is missing or blank
    Empty { field: &'static str },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// Field is shorter than its minimum length
    TooShort { field: &'static str, min: usize },

    /// Numeric field outside its allowed range
    OutOfRange { field: &'static str, min: f64, max: f64 },

    /// String doesn't match required format (e.g. email, coordinates)
    InvalidFormat { field: &'static str, reason: String },

    /// Invalid enum variant
    InvalidVariant { field: &'static str, value: String, allowed: &'static str },

    /// Two fields that must agree do not (password confirmation)
    Mismatch { field: &'static str, other: &'static str },

    /// Rule with a fixed message of its own
    Custom(String),
}

impl ValidationError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    pub fn format(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} is required", field),
            Self::TooLong { field, max } => {
                write!(f, "{} must have less or equal than {} characters", field, max)
            }
            Self::TooShort { field, min } => {
                write!(f, "{} must have more or equal than {} characters", field, min)
            }
            Self::OutOfRange { field, min, max } => {
                write!(f, "{} must be between {} and {}", field, min, max)
            }
            Self::InvalidFormat { field, reason } => write!(f, "{}: {}", field, reason),
            Self::InvalidVariant {
                field,
                value,
                allowed,
            } => write!(f, "invalid {} value '{}', expected one of: {}", field, value, allowed),
            Self::Mismatch { field, other } => write!(f, "{} and {} are not matching", field, other),
            Self::Custom(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Trim a required text field, rejecting blanks.
pub(crate) fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(trimmed.to_owned())
}
