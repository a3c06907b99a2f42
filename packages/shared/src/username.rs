//! Username value object.

use std::fmt;

use crate::error::ValidationError;

/// Maximum username length, in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// A display name that passed validation.
///
/// Allowed characters are ASCII letters, digits, `_`, `-` and `.`, which keeps
/// names safe to splice into log entries and terminal output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ValidationError::Empty);
        }
        if raw.chars().count() > MAX_USERNAME_LEN {
            return Err(ValidationError::TooLong {
                max: MAX_USERNAME_LEN,
            });
        }
        if let Some(c) = raw.chars().find(|c| !is_allowed(*c)) {
            return Err(ValidationError::InvalidChar(c));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl TryFrom<String> for Username {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
