use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A required field is missing or malformed.
    Invalid(String),
    /// A status string outside the fixed vocabulary.
    UnknownStatus(String),
    /// A severity name or code outside the fixed vocabulary.
    UnknownSeverity(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Invalid(msg) => write!(f, "invalid: {msg}"),
            ModelError::UnknownStatus(raw) => {
                write!(f, "unknown scan status '{raw}'")
            }
            ModelError::UnknownSeverity(raw) => {
                write!(f, "unknown severity '{raw}'")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Fails with [`ModelError::Invalid`] naming `field` when `value` is blank.
pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ModelError::Invalid(format!("missing {field}")));
    }
    Ok(())
}
