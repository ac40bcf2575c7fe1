use thiserror::Error;

/// Validation and codec failures that are pure (no I/O) and therefore
/// belong to the domain crate rather than a specific transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A single field failed validation. `field` names the offending
    /// attribute using its wire (camelCase) name, matching the `field`
    /// key callers surface in the `{error, message, field}` HTTP body.
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    /// The record's JSON payload could not be deserialized at all.
    #[error("malformed payload: {0}")]
    Codec(String),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            message: message.into(),
        }
    }

    /// The wire field name this error should be reported against, or
    /// `"body"` for failures that precede field-level validation.
    pub fn field(&self) -> &'static str {
        match self {
            DomainError::Validation { field, .. } => field,
            DomainError::Codec(_) => "body",
        }
    }
}
