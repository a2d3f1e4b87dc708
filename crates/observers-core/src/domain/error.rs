//! Error taxonomy for observation operations.

use observers_state::StorageError;

/// Errors produced by the observation store and its dispatch surface.
#[derive(Debug, thiserror::Error)]
pub enum ObservationError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("invalid {field}: {value:?} (expected one of: {expected})")]
    InvalidEnumValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Observation not found: {id}")]
    NotFound { id: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Unknown operation: {operation}")]
    UnknownOperation { operation: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ObservationError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_enum(field: &str, value: &str, expected: &[&str]) -> Self {
        Self::InvalidEnumValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }

    /// Name of the offending argument field, where one applies.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } | Self::InvalidEnumValue { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Stable machine-readable kind, used in structured failure results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::InvalidEnumValue { .. } => "invalid_enum_value",
            Self::NotFound { .. } => "not_found",
            Self::Persistence(_) | Self::Serialization(_) => "persistence_error",
            Self::UnknownOperation { .. } => "unknown_operation",
        }
    }

    /// Prefix the field name, e.g. `content` becomes `observations[2].content`.
    pub(crate) fn within(self, prefix: &str) -> Self {
        match self {
            Self::Validation { field, message } => Self::Validation {
                field: prefixed(prefix, &field),
                message,
            },
            Self::InvalidEnumValue {
                field,
                value,
                expected,
            } => Self::InvalidEnumValue {
                field: prefixed(prefix, &field),
                value,
                expected,
            },
            other => other,
        }
    }
}

fn prefixed(prefix: &str, field: &str) -> String {
    if field.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

/// Result type for observation operations.
pub type Result<T> = std::result::Result<T, ObservationError>;
