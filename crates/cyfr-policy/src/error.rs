//! Policy error types.

use thiserror::Error;

/// Errors from policy parsing and storage.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A limit field failed to parse.
    #[error(transparent)]
    Limit(#[from] cyfr_core::limits::LimitError),

    /// The reference has no component type; policies are per typed ref.
    #[error(transparent)]
    Reference(#[from] cyfr_core::RefError),

    /// A map field had the wrong JSON shape.
    #[error("invalid policy field {field:?}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] cyfr_storage::StorageError),
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
