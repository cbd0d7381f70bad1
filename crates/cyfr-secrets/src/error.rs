//! Secret store error types.

use thiserror::Error;

/// Errors from secret storage and grants.
#[derive(Debug, Error)]
pub enum SecretError {
    /// No secret with that name in the requested scope.
    #[error("secret not found: {0}")]
    NotFound(String),

    /// Scope string was not `personal` or `org`.
    #[error("unknown secret scope: {0}")]
    UnknownScope(String),

    /// Sealing or opening the ciphertext failed.
    #[error(transparent)]
    Crypto(#[from] cyfr_crypto::CryptoError),

    /// The grant references an untyped component.
    #[error(transparent)]
    Reference(#[from] cyfr_core::RefError),

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] cyfr_storage::StorageError),
}

/// Result type for secret operations.
pub type SecretResult<T> = Result<T, SecretError>;
