//! Auth error types.

use cyfr_core::ErrorCode;
use thiserror::Error;

/// Errors from key validation and session handling.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bearer value did not carry a known `cyfr_*` prefix.
    #[error("unknown API key prefix")]
    UnknownKeyPrefix,

    /// No key row matches the presented value.
    #[error("invalid API key")]
    InvalidKey,

    /// The key exists but has been revoked.
    #[error("API key revoked")]
    KeyRevoked,

    /// The caller's IP is outside the key's allow-list.
    #[error("client IP {0} not in key allow-list")]
    IpNotAllowed(String),

    /// No key with that id (rotate/revoke target).
    #[error("API key not found: {0}")]
    KeyNotFound(String),

    /// Session token is unknown.
    #[error("session not found")]
    SessionNotFound,

    /// Session exists but its TTL has elapsed.
    #[error("session expired")]
    SessionExpired,

    /// Session was explicitly terminated.
    #[error("session revoked")]
    SessionRevoked,

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] cyfr_storage::StorageError),
}

impl AuthError {
    /// The wire error code this failure maps to.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnknownKeyPrefix | Self::InvalidKey | Self::KeyRevoked => ErrorCode::AuthInvalid,
            Self::IpNotAllowed(_) => ErrorCode::InsufficientPermissions,
            Self::KeyNotFound(_) => ErrorCode::InvalidParams,
            Self::SessionNotFound | Self::SessionRevoked => ErrorCode::SessionExpired,
            Self::SessionExpired => ErrorCode::AuthExpired,
            Self::Storage(_) => ErrorCode::InternalError,
        }
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
