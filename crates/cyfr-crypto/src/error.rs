//! Crypto error types.

use thiserror::Error;

/// Errors from digest parsing and secret sealing.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Digest string did not match `sha256:<64 hex chars>`.
    #[error("invalid digest {0:?} (expected \"sha256:<hex>\")")]
    InvalidDigest(String),

    /// Sealed envelope was truncated or carried an unknown version byte.
    #[error("malformed sealed envelope: {0}")]
    MalformedEnvelope(String),

    /// AEAD decryption failed (wrong key base or tampered ciphertext).
    #[error("decryption failed")]
    DecryptionFailed,

    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Key derivation was configured with zero iterations.
    #[error("pbkdf2 iteration count must be non-zero")]
    ZeroIterations,
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
