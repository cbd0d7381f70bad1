//! Cyfr Crypto - content digests and secret sealing.
//!
//! This crate provides:
//! - SHA-256 content digests in the `sha256:<hex>` form used for
//!   content-addressed artifact storage
//! - [`SecretBox`]: AES-256-GCM sealing with a PBKDF2-derived key, used by
//!   the secret store for values at rest
//! - Opaque token generation and constant-time comparison for API keys
//!   and session tokens

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod digest;
pub mod error;
pub mod secretbox;
pub mod token;

pub use digest::ContentDigest;
pub use error::{CryptoError, CryptoResult};
pub use secretbox::SecretBox;
pub use token::{constant_time_eq, generate_token, sha256_hex};
