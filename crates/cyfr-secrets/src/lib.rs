//! Cyfr Secrets - encrypted values, component grants, output redaction.
//!
//! Secrets are sealed at rest with the server's [`cyfr_crypto::SecretBox`]
//! and only ever decrypted inside the authorized server path (execution
//! preload). The [`masker`] scrubs known plaintexts and their common
//! encodings from execution outputs as defense-in-depth; the primary
//! control is always the policy's domain allow-list.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod masker;
pub mod store;

pub use error::{SecretError, SecretResult};
pub use masker::{REDACTED, mask_text, mask_value};
pub use store::{SecretScope, SecretStore};
