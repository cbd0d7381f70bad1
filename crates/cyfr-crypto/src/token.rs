//! Opaque token generation and hashing.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Bytes of entropy behind every generated token (256 bits, double the
/// 128-bit floor the session contract requires).
const TOKEN_ENTROPY_BYTES: usize = 32;

/// Generate an opaque token: `<prefix><43 url-safe base64 chars>`.
///
/// Used for session tokens (empty prefix) and raw API keys
/// (`cyfr_pk_` / `cyfr_sk_` / `cyfr_ak_` prefixes).
#[must_use]
pub fn generate_token(prefix: &str) -> String {
    use base64::Engine as _;

    let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let body = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    format!("{prefix}{body}")
}

/// SHA-256 of `input`, hex-encoded. The stored form-of-record for API
/// keys; raw keys are never persisted.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Constant-time string equality for credential comparison.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
