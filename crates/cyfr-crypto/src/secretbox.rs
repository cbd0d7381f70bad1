//! AES-256-GCM sealing with PBKDF2-derived keys.
//!
//! Envelope layout (version 1):
//!
//! ```text
//! [0x01][16-byte salt][12-byte nonce][ciphertext + tag]
//! ```
//!
//! A fresh salt and nonce are drawn per seal, so sealing the same
//! plaintext twice yields different envelopes and rotation never reuses a
//! nonce.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};

const ENVELOPE_VERSION: u8 = 0x01;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Default PBKDF2 iteration count. Lowered only in tests.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Seals and opens secret values with a key derived from the server's
/// secret key base.
pub struct SecretBox {
    key_base: Vec<u8>,
    iterations: u32,
}

impl SecretBox {
    /// Create a box over the configured secret key base.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::ZeroIterations`] when `iterations` is zero.
    pub fn new(key_base: &str, iterations: u32) -> CryptoResult<Self> {
        if iterations == 0 {
            return Err(CryptoError::ZeroIterations);
        }
        Ok(Self {
            key_base: key_base.as_bytes().to_vec(),
            iterations,
        })
    }

    /// Create a box with the production iteration count.
    ///
    /// # Errors
    ///
    /// Never fails in practice; kept fallible for signature symmetry.
    pub fn with_default_iterations(key_base: &str) -> CryptoResult<Self> {
        Self::new(key_base, DEFAULT_PBKDF2_ITERATIONS)
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(&self.key_base, salt, self.iterations, &mut key);
        key
    }

    /// Seal a plaintext into a versioned envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if the AEAD rejects the
    /// input.
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut key = self.derive_key(&salt);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::EncryptionFailed);
        key.zeroize();
        let cipher = cipher?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut envelope = Vec::with_capacity(1 + SALT_LEN + NONCE_LEN + ciphertext.len());
        envelope.push(ENVELOPE_VERSION);
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    /// Open a sealed envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedEnvelope`] for truncated or
    /// unversioned input and [`CryptoError::DecryptionFailed`] when the
    /// key base is wrong or the ciphertext was tampered with.
    pub fn open(&self, envelope: &[u8]) -> CryptoResult<Vec<u8>> {
        if envelope.len() < 1 + SALT_LEN + NONCE_LEN {
            return Err(CryptoError::MalformedEnvelope("too short".to_string()));
        }
        if envelope[0] != ENVELOPE_VERSION {
            return Err(CryptoError::MalformedEnvelope(format!(
                "unknown version byte {:#04x}",
                envelope[0]
            )));
        }
        let salt = &envelope[1..1 + SALT_LEN];
        let nonce = &envelope[1 + SALT_LEN..1 + SALT_LEN + NONCE_LEN];
        let ciphertext = &envelope[1 + SALT_LEN + NONCE_LEN..];

        let mut key = self.derive_key(salt);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::DecryptionFailed);
        key.zeroize();
        let cipher = cipher?;

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Seal a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Same as [`SecretBox::seal`].
    pub fn seal_str(&self, plaintext: &str) -> CryptoResult<Vec<u8>> {
        self.seal(plaintext.as_bytes())
    }

    /// Open an envelope expected to hold UTF-8.
    ///
    /// # Errors
    ///
    /// Same as [`SecretBox::open`], plus [`CryptoError::DecryptionFailed`]
    /// when the plaintext is not valid UTF-8.
    pub fn open_str(&self, envelope: &[u8]) -> CryptoResult<String> {
        let mut bytes = self.open(envelope)?;
        match String::from_utf8(std::mem::take(&mut bytes)) {
            Ok(s) => Ok(s),
            Err(e) => {
                let mut raw = e.into_bytes();
                raw.zeroize();
                Err(CryptoError::DecryptionFailed)
            },
        }
    }
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl Drop for SecretBox {
    fn drop(&mut self) {
        self.key_base.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keep tests fast; production uses DEFAULT_PBKDF2_ITERATIONS.
    const TEST_ITERATIONS: u32 = 16;

    fn test_box() -> SecretBox {
        SecretBox::new("test-secret-key-base", TEST_ITERATIONS).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let sb = test_box();
        let envelope = sb.seal_str("sk-abcdefghijkl").unwrap();
        assert_eq!(sb.open_str(&envelope).unwrap(), "sk-abcdefghijkl");
    }

    #[test]
    fn test_envelopes_are_unique() {
        let sb = test_box();
        let a = sb.seal(b"same").unwrap();
        let b = sb.seal(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_base_fails() {
        let sealed = test_box().seal(b"value").unwrap();
        let other = SecretBox::new("different-key-base", TEST_ITERATIONS).unwrap();
        assert!(matches!(
            other.open(&sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let sb = test_box();
        let mut sealed = sb.seal(b"value").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(
            sb.open(&sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_malformed_envelope() {
        let sb = test_box();
        assert!(matches!(
            sb.open(&[0x01, 0x02]),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        let mut sealed = sb.seal(b"value").unwrap();
        sealed[0] = 0x7f;
        assert!(matches!(
            sb.open(&sealed),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(matches!(
            SecretBox::new("base", 0),
            Err(CryptoError::ZeroIterations)
        ));
    }
}
