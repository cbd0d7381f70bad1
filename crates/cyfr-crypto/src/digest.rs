//! Content digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// A SHA-256 content digest, displayed as `sha256:<hex>`.
///
/// Blobs are keyed by this value; two component records with identical
/// bytes share one blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Digest raw bytes.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("sha256:{}", hex::encode(digest)))
    }

    /// Parse a stored digest string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidDigest`] unless the input is
    /// `sha256:` followed by exactly 64 lowercase hex characters.
    pub fn parse(s: &str) -> CryptoResult<Self> {
        let hex_part = s
            .strip_prefix("sha256:")
            .ok_or_else(|| CryptoError::InvalidDigest(s.to_string()))?;
        let valid = hex_part.len() == 64
            && hex_part
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(CryptoError::InvalidDigest(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The full `sha256:<hex>` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex part without the algorithm prefix.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.0["sha256:".len()..]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ContentDigest {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_vector() {
        // SHA-256 of the empty string.
        let d = ContentDigest::of(b"");
        assert_eq!(
            d.as_str(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        let d = ContentDigest::of(b"hello");
        let parsed = ContentDigest::parse(d.as_str()).unwrap();
        assert_eq!(d, parsed);
        assert_eq!(parsed.hex().len(), 64);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ContentDigest::parse("md5:abcd").is_err());
        assert!(ContentDigest::parse("sha256:short").is_err());
        assert!(ContentDigest::parse("sha256:ZZ").is_err());
    }
}
