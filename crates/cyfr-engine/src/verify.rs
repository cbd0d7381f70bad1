//! Artifact provenance.
//!
//! Published (non-`local`, non-`agent`) artifacts must carry a signature
//! a configured [`TrustRoot`] accepts. The in-tree root verifies an
//! HMAC-SHA256 detached signature stored next to the blob
//! (`<type>.wasm.sig`); Sigstore-style roots plug in behind the same
//! trait. OCI pulls go through [`BlobResolver`], whose production
//! implementation is the optional side-car.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{EngineError, EngineResult};

type HmacSha256 = Hmac<Sha256>;

/// Decides whether a published artifact's signature is acceptable.
pub trait TrustRoot: Send + Sync {
    /// Verify `signature` over `bytes` for `publisher`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::VerificationFailed`] when the signature is
    /// missing or wrong.
    fn verify(&self, publisher: &str, bytes: &[u8], signature: Option<&str>)
    -> EngineResult<()>;
}

/// HMAC-SHA256 trust root keyed from server configuration.
pub struct HmacTrustRoot {
    key: Vec<u8>,
}

impl HmacTrustRoot {
    /// Create a root over the configured signing key.
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
        }
    }

    /// Produce the detached signature for `bytes` (publish-side helper).
    #[must_use]
    pub fn sign(&self, bytes: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(bytes);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl TrustRoot for HmacTrustRoot {
    fn verify(
        &self,
        publisher: &str,
        bytes: &[u8],
        signature: Option<&str>,
    ) -> EngineResult<()> {
        let signature = signature.ok_or_else(|| {
            EngineError::VerificationFailed(format!(
                "publisher {publisher} requires a signature and none was stored"
            ))
        })?;
        let raw = hex::decode(signature.trim()).map_err(|_| {
            EngineError::VerificationFailed("signature is not hex".to_string())
        })?;
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(bytes);
        mac.verify_slice(&raw).map_err(|_| {
            EngineError::VerificationFailed(format!(
                "signature from publisher {publisher} does not verify"
            ))
        })
    }
}

impl std::fmt::Debug for HmacTrustRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTrustRoot").finish_non_exhaustive()
    }
}

/// Resolves remote (OCI) references to raw bytes.
#[async_trait]
pub trait BlobResolver: Send + Sync {
    /// Pull the artifact bytes for `reference`.
    ///
    /// # Errors
    ///
    /// Resolver-specific; the default resolver always errors.
    async fn pull(&self, reference: &str) -> EngineResult<Vec<u8>>;
}

/// The not-configured resolver: every pull fails with a clear error.
#[derive(Debug, Default)]
pub struct NoopResolver;

#[async_trait]
impl BlobResolver for NoopResolver {
    async fn pull(&self, _reference: &str) -> EngineResult<Vec<u8>> {
        Err(EngineError::ResolverNotConfigured("oci"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sign_verify_roundtrip() {
        let root = HmacTrustRoot::new("trust-key");
        let sig = root.sign(b"wasm bytes");
        assert!(root.verify("acme", b"wasm bytes", Some(&sig)).is_ok());
    }

    #[test]
    fn test_verify_rejects_missing_and_wrong() {
        let root = HmacTrustRoot::new("trust-key");
        assert!(matches!(
            root.verify("acme", b"wasm bytes", None),
            Err(EngineError::VerificationFailed(_))
        ));
        let other = HmacTrustRoot::new("different-key").sign(b"wasm bytes");
        assert!(root.verify("acme", b"wasm bytes", Some(&other)).is_err());
        assert!(root.verify("acme", b"other bytes", Some(&root.sign(b"wasm bytes"))).is_err());
    }

    #[tokio::test]
    async fn test_noop_resolver_errors() {
        assert!(matches!(
            NoopResolver.pull("ghcr.io/acme/m:1.0.0").await,
            Err(EngineError::ResolverNotConfigured("oci"))
        ));
    }
}
