//! Registry error types.

use thiserror::Error;

/// Errors from publish, registration, and lookup.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Component name outside `[a-z0-9-]{2,64}`.
    #[error("invalid component name {0:?} (lowercase alphanumerics and hyphens, 2-64 chars)")]
    InvalidName(String),

    /// Version not three dotted numerics (`latest` is not publishable).
    #[error("invalid component version {0:?} (expected e.g. \"1.0.0\")")]
    InvalidVersion(String),

    /// Bytes did not start with the WASM magic, or carried an unknown
    /// binary version.
    #[error("invalid wasm module: {0}")]
    InvalidWasm(String),

    /// A non-`local` publisher re-published an existing
    /// `(name, version, type)`.
    #[error("component already exists: {0}")]
    AlreadyExists(String),

    /// No row matches the reference.
    #[error("component not found: {0}")]
    NotFound(String),

    /// No blob stored under the digest.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Directory registration only accepts `local` and `agent`.
    #[error("publisher {0:?} cannot register from the filesystem")]
    PublisherNotAllowed(String),

    /// Directory layout did not match
    /// `components/<types>/<publisher>/<name>/<version>/`.
    #[error("unrecognized component directory layout: {0}")]
    BadLayout(String),

    /// Manifest file failed to parse.
    #[error("invalid component manifest: {0}")]
    InvalidManifest(String),

    /// Reference problem (untyped, unparseable).
    #[error(transparent)]
    Reference(#[from] cyfr_core::RefError),

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] cyfr_storage::StorageError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
