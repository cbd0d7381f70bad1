//! Engine error types.

use cyfr_core::ErrorCode;
use thiserror::Error;

/// Errors from the execution kernel.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Reference shape was not one of `local|registry|arca|oci`.
    #[error("invalid execution reference: {0}")]
    InvalidReference(String),

    /// A `{local: path}` reference outside the canonical layout.
    #[error(
        "local path {0:?} does not match components/<types>/<publisher>/<name>/<version>/"
    )]
    BadLocalPath(String),

    /// Artifact provenance could not be verified.
    #[error("artifact verification failed: {0}")]
    VerificationFailed(String),

    /// A catalyst with no stored policy and deny-all egress.
    #[error("POLICY_REQUIRED: catalyst {0} has no stored policy; egress would be deny-all")]
    PolicyRequired(String),

    /// The guest trapped or a host import failed terminally.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Wall-clock or fuel budget exhausted.
    #[error("execution timed out: {0}")]
    Timeout(String),

    /// Cancel target does not exist.
    #[error("execution not found: {0}")]
    NotFound(String),

    /// Cancel target is not in `running` state.
    #[error("execution {id} is {status}, only running executions can be cancelled")]
    NotRunning {
        /// Execution id.
        id: String,
        /// Its current status.
        status: String,
    },

    /// OCI references need the pull side-car, which is not configured.
    #[error("no blob resolver configured for reference kind {0}")]
    ResolverNotConfigured(&'static str),

    /// Component lookup failure.
    #[error(transparent)]
    Registry(#[from] cyfr_registry::RegistryError),

    /// Policy load failure.
    #[error(transparent)]
    Policy(#[from] cyfr_policy::PolicyError),

    /// Secret preload failure.
    #[error(transparent)]
    Secrets(#[from] cyfr_secrets::SecretError),

    /// Reference parse failure.
    #[error(transparent)]
    Reference(#[from] cyfr_core::RefError),

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] cyfr_storage::StorageError),
}

impl EngineError {
    /// The wire error code this failure maps to.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidReference(_) | Self::BadLocalPath(_) => ErrorCode::InvalidParams,
            Self::VerificationFailed(_) => ErrorCode::InsufficientPermissions,
            Self::Timeout(_) => ErrorCode::ExecutionTimeout,
            Self::NotFound(_) => ErrorCode::ComponentNotFound,
            Self::Registry(cyfr_registry::RegistryError::NotFound(_))
            | Self::Registry(cyfr_registry::RegistryError::BlobNotFound(_)) => {
                ErrorCode::ComponentNotFound
            },
            Self::PolicyRequired(_)
            | Self::ExecutionFailed(_)
            | Self::NotRunning { .. }
            | Self::ResolverNotConfigured(_)
            | Self::Registry(_)
            | Self::Policy(_)
            | Self::Secrets(_)
            | Self::Reference(_)
            | Self::Storage(_) => ErrorCode::ExecutionFailed,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
