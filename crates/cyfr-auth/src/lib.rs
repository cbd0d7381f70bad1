//! Cyfr Auth - API keys and sessions.
//!
//! Two credential kinds gate the transport:
//! - **API keys** (`cyfr_pk_` / `cyfr_sk_` / `cyfr_ak_`): stateless,
//!   hashed at rest, optionally IP-allow-listed. The raw value is shown
//!   once at creation and never retrievable again.
//! - **Sessions**: opaque bearer tokens with an activity-refreshed TTL,
//!   mirrored in memory for hot reads and persisted for restart
//!   hydration. Termination goes through a revoked-sessions set so stale
//!   mirrors cannot re-hydrate a dead session.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod keys;
pub mod permissions;
pub mod sessions;

pub use error::{AuthError, AuthResult};
pub use keys::{ApiKeyRecord, ApiKeyStore, KeyType};
pub use permissions::PermissionStore;
pub use sessions::{Session, SessionStore};
