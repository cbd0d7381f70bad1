//! Cyfr Policy - host policies.
//!
//! A [`HostPolicy`] is both the enforcement input and the audit record for
//! one sandbox invocation: egress domains and methods, tool and
//! storage-path scopes, and the resource budget (timeout, memory, request
//! and response byte caps, rate limit).
//!
//! A component without a stored policy executes against a type-aware
//! default whose egress is deny-all; the execution kernel refuses to run
//! catalysts like that (`POLICY_REQUIRED`) rather than silently running
//! them without network access.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod policy;
pub mod store;

pub use error::{PolicyError, PolicyResult};
pub use policy::HostPolicy;
pub use store::{PolicyStore, StoredPolicy};
