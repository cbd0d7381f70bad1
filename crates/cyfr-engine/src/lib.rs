//! Cyfr Engine - the execution kernel.
//!
//! One invocation runs through fixed stages: resolve the reference to
//! bytes, verify provenance, load and snapshot the policy, preload
//! granted secrets, insert the execution record (before the sandbox ever
//! starts, so crashes leave forensic evidence), invoke the guest under
//! fuel/memory/time/size limits, then finalize the record with masked
//! output.
//!
//! Host imports exposed to the sandbox (`cyfr_http_request`,
//! `cyfr_secrets_read`, `cyfr_storage_*`, `cyfr_tools_call`) are gated by
//! the policy snapshot and logged to the policy log on every
//! consultation.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod host;
pub mod kernel;
pub mod record;
pub mod reference;
pub mod verify;

pub use error::{EngineError, EngineResult};
pub use kernel::{ExecutionKernel, RunOptions, RunOutcome};
pub use record::{ExecutionRecord, ExecutionStatus, ExecutionStore};
pub use reference::Reference;
pub use verify::{BlobResolver, HmacTrustRoot, NoopResolver, TrustRoot};
