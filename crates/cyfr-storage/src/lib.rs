//! Cyfr Storage - the persistence plane.
//!
//! Three pieces live here:
//! - [`StorageAdapter`]: scoped blob I/O over the base directory. Every
//!   other subsystem writes files through this; it is the only module
//!   that knows the on-disk layout.
//! - [`Cache`] and its sweeper: the process-local TTL map for hot reads
//!   (policies, component configs, sessions).
//! - [`Database`]: the embedded SQLite handle plus the ordered migration
//!   list.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod adapter;
pub mod cache;
pub mod db;
pub mod error;
pub mod migrations;

pub use adapter::StorageAdapter;
pub use cache::{Cache, CacheKey, DEFAULT_TTL, spawn_sweeper};
pub use db::Database;
pub use error::{StorageError, StorageResult};

/// Re-export of the underlying SQL engine for direct query access.
pub use rusqlite;
