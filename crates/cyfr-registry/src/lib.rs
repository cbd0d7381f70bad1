//! Cyfr Registry - content-addressed component storage.
//!
//! Components arrive two ways:
//! - **Publish**: raw WASM bytes over the tool surface; validated,
//!   digested, inspected, and written to the canonical blob layout.
//! - **Filesystem registration**: the auto-indexer walks the components
//!   directory, registers every discovered leaf, and prunes rows whose
//!   source directory has disappeared.
//!
//! Rows are the authority for `(publisher, name, version, type)`; blobs
//! are shared by digest.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod indexer;
pub mod inspect;
pub mod manifest;
pub mod record;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use indexer::{IndexSummary, spawn_auto_indexer};
pub use inspect::{WasmInfo, infer_component_type, inspect_wasm, validate_wasm};
pub use manifest::ComponentManifest;
pub use record::{ComponentRecord, ComponentSource, PublishAttrs, SearchFilter};
pub use registry::{ComponentRegistry, RegisterOutcome};
