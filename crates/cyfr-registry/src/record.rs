//! Component rows and the shapes that create and query them.

use cyfr_core::{ComponentRef, ComponentType, component_id};
use serde::{Deserialize, Serialize};

/// How a row entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentSource {
    /// Published over the tool surface.
    Published,
    /// Discovered on disk by the auto-indexer.
    Filesystem,
}

impl ComponentSource {
    /// The stored form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Filesystem => "filesystem",
        }
    }

    /// Inverse of [`ComponentSource::as_str`]; unknown input reads as
    /// `published`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        if s == "filesystem" {
            Self::Filesystem
        } else {
            Self::Published
        }
    }
}

/// One registry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Stable id derived from `(publisher, name, version, type)`.
    pub id: String,
    /// Component name.
    pub name: String,
    /// Version, three dotted numerics.
    pub version: String,
    /// Component type.
    pub component_type: ComponentType,
    /// Publishing namespace.
    pub publisher: String,
    /// Owning organization; empty for unscoped rows.
    pub org_id: String,
    /// Content digest of the blob.
    pub digest: String,
    /// Blob size in bytes.
    pub size: u64,
    /// Function export names.
    pub exports: Vec<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Search tags.
    pub tags: Vec<String>,
    /// Category label.
    pub category: Option<String>,
    /// License identifier.
    pub license: Option<String>,
    /// How the row entered the registry.
    pub source: ComponentSource,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Last update time (RFC 3339).
    pub updated_at: String,
}

impl ComponentRecord {
    /// The typed reference for this row.
    #[must_use]
    pub fn reference(&self) -> ComponentRef {
        ComponentRef::new(
            self.component_type,
            self.publisher.clone(),
            self.name.clone(),
            self.version.clone(),
        )
    }

    /// The canonical blob path segments under the components tree:
    /// `components/<types>/<publisher>/<name>/<version>/<type>.wasm`.
    #[must_use]
    pub fn blob_segments(&self) -> [String; 6] {
        [
            "components".to_string(),
            self.component_type.plural().to_string(),
            self.publisher.clone(),
            self.name.clone(),
            self.version.clone(),
            format!("{}.wasm", self.component_type.as_str()),
        ]
    }

    /// Recompute the stable row id from the identity fields.
    #[must_use]
    pub fn derived_id(&self) -> String {
        component_id(&self.publisher, &self.name, &self.version, self.component_type)
    }
}

/// Caller-supplied attributes for a publish.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishAttrs {
    /// Component name (validated).
    pub name: String,
    /// Version (validated; `latest` rejected).
    pub version: String,
    /// Explicit type; inferred from exports when absent.
    pub component_type: Option<ComponentType>,
    /// Publisher namespace; defaults to `local`.
    pub publisher: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Category label.
    pub category: Option<String>,
    /// License identifier.
    pub license: Option<String>,
}

/// Search parameters. All filters are conjunctive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilter {
    /// Restrict to one type.
    #[serde(alias = "type")]
    pub component_type: Option<ComponentType>,
    /// Restrict to one category.
    pub category: Option<String>,
    /// Require every listed tag.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Restrict to one license.
    pub license: Option<String>,
    /// Free text matched against name and description.
    pub query: Option<String>,
    /// Result cap; defaults to 50.
    pub limit: Option<u32>,
}
