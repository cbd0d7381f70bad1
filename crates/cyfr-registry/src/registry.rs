//! The component registry.

use std::collections::HashSet;
use std::path::Path;

use cyfr_core::{ComponentRef, ComponentType, Context, component_id};
use cyfr_crypto::ContentDigest;
use cyfr_storage::{Database, StorageAdapter, StorageError};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::inspect;
use crate::manifest::{ComponentManifest, MANIFEST_FILE};
use crate::record::{ComponentRecord, ComponentSource, PublishAttrs, SearchFilter};

/// Default search result cap.
const DEFAULT_SEARCH_LIMIT: u32 = 50;

/// Outcome of a filesystem registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new or changed row was written.
    Registered,
    /// The row already matched the on-disk digest.
    Unchanged,
}

/// Publish, registration, search, and blob retrieval.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    db: Database,
    adapter: StorageAdapter,
}

fn valid_name(name: &str) -> bool {
    (2..=64).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn valid_publish_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

impl ComponentRegistry {
    /// Create a registry over the shared database and adapter.
    #[must_use]
    pub fn new(db: Database, adapter: StorageAdapter) -> Self {
        Self { db, adapter }
    }

    /// The storage adapter the registry writes blobs through.
    #[must_use]
    pub fn adapter(&self) -> &StorageAdapter {
        &self.adapter
    }

    /// Publish raw WASM bytes.
    ///
    /// Validates name, version, and the WASM header; computes the content
    /// digest; parses exports (inferring the type when the caller gave
    /// none); writes the blob to the canonical layout; upserts the row.
    /// `local` re-publishes overwrite; any other publisher gets
    /// [`RegistryError::AlreadyExists`].
    ///
    /// # Errors
    ///
    /// See the validation steps above; plus storage failures.
    pub async fn publish_bytes(
        &self,
        ctx: &Context,
        bytes: &[u8],
        attrs: PublishAttrs,
    ) -> RegistryResult<ComponentRecord> {
        if !valid_name(&attrs.name) {
            return Err(RegistryError::InvalidName(attrs.name));
        }
        if !valid_publish_version(&attrs.version) {
            return Err(RegistryError::InvalidVersion(attrs.version));
        }

        let info = inspect::inspect_wasm(bytes)?;
        let component_type = attrs.component_type.unwrap_or(info.suggested_type);
        let publisher = attrs.publisher.unwrap_or_else(|| "local".to_string());
        let digest = ContentDigest::of(bytes);
        let now = chrono::Utc::now().to_rfc3339();

        let record = ComponentRecord {
            id: component_id(&publisher, &attrs.name, &attrs.version, component_type),
            name: attrs.name,
            version: attrs.version,
            component_type,
            publisher,
            org_id: ctx.org_id.clone().unwrap_or_default(),
            digest: digest.to_string(),
            size: bytes.len() as u64,
            exports: info.exports,
            description: attrs.description,
            tags: attrs.tags,
            category: attrs.category,
            license: attrs.license,
            source: ComponentSource::Published,
            created_at: now.clone(),
            updated_at: now,
        };

        let existing = self.find_exact(
            &record.publisher,
            &record.name,
            &record.version,
            record.component_type,
            &record.org_id,
        )?;
        if existing.is_some() && record.publisher != "local" {
            return Err(RegistryError::AlreadyExists(record.reference().to_string()));
        }

        let segments = record.blob_segments();
        let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.adapter.put(ctx, &segment_refs, bytes).await?;

        self.upsert_row(&record)?;
        info!(reference = %record.reference(), digest = %record.digest, "component published");
        Ok(record)
    }

    /// Register a component discovered on disk.
    ///
    /// The directory must sit at
    /// `components/<types>/<publisher>/<name>/<version>/` under the base
    /// path; a `component.toml` may override what the layout implies.
    /// Publishers other than `local` and `agent` are rejected. An
    /// existing row with the same digest is left unchanged unless
    /// `force`.
    ///
    /// # Errors
    ///
    /// Layout, manifest, publisher, and storage failures.
    pub async fn register_from_directory(
        &self,
        ctx: &Context,
        dir: &Path,
        force: bool,
    ) -> RegistryResult<(RegisterOutcome, ComponentRecord)> {
        let (type_seg, publisher_seg, name_seg, version_seg) = layout_segments(dir)?;

        let manifest = match tokio::fs::read_to_string(dir.join(MANIFEST_FILE)).await {
            Ok(raw) => ComponentManifest::parse(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ComponentManifest::default(),
            Err(e) => return Err(StorageError::Io(e).into()),
        };

        let component_type = match &manifest.component_type {
            Some(name) => ComponentType::parse(name)?,
            None => ComponentType::from_plural(&type_seg)?,
        };
        let name = manifest.name.clone().unwrap_or(name_seg);
        let version = manifest.version.clone().unwrap_or(version_seg);
        if !valid_name(&name) {
            return Err(RegistryError::InvalidName(name));
        }
        if !valid_publish_version(&version) {
            return Err(RegistryError::InvalidVersion(version));
        }
        if publisher_seg != "local" && publisher_seg != "agent" {
            return Err(RegistryError::PublisherNotAllowed(publisher_seg));
        }

        let bytes = read_wasm_artifact(dir, component_type).await?;
        inspect::validate_wasm(&bytes)?;
        let info = inspect::inspect_wasm(&bytes)?;
        let digest = ContentDigest::of(&bytes).to_string();
        let org_id = ctx.org_id.clone().unwrap_or_default();

        if let Some(existing) =
            self.find_exact(&publisher_seg, &name, &version, component_type, &org_id)?
            && existing.digest == digest
            && !force
        {
            return Ok((RegisterOutcome::Unchanged, existing));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let record = ComponentRecord {
            id: component_id(&publisher_seg, &name, &version, component_type),
            name,
            version,
            component_type,
            publisher: publisher_seg,
            org_id,
            digest,
            size: bytes.len() as u64,
            exports: info.exports,
            description: manifest.description,
            tags: manifest.tags,
            category: manifest.category,
            license: manifest.license,
            source: ComponentSource::Filesystem,
            created_at: now.clone(),
            updated_at: now,
        };

        // Mirror the bytes into the canonical layout via the adapter so a
        // manifest-renamed component still lands where lookups expect it.
        let segments = record.blob_segments();
        let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.adapter.put(ctx, &segment_refs, &bytes).await?;

        self.upsert_row(&record)?;
        debug!(reference = %record.reference(), "component registered from directory");
        Ok((RegisterOutcome::Registered, record))
    }

    /// Resolve a typed reference to its row. `latest` picks the most
    /// recently published version within the reference's publisher
    /// namespace.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when nothing matches.
    pub fn get(&self, ctx: &Context, reference: &ComponentRef) -> RegistryResult<ComponentRecord> {
        let component_type = reference.require_type()?;
        let org_id = ctx.org_id.clone().unwrap_or_default();
        let record = if reference.version == "latest" {
            self.query_one(
                "SELECT * FROM components
                 WHERE publisher = ?1 AND name = ?2 AND component_type = ?3 AND org_id = ?4
                 ORDER BY created_at DESC LIMIT 1",
                rusqlite::params![
                    reference.namespace,
                    reference.name,
                    component_type.as_str(),
                    org_id,
                ],
            )?
        } else {
            self.find_exact(
                &reference.namespace,
                &reference.name,
                &reference.version,
                component_type,
                &org_id,
            )?
        };
        record.ok_or_else(|| RegistryError::NotFound(reference.to_string()))
    }

    /// Search with conjunctive filters, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn search(&self, ctx: &Context, filter: &SearchFilter) -> RegistryResult<Vec<ComponentRecord>> {
        let mut sql = String::from("SELECT * FROM components WHERE org_id = ?1");
        let org_id = ctx.org_id.clone().unwrap_or_default();
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(org_id)];

        if let Some(ty) = filter.component_type {
            params.push(Box::new(ty.as_str().to_string()));
            sql.push_str(&format!(" AND component_type = ?{}", params.len()));
        }
        if let Some(category) = &filter.category {
            params.push(Box::new(category.clone()));
            sql.push_str(&format!(" AND category = ?{}", params.len()));
        }
        if let Some(license) = &filter.license {
            params.push(Box::new(license.clone()));
            sql.push_str(&format!(" AND license = ?{}", params.len()));
        }
        for tag in &filter.tags {
            // Tags are stored as a JSON array; require each one.
            params.push(Box::new(format!("%\"{tag}\"%")));
            sql.push_str(&format!(" AND tags LIKE ?{}", params.len()));
        }
        if let Some(query) = &filter.query {
            params.push(Box::new(format!("%{query}%")));
            sql.push_str(&format!(
                " AND (name LIKE ?{n} OR description LIKE ?{n})",
                n = params.len()
            ));
        }
        let limit = filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        sql.push_str(&format!(" ORDER BY name, version LIMIT {limit}"));

        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(AsRef::as_ref).collect();
            let rows = stmt.query_map(param_refs.as_slice(), row_to_record)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows)
    }

    /// Distinct categories with row counts.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn categories(&self, ctx: &Context) -> RegistryResult<Vec<(String, i64)>> {
        let org_id = ctx.org_id.clone().unwrap_or_default();
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) FROM components
                 WHERE org_id = ?1 AND category IS NOT NULL
                 GROUP BY category ORDER BY category",
            )?;
            let rows = stmt.query_map([org_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows)
    }

    /// Delete a component row; the blob is removed too when no other row
    /// shares its digest.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when nothing matches.
    pub async fn delete(&self, ctx: &Context, reference: &ComponentRef) -> RegistryResult<()> {
        let record = self.get(ctx, reference)?;
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM components WHERE id = ?1", [&record.id])
        })?;

        let still_referenced: bool = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM components WHERE digest = ?1)",
                [&record.digest],
                |row| row.get(0),
            )
        })?;
        if !still_referenced {
            let segments = record.blob_segments();
            let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
            if let Err(e) = self.adapter.delete(ctx, &segment_refs).await {
                debug!(error = %e, "blob already absent during delete");
            }
        }
        Ok(())
    }

    /// Raw blob bytes for a digest.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::BlobNotFound`] when no row carries the
    /// digest or the blob file is gone.
    pub async fn get_blob(&self, ctx: &Context, digest: &str) -> RegistryResult<Vec<u8>> {
        let record = self
            .query_one(
                "SELECT * FROM components WHERE digest = ?1 LIMIT 1",
                rusqlite::params![digest],
            )?
            .ok_or_else(|| RegistryError::BlobNotFound(digest.to_string()))?;
        let segments = record.blob_segments();
        let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        match self.adapter.get(ctx, &segment_refs).await {
            Ok(bytes) => Ok(bytes),
            Err(StorageError::NotFound(_)) => {
                Err(RegistryError::BlobNotFound(digest.to_string()))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every filesystem-sourced row whose `(name, version)` is not
    /// in `discovered`. Returns how many rows were pruned.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn prune_stale_entries(
        &self,
        _ctx: &Context,
        discovered: &HashSet<(String, String)>,
    ) -> RegistryResult<usize> {
        let filesystem_rows: Vec<(String, String, String)> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, version FROM components WHERE source = 'filesystem'",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;

        let mut pruned = 0usize;
        for (id, name, version) in filesystem_rows {
            if !discovered.contains(&(name.clone(), version.clone())) {
                self.db.with_conn(|conn| {
                    conn.execute("DELETE FROM components WHERE id = ?1", [&id])
                })?;
                debug!(name, version, "pruned stale filesystem component");
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn find_exact(
        &self,
        publisher: &str,
        name: &str,
        version: &str,
        component_type: ComponentType,
        org_id: &str,
    ) -> RegistryResult<Option<ComponentRecord>> {
        self.query_one(
            "SELECT * FROM components
             WHERE publisher = ?1 AND name = ?2 AND version = ?3
               AND component_type = ?4 AND org_id = ?5",
            rusqlite::params![publisher, name, version, component_type.as_str(), org_id],
        )
    }

    fn query_one(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> RegistryResult<Option<ComponentRecord>> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(sql, params, row_to_record)
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
        })?;
        Ok(row)
    }

    fn upsert_row(&self, record: &ComponentRecord) -> RegistryResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO components
                 (id, name, version, component_type, publisher, org_id, digest, size,
                  exports, description, tags, category, license, source, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(publisher, name, version, component_type, org_id)
                 DO UPDATE SET digest = excluded.digest, size = excluded.size,
                               exports = excluded.exports, description = excluded.description,
                               tags = excluded.tags, category = excluded.category,
                               license = excluded.license, source = excluded.source,
                               updated_at = excluded.updated_at",
                rusqlite::params![
                    record.id,
                    record.name,
                    record.version,
                    record.component_type.as_str(),
                    record.publisher,
                    record.org_id,
                    record.digest,
                    record.size as i64,
                    serde_json::to_string(&record.exports).unwrap_or_else(|_| "[]".into()),
                    record.description,
                    serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".into()),
                    record.category,
                    record.license,
                    record.source.as_str(),
                    record.created_at,
                    record.updated_at,
                ],
            )
        })?;
        Ok(())
    }
}

/// Extract `(types, publisher, name, version)` from a component
/// directory path.
fn layout_segments(dir: &Path) -> RegistryResult<(String, String, String, String)> {
    let segments: Vec<String> = dir
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let anchor = segments
        .iter()
        .rposition(|s| s == "components")
        .ok_or_else(|| RegistryError::BadLayout(dir.display().to_string()))?;
    let tail = &segments[anchor + 1..];
    if tail.len() != 4 {
        return Err(RegistryError::BadLayout(dir.display().to_string()));
    }
    Ok((
        tail[0].clone(),
        tail[1].clone(),
        tail[2].clone(),
        tail[3].clone(),
    ))
}

/// Read the `<type>.wasm` artifact (or the single `.wasm` file) in a
/// component directory.
async fn read_wasm_artifact(dir: &Path, component_type: ComponentType) -> RegistryResult<Vec<u8>> {
    let preferred = dir.join(format!("{}.wasm", component_type.as_str()));
    match tokio::fs::read(&preferred).await {
        Ok(bytes) => return Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return Err(StorageError::Io(e).into()),
    }

    let mut entries = tokio::fs::read_dir(dir).await.map_err(StorageError::Io)?;
    while let Some(entry) = entries.next_entry().await.map_err(StorageError::Io)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "wasm") {
            return Ok(tokio::fs::read(&path).await.map_err(StorageError::Io)?);
        }
    }
    Err(RegistryError::BadLayout(format!(
        "no .wasm artifact in {}",
        dir.display()
    )))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ComponentRecord> {
    let type_raw: String = row.get("component_type")?;
    let exports_raw: String = row.get("exports")?;
    let tags_raw: String = row.get("tags")?;
    let source_raw: String = row.get("source")?;
    Ok(ComponentRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        version: row.get("version")?,
        component_type: ComponentType::parse(&type_raw).unwrap_or(ComponentType::Reagent),
        publisher: row.get("publisher")?,
        org_id: row.get("org_id")?,
        digest: row.get("digest")?,
        size: row.get::<_, i64>("size")?.max(0) as u64,
        exports: serde_json::from_str(&exports_raw).unwrap_or_default(),
        description: row.get("description")?,
        tags: serde_json::from_str(&tags_raw).unwrap_or_default(),
        category: row.get("category")?,
        license: row.get("license")?,
        source: ComponentSource::from_str_lossy(&source_raw),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyfr_core::RequestId;

    fn ctx() -> Context {
        let mut ctx = Context::unauthenticated(RequestId::new());
        ctx.user_id = "alice".to_string();
        ctx
    }

    fn registry(dir: &Path) -> ComponentRegistry {
        ComponentRegistry::new(Database::in_memory().unwrap(), StorageAdapter::new(dir))
    }

    fn module_with_exports(names: &[&str]) -> Vec<u8> {
        crate::inspect::module_with_exports(names)
    }

    fn attrs(name: &str, version: &str) -> PublishAttrs {
        PublishAttrs {
            name: name.to_string(),
            version: version.to_string(),
            ..PublishAttrs::default()
        }
    }

    #[tokio::test]
    async fn test_publish_writes_blob_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let bytes = module_with_exports(&["add"]);

        let record = registry
            .publish_bytes(&ctx(), &bytes, attrs("math", "1.0.0"))
            .await
            .unwrap();
        assert_eq!(record.component_type, ComponentType::Reagent);
        assert_eq!(record.publisher, "local");
        assert!(record.digest.starts_with("sha256:"));
        assert_eq!(record.exports, vec!["add"]);

        let blob_path = dir
            .path()
            .join("components/reagents/local/math/1.0.0/reagent.wasm");
        assert!(blob_path.exists());

        let fetched = registry
            .get(&ctx(), &ComponentRef::parse("r:local.math:1.0.0").unwrap())
            .unwrap();
        assert_eq!(fetched.digest, record.digest);
    }

    #[tokio::test]
    async fn test_publish_validation() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let bytes = module_with_exports(&["add"]);

        assert!(matches!(
            registry.publish_bytes(&ctx(), &bytes, attrs("X", "1.0.0")).await,
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            registry.publish_bytes(&ctx(), &bytes, attrs("math", "latest")).await,
            Err(RegistryError::InvalidVersion(_))
        ));
        assert!(matches!(
            registry.publish_bytes(&ctx(), b"garbage", attrs("math", "1.0.0")).await,
            Err(RegistryError::InvalidWasm(_))
        ));
    }

    #[tokio::test]
    async fn test_local_republish_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());

        registry
            .publish_bytes(&ctx(), &module_with_exports(&["add"]), attrs("math", "1.0.0"))
            .await
            .unwrap();
        let second = registry
            .publish_bytes(
                &ctx(),
                &module_with_exports(&["add", "sub"]),
                attrs("math", "1.0.0"),
            )
            .await
            .unwrap();
        assert_eq!(second.exports, vec!["add", "sub"]);
    }

    #[tokio::test]
    async fn test_foreign_republish_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let bytes = module_with_exports(&["add"]);
        let mut first = attrs("math", "1.0.0");
        first.publisher = Some("acme".to_string());
        registry.publish_bytes(&ctx(), &bytes, first.clone()).await.unwrap();

        assert!(matches!(
            registry.publish_bytes(&ctx(), &bytes, first).await,
            Err(RegistryError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_resolves_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let bytes = module_with_exports(&["add"]);

        registry
            .publish_bytes(&ctx(), &bytes, attrs("math", "1.0.0"))
            .await
            .unwrap();
        registry
            .publish_bytes(&ctx(), &bytes, attrs("math", "1.1.0"))
            .await
            .unwrap();

        let latest = registry
            .get(&ctx(), &ComponentRef::parse("r:local.math:latest").unwrap())
            .unwrap();
        assert_eq!(latest.version, "1.1.0");
    }

    #[tokio::test]
    async fn test_search_filters() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let bytes = module_with_exports(&["add"]);

        let mut a = attrs("math", "1.0.0");
        a.tags = vec!["arith".to_string(), "pure".to_string()];
        a.category = Some("compute".to_string());
        registry.publish_bytes(&ctx(), &bytes, a).await.unwrap();

        let mut b = attrs("fetcher", "1.0.0");
        b.tags = vec!["net".to_string()];
        registry.publish_bytes(&ctx(), &bytes, b).await.unwrap();

        let by_tag = registry
            .search(
                &ctx(),
                &SearchFilter {
                    tags: vec!["arith".to_string(), "pure".to_string()],
                    ..SearchFilter::default()
                },
            )
            .unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].name, "math");

        let by_query = registry
            .search(
                &ctx(),
                &SearchFilter {
                    query: Some("fetch".to_string()),
                    ..SearchFilter::default()
                },
            )
            .unwrap();
        assert_eq!(by_query.len(), 1);
        assert_eq!(by_query[0].name, "fetcher");

        let by_category = registry
            .search(
                &ctx(),
                &SearchFilter {
                    category: Some("compute".to_string()),
                    ..SearchFilter::default()
                },
            )
            .unwrap();
        assert_eq!(by_category.len(), 1);
    }

    #[tokio::test]
    async fn test_get_blob_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let bytes = module_with_exports(&["add"]);
        let record = registry
            .publish_bytes(&ctx(), &bytes, attrs("math", "1.0.0"))
            .await
            .unwrap();

        let blob = registry.get_blob(&ctx(), &record.digest).await.unwrap();
        assert_eq!(blob, bytes);

        assert!(matches!(
            registry.get_blob(&ctx(), "sha256:ffff").await,
            Err(RegistryError::BlobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_from_directory_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let component_dir = dir.path().join("components/reagents/local/echo/1.0.0");
        std::fs::create_dir_all(&component_dir).unwrap();
        std::fs::write(
            component_dir.join("reagent.wasm"),
            module_with_exports(&["echo"]),
        )
        .unwrap();

        let (first, record) = registry
            .register_from_directory(&ctx(), &component_dir, false)
            .await
            .unwrap();
        assert_eq!(first, RegisterOutcome::Registered);
        assert_eq!(record.source, ComponentSource::Filesystem);

        let (second, _) = registry
            .register_from_directory(&ctx(), &component_dir, false)
            .await
            .unwrap();
        assert_eq!(second, RegisterOutcome::Unchanged);

        let (forced, _) = registry
            .register_from_directory(&ctx(), &component_dir, true)
            .await
            .unwrap();
        assert_eq!(forced, RegisterOutcome::Registered);
    }

    #[tokio::test]
    async fn test_register_rejects_foreign_publisher() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let component_dir = dir.path().join("components/reagents/acme/echo/1.0.0");
        std::fs::create_dir_all(&component_dir).unwrap();
        std::fs::write(
            component_dir.join("reagent.wasm"),
            module_with_exports(&["echo"]),
        )
        .unwrap();

        assert!(matches!(
            registry
                .register_from_directory(&ctx(), &component_dir, false)
                .await,
            Err(RegistryError::PublisherNotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn test_prune_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let component_dir = dir.path().join("components/reagents/local/echo/1.0.0");
        std::fs::create_dir_all(&component_dir).unwrap();
        std::fs::write(
            component_dir.join("reagent.wasm"),
            module_with_exports(&["echo"]),
        )
        .unwrap();
        registry
            .register_from_directory(&ctx(), &component_dir, false)
            .await
            .unwrap();

        // Everything discovered: a no-op.
        let mut discovered = HashSet::new();
        discovered.insert(("echo".to_string(), "1.0.0".to_string()));
        assert_eq!(registry.prune_stale_entries(&ctx(), &discovered).unwrap(), 0);

        // Source gone: the row goes too.
        assert_eq!(
            registry.prune_stale_entries(&ctx(), &HashSet::new()).unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_orphan_blob() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let bytes = module_with_exports(&["add"]);
        let record = registry
            .publish_bytes(&ctx(), &bytes, attrs("math", "1.0.0"))
            .await
            .unwrap();
        let reference = record.reference();

        registry.delete(&ctx(), &reference).await.unwrap();
        assert!(matches!(
            registry.get(&ctx(), &reference),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.get_blob(&ctx(), &record.digest).await,
            Err(RegistryError::BlobNotFound(_))
        ));
    }
}
