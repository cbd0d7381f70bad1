//! Scoped blob I/O over the base directory.
//!
//! The first path segment classifies a request: the global prefixes
//! (`mcp_logs`, `cache`, `components`) resolve under `<base>/` directly,
//! everything else under `<base>/users/<user_id>/`. Swapping this module
//! is the intended path to object storage.

use std::path::{Path, PathBuf};

use cyfr_core::Context;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// First segments that resolve outside the per-user tree.
const GLOBAL_PREFIXES: &[&str] = &["mcp_logs", "cache", "components"];

/// Outcome of a recursive delete.
#[derive(Debug)]
pub enum DeleteTreeOutcome {
    /// Whole tree removed (or it never existed).
    Removed,
    /// Removal aborted; the triggering cause is attached.
    Failed(std::io::Error),
}

/// Scoped filesystem adapter.
#[derive(Debug, Clone)]
pub struct StorageAdapter {
    base: PathBuf,
}

impl StorageAdapter {
    /// Create an adapter rooted at `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The adapter's base directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether `segment` resolves outside the per-user tree. Sandbox
    /// storage imports must refuse these.
    #[must_use]
    pub fn is_global_prefix(segment: &str) -> bool {
        GLOBAL_PREFIXES.contains(&segment)
    }

    /// Resolve `(ctx, segments)` to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidSegment`] for empty segments,
    /// absolute segments, or `.`/`..` traversal.
    pub fn resolve(&self, ctx: &Context, segments: &[&str]) -> StorageResult<PathBuf> {
        if segments.is_empty() {
            return Err(StorageError::InvalidSegment(String::new()));
        }
        for segment in segments {
            if segment.is_empty()
                || *segment == "."
                || *segment == ".."
                || segment.contains('/')
                || segment.contains('\\')
            {
                return Err(StorageError::InvalidSegment((*segment).to_string()));
            }
        }

        let mut path = if GLOBAL_PREFIXES.contains(&segments[0]) {
            self.base.clone()
        } else {
            self.base.join("users").join(&ctx.user_id)
        };
        for segment in segments {
            path.push(segment);
        }
        Ok(path)
    }

    /// Read a file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the file does not exist.
    pub async fn get(&self, ctx: &Context, segments: &[&str]) -> StorageResult<Vec<u8>> {
        let path = self.resolve(ctx, segments)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Write a file, creating missing parents. Overwrites.
    pub async fn put(&self, ctx: &Context, segments: &[&str], bytes: &[u8]) -> StorageResult<()> {
        let path = self.resolve(ctx, segments)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "wrote blob");
        Ok(())
    }

    /// Append to a file, creating it (and missing parents) if absent.
    /// Never truncates existing content.
    pub async fn append(
        &self,
        ctx: &Context,
        segments: &[&str],
        bytes: &[u8],
    ) -> StorageResult<()> {
        use tokio::io::AsyncWriteExt;

        let path = self.resolve(ctx, segments)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Delete a file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the file does not exist,
    /// distinctly from other I/O failures.
    pub async fn delete(&self, ctx: &Context, segments: &[&str]) -> StorageResult<()> {
        let path = self.resolve(ctx, segments)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// List entry names in a directory. A missing directory is the empty
    /// set, not an error.
    pub async fn list(&self, ctx: &Context, segments: &[&str]) -> StorageResult<Vec<String>> {
        let path = self.resolve(ctx, segments)?;
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        Ok(entries)
    }

    /// Whether a path exists.
    pub async fn exists(&self, ctx: &Context, segments: &[&str]) -> StorageResult<bool> {
        let path = self.resolve(ctx, segments)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Recursively delete a tree. Missing trees count as removed.
    pub async fn delete_tree(
        &self,
        ctx: &Context,
        segments: &[&str],
    ) -> StorageResult<DeleteTreeOutcome> {
        let path = self.resolve(ctx, segments)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(DeleteTreeOutcome::Removed),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeleteTreeOutcome::Removed),
            Err(e) => Ok(DeleteTreeOutcome::Failed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyfr_core::RequestId;

    fn ctx_for(user: &str) -> Context {
        let mut ctx = Context::unauthenticated(RequestId::new());
        ctx.user_id = user.to_string();
        ctx
    }

    #[tokio::test]
    async fn test_global_vs_user_scoping() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StorageAdapter::new(dir.path());
        let ctx = ctx_for("alice");

        let global = adapter.resolve(&ctx, &["mcp_logs", "req_1.json"]).unwrap();
        assert_eq!(global, dir.path().join("mcp_logs/req_1.json"));

        let scoped = adapter.resolve(&ctx, &["executions", "e1"]).unwrap();
        assert_eq!(scoped, dir.path().join("users/alice/executions/e1"));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StorageAdapter::new(dir.path());
        let ctx = ctx_for("alice");

        adapter
            .put(&ctx, &["builds", "b1", "build.log"], b"ok")
            .await
            .unwrap();
        let bytes = adapter
            .get(&ctx, &["builds", "b1", "build.log"])
            .await
            .unwrap();
        assert_eq!(bytes, b"ok");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StorageAdapter::new(dir.path());
        let ctx = ctx_for("alice");

        assert!(matches!(
            adapter.get(&ctx, &["nope.txt"]).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StorageAdapter::new(dir.path());
        let ctx = ctx_for("alice");

        adapter
            .append(&ctx, &["audit", "2026-02-01.jsonl"], b"{\"a\":1}\n")
            .await
            .unwrap();
        adapter
            .append(&ctx, &["audit", "2026-02-01.jsonl"], b"{\"b\":2}\n")
            .await
            .unwrap();
        let bytes = adapter
            .get(&ctx, &["audit", "2026-02-01.jsonl"])
            .await
            .unwrap();
        assert_eq!(bytes, b"{\"a\":1}\n{\"b\":2}\n");
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StorageAdapter::new(dir.path());
        let ctx = ctx_for("alice");

        assert!(adapter.list(&ctx, &["no-such-dir"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_distinguishes_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StorageAdapter::new(dir.path());
        let ctx = ctx_for("alice");

        adapter.put(&ctx, &["f.txt"], b"x").await.unwrap();
        adapter.delete(&ctx, &["f.txt"]).await.unwrap();
        assert!(matches!(
            adapter.delete(&ctx, &["f.txt"]).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StorageAdapter::new(dir.path());
        let ctx = ctx_for("alice");

        assert!(matches!(
            adapter.resolve(&ctx, &["..", "etc"]),
            Err(StorageError::InvalidSegment(_))
        ));
        assert!(matches!(
            adapter.resolve(&ctx, &["a/b"]),
            Err(StorageError::InvalidSegment(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_tree() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StorageAdapter::new(dir.path());
        let ctx = ctx_for("alice");

        adapter.put(&ctx, &["tree", "a.txt"], b"1").await.unwrap();
        adapter.put(&ctx, &["tree", "sub", "b.txt"], b"2").await.unwrap();
        let outcome = adapter.delete_tree(&ctx, &["tree"]).await.unwrap();
        assert!(matches!(outcome, DeleteTreeOutcome::Removed));
        assert!(!adapter.exists(&ctx, &["tree"]).await.unwrap());
    }
}
