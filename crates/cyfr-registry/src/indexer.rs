//! The filesystem auto-indexer.
//!
//! Periodically walks `<base>/components`, registers every discovered
//! component leaf, and prunes rows whose source directory has
//! disappeared. Indexing is best-effort per leaf: one bad directory is
//! reported in the summary, never aborts the pass.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cyfr_core::Context;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::registry::{ComponentRegistry, RegisterOutcome};

/// Delta summary of one index pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndexSummary {
    /// Rows written (new or changed).
    pub registered: usize,
    /// Leaves whose row already matched.
    pub unchanged: usize,
    /// Stale rows removed.
    pub pruned: usize,
    /// Per-leaf failures.
    pub errors: Vec<String>,
}

/// Whether `dir` looks like a component leaf
/// (`components/<types>/<publisher>/<name>/<version>`).
fn is_component_leaf(base: &Path, dir: &Path) -> bool {
    dir.strip_prefix(base)
        .map(|rel| rel.components().count() == 4)
        .unwrap_or(false)
}

/// Run one index pass.
pub async fn run_index(registry: &ComponentRegistry, ctx: &Context) -> IndexSummary {
    let components_root = registry.adapter().base().join("components");
    let mut summary = IndexSummary::default();
    let mut discovered: HashSet<(String, String)> = HashSet::new();

    let leaves: Vec<_> = WalkDir::new(&components_root)
        .min_depth(4)
        .max_depth(4)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| is_component_leaf(&components_root, entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    for leaf in leaves {
        match registry.register_from_directory(ctx, &leaf, false).await {
            Ok((outcome, record)) => {
                discovered.insert((record.name.clone(), record.version.clone()));
                match outcome {
                    RegisterOutcome::Registered => summary.registered += 1,
                    RegisterOutcome::Unchanged => summary.unchanged += 1,
                }
            },
            Err(e) => {
                warn!(dir = %leaf.display(), error = %e, "auto-index failed for component directory");
                summary.errors.push(format!("{}: {e}", leaf.display()));
            },
        }
    }

    match registry.prune_stale_entries(ctx, &discovered) {
        Ok(pruned) => summary.pruned = pruned,
        Err(e) => {
            warn!(error = %e, "prune pass failed");
            summary.errors.push(format!("prune: {e}"));
        },
    }

    if summary.registered > 0 || summary.pruned > 0 || !summary.errors.is_empty() {
        info!(
            registered = summary.registered,
            unchanged = summary.unchanged,
            pruned = summary.pruned,
            errors = summary.errors.len(),
            "auto-index pass"
        );
    }
    summary
}

/// Spawn the periodic auto-indexer task.
pub fn spawn_auto_indexer(
    registry: Arc<ComponentRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let ctx = Context::system();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_index(&registry, &ctx).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyfr_storage::{Database, StorageAdapter};

    fn module() -> Vec<u8> {
        crate::inspect::module_with_exports(&["echo"])
    }

    #[tokio::test]
    async fn test_index_registers_then_reports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            ComponentRegistry::new(Database::in_memory().unwrap(), StorageAdapter::new(dir.path()));
        let ctx = Context::system();

        let leaf = dir.path().join("components/reagents/local/echo/1.0.0");
        std::fs::create_dir_all(&leaf).unwrap();
        std::fs::write(leaf.join("reagent.wasm"), module()).unwrap();

        let first = run_index(&registry, &ctx).await;
        assert_eq!(first.registered, 1);
        assert_eq!(first.unchanged, 0);
        assert!(first.errors.is_empty());

        // No on-disk change: the second pass is all unchanged.
        let second = run_index(&registry, &ctx).await;
        assert_eq!(second.registered, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(first.registered + second.unchanged, 2);
    }

    #[tokio::test]
    async fn test_index_prunes_removed_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            ComponentRegistry::new(Database::in_memory().unwrap(), StorageAdapter::new(dir.path()));
        let ctx = Context::system();

        let leaf = dir.path().join("components/reagents/local/echo/1.0.0");
        std::fs::create_dir_all(&leaf).unwrap();
        std::fs::write(leaf.join("reagent.wasm"), module()).unwrap();
        run_index(&registry, &ctx).await;

        std::fs::remove_dir_all(&leaf).unwrap();
        let summary = run_index(&registry, &ctx).await;
        assert_eq!(summary.pruned, 1);
    }

    #[tokio::test]
    async fn test_index_reports_bad_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            ComponentRegistry::new(Database::in_memory().unwrap(), StorageAdapter::new(dir.path()));
        let ctx = Context::system();

        let leaf = dir.path().join("components/reagents/local/echo/1.0.0");
        std::fs::create_dir_all(&leaf).unwrap();
        std::fs::write(leaf.join("reagent.wasm"), b"not wasm").unwrap();

        let summary = run_index(&registry, &ctx).await;
        assert_eq!(summary.registered, 0);
        assert_eq!(summary.errors.len(), 1);
    }
}
