//! Retention pruning: keep at most `max_backups` bundles per repository.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::inventory::BundleInventory;

/// Delete the oldest bundles so that the directory holds at most `limit`
/// bundles once the `added` new ones are counted.
///
/// `before` is the inventory taken *before* this run wrote its bundles.  Each
/// new bundle displaces at most one old one, so no more than `added` files
/// are removed per call.  Returns the removed paths, oldest first.
#[instrument(skip(before), fields(dir = %dir.display(), existing = before.len()))]
pub async fn prune_bundles(
    dir: &Path,
    before: &BundleInventory,
    limit: usize,
    added: usize,
) -> Result<Vec<PathBuf>> {
    let mut remaining = before.len();
    if remaining + added <= limit {
        return Ok(Vec::new());
    }

    info!(dir = %dir.display(), limit, "pruning backups");

    let mut pruned = Vec::new();
    for entry in before.oldest_first() {
        if remaining + added <= limit || pruned.len() >= added {
            break;
        }
        tokio::fs::remove_file(&entry.path)
            .await
            .with_context(|| format!("failed to prune bundle {}", entry.path.display()))?;
        info!(
            path = %entry.path.display(),
            created_ms = entry.created_ms,
            size_bytes = entry.metadata.len(),
            "pruned bundle"
        );
        remaining -= 1;
        pruned.push(entry.path.clone());
    }

    Ok(pruned)
}
