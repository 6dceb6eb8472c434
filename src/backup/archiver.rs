//! Per-repository archiving: clone → bundle → relocate → cleanup → prune.
//!
//! Each repository owns `{backup_root}/{owner}/{repo}/`.  Bundles sit
//! directly in that directory; the mirror clone is built in the `cloned/`
//! subdirectory and discarded once its bundle has been moved out.  A scratch
//! directory left behind by an interrupted run is removed before anything
//! else happens, which is how partial state gets recovered.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, instrument, warn};

use crate::credentials::{redact, CloneTransport};
use crate::forge::RepoDescriptor;
use crate::git::{recreate_dir, remove_dir_with_retry};

use super::freshness::is_up_to_date;
use super::inventory::{bundle_file_name, scan_bundles};
use super::retention::prune_bundles;
use super::BackupContext;

/// Name of the per-repository scratch directory holding the mirror clone.
pub const SCRATCH_DIR: &str = "cloned";

/// What [`archive_repository`] did for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// A bundle for the latest pushed state already exists.
    UpToDate,
    /// The forge reports no push at all, so there is nothing to bundle.
    NeverPushed,
    /// A new bundle was written; `pruned` lists bundles deleted to honour
    /// the retention limit.
    Created { bundle: PathBuf, pruned: Vec<PathBuf> },
}

/// `{root}/{owner}/{repo}`, refusing names that would escape `root`.
pub fn repo_dir(root: &Path, full_name: &str) -> Result<PathBuf> {
    let mut dir = root.to_path_buf();
    for component in full_name.split('/') {
        if component.is_empty() || component == "." || component == ".." || component.contains('\\')
        {
            bail!("refusing unsafe repository name {full_name:?}");
        }
        dir.push(component);
    }
    Ok(dir)
}

/// Bring the backup of `repo` up to date, producing at most one new bundle.
#[instrument(skip(ctx, repo), fields(repo = %repo.full_name))]
pub async fn archive_repository(ctx: &BackupContext, repo: &RepoDescriptor) -> Result<ArchiveOutcome> {
    let config = &ctx.config;
    let Some(pushed_ms) = repo.pushed_at_millis() else {
        warn!(repo = %repo.full_name, "repository has never been pushed; nothing to back up");
        return Ok(ArchiveOutcome::NeverPushed);
    };

    let retries = config.git.cleanup_retries;
    let retry_delay = config.git.cleanup_retry_delay();

    // 1. Destination exists, stale scratch from a failed run is gone.
    let bundle_dir = repo_dir(config.backup_root(), &repo.full_name)?;
    let scratch = bundle_dir.join(SCRATCH_DIR);
    tokio::fs::create_dir_all(&bundle_dir)
        .await
        .with_context(|| format!("failed to create backup directory {}", bundle_dir.display()))?;
    remove_dir_with_retry(&scratch, retries, retry_delay).await?;

    // 2. Freshness.
    let before = scan_bundles(&bundle_dir)?;
    if is_up_to_date(&before, pushed_ms, config.backup.freshness_match) {
        info!(
            repo = %repo.full_name,
            pushed_at_ms = pushed_ms,
            "backup is up to date; skipping bundle step"
        );
        return Ok(ArchiveOutcome::UpToDate);
    }

    // 3. Fresh scratch directory.
    recreate_dir(&scratch, retries, retry_delay).await?;

    // 4. Transport.
    let transport = CloneTransport::from_config(config);
    let url = transport.clone_url(repo)?;
    let secret = transport.secret();

    // 5. Mirror clone.
    info!(
        repo = %repo.full_name,
        transport = transport.label(),
        dest = %scratch.display(),
        "cloning"
    );
    ctx.vcs
        .mirror_clone(&url, &scratch)
        .await
        .map_err(|e| anyhow!(redact(&format!("{e:#}"), secret)))?;

    // 6. Bundle with every ref.
    let bundle_name = bundle_file_name(repo.short_name(), pushed_ms);
    ctx.vcs
        .bundle_create(&scratch, &bundle_name)
        .await
        .map_err(|e| anyhow!(redact(&format!("{e:#}"), secret)))?;
    info!(repo = %repo.full_name, bundle = %bundle_name, "created bundle");

    // 7. Move it next to the older bundles.
    let produced = scratch.join(&bundle_name);
    let target = bundle_dir.join(&bundle_name);
    tokio::fs::rename(&produced, &target)
        .await
        .with_context(|| {
            format!(
                "failed to move {} to {}",
                produced.display(),
                target.display()
            )
        })?;

    // 8. Drop the mirror clone.
    remove_dir_with_retry(&scratch, retries, retry_delay).await?;

    // 9. Retention, judged against the inventory from before this bundle.
    let pruned = match config.backup.max_backups {
        Some(limit) => prune_bundles(&bundle_dir, &before, limit, 1).await?,
        None => Vec::new(),
    };

    Ok(ArchiveOutcome::Created {
        bundle: target,
        pruned,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
