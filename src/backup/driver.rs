//! Sequential batch driver.
//!
//! Repositories are archived strictly one after another.  A failure is
//! logged with the repository name and the run moves on; only the final
//! [`BatchSummary`] reflects it.

use tracing::{error, info};

use crate::forge::RepoDescriptor;

use super::archiver::{archive_repository, ArchiveOutcome};
use super::BackupContext;

/// Per-run tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub created: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pruned: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.created + self.up_to_date + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Archive every repository in `repos`, isolating failures per repository.
pub async fn run_batch(ctx: &BackupContext, repos: &[RepoDescriptor]) -> BatchSummary {
    info!(
        repos = repos.len(),
        backup_root = %ctx.config.backup_root().display(),
        max_backups = ?ctx.config.backup.max_backups,
        "starting backup run"
    );

    let mut summary = BatchSummary::default();

    for repo in repos {
        match archive_repository(ctx, repo).await {
            Ok(ArchiveOutcome::Created { bundle, pruned }) => {
                info!(
                    repo = %repo.full_name,
                    bundle = %bundle.display(),
                    pruned = pruned.len(),
                    "backup complete"
                );
                summary.created += 1;
                summary.pruned += pruned.len();
            }
            Ok(ArchiveOutcome::UpToDate) => summary.up_to_date += 1,
            Ok(ArchiveOutcome::NeverPushed) => summary.skipped += 1,
            Err(e) => {
                error!(
                    repo = %repo.full_name,
                    error = %format!("{e:#}"),
                    "failed to back up repository"
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        created = summary.created,
        up_to_date = summary.up_to_date,
        skipped = summary.skipped,
        failed = summary.failed,
        pruned = summary.pruned,
        "backup run finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backup::test_support::{bundle_names, config, context, repo, FakeVcs};

    #[tokio::test]
    async fn failure_does_not_stop_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeVcs {
            fail_clone_for: Some("acme/broken".to_string()),
            ..FakeVcs::default()
        });
        let ctx = context(config(tmp.path(), Some(2)), vcs.clone());

        let repos = vec![
            repo("acme/alpha", Some(10)),
            repo("acme/broken", Some(20)),
            repo("acme/empty", None),
            repo("acme/omega", Some(30)),
        ];

        let summary = run_batch(&ctx, &repos).await;

        assert_eq!(
            summary,
            BatchSummary {
                created: 2,
                up_to_date: 0,
                skipped: 1,
                failed: 1,
                pruned: 0,
            }
        );
        assert!(summary.has_failures());
        assert_eq!(summary.total(), 4);
        assert_eq!(vcs.clone_count(), 3);
        assert_eq!(
            bundle_names(&tmp.path().join("acme/omega")),
            vec!["omega-30.bundle"]
        );
    }

    #[tokio::test]
    async fn repeated_runs_report_up_to_date() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeVcs::default());
        let ctx = context(config(tmp.path(), Some(2)), vcs.clone());
        let repos = vec![repo("acme/alpha", Some(10)), repo("acme/beta", Some(20))];

        let first = run_batch(&ctx, &repos).await;
        let second = run_batch(&ctx, &repos).await;

        assert_eq!(first.created, 2);
        assert_eq!(second.up_to_date, 2);
        assert_eq!(second.created, 0);
        assert!(!second.has_failures());
        assert_eq!(vcs.clone_count(), 2);
    }

    #[tokio::test]
    async fn pruned_bundles_are_counted() {
        let tmp = tempfile::tempdir().unwrap();
        let vcs = Arc::new(FakeVcs::default());
        let ctx = context(config(tmp.path(), Some(1)), vcs);

        run_batch(&ctx, &[repo("acme/alpha", Some(10))]).await;
        let summary = run_batch(&ctx, &[repo("acme/alpha", Some(20))]).await;

        assert_eq!(summary.created, 1);
        assert_eq!(summary.pruned, 1);
        assert_eq!(
            bundle_names(&tmp.path().join("acme/alpha")),
            vec!["alpha-20.bundle"]
        );
    }

    #[tokio::test]
    async fn empty_listing_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(config(tmp.path(), None), Arc::new(FakeVcs::default()));
        assert_eq!(run_batch(&ctx, &[]).await, BatchSummary::default());
    }
}
