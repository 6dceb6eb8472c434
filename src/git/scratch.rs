//! Scratch clone directory management.
//!
//! Mirror clones are written to a throw-away directory next to the bundles
//! and removed once the bundle has been moved out.  Freshly written pack
//! files can be briefly locked, so removal is retried.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

/// Recursively remove `path`, retrying up to `retries` extra times with
/// `delay` between attempts.  A missing path is not an error.
#[instrument(fields(path = %path.display()))]
pub async fn remove_dir_with_retry(path: &Path, retries: u32, delay: Duration) -> Result<()> {
    let mut attempt = 0;
    loop {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!(attempt, "scratch directory removed");
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) if attempt < retries => {
                attempt += 1;
                warn!(attempt, retries, error = %e, "scratch removal failed; retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!(
                        "failed to remove scratch directory {} after {} attempts",
                        path.display(),
                        attempt + 1
                    )
                });
            }
        }
    }
}

/// Create an empty directory at `path`, replacing whatever was there.
pub async fn recreate_dir(path: &Path, retries: u32, delay: Duration) -> Result<()> {
    remove_dir_with_retry(path, retries, delay).await?;
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("failed to create scratch directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_path_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        remove_dir_with_retry(&tmp.path().join("absent"), 3, Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn removes_nested_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = tmp.path().join("cloned");
        std::fs::create_dir_all(scratch.join("objects/pack")).unwrap();
        std::fs::write(scratch.join("objects/pack/p.pack"), b"data").unwrap();
        std::fs::write(scratch.join("HEAD"), b"ref: refs/heads/main").unwrap();

        remove_dir_with_retry(&scratch, 3, Duration::ZERO).await.unwrap();
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn recreate_leaves_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = tmp.path().join("cloned");
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::write(scratch.join("stale"), b"x").unwrap();

        recreate_dir(&scratch, 0, Duration::ZERO).await.unwrap();
        assert!(scratch.is_dir());
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn file_in_place_of_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cloned");
        std::fs::write(&path, b"not a dir").unwrap();

        let err = remove_dir_with_retry(&path, 1, Duration::ZERO).await.unwrap_err();
        assert!(err.to_string().contains("after 2 attempts"));
    }
}
