//! Version-control collaborator.
//!
//! [`VcsBackend`] is the seam between the archiver and the `git` binary:
//! production code uses [`GitCli`], tests substitute an in-process fake.

pub mod commands;
pub mod scratch;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::config::GitConfig;

pub use commands::{git_bundle_create, git_clone_mirror};
pub use scratch::{recreate_dir, remove_dir_with_retry};

#[async_trait::async_trait]
pub trait VcsBackend: Send + Sync {
    /// Mirror-clone `url` (all refs, no working tree) into the existing,
    /// empty directory `dest`.
    async fn mirror_clone(&self, url: &str, dest: &Path) -> Result<()>;

    /// Write a bundle named `output_name` containing every ref of the
    /// repository at `workdir` into `workdir`.
    async fn bundle_create(&self, workdir: &Path, output_name: &str) -> Result<()>;
}

/// [`VcsBackend`] backed by the system `git`.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    timeout: Option<Duration>,
}

impl GitCli {
    pub fn new(config: &GitConfig) -> Self {
        Self {
            timeout: config.timeout(),
        }
    }
}

#[async_trait::async_trait]
impl VcsBackend for GitCli {
    async fn mirror_clone(&self, url: &str, dest: &Path) -> Result<()> {
        git_clone_mirror(url, dest, self.timeout).await
    }

    async fn bundle_create(&self, workdir: &Path, output_name: &str) -> Result<()> {
        git_bundle_create(workdir, output_name, self.timeout).await
    }
}
