//! Backup subsystem: bundle inventory, freshness and retention policy, the
//! per-repository archiver and the sequential batch driver.

pub mod archiver;
pub mod driver;
pub mod freshness;
pub mod inventory;
pub mod retention;

use std::sync::Arc;

use crate::config::Config;
use crate::git::VcsBackend;

pub use driver::{run_batch, BatchSummary};

/// Everything an archive run needs, fixed for the lifetime of the process.
#[derive(Clone)]
pub struct BackupContext {
    pub config: Arc<Config>,
    pub vcs: Arc<dyn VcsBackend>,
}

impl BackupContext {
    pub fn new(config: Arc<Config>, vcs: Arc<dyn VcsBackend>) -> Self {
        Self { config, vcs }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use chrono::{TimeZone, Utc};

    use super::BackupContext;
    use crate::config::{Config, Token};
    use crate::forge::RepoDescriptor;
    use crate::git::VcsBackend;

    /// In-process stand-in for git.  Clones leave a few mirror-like files in
    /// the destination and bundles are small text files.
    #[derive(Default)]
    pub struct FakeVcs {
        pub cloned_urls: Mutex<Vec<String>>,
        /// Clone fails for any URL containing this text.
        pub fail_clone_for: Option<String>,
        pub fail_bundle: bool,
    }

    impl FakeVcs {
        pub fn clone_count(&self) -> usize {
            self.cloned_urls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl VcsBackend for FakeVcs {
        async fn mirror_clone(&self, url: &str, dest: &Path) -> Result<()> {
            self.cloned_urls.lock().unwrap().push(url.to_string());
            if let Some(ref needle) = self.fail_clone_for {
                if url.contains(needle.as_str()) {
                    std::fs::write(dest.join("HEAD"), b"partial")?;
                    bail!("git clone --mirror failed (status 128): fatal: unable to access '{url}'");
                }
            }
            assert_eq!(std::fs::read_dir(dest)?.count(), 0, "clone target must be empty");
            std::fs::create_dir_all(dest.join("objects/pack"))?;
            std::fs::write(dest.join("HEAD"), b"ref: refs/heads/main\n")?;
            std::fs::write(dest.join("objects/pack/pack-1.pack"), b"PACK")?;
            Ok(())
        }

        async fn bundle_create(&self, workdir: &Path, output_name: &str) -> Result<()> {
            if self.fail_bundle {
                bail!("git bundle create failed (status 128): fatal: Refusing to create empty bundle.");
            }
            std::fs::write(workdir.join(output_name), b"# v2 git bundle\n")?;
            Ok(())
        }
    }

    pub fn config(root: &Path, max_backups: Option<usize>) -> Config {
        let mut config = Config::default();
        config.backup.path = Some(root.to_path_buf());
        config.backup.max_backups = max_backups;
        config.github.token = Token::new("ghp_secret");
        config.git.cleanup_retry_delay_ms = 0;
        config
    }

    pub fn context(config: Config, vcs: Arc<FakeVcs>) -> BackupContext {
        BackupContext::new(Arc::new(config), vcs)
    }

    pub fn repo(full_name: &str, pushed_at_ms: Option<i64>) -> RepoDescriptor {
        RepoDescriptor {
            full_name: full_name.to_string(),
            clone_url: format!("https://github.com/{full_name}.git"),
            ssh_url: format!("git@github.com:{full_name}.git"),
            pushed_at: pushed_at_ms.map(|ms| Utc.timestamp_millis_opt(ms).unwrap()),
        }
    }

    pub fn bundle_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".bundle"))
            .collect();
        names.sort();
        names
    }
}
