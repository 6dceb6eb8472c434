//! Bundle inventory scanning.
//!
//! Bundles live directly under `{backup_root}/{owner}/{repo}/` and are named
//! `{repo}-{pushed_at_millis}.bundle`.  The embedded timestamp is the only
//! record of which upstream state a bundle captures, so the inventory is
//! always rebuilt from a fresh directory listing.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

/// File suffix shared by every bundle the archiver writes.
pub const BUNDLE_SUFFIX: &str = ".bundle";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One bundle file found on disk.
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub name: String,
    pub path: PathBuf,
    /// Epoch milliseconds parsed from the file name.
    pub created_ms: i64,
    pub metadata: Metadata,
}

/// All bundles in one repository directory, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct BundleInventory {
    entries: BTreeMap<String, BundleEntry>,
}

impl BundleInventory {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &BundleEntry> {
        self.entries.values()
    }

    /// Entries sorted by ascending timestamp.  Equal timestamps keep file
    /// name order.
    pub fn oldest_first(&self) -> Vec<&BundleEntry> {
        let mut sorted: Vec<&BundleEntry> = self.entries.values().collect();
        sorted.sort_by_key(|e| e.created_ms);
        sorted
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Build the bundle file name for a repository state.
pub fn bundle_file_name(short_name: &str, pushed_at_ms: i64) -> String {
    format!("{short_name}-{pushed_at_ms}{BUNDLE_SUFFIX}")
}

/// Extract the trailing `-<digits>` timestamp from a bundle file name.
///
/// A name that carries the suffix but no numeric timestamp is treated as
/// corruption and reported, never skipped.
pub fn parse_bundle_timestamp(name: &str) -> Result<i64> {
    let Some(stem) = name.strip_suffix(BUNDLE_SUFFIX) else {
        bail!("{name:?} is not a bundle file name");
    };
    let Some((_, digits)) = stem.rsplit_once('-') else {
        bail!("bundle file {name:?} has no '-<timestamp>' segment");
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        bail!("bundle file {name:?} has a non-numeric timestamp {digits:?}");
    }
    digits
        .parse::<i64>()
        .with_context(|| format!("bundle file {name:?} has an out-of-range timestamp"))
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// List every bundle in `dir`, creating the directory first if needed.
pub fn scan_bundles(dir: &Path) -> Result<BundleInventory> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create bundle directory: {}", dir.display()))?;

    let listing = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read bundle directory: {}", dir.display()))?;

    let mut entries = BTreeMap::new();
    for entry in listing {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let file_name = entry.file_name();
        if !file_name
            .as_encoded_bytes()
            .ends_with(BUNDLE_SUFFIX.as_bytes())
        {
            continue;
        }

        let path = entry.path();
        let metadata = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if !metadata.is_file() {
            continue;
        }

        let Some(name) = file_name.to_str() else {
            bail!(
                "corrupt bundle inventory in {}: {file_name:?} is not valid UTF-8",
                dir.display()
            );
        };

        let created_ms = parse_bundle_timestamp(name)
            .with_context(|| format!("corrupt bundle inventory in {}", dir.display()))?;

        entries.insert(
            name.to_string(),
            BundleEntry {
                name: name.to_string(),
                path,
                created_ms,
                metadata,
            },
        );
    }

    debug!(dir = %dir.display(), bundles = entries.len(), "scanned bundle inventory");
    Ok(BundleInventory { entries })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
