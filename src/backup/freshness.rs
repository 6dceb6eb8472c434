//! Decides whether an existing bundle already captures the latest pushed
//! state of a repository.

use serde::Deserialize;

use super::inventory::BundleInventory;

/// How a bundle is matched against the latest `pushed_at` timestamp.
///
/// `Substring` is the historical behaviour and stays the default: a bundle
/// counts as current when its file name merely *contains* the timestamp
/// digits. That can false-positive when the timestamp happens to appear
/// inside a longer number. `Exact` compares the parsed timestamp field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessMatch {
    #[default]
    Substring,
    Exact,
}

impl FreshnessMatch {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "substring" => Some(Self::Substring),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }
}

/// Return `true` when some bundle in `inventory` already represents
/// `latest_ms`.
pub fn is_up_to_date(inventory: &BundleInventory, latest_ms: i64, mode: FreshnessMatch) -> bool {
    if inventory.is_empty() {
        return false;
    }
    match mode {
        FreshnessMatch::Substring => {
            let needle = latest_ms.to_string();
            inventory.names().any(|name| name.contains(&needle))
        }
        FreshnessMatch::Exact => inventory.entries().any(|e| e.created_ms == latest_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::inventory::scan_bundles;

    fn inventory_with(names: &[&str]) -> (tempfile::TempDir, BundleInventory) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let inventory = scan_bundles(dir.path()).unwrap();
        (dir, inventory)
    }

    #[test]
    fn matching_timestamp_is_fresh() {
        let (_dir, inv) = inventory_with(&["repo-1700000000000.bundle"]);
        assert!(is_up_to_date(&inv, 1_700_000_000_000, FreshnessMatch::Substring));
        assert!(is_up_to_date(&inv, 1_700_000_000_000, FreshnessMatch::Exact));
    }

    #[test]
    fn newer_timestamp_is_stale() {
        let (_dir, inv) = inventory_with(&["repo-1700000000000.bundle"]);
        assert!(!is_up_to_date(&inv, 1_700_000_000_001, FreshnessMatch::Substring));
        assert!(!is_up_to_date(&inv, 1_700_000_000_001, FreshnessMatch::Exact));
    }

    #[test]
    fn empty_inventory_is_stale() {
        let (_dir, inv) = inventory_with(&[]);
        assert!(!is_up_to_date(&inv, 1, FreshnessMatch::Substring));
    }

    #[test]
    fn substring_mode_accepts_embedded_digits() {
        // 17000 appears inside 1700000000000; only substring mode is fooled.
        let (_dir, inv) = inventory_with(&["repo-1700000000000.bundle"]);
        assert!(is_up_to_date(&inv, 17000, FreshnessMatch::Substring));
        assert!(!is_up_to_date(&inv, 17000, FreshnessMatch::Exact));
    }

    #[test]
    fn substring_mode_matches_repo_name_digits() {
        let (_dir, inv) = inventory_with(&["build2024-1.bundle"]);
        assert!(is_up_to_date(&inv, 2024, FreshnessMatch::Substring));
        assert!(!is_up_to_date(&inv, 2024, FreshnessMatch::Exact));
    }

    #[test]
    fn parse_mode_names() {
        assert_eq!(FreshnessMatch::parse("Exact"), Some(FreshnessMatch::Exact));
        assert_eq!(FreshnessMatch::parse("substring"), Some(FreshnessMatch::Substring));
        assert_eq!(FreshnessMatch::parse("fuzzy"), None);
    }
}
