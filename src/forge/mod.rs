//! Forge backend abstraction layer.
//!
//! The rest of the crate only needs one thing from a forge: the list of
//! repositories owned by the authenticated identity.  [`ForgeBackend`] hides
//! the API, pagination and rate limiting behind that single call.

pub mod github;
pub mod rate_limit;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::Config;

// ---------------------------------------------------------------------------
// Repository descriptor
// ---------------------------------------------------------------------------

/// A repository as reported by the forge listing API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoDescriptor {
    /// `owner/name`; unique within one listing and used as the on-disk key.
    pub full_name: String,
    /// HTTPS clone URL (token transport).
    pub clone_url: String,
    /// SSH clone URL (key transport).
    pub ssh_url: String,
    /// `null` for repositories that have never been pushed to.
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

impl RepoDescriptor {
    /// The repository name without its owner.
    pub fn short_name(&self) -> &str {
        self.full_name
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.full_name)
    }

    /// Epoch milliseconds of the last push, if any.
    pub fn pushed_at_millis(&self) -> Option<i64> {
        self.pushed_at.map(|ts| ts.timestamp_millis())
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait ForgeBackend: Send + Sync {
    /// Every repository owned by the authenticated identity, all pages
    /// consumed.  Any failure here is fatal to the run.
    async fn list_owned_repos(&self) -> Result<Vec<RepoDescriptor>>;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the forge backend for the configured API endpoint.
pub fn build_backend(config: &Config, http_client: reqwest::Client) -> Box<dyn ForgeBackend> {
    Box::new(github::GitHubBackend::new(config, http_client))
}
