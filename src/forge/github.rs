//! GitHub / GitHub Enterprise repository listing.

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use tracing::{debug, info};

use crate::config::{Config, Token};

use super::rate_limit::RateLimitState;
use super::{ForgeBackend, RepoDescriptor};

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";

// ---------------------------------------------------------------------------
// Backend struct
// ---------------------------------------------------------------------------

pub struct GitHubBackend {
    http_client: reqwest::Client,
    api_url: String,
    token: Token,
    page_size: u32,
    rate_limit_buffer: u32,
    rate_limit: RateLimitState,
}

impl GitHubBackend {
    pub fn new(config: &Config, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            api_url: config.github.api_url.trim_end_matches('/').to_string(),
            token: config.github.token.clone(),
            page_size: config.github.page_size,
            rate_limit_buffer: config.github.rate_limit_buffer,
            rate_limit: RateLimitState::new(),
        }
    }

    fn first_page_url(&self) -> String {
        format!(
            "{}/user/repos?type=owner&per_page={}&page=1",
            self.api_url, self.page_size
        )
    }
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl ForgeBackend for GitHubBackend {
    async fn list_owned_repos(&self) -> Result<Vec<RepoDescriptor>> {
        let mut repos = Vec::new();
        let mut next = Some(self.first_page_url());
        let mut page = 0u32;

        while let Some(url) = next.take() {
            self.rate_limit.wait_if_needed(self.rate_limit_buffer).await;

            let resp = self
                .http_client
                .get(&url)
                .bearer_auth(self.token.expose())
                .header(ACCEPT, ACCEPT_GITHUB_JSON)
                .header("X-GitHub-Api-Version", "2022-11-28")
                .send()
                .await
                .context("repository listing request failed")?;

            self.rate_limit.update_from_headers(resp.headers());

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "repository listing failed (status {status}): {}",
                    body.trim()
                );
            }

            next = next_page_url(resp.headers());

            let batch: Vec<RepoDescriptor> = resp
                .json()
                .await
                .context("failed to parse repository listing")?;

            page += 1;
            debug!(
                page,
                count = batch.len(),
                rate_limit_remaining = self.rate_limit.remaining(),
                "fetched repository page"
            );
            repos.extend(batch);
        }

        info!(count = repos.len(), pages = page, "listed owned repositories");
        Ok(repos)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pull the `rel="next"` target out of an RFC 8288 `Link` header.
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    parse_next_link(link)
}

fn parse_next_link(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
