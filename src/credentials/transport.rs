use anyhow::{bail, Result};

use crate::config::{Config, Token};
use crate::forge::RepoDescriptor;

/// How a repository is fetched from the forge.
///
/// Resolved once per archive call from the configuration, so URL rewriting
/// never depends on ad-hoc flag combinations at the call site.
#[derive(Clone, PartialEq, Eq)]
pub enum CloneTransport {
    /// `ssh_url`, authenticated by the local SSH agent or key.
    Ssh,
    /// `clone_url` as published by the forge.
    Token,
    /// `clone_url` with `username:token@` embedded before the host.
    TokenWithUsername { username: String, token: Token },
}

impl CloneTransport {
    pub fn from_config(config: &Config) -> Self {
        if config.backup.use_ssh_url {
            return Self::Ssh;
        }
        match config.github.username {
            Some(ref username) => Self::TokenWithUsername {
                username: username.clone(),
                token: config.github.token.clone(),
            },
            None => Self::Token,
        }
    }

    /// The URL git should clone `repo` from.
    pub fn clone_url(&self, repo: &RepoDescriptor) -> Result<String> {
        match self {
            Self::Ssh => Ok(repo.ssh_url.clone()),
            Self::Token => Ok(repo.clone_url.clone()),
            Self::TokenWithUsername { username, token } => {
                embed_credentials(&repo.clone_url, username, token.expose())
            }
        }
    }

    /// Secret text that must never reach logs or error messages.
    pub fn secret(&self) -> Option<&str> {
        match self {
            Self::TokenWithUsername { token, .. } => Some(token.expose()),
            _ => None,
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Token => "token",
            Self::TokenWithUsername { .. } => "token+username",
        }
    }
}

impl std::fmt::Debug for CloneTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenWithUsername { username, .. } => f
                .debug_struct("TokenWithUsername")
                .field("username", username)
                .finish_non_exhaustive(),
            other => f.write_str(other.label()),
        }
    }
}

/// Insert `username:token@` right after `scheme://`.
fn embed_credentials(url: &str, username: &str, token: &str) -> Result<String> {
    let Some((scheme, rest)) = url.split_once("://") else {
        bail!("clone URL has no scheme; cannot embed credentials");
    };
    Ok(format!("{scheme}://{username}:{token}@{rest}"))
}

/// Replace every occurrence of `secret` in `text` with `***`.
pub fn redact(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => text.replace(s, "***"),
        _ => text.to_string(),
    }
}
