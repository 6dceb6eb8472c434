use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::backup::freshness::FreshnessMatch;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration problems detected at startup, before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("environment variable {name} has invalid value {value:?} (expected {expected})")]
    InvalidEnv {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("authentication token missing: environment variable {0} is unset or empty")]
    MissingToken(String),

    #[error("cannot determine default backup path: {0}")]
    BackupRoot(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// Forge API token. `Debug` never prints the secret.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub git: GitConfig,
    /// Exit with a distinct status when any repository failed to archive.
    #[serde(default = "bool_true")]
    pub exit_nonzero_on_failure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GithubConfig::default(),
            backup: BackupConfig::default(),
            git: GitConfig::default(),
            exit_nonzero_on_failure: true,
        }
    }
}

impl Config {
    /// Root directory under which `<owner>/<repo>` bundle directories live.
    pub fn backup_root(&self) -> &Path {
        self.backup.path.as_deref().unwrap_or_else(|| Path::new("."))
    }
}

fn bool_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// Full URL to the API root (e.g. `https://ghe.corp.example.com/api/v3`).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Name of the environment variable that holds the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// When set, token-transport clone URLs embed `username:token@`.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Minimum number of API calls to keep in reserve before self-throttling.
    #[serde(default = "default_rate_limit_buffer")]
    pub rate_limit_buffer: u32,
    /// Resolved from `token_env` at load time.
    #[serde(skip)]
    pub token: Token,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            username: None,
            page_size: default_page_size(),
            rate_limit_buffer: default_rate_limit_buffer(),
            token: Token::default(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_rate_limit_buffer() -> u32 {
    10
}

// ---------------------------------------------------------------------------
// Backup policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupConfig {
    /// Backup root. Defaults to the directory containing the executable.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Maximum bundles kept per repository. `None` disables pruning.
    #[serde(default)]
    pub max_backups: Option<usize>,
    /// Clone over SSH instead of the token-authenticated HTTPS URL.
    #[serde(default)]
    pub use_ssh_url: bool,
    #[serde(default)]
    pub freshness_match: FreshnessMatch,
}

// ---------------------------------------------------------------------------
// Git subprocesses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GitConfig {
    /// Upper bound (seconds) on a single clone or bundle invocation. `0`
    /// disables the limit.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts at removing the scratch clone before giving up.
    #[serde(default = "default_cleanup_retries")]
    pub cleanup_retries: u32,
    #[serde(default = "default_cleanup_retry_delay_ms")]
    pub cleanup_retry_delay_ms: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            cleanup_retries: default_cleanup_retries(),
            cleanup_retry_delay_ms: default_cleanup_retry_delay_ms(),
        }
    }
}

impl GitConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn cleanup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_retry_delay_ms)
    }
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_cleanup_retries() -> u32 {
    10
}

fn default_cleanup_retry_delay_ms() -> u64 {
    100
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Values supplied on the command line. They win over both the file and the
/// environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backup_path: Option<PathBuf>,
    pub max_backups: Option<usize>,
}

/// Load the configuration from an optional YAML file, the process
/// environment, and command-line overrides, then validate it.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<Config, ConfigError> {
    load_config_with(path, overrides, |name| std::env::var(name).ok())
}

/// Like [`load_config`] but reads environment variables through `lookup`.
pub fn load_config_with<F>(
    path: Option<&Path>,
    overrides: &Overrides,
    lookup: F,
) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, &lookup)?;

    if let Some(ref backup_path) = overrides.backup_path {
        config.backup.path = Some(backup_path.clone());
    }
    if let Some(max_backups) = overrides.max_backups {
        config.backup.max_backups = Some(max_backups);
    }

    let token = lookup(config.github.token_env.as_str())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingToken(config.github.token_env.clone()))?;
    config.github.token = Token::new(token);

    if config.backup.path.is_none() {
        config.backup.path = Some(default_backup_root()?);
    }

    validate_config(&config)?;
    Ok(config)
}

/// Apply the environment keys the tool has always honoured.
///
/// Empty values are treated as unset, matching the usual `.env` convention.
fn apply_env_overrides<F>(config: &mut Config, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("GITHUB_API_URL") {
        config.github.api_url = v;
    }
    if let Some(v) = get("GITHUB_USERNAME") {
        config.github.username = Some(v);
    }
    if let Some(v) = get("BACKUP_PATH") {
        config.backup.path = Some(PathBuf::from(v));
    }
    if let Some(v) = get("MAX_BACKUPS") {
        let parsed = v.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnv {
            name: "MAX_BACKUPS",
            value: v.clone(),
            expected: "a positive integer",
        })?;
        config.backup.max_backups = Some(parsed);
    }
    if let Some(v) = get("USE_SSH_URL") {
        config.backup.use_ssh_url = parse_bool(&v).ok_or(ConfigError::InvalidEnv {
            name: "USE_SSH_URL",
            value: v.clone(),
            expected: "true or false",
        })?;
    }
    if let Some(v) = get("FRESHNESS_MATCH") {
        config.backup.freshness_match =
            FreshnessMatch::parse(&v).ok_or(ConfigError::InvalidEnv {
                name: "FRESHNESS_MATCH",
                value: v.clone(),
                expected: "substring or exact",
            })?;
    }
    if let Some(v) = get("GIT_TIMEOUT_SECS") {
        config.git.timeout_secs = v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
            name: "GIT_TIMEOUT_SECS",
            value: v.clone(),
            expected: "a number of seconds",
        })?;
    }

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn default_backup_root() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe().map_err(ConfigError::BackupRoot)?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.backup.max_backups == Some(0) {
        return Err(ConfigError::Invalid(
            "max_backups must be at least 1".to_string(),
        ));
    }
    if !(1..=100).contains(&config.github.page_size) {
        return Err(ConfigError::Invalid(
            "github.page_size must be 1-100".to_string(),
        ));
    }
    if config.github.api_url.trim().is_empty() {
        return Err(ConfigError::Invalid("github.api_url is empty".to_string()));
    }
    if matches!(config.github.username.as_deref(), Some(u) if u.contains(['@', ':', '/'])) {
        return Err(ConfigError::Invalid(
            "github.username must not contain '@', ':' or '/'".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
