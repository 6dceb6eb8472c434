mod backup;
mod config;
mod credentials;
mod forge;
mod git;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::backup::{run_batch, BackupContext, BatchSummary};
use crate::config::{ConfigError, Overrides};
use crate::git::GitCli;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "forgebackup",
    version,
    about = "Back up every repository you own as rotating git bundles"
)]
struct Cli {
    /// Path to an optional YAML configuration file.
    #[arg(short, long, env = "FORGEBACKUP_CONFIG")]
    config: Option<PathBuf>,

    /// Backup root directory; wins over BACKUP_PATH and the config file.
    #[arg(long)]
    backup_path: Option<PathBuf>,

    /// Bundles kept per repository; wins over MAX_BACKUPS and the config file.
    #[arg(long)]
    max_backups: Option<usize>,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

const EXIT_FATAL: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_REPO_FAILURES: u8 = 3;

fn batch_exit_code(summary: &BatchSummary, exit_nonzero_on_failure: bool) -> u8 {
    if summary.has_failures() && exit_nonzero_on_failure {
        EXIT_REPO_FAILURES
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

async fn run(cli: Cli) -> Result<u8> {
    // ---- Config ----
    let overrides = Overrides {
        backup_path: cli.backup_path,
        max_backups: cli.max_backups,
    };
    let config = Arc::new(config::load_config(cli.config.as_deref(), &overrides)?);

    tracing::info!(
        api_url = %config.github.api_url,
        backup_root = %config.backup_root().display(),
        max_backups = ?config.backup.max_backups,
        use_ssh_url = config.backup.use_ssh_url,
        freshness_match = ?config.backup.freshness_match,
        "starting forgebackup"
    );

    // ---- Forge listing ----
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("forgebackup/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build reqwest client")?;
    let forge = forge::build_backend(&config, http_client);
    let repos = forge
        .list_owned_repos()
        .await
        .context("failed to list repositories")?;

    // ---- Archive ----
    let ctx = BackupContext::new(Arc::clone(&config), Arc::new(GitCli::new(&config.git)));
    let summary = run_batch(&ctx, &repos).await;

    tracing::info!(repos = summary.total(), "forgebackup finished");
    Ok(batch_exit_code(&summary, config.exit_nonzero_on_failure))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
            tracing::error!(error = %format!("{e:#}"), "invalid configuration");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "backup run aborted");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
