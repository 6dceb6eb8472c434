//! Git command wrappers using [`tokio::process::Command`].
//!
//! Every function in this module shells out to the system `git` binary.
//! Output is captured, never inherited, so a successful run stays quiet and a
//! failed one reports git's stderr.  Clone URLs can carry credentials and are
//! therefore kept out of tracing spans.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, instrument};

/// ssh invocation used when the environment does not supply its own: host key
/// and passphrase prompts fail instead of waiting on the terminal.
const BATCH_SSH_COMMAND: &str = "ssh -o BatchMode=yes";

// ---------------------------------------------------------------------------
// Clone
// ---------------------------------------------------------------------------

/// Run `git clone --mirror <url> .` inside `dest`.
///
/// `dest` must already exist and be empty.
#[instrument(skip(url), fields(dest = %dest.display()))]
pub async fn git_clone_mirror(url: &str, dest: &Path, timeout: Option<Duration>) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("clone").arg("--mirror").arg(url).arg(".").current_dir(dest);

    debug!("spawning git clone --mirror");
    run_command(cmd, "git clone --mirror", timeout).await?;
    debug!("git clone --mirror succeeded");
    Ok(())
}

// ---------------------------------------------------------------------------
// Bundle create
// ---------------------------------------------------------------------------

/// Run `git bundle create <output_name> --all` inside `repo_path`, writing
/// the bundle next to the repository data.
#[instrument(fields(repo = %repo_path.display(), %output_name))]
pub async fn git_bundle_create(
    repo_path: &Path,
    output_name: &str,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("bundle")
        .arg("create")
        .arg(output_name)
        .arg("--all")
        .current_dir(repo_path);

    debug!("spawning git bundle create");
    run_command(cmd, "git bundle create", timeout).await?;
    debug!("git bundle create succeeded");
    Ok(())
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Spawn `cmd`, wait for it to exit, and turn a non-zero status or an elapsed
/// `timeout` into an error.  A timed-out child is killed.
pub(crate) async fn run_command(
    mut cmd: Command,
    what: &str,
    timeout: Option<Duration>,
) -> Result<Output> {
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    if std::env::var_os("GIT_SSH_COMMAND").is_none() {
        cmd.env("GIT_SSH_COMMAND", BATCH_SSH_COMMAND);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| anyhow!("{what} timed out after {}s", limit.as_secs_f64()))?,
        None => cmd.output().await,
    }
    .with_context(|| format!("failed to spawn {what}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{what} failed (status {}): {}", output.status, stderr.trim());
    }

    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
