use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// Run the external export fetcher (`EXPORT_FETCH_COMMAND`) in the downloads
/// directory with a wall-clock timeout. The command is expected to drop a
/// fresh CSV there; its stdout and stderr are captured for the log.
pub async fn fetch_export(command: &str, timeout_secs: u64, downloads_dir: &Path) -> Result<()> {
    tracing::info!(timeout_secs, "running export fetcher: {command}");

    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(downloads_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("cannot start the export fetcher")?;

    let output = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        child.wait_with_output(),
    )
    .await
    .map_err(|_| anyhow::anyhow!("export fetcher timed out after {timeout_secs} s"))?
    .context("export fetcher failed to run")?;

    if !output.stdout.is_empty() {
        tracing::debug!("fetcher stdout: {}", String::from_utf8_lossy(&output.stdout));
    }
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "export fetcher exited with {}: {}",
            output.status,
            stderr.trim().chars().take(500).collect::<String>()
        );
    }
    Ok(())
}
