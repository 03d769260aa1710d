use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Advisory single-instance lock: a file holding the owner's PID. A lock
/// left by a dead process is replaced; a live one aborts the run.
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    pub fn acquire(path: PathBuf) -> Result<Self> {
        if let Ok(raw) = fs::read_to_string(&path) {
            if let Ok(pid) = raw.trim().parse::<u32>() {
                if pid_alive(pid) {
                    bail!("another run is in progress (pid {pid}, lock {})", path.display());
                }
                tracing::warn!(pid, "replacing stale lock {}", path.display());
            }
            fs::remove_file(&path)
                .with_context(|| format!("cannot remove stale lock {}", path.display()))?;
        }

        fs::write(&path, format!("{}\n", std::process::id()))
            .with_context(|| format!("cannot write lock {}", path.display()))?;
        Ok(PidLock { path })
    }
}

fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
