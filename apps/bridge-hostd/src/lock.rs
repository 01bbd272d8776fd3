use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Single-instance guard (spec §6 exit code `2`): a PID file at a fixed
/// path, created exclusively so a second `start` on the same machine fails
/// fast instead of racing the first for the transport and the provider.
pub struct InstanceLock {
    path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another instance is already running (lock held at {0})")]
    AlreadyRunning(String),
    #[error("failed to create lock file at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl InstanceLock {
    pub fn default_path() -> PathBuf {
        std::env::var("BRIDGE_HOSTD_LOCK")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("bridge-hostd.lock"))
    }

    /// Atomically creates the lock file, failing if a live holder's PID is
    /// already recorded there. A lock file left behind by a process that no
    /// longer exists is treated as stale and reclaimed.
    pub fn acquire(path: PathBuf) -> Result<Self, LockError> {
        if let Ok(existing) = fs::read_to_string(&path) {
            if let Ok(pid) = existing.trim().parse::<u32>() {
                if process_is_alive(pid) {
                    return Err(LockError::AlreadyRunning(path.display().to_string()));
                }
            }
            let _ = fs::remove_file(&path);
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.display().to_string(),
                source,
            })?;
        write!(file, "{}", std::process::id()).map_err(|source| LockError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self { path })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    // No portable liveness check without an extra dependency; treat any
    // recorded PID as live so a stale lock on non-Unix targets still fails
    // closed rather than silently racing a second instance.
    true
}
