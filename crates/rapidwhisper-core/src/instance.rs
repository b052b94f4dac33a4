use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("Another instance is already running (pid {0})")]
    AlreadyRunning(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// PID lockfile under the system temp directory.
///
/// Startup reads any existing lockfile and checks whether the recorded PID
/// is still alive; stale locks from crashed instances are overwritten. The
/// lock is removed on drop.
pub struct SingleInstance {
    lock_path: PathBuf,
    acquired: bool,
}

impl SingleInstance {
    pub fn new(app_name: &str) -> Self {
        Self {
            lock_path: std::env::temp_dir().join(format!("{app_name}.lock")),
            acquired: false,
        }
    }

    pub fn lock_path(&self) -> &PathBuf {
        &self.lock_path
    }

    /// PID of a live holder of the lock, if any. Stale and malformed
    /// lockfiles are cleaned up along the way.
    fn live_holder(&self) -> Option<u32> {
        if !self.lock_path.exists() {
            return None;
        }

        let pid = std::fs::read_to_string(&self.lock_path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());

        match pid {
            Some(pid) if pid_is_alive(pid) => Some(pid),
            _ => {
                debug!("removing stale lockfile at {}", self.lock_path.display());
                if let Err(e) = std::fs::remove_file(&self.lock_path) {
                    warn!("failed to remove stale lockfile: {e}");
                }
                None
            }
        }
    }

    pub fn is_already_running(&self) -> bool {
        self.live_holder().is_some()
    }

    /// Take the lock for this process, writing our PID into the lockfile.
    pub fn acquire(&mut self) -> Result<(), InstanceError> {
        if let Some(pid) = self.live_holder() {
            return Err(InstanceError::AlreadyRunning(pid));
        }
        std::fs::write(&self.lock_path, std::process::id().to_string())?;
        self.acquired = true;
        debug!("lock acquired at {}", self.lock_path.display());
        Ok(())
    }

    /// Remove the lockfile if this process holds it.
    pub fn release(&mut self) {
        if self.acquired {
            if let Err(e) = std::fs::remove_file(&self.lock_path) {
                warn!("failed to remove lockfile: {e}");
            }
            self.acquired = false;
        }
    }
}

impl Drop for SingleInstance {
    fn drop(&mut self) {
        self.release();
    }
}

fn pid_is_alive(pid: u32) -> bool {
    let system = sysinfo::System::new_all();
    system.process(sysinfo::Pid::from_u32(pid)).is_some()
}
