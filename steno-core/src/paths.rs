//! Base directory resolution and the single-instance pidfile lock.
//!
//! The pidfile is acquired by writing the current pid to a temp file and
//! renaming it into place — the rename is atomic, so concurrent `acquire`
//! callers race on it and at most one wins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, StenoError};

/// Resolved filesystem locations for one daemon instance.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base_dir: PathBuf,
    pub db_path: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub log_path: PathBuf,
}

impl Paths {
    /// Resolve the default base directory (`$XDG_DATA_HOME/steno` or
    /// `$HOME/.local/share/steno`) and the well-known file names beneath it.
    pub fn resolve() -> Self {
        let base_dir = default_base_dir();
        Self::with_base_dir(base_dir)
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            db_path: base_dir.join("steno.sqlite"),
            socket_path: base_dir.join("steno.sock"),
            pid_path: base_dir.join("steno.pid"),
            log_path: base_dir.join("daemon.log"),
            base_dir,
        }
    }

    /// Create the base directory if it does not already exist.
    pub fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

fn default_base_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("steno");
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("steno")
}

/// Advisory single-instance lock backed by a pidfile.
pub struct PidLock {
    pid_path: PathBuf,
    acquired: bool,
}

impl PidLock {
    pub fn new(pid_path: PathBuf) -> Self {
        Self {
            pid_path,
            acquired: false,
        }
    }

    /// Attempt to acquire the lock.
    ///
    /// Succeeds iff there is no pidfile, or the pidfile names a pid that is
    /// not a live process. On success the current pid is written atomically
    /// (write to a sibling `.tmp` file, then rename).
    pub fn acquire(&mut self) -> Result<()> {
        let (running, stale_pid) = is_running(&self.pid_path);
        if running {
            let pid = stale_pid.unwrap_or(0);
            return Err(StenoError::AlreadyRunning(pid));
        }

        let tmp_path = self.pid_path.with_extension("tmp");
        let pid = std::process::id();
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            write!(tmp, "{pid}")?;
            tmp.flush()?;
        }
        fs::rename(&tmp_path, &self.pid_path)?;
        self.acquired = true;
        info!(pid, path = %self.pid_path.display(), "acquired pidfile lock");
        Ok(())
    }

    /// Release the lock, unlinking the pidfile. Idempotent.
    pub fn release(&mut self) {
        if !self.acquired {
            return;
        }
        if let Err(e) = fs::remove_file(&self.pid_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "failed to remove pidfile");
            }
        }
        self.acquired = false;
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Check whether the process named in the pidfile at `pid_path` is alive,
/// without mutating any state.
pub fn is_running(pid_path: &Path) -> (bool, Option<u32>) {
    let Ok(contents) = fs::read_to_string(pid_path) else {
        return (false, None);
    };
    let Ok(pid) = contents.trim().parse::<u32>() else {
        return (false, None);
    };
    (process_alive(pid), Some(pid))
}

/// Zero-signal liveness probe: `kill(pid, 0)` succeeds iff the process
/// exists and we have permission to signal it.
fn process_alive(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    ret == 0
}
