//! Lock file management for watcher exclusivity
//!
//! One vault gets at most one live watcher. The lock is a flock-held file
//! under `.vellum/locks/` whose JSON body names the holder, so `status` can
//! report who is watching and a crashed holder can be detected and cleared.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Watcher lock file handle
pub struct VaultLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
pub struct LockContent {
    pub pid: u32,
    pub started_at: i64,
}

impl VaultLock {
    /// Acquire the exclusive watcher lock for the vault
    ///
    /// Returns error if:
    /// - Lock is already held by a running process
    /// - Permission denied
    pub fn acquire(vellum_dir: &Path) -> Result<Self> {
        let lock_path = vellum_dir.join("locks/watch.lock");

        // Ensure locks directory exists
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create locks directory")?;
        }

        // Try to open/create lock file
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .context("Failed to open lock file")?;

        // Try to acquire exclusive lock (non-blocking)
        if !try_flock_exclusive(&file)? {
            // Lock held - check if stale
            if Self::is_stale_lock(&mut file)? {
                // Force remove stale lock and retry
                tracing::warn!("Removing stale watcher lock");
                drop(file);
                std::fs::remove_file(&lock_path)?;
                return Self::acquire(vellum_dir); // Retry
            } else {
                anyhow::bail!("A watcher is already running for this vault");
            }
        }

        // Write PID to lock file
        Self::write_lock_content(&mut file)?;

        Ok(Self {
            path: lock_path,
            file,
        })
    }

    /// Who currently holds the watcher lock, if anyone alive does
    pub fn holder(vellum_dir: &Path) -> Result<Option<LockContent>> {
        let lock_path = vellum_dir.join("locks/watch.lock");
        let mut file = match File::open(&lock_path) {
            Ok(file) => file,
            Err(_) => return Ok(None),
        };

        if try_flock_exclusive(&file)? {
            // Nobody was holding it; the flock releases when `file` drops
            return Ok(None);
        }

        match Self::read_lock_content(&mut file) {
            Ok(content) => Ok(Some(content)),
            // Held but mid-rewrite; report unknown rather than a bad pid
            Err(_) => Ok(None),
        }
    }

    /// Release the watcher lock
    pub fn release(self) -> Result<()> {
        // File lock is released when the handle drops, but remove the
        // file eagerly so the next status read is clean
        std::fs::remove_file(&self.path)
            .context("Failed to remove lock file")?;
        Ok(())
    }

    /// Check if lock file represents a stale lock
    fn is_stale_lock(file: &mut File) -> Result<bool> {
        match Self::read_lock_content(file) {
            Ok(content) => {
                // Check if process is alive
                Ok(!is_process_alive(content.pid))
            }
            Err(_) => {
                // If we can't read lock content, assume it's stale
                Ok(true)
            }
        }
    }

    /// Write lock content (PID + timestamp)
    fn write_lock_content(file: &mut File) -> Result<()> {
        let content = LockContent {
            pid: std::process::id(),
            started_at: vellum_core::now_ms(),
        };

        let serialized = serde_json::to_string(&content)
            .context("Failed to serialize lock content")?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Read lock content from file
    fn read_lock_content(file: &mut File) -> Result<LockContent> {
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let content: LockContent = serde_json::from_str(&contents)
            .context("Failed to deserialize lock content")?;
        Ok(content)
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        // Ensure lock file is removed on drop
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Check if process is alive
#[cfg(target_os = "macos")]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // Null signal checks existence without delivering anything
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false, // No such process
        Err(_) => true,                         // Permission denied or other - assume alive
    }
}

#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    // Check /proc/<pid> directory exists
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn is_process_alive(_pid: u32) -> bool {
    // Conservative: assume process is alive on unknown platforms
    true
}
