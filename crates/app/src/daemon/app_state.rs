//! Application directory layout and the single-instance lock
//!
//! Everything rmount persists lives under one directory (`~/.rmount` unless
//! overridden): the encrypted configuration, the generated rclone config, the
//! rclone VFS cache, logs, and the lock file held by the process that owns
//! the directory.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use common::store::CONFIG_FILE_NAME;

use super::driver::{CACHE_DIR_NAME, RCLONE_CONFIG_FILE_NAME};

pub const APP_NAME: &str = "rmount";
pub const LOCK_FILE_NAME: &str = "rmount.lock";
pub const LOGS_DIR_NAME: &str = "logs";

/// Paths of an rmount directory
#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the rmount directory (~/.rmount or custom)
    pub rmount_dir: PathBuf,
    /// Encrypted configuration
    pub config_path: PathBuf,
    /// Generated rclone connection config (cleartext credentials)
    pub rclone_config_path: PathBuf,
    /// rclone VFS cache
    pub cache_path: PathBuf,
    pub logs_path: PathBuf,
    pub lock_path: PathBuf,
}

impl AppState {
    /// Get the rmount directory path (custom or default ~/.rmount)
    pub fn rmount_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, AppStateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(AppStateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    pub fn at(rmount_dir: PathBuf) -> Self {
        Self {
            config_path: rmount_dir.join(CONFIG_FILE_NAME),
            rclone_config_path: rmount_dir.join(RCLONE_CONFIG_FILE_NAME),
            cache_path: rmount_dir.join(CACHE_DIR_NAME),
            logs_path: rmount_dir.join(LOGS_DIR_NAME),
            lock_path: rmount_dir.join(LOCK_FILE_NAME),
            rmount_dir,
        }
    }

    /// Resolve the directory and create it (owner-only) if missing
    pub fn load_or_init(custom_path: Option<PathBuf>) -> Result<Self, AppStateError> {
        let state = Self::at(Self::rmount_dir(custom_path)?);

        if !state.rmount_dir.exists() {
            fs::create_dir_all(&state.rmount_dir)?;
            restrict_to_owner(&state.rmount_dir)?;
            tracing::debug!(path = %state.rmount_dir.display(), "created rmount directory");
        }
        fs::create_dir_all(&state.cache_path)?;

        Ok(state)
    }
}

#[cfg(unix)]
fn restrict_to_owner(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_to_owner(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Advisory lock marking the process that owns an rmount directory.
///
/// The file holds the owner's pid. A lock whose pid is no longer alive is
/// considered stale and replaced. The file is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self, AppStateError> {
        let own_pid = std::process::id();

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    writeln!(file, "{}", own_pid)?;
                    file.sync_all()?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(path)
                        .ok()
                        .and_then(|s| s.trim().parse::<u32>().ok());
                    match holder {
                        Some(pid) if pid != own_pid && process_alive(pid) => {
                            return Err(AppStateError::AlreadyRunning(pid));
                        }
                        _ => {
                            tracing::warn!(path = %path.display(), ?holder, "removing stale lock file");
                            fs::remove_file(path)?;
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppStateError::LockContended)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "failed to remove lock file: {}", e);
        }
    }
}

/// Signal 0 probes for existence without delivering anything. `EPERM`
/// means the process exists but belongs to another user.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

#[derive(Debug, thiserror::Error)]
pub enum AppStateError {
    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("another rmount instance (pid {0}) owns this directory")]
    AlreadyRunning(u32),

    #[error("could not acquire the instance lock")]
    LockContended,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_custom_dir() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("rm");
        let state = AppState::load_or_init(Some(dir.clone())).unwrap();

        assert_eq!(state.rmount_dir, dir);
        assert_eq!(state.config_path, dir.join("config.enc"));
        assert_eq!(state.rclone_config_path, dir.join("rclone.conf"));
        assert!(state.cache_path.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(LOCK_FILE_NAME);

        let lock = InstanceLock::acquire(&path).unwrap();
        let contents = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        drop(lock);
        assert!(!path.exists());
        InstanceLock::acquire(&path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn process_liveness() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(0));
        assert!(!process_alive(u32::MAX));

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!process_alive(pid));
    }

    #[cfg(unix)]
    #[test]
    fn live_holder_blocks_and_stale_holder_is_replaced() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(LOCK_FILE_NAME);

        // A live process that is not us
        let mut child = std::process::Command::new("sleep").arg("5").spawn().unwrap();
        fs::write(&path, format!("{}\n", child.id())).unwrap();
        assert!(matches!(
            InstanceLock::acquire(&path),
            Err(AppStateError::AlreadyRunning(pid)) if pid == child.id()
        ));

        child.kill().unwrap();
        child.wait().unwrap();
        let lock = InstanceLock::acquire(&path).unwrap();
        drop(lock);

        fs::write(&path, "garbage").unwrap();
        InstanceLock::acquire(&path).unwrap();
    }
}
