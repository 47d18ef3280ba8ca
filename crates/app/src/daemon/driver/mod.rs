//! Mount driver abstraction
//!
//! A [`MountDriver`] owns everything that touches the operating system:
//! spawning the mount helper, unmounting, and enumerating live mount
//! processes. The registry and the reconciler only ever see the typed results
//! below, never raw process output.

mod process_list;
mod rclone;

use std::path::{Path, PathBuf};

use common::config::S3DataSource;

pub use process_list::{check_listable, parse_cmdline, parse_process_list, EXACT_ARGUMENTS};
pub use rclone::{render_config, RcloneDriver, CACHE_DIR_NAME, RCLONE_CONFIG_FILE_NAME};

/// Returned by [`MountDriver::start`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MountHandle {
    /// Pid of the mount helper, when the driver knows it
    pub pid: Option<u32>,
}

/// State of a started mount helper after the settle window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Still running, or not a process the driver manages
    Running,
    /// Exited, with its exit status and the tail of its diagnostic output
    Exited { status: String, output: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The path was not mounted to begin with
    AlreadyUnmounted,
}

/// A live mount helper reconstructed from process inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMount {
    pub pid: Option<u32>,
    /// Data source name (the section part of `name:remote`)
    pub name: String,
    /// Remote sub-path (the part after the first `:`)
    pub remote: String,
    pub local_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("{program} failed ({status}): {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{0}' contains whitespace, which the process listing cannot represent")]
    UnlistablePath(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
pub trait MountDriver: Send + Sync {
    /// Regenerate the driver's connection settings for `sources`.
    /// Called after every configuration change.
    fn configure(&self, sources: &[S3DataSource]) -> Result<(), DriverError>;

    /// Fail if a mount involving `path` would not be recognisable by
    /// [`Self::list_active`]
    fn check_path(&self, _path: &Path) -> Result<(), DriverError> {
        Ok(())
    }

    /// Start serving `name:remote_path` at `local_path`. May return before
    /// the mount is servicing requests.
    async fn start(
        &self,
        name: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<MountHandle, DriverError>;

    /// Check whether the helper started for `local_path` is still alive
    async fn probe(&self, local_path: &Path) -> Result<ProbeResult, DriverError>;

    /// Unmount `local_path`. Idempotent: an unmounted path reports
    /// [`StopOutcome::AlreadyUnmounted`].
    async fn stop(&self, local_path: &Path) -> Result<StopOutcome, DriverError>;

    /// Enumerate live mount helpers, in process-table order
    async fn list_active(&self) -> Result<Vec<ActiveMount>, DriverError>;
}
