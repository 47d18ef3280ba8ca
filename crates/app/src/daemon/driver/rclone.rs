//! rclone-backed mount driver
//!
//! Mount helpers run as managed foreground children (no `--daemon`), so an
//! early exit is observable through [`MountDriver::probe`] and the child is
//! reaped on stop. Their stderr is forwarded to tracing and the last few
//! lines are kept for error reports.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsStr;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use common::config::S3DataSource;
use common::store::write_atomic;

use super::process_list::{check_listable, EXACT_ARGUMENTS};
use super::{ActiveMount, DriverError, MountDriver, MountHandle, ProbeResult, StopOutcome};

pub const RCLONE_CONFIG_FILE_NAME: &str = "rclone.conf";
pub const CACHE_DIR_NAME: &str = "cache";

const STDERR_TAIL_LINES: usize = 20;
const REAP_TIMEOUT: Duration = Duration::from_secs(5);
const FORWARDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Output fragments unmount tools print when the path is not a mount point
const NOT_MOUNTED_MARKERS: [&str; 4] = [
    "not currently mounted",
    "not mounted",
    "not found in /etc/mtab",
    "no such file or directory",
];

type StderrTail = Arc<parking_lot::Mutex<VecDeque<String>>>;

struct ManagedChild {
    child: Child,
    stderr_tail: StderrTail,
    forwarder: Option<JoinHandle<()>>,
}

impl ManagedChild {
    async fn drained_output(&mut self) -> String {
        if let Some(forwarder) = self.forwarder.take() {
            let _ = tokio::time::timeout(FORWARDER_DRAIN_TIMEOUT, forwarder).await;
        }
        let tail = self.stderr_tail.lock();
        tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

pub struct RcloneDriver {
    program: PathBuf,
    config_path: PathBuf,
    cache_dir: PathBuf,
    children: Mutex<HashMap<PathBuf, ManagedChild>>,
    /// Serializes writers of the shared config file
    config_lock: parking_lot::Mutex<()>,
}

impl RcloneDriver {
    /// Driver keeping its config file and VFS cache under `dir`
    pub fn new(dir: &Path) -> Self {
        Self {
            program: PathBuf::from("rclone"),
            config_path: dir.join(RCLONE_CONFIG_FILE_NAME),
            cache_dir: dir.join(CACHE_DIR_NAME),
            children: Mutex::new(HashMap::new()),
            config_lock: parking_lot::Mutex::new(()),
        }
    }

    /// Use a different rclone executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Regenerate the connection config from the given data sources.
    /// The file holds credentials in cleartext and is written with mode 0600.
    pub fn write_config(&self, sources: &[S3DataSource]) -> Result<(), DriverError> {
        let rendered = render_config(sources);

        let _guard = self.config_lock.lock();
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(&self.config_path, rendered.as_bytes())?;

        tracing::debug!(
            path = %self.config_path.display(),
            sections = sources.len(),
            "wrote rclone config"
        );
        Ok(())
    }

    /// Whether `rclone version` runs successfully
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Wait for (or kill) the managed child serving `local_path`, if any
    async fn reap(&self, local_path: &Path) {
        let Some(mut managed) = self.children.lock().await.remove(local_path) else {
            return;
        };

        match tokio::time::timeout(REAP_TIMEOUT, managed.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(local = %local_path.display(), %status, "rclone exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(local = %local_path.display(), "failed to wait for rclone: {}", e);
            }
            Err(_) => {
                tracing::warn!(
                    local = %local_path.display(),
                    "rclone did not exit after unmount, killing it"
                );
                if let Err(e) = managed.child.kill().await {
                    tracing::warn!("failed to kill rclone: {}", e);
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    async fn unmount(&self, local_path: &Path) -> Result<StopOutcome, DriverError> {
        let output = run_command("umount", &[local_path.as_os_str()]).await?;
        if output.status.success() {
            return Ok(StopOutcome::Stopped);
        }
        if is_not_mounted(&output) {
            return Ok(StopOutcome::AlreadyUnmounted);
        }

        tracing::warn!(
            local = %local_path.display(),
            "umount failed, forcing with diskutil"
        );
        let output = run_command(
            "diskutil",
            &[OsStr::new("unmount"), OsStr::new("force"), local_path.as_os_str()],
        )
        .await?;
        if output.status.success() {
            Ok(StopOutcome::Stopped)
        } else {
            Err(failed("diskutil", &output))
        }
    }

    #[cfg(not(target_os = "macos"))]
    async fn unmount(&self, local_path: &Path) -> Result<StopOutcome, DriverError> {
        let output = run_command("fusermount", &[OsStr::new("-u"), local_path.as_os_str()]).await?;
        if output.status.success() {
            return Ok(StopOutcome::Stopped);
        }
        if is_not_mounted(&output) {
            return Ok(StopOutcome::AlreadyUnmounted);
        }

        tracing::warn!(
            local = %local_path.display(),
            "fusermount -u failed, retrying with a lazy unmount"
        );
        let output = run_command("fusermount", &[OsStr::new("-uz"), local_path.as_os_str()]).await?;
        if output.status.success() {
            Ok(StopOutcome::Stopped)
        } else {
            Err(failed("fusermount", &output))
        }
    }
}

#[async_trait::async_trait]
impl MountDriver for RcloneDriver {
    fn configure(&self, sources: &[S3DataSource]) -> Result<(), DriverError> {
        self.write_config(sources)
    }

    fn check_path(&self, path: &Path) -> Result<(), DriverError> {
        check_listable(path, EXACT_ARGUMENTS)
    }

    async fn start(
        &self,
        name: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<MountHandle, DriverError> {
        tokio::fs::create_dir_all(local_path).await?;
        let remote = format!("{}:{}", name, remote_path);

        let mut child = Command::new(&self.program)
            .arg("mount")
            .arg("--config")
            .arg(&self.config_path)
            .args(["--vfs-cache-mode", "full"])
            .arg("--cache-dir")
            .arg(&self.cache_dir)
            .arg("--allow-non-empty")
            .arg(&remote)
            .arg(local_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DriverError::Spawn {
                program: self.program_name(),
                source,
            })?;

        let pid = child.id();
        let stderr_tail: StderrTail = Arc::default();
        let forwarder = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_stderr(name.to_string(), stderr, stderr_tail.clone())));

        tracing::info!(
            name,
            remote = %remote,
            local = %local_path.display(),
            ?pid,
            "started rclone mount"
        );

        self.children.lock().await.insert(
            local_path.to_path_buf(),
            ManagedChild {
                child,
                stderr_tail,
                forwarder,
            },
        );

        Ok(MountHandle { pid })
    }

    async fn probe(&self, local_path: &Path) -> Result<ProbeResult, DriverError> {
        let mut children = self.children.lock().await;
        let Some(managed) = children.get_mut(local_path) else {
            return Ok(ProbeResult::Running);
        };

        match managed.child.try_wait()? {
            None => Ok(ProbeResult::Running),
            Some(status) => {
                let output = managed.drained_output().await;
                children.remove(local_path);
                Ok(ProbeResult::Exited {
                    status: status.to_string(),
                    output,
                })
            }
        }
    }

    async fn stop(&self, local_path: &Path) -> Result<StopOutcome, DriverError> {
        let outcome = self.unmount(local_path).await?;
        self.reap(local_path).await;

        tracing::info!(local = %local_path.display(), ?outcome, "unmounted");
        Ok(outcome)
    }

    async fn list_active(&self) -> Result<Vec<ActiveMount>, DriverError> {
        list_processes().await
    }
}

#[cfg(target_os = "linux")]
async fn list_processes() -> Result<Vec<ActiveMount>, DriverError> {
    use super::process_list::parse_cmdline;

    let mut entries = tokio::fs::read_dir("/proc").await?;
    let mut cmdlines = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // The process may exit between the directory read and this one
        if let Ok(cmdline) = tokio::fs::read(entry.path().join("cmdline")).await {
            cmdlines.push((pid, cmdline));
        }
    }

    cmdlines.sort_by_key(|(pid, _)| *pid);
    Ok(cmdlines
        .iter()
        .filter_map(|(pid, cmdline)| parse_cmdline(*pid, cmdline))
        .collect())
}

#[cfg(not(target_os = "linux"))]
async fn list_processes() -> Result<Vec<ActiveMount>, DriverError> {
    use super::process_list::parse_process_list;

    let output = run_command("ps", &[OsStr::new("-eo"), OsStr::new("pid=,args=")]).await?;
    if !output.status.success() {
        return Err(failed("ps", &output));
    }
    Ok(parse_process_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Render one `[name]` section per data source
pub fn render_config(sources: &[S3DataSource]) -> String {
    let mut out = String::new();
    for ds in sources {
        let _ = writeln!(out, "[{}]", ds.name);
        let _ = writeln!(out, "type = s3");
        let _ = writeln!(out, "provider = AWS");
        let _ = writeln!(out, "env_auth = false");
        let _ = writeln!(out, "access_key_id = {}", ds.access_key);
        let _ = writeln!(out, "secret_access_key = {}", ds.secret_key);
        let _ = writeln!(out, "region = {}", ds.region);
        if !ds.endpoint.is_empty() {
            let _ = writeln!(out, "endpoint = {}", ds.endpoint);
        }
        if !ds.bucket.is_empty() {
            let _ = writeln!(out, "bucket = {}", ds.bucket);
        }
        out.push('\n');
    }
    out
}

async fn forward_stderr(name: String, stderr: ChildStderr, tail: StderrTail) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(mount = %name, "rclone: {}", line);
        let mut buf = tail.lock();
        if buf.len() == STDERR_TAIL_LINES {
            buf.pop_front();
        }
        buf.push_back(line);
    }
}

async fn run_command(program: &str, args: &[&OsStr]) -> Result<Output, DriverError> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| DriverError::Spawn {
            program: program.to_string(),
            source,
        })
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stdout.trim());
    }
    text
}

fn is_not_mounted(output: &Output) -> bool {
    let text = combined_output(output).to_lowercase();
    NOT_MOUNTED_MARKERS.iter().any(|marker| text.contains(marker))
}

fn failed(program: &str, output: &Output) -> DriverError {
    DriverError::Failed {
        program: program.to_string(),
        status: output.status.to_string(),
        output: combined_output(output),
    }
}
