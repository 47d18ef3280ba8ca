//! Mount registry - the in-process record of believed-active mounts
//!
//! Responsibilities:
//! - Track one [`MountRecord`] per data source name
//! - Start/stop mount helpers through the [`MountDriver`]
//! - Apply the reconciler's view of live mount processes
//! - Unmount everything on shutdown
//!
//! All map access happens under one `RwLock`. Driver calls never run while
//! the lock is held: a name is reserved under the write lock, the driver is
//! called, and the lock is re-acquired only to commit the result.
//! Mount and unmount run to completion on their own task, so a caller that
//! stops waiting does not leave the registry half-updated.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use super::driver::{ActiveMount, DriverError, MountDriver, ProbeResult, StopOutcome};

/// Default time a freshly started helper must survive to count as mounted
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountStatus {
    Mounted,
    /// The helper is alive but serving a different path than recorded
    Error,
}

/// Snapshot of a tracked mount. Callers always receive copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountRecord {
    pub name: String,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub pid: Option<u32>,
    pub status: MountStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("data source '{0}' is already mounted")]
    AlreadyMounted(String),
    #[error("data source '{0}' is not mounted")]
    NotMounted(String),
    #[error("mount of '{name}' exited during startup ({status}): {output}")]
    MountTimeout {
        name: String,
        status: String,
        output: String,
    },
    #[error("mount driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("mount task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What one reconciliation pass changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records dropped because no live helper serves them
    pub removed: Vec<String>,
    /// Records whose helper serves a different path
    pub errored: Vec<String>,
    /// Records confirmed as mounted
    pub confirmed: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.errored.is_empty()
    }
}

struct Entry {
    record: MountRecord,
    /// Value of the insert counter when this entry was committed
    generation: u64,
}

struct RegistryState {
    records: HashMap<String, Entry>,
    /// Names with a mount or unmount in flight
    pending: HashSet<String>,
    mount_directory: PathBuf,
    generation: u64,
}

struct Inner {
    driver: Arc<dyn MountDriver>,
    state: RwLock<RegistryState>,
    settle: Duration,
}

/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct MountRegistry {
    inner: Arc<Inner>,
}

/// `<mount_dir>/<name>` for an empty or root remote path, otherwise
/// `<mount_dir>/<name>/<basename(remote_path)>`
pub fn local_path_for(mount_directory: &Path, name: &str, remote_path: &str) -> PathBuf {
    let base = mount_directory.join(name);
    let trimmed = remote_path.trim_matches('/');
    if trimmed.is_empty() {
        return base;
    }
    match Path::new(trimmed).file_name() {
        Some(leaf) => base.join(leaf),
        None => base,
    }
}

impl MountRegistry {
    pub fn new(driver: Arc<dyn MountDriver>, mount_directory: PathBuf) -> Self {
        Self::with_settle(driver, mount_directory, DEFAULT_SETTLE)
    }

    pub fn with_settle(
        driver: Arc<dyn MountDriver>,
        mount_directory: PathBuf,
        settle: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                state: RwLock::new(RegistryState {
                    records: HashMap::new(),
                    pending: HashSet::new(),
                    mount_directory,
                    generation: 0,
                }),
                settle,
            }),
        }
    }

    pub fn driver(&self) -> &Arc<dyn MountDriver> {
        &self.inner.driver
    }

    pub async fn mount_directory(&self) -> PathBuf {
        self.inner.state.read().await.mount_directory.clone()
    }

    /// Used for mounts started after the call; existing records keep their paths.
    pub async fn set_mount_directory(&self, mount_directory: PathBuf) {
        self.inner.state.write().await.mount_directory = mount_directory;
    }

    /// Mount data source `name` at its derived local path
    pub async fn mount(&self, name: &str, remote_path: &str) -> Result<MountRecord, MountError> {
        let inner = self.inner.clone();
        let name = name.to_string();
        let remote_path = remote_path.to_string();
        tokio::spawn(async move { inner.mount(name, remote_path).await }).await?
    }

    /// Unmount `name` and forget its record
    pub async fn unmount(&self, name: &str) -> Result<StopOutcome, MountError> {
        let inner = self.inner.clone();
        let name = name.to_string();
        tokio::spawn(async move { inner.unmount(name).await }).await?
    }

    /// All records, ordered by name
    pub async fn list(&self) -> Vec<MountRecord> {
        let state = self.inner.state.read().await;
        let mut records: Vec<MountRecord> =
            state.records.values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub async fn get(&self, name: &str) -> Option<MountRecord> {
        let state = self.inner.state.read().await;
        state.records.get(name).map(|e| e.record.clone())
    }

    pub async fn is_mounted(&self, name: &str) -> bool {
        self.inner.state.read().await.records.contains_key(name)
    }

    /// Unmount every tracked record. Called on shutdown.
    pub async fn unmount_all(&self) -> Vec<(String, Result<StopOutcome, MountError>)> {
        let names: Vec<String> = {
            let state = self.inner.state.read().await;
            state.records.keys().cloned().collect()
        };

        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let result = self.unmount(&name).await;
            if let Err(e) = &result {
                tracing::error!(name = %name, "failed to unmount: {}", e);
            }
            results.push((name, result));
        }
        results
    }

    /// Enumerate live helpers and correct the records against them.
    ///
    /// Records committed after enumeration began are left alone, so a mount
    /// that lands mid-pass is never dropped by a stale listing.
    pub async fn reconcile(&self) -> Result<ReconcileReport, DriverError> {
        let generation = self.inner.state.read().await.generation;
        let active = self.inner.driver.list_active().await?;
        Ok(self.apply_active(generation, &active).await)
    }

    async fn apply_active(&self, generation: u64, active: &[ActiveMount]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut state = self.inner.state.write().await;

        state.records.retain(|name, entry| {
            if entry.generation > generation {
                return true;
            }

            let mut live = active.iter().filter(|m| &m.name == name).peekable();
            if live.peek().is_none() {
                report.removed.push(name.clone());
                return false;
            }

            match live.find(|m| m.local_path == entry.record.local_path) {
                Some(m) => {
                    entry.record.status = MountStatus::Mounted;
                    if m.pid.is_some() {
                        entry.record.pid = m.pid;
                    }
                    report.confirmed += 1;
                }
                None => {
                    if entry.record.status != MountStatus::Error {
                        report.errored.push(name.clone());
                    }
                    entry.record.status = MountStatus::Error;
                }
            }
            true
        });

        report.removed.sort();
        report.errored.sort();
        report
    }
}

impl Inner {
    async fn mount(&self, name: String, remote_path: String) -> Result<MountRecord, MountError> {
        self.driver.check_path(Path::new(&remote_path))?;

        let local_path = {
            let mut state = self.state.write().await;
            if state.records.contains_key(&name) || state.pending.contains(&name) {
                return Err(MountError::AlreadyMounted(name));
            }
            let local_path = local_path_for(&state.mount_directory, &name, &remote_path);
            self.driver.check_path(&local_path)?;
            state.pending.insert(name.clone());
            local_path
        };

        let result = self.start_and_settle(&name, &remote_path, &local_path).await;

        let mut state = self.state.write().await;
        state.pending.remove(&name);
        let pid = result?;

        state.generation += 1;
        let record = MountRecord {
            name: name.clone(),
            remote_path,
            local_path,
            pid,
            status: MountStatus::Mounted,
        };
        let generation = state.generation;
        state.records.insert(
            name,
            Entry {
                record: record.clone(),
                generation,
            },
        );

        tracing::info!(
            name = %record.name,
            local = %record.local_path.display(),
            pid = ?record.pid,
            "mounted"
        );
        Ok(record)
    }

    /// Start the helper and wait out the settle window
    async fn start_and_settle(
        &self,
        name: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<Option<u32>, MountError> {
        let handle = self.driver.start(name, remote_path, local_path).await?;
        tokio::time::sleep(self.settle).await;

        match self.driver.probe(local_path).await {
            Ok(ProbeResult::Running) => Ok(handle.pid),
            Ok(ProbeResult::Exited { status, output }) => {
                tracing::warn!(name, %status, "mount helper exited during startup");
                Err(MountError::MountTimeout {
                    name: name.to_string(),
                    status,
                    output,
                })
            }
            Err(e) => {
                // Unknown state: make sure nothing is left serving the path
                if let Err(stop_err) = self.driver.stop(local_path).await {
                    tracing::warn!(name, "cleanup after failed probe failed: {}", stop_err);
                }
                Err(e.into())
            }
        }
    }

    async fn unmount(&self, name: String) -> Result<StopOutcome, MountError> {
        let local_path = {
            let mut state = self.state.write().await;
            let Some(entry) = state.records.get(&name) else {
                return Err(MountError::NotMounted(name));
            };
            let local_path = entry.record.local_path.clone();
            if !state.pending.insert(name.clone()) {
                return Err(MountError::NotMounted(name));
            }
            local_path
        };

        let result = self.driver.stop(&local_path).await;

        let mut state = self.state.write().await;
        state.pending.remove(&name);
        let outcome = result?;
        state.records.remove(&name);

        if outcome == StopOutcome::AlreadyUnmounted {
            tracing::info!(name = %name, "was already unmounted");
        }
        Ok(outcome)
    }
}
