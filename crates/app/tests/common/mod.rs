//! Shared test utilities for registry, reconciler and state integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use ::common::config::S3DataSource;
use ::common::crypto::KdfParams;
use ::common::store::SecureConfigStore;
use rmount::daemon::backup::{BackupTransport, TransportError};
use rmount::daemon::driver::{
    check_listable, ActiveMount, DriverError, MountDriver, MountHandle, ProbeResult, StopOutcome,
};
use rmount::State;

pub const PASSPHRASE: &str = "correct horse battery staple";

/// Settle window used by tests; long enough to yield to concurrent tasks
pub const SETTLE: Duration = Duration::from_millis(20);

/// A scriptable in-memory mount driver.
///
/// Started mounts show up in `list_active` until stopped, unless a listing
/// has been pinned with [`MockDriver::set_active`].
#[derive(Default)]
pub struct MockDriver {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub configures: AtomicUsize,
    live: Mutex<HashMap<PathBuf, (String, String)>>,
    pinned: Mutex<Option<Vec<ActiveMount>>>,
    exit_on_probe: Mutex<Option<String>>,
    fail_list: Mutex<bool>,
    already_unmounted: Mutex<bool>,
    list_delay: Mutex<Option<Duration>>,
    inexact_listing: Mutex<bool>,
    pub last_sources: Mutex<Vec<S3DataSource>>,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `list_active` report exactly `active`
    pub fn set_active(&self, active: Vec<ActiveMount>) {
        *self.pinned.lock() = Some(active);
    }

    /// Make every probe report the helper exited with `output`
    pub fn exit_on_probe(&self, output: &str) {
        *self.exit_on_probe.lock() = Some(output.to_string());
    }

    pub fn fail_list(&self, fail: bool) {
        *self.fail_list.lock() = fail;
    }

    /// Make `stop` report the path was not mounted
    pub fn report_already_unmounted(&self) {
        *self.already_unmounted.lock() = true;
    }

    /// Behave like a driver that lists mounts from space-joined `ps` output
    pub fn inexact_listing(&self) {
        *self.inexact_listing.lock() = true;
    }

    pub fn delay_list(&self, delay: Duration) {
        *self.list_delay.lock() = Some(delay);
    }

    /// Forget a started mount, as if the helper died
    pub fn kill(&self, local_path: &Path) {
        self.live.lock().remove(local_path);
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MountDriver for MockDriver {
    fn configure(&self, sources: &[S3DataSource]) -> Result<(), DriverError> {
        self.configures.fetch_add(1, Ordering::SeqCst);
        *self.last_sources.lock() = sources.to_vec();
        Ok(())
    }

    fn check_path(&self, path: &Path) -> Result<(), DriverError> {
        check_listable(path, !*self.inexact_listing.lock())
    }

    async fn start(
        &self,
        name: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<MountHandle, DriverError> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        self.live.lock().insert(
            local_path.to_path_buf(),
            (name.to_string(), remote_path.to_string()),
        );
        Ok(MountHandle {
            pid: Some(1000 + n as u32),
        })
    }

    async fn probe(&self, local_path: &Path) -> Result<ProbeResult, DriverError> {
        match self.exit_on_probe.lock().clone() {
            Some(output) => {
                self.live.lock().remove(local_path);
                Ok(ProbeResult::Exited {
                    status: "exit status: 1".to_string(),
                    output,
                })
            }
            None => Ok(ProbeResult::Running),
        }
    }

    async fn stop(&self, local_path: &Path) -> Result<StopOutcome, DriverError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let was_live = self.live.lock().remove(local_path).is_some();
        if *self.already_unmounted.lock() || !was_live {
            Ok(StopOutcome::AlreadyUnmounted)
        } else {
            Ok(StopOutcome::Stopped)
        }
    }

    async fn list_active(&self) -> Result<Vec<ActiveMount>, DriverError> {
        let delay = *self.list_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_list.lock() {
            return Err(DriverError::Failed {
                program: "ps".to_string(),
                status: "exit status: 1".to_string(),
                output: "ps: permission denied".to_string(),
            });
        }
        if let Some(active) = self.pinned.lock().clone() {
            return Ok(active);
        }
        let live = self.live.lock();
        let mut active: Vec<ActiveMount> = live
            .iter()
            .map(|(path, (name, remote))| ActiveMount {
                pid: None,
                name: name.clone(),
                remote: remote.clone(),
                local_path: path.clone(),
            })
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }
}

pub fn active(name: &str, local_path: &Path) -> ActiveMount {
    ActiveMount {
        pid: Some(4242),
        name: name.to_string(),
        remote: String::new(),
        local_path: local_path.to_path_buf(),
    }
}

/// Backup transport keeping blobs in memory, numbering new ids
#[derive(Default)]
pub struct MemoryTransport {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    next: AtomicUsize,
}

impl MemoryTransport {
    pub fn blob(&self, id: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }
}

#[async_trait::async_trait]
impl BackupTransport for MemoryTransport {
    async fn upload(
        &self,
        blob: &[u8],
        existing_id: Option<&str>,
    ) -> Result<String, TransportError> {
        let id = match existing_id {
            Some(id) => id.to_string(),
            None => format!("gist{}", self.next.fetch_add(1, Ordering::SeqCst)),
        };
        self.blobs.lock().insert(id.clone(), blob.to_vec());
        Ok(id)
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>, TransportError> {
        self.blob(id)
            .ok_or_else(|| TransportError::InvalidId(id.to_string()))
    }
}

pub fn store_at(dir: &Path) -> SecureConfigStore {
    let store =
        SecureConfigStore::with_params(dir.join("config.enc"), KdfParams::insecure_fast());
    store.unlock(PASSPHRASE);
    store
}

/// A context over a fresh temp directory and a mock driver
pub async fn setup_state() -> (State, Arc<MockDriver>, TempDir) {
    let temp = TempDir::new().unwrap();
    let driver = MockDriver::new();
    let state = open_state(temp.path(), driver.clone()).await;
    (state, driver, temp)
}

/// A context over `dir`, as a restarted process would open it
pub async fn open_state(dir: &Path, driver: Arc<MockDriver>) -> State {
    State::from_parts(store_at(dir), driver, None, SETTLE)
        .await
        .unwrap()
}

pub fn data_source(name: &str, bucket: &str) -> S3DataSource {
    S3DataSource {
        name: name.to_string(),
        endpoint: "http://localhost:9000".to_string(),
        access_key: "AKIAEXAMPLE".to_string(),
        secret_key: "wJalrXUtnFEMI/K7MDENG".to_string(),
        region: "us-east-1".to_string(),
        bucket: bucket.to_string(),
        ..Default::default()
    }
}
