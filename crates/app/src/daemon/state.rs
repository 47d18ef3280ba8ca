use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use common::config::{mask_token, AppConfig, CatalogError, S3DataSource};
use common::store::{SecureConfigStore, StoreError};

use super::app_state::{AppState, AppStateError, InstanceLock};
use super::autostart::{AutoStart, AutoStartError};
use super::backup::{BackupTransport, GistTransport, TransportError};
use super::config::Config;
use super::driver::{DriverError, MountDriver, RcloneDriver, StopOutcome};
use super::mount_manager::{MountError, MountRecord, MountRegistry};
use super::reconcile::Reconciler;
use super::storage::{FileEntry, ObjectStoreClient, ObjectStoreError};

/// Application context - constructed once and shared by every handler
///
/// Holds the two independent locks of the application: the configuration
/// mutex (store + in-memory [`AppConfig`]) and the mount registry's lock.
/// No method holds both at once.
#[derive(Clone)]
pub struct State {
    inner: Arc<Inner>,
}

struct Inner {
    store: SecureConfigStore,
    config: Mutex<AppConfig>,
    registry: MountRegistry,
    autostart: Option<AutoStart>,
    _lock: Option<InstanceLock>,
}

/// Masked view of the backup settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSettings {
    pub token: String,
    pub has_token: bool,
    pub gist_id: String,
}

impl State {
    /// Open the directory described by `app`, taking its instance lock
    /// when `exclusive` is set.
    pub async fn open(
        app: &AppState,
        passphrase: Option<&str>,
        service: &Config,
        exclusive: bool,
    ) -> Result<Self, StateError> {
        let lock = if exclusive {
            Some(InstanceLock::acquire(&app.lock_path)?)
        } else {
            None
        };

        let store = SecureConfigStore::new(&app.config_path);
        if let Some(passphrase) = passphrase {
            store.unlock(passphrase);
        }

        let driver: Arc<dyn MountDriver> = Arc::new(RcloneDriver::new(&app.rmount_dir));
        let autostart = match AutoStart::for_current_exe() {
            Ok(autostart) => Some(autostart),
            Err(e) => {
                tracing::debug!("autostart unavailable: {}", e);
                None
            }
        };

        let state = Self::from_parts(store, driver, autostart, service.mount_settle).await?;
        Ok(state.with_lock(lock))
    }

    /// Build a context from its parts. `store` must already be unlocked if a
    /// configuration file exists.
    pub async fn from_parts(
        store: SecureConfigStore,
        driver: Arc<dyn MountDriver>,
        autostart: Option<AutoStart>,
        mount_settle: Duration,
    ) -> Result<Self, StateError> {
        let config = store.load()?;
        driver.configure(&config.s3_data_sources)?;

        let registry =
            MountRegistry::with_settle(driver, config.mount_directory.clone(), mount_settle);

        tracing::debug!(
            sources = config.s3_data_sources.len(),
            mount_directory = %config.mount_directory.display(),
            "configuration loaded"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                config: Mutex::new(config),
                registry,
                autostart,
                _lock: None,
            }),
        })
    }

    fn with_lock(self, lock: Option<InstanceLock>) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner._lock = lock;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => Self { inner },
        }
    }

    pub fn registry(&self) -> &MountRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &SecureConfigStore {
        &self.inner.store
    }

    pub fn reconciler(&self, interval: Duration) -> Reconciler {
        Reconciler::new(self.inner.registry.clone(), interval)
    }

    /// Copy of the current configuration
    pub async fn config(&self) -> AppConfig {
        self.inner.config.lock().await.clone()
    }

    /// Apply `f` to a copy of the configuration, persist the copy, then make
    /// it current and regenerate the driver configuration. Nothing changes if
    /// `f` or the save fails.
    async fn update_config<T>(
        &self,
        f: impl FnOnce(&mut AppConfig) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let mut config = self.inner.config.lock().await;
        let mut next = config.clone();
        let out = f(&mut next)?;

        self.inner.store.save(&next)?;
        *config = next;
        self.inner
            .registry
            .driver()
            .configure(&config.s3_data_sources)?;

        Ok(out)
    }

    // data sources

    pub async fn list_sources(&self) -> Vec<S3DataSource> {
        self.inner.config.lock().await.s3_data_sources.clone()
    }

    pub async fn source(&self, name: &str) -> Result<S3DataSource, StateError> {
        let config = self.inner.config.lock().await;
        config
            .catalog()
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(name.to_string()).into())
    }

    pub async fn add_source(&self, ds: S3DataSource) -> Result<S3DataSource, StateError> {
        let added = self
            .update_config(|config| Ok(config.catalog_mut().add(ds)?.clone()))
            .await?;
        tracing::info!(name = %added.name, "data source added");
        Ok(added)
    }

    pub async fn update_source(
        &self,
        name: &str,
        ds: S3DataSource,
    ) -> Result<S3DataSource, StateError> {
        if self.inner.registry.is_mounted(name).await {
            return Err(StateError::SourceMounted(name.to_string()));
        }
        let updated = self
            .update_config(|config| Ok(config.catalog_mut().update(name, ds)?.clone()))
            .await?;
        tracing::info!(name = %name, new_name = %updated.name, "data source updated");
        Ok(updated)
    }

    pub async fn remove_source(&self, name: &str) -> Result<S3DataSource, StateError> {
        if self.inner.registry.is_mounted(name).await {
            return Err(StateError::SourceMounted(name.to_string()));
        }
        let removed = self
            .update_config(|config| Ok(config.catalog_mut().remove(name)?))
            .await?;
        tracing::info!(name = %name, "data source removed");
        Ok(removed)
    }

    pub async fn test_source(&self, name: &str) -> Result<(), StateError> {
        let ds = self.source(name).await?;
        ObjectStoreClient::from_data_source(&ds)
            .test_connection(&ds.bucket)
            .await?;
        Ok(())
    }

    pub async fn list_files(&self, name: &str, prefix: &str) -> Result<Vec<FileEntry>, StateError> {
        let ds = self.source(name).await?;
        Ok(ObjectStoreClient::from_data_source(&ds)
            .list_files(&ds.bucket, prefix)
            .await?)
    }

    // settings

    pub async fn set_mount_directory(&self, dir: PathBuf) -> Result<(), StateError> {
        self.inner.registry.driver().check_path(&dir)?;
        self.update_config(|config| {
            config.mount_directory = dir.clone();
            Ok(())
        })
        .await?;
        self.inner.registry.set_mount_directory(dir).await;
        Ok(())
    }

    pub async fn set_backup(&self, token: Option<String>, gist_id: Option<String>) -> Result<(), StateError> {
        self.update_config(|config| {
            if let Some(token) = token {
                config.gist_api_token = token;
            }
            if let Some(gist_id) = gist_id {
                config.gist_id = gist_id;
            }
            Ok(())
        })
        .await
    }

    pub async fn backup_settings(&self) -> BackupSettings {
        let config = self.inner.config.lock().await;
        BackupSettings {
            token: mask_token(&config.gist_api_token),
            has_token: !config.gist_api_token.is_empty(),
            gist_id: config.gist_id.clone(),
        }
    }

    /// Toggle the login entry and record the choice
    pub async fn set_auto_start(&self, enabled: bool) -> Result<(), StateError> {
        let autostart = self
            .inner
            .autostart
            .as_ref()
            .ok_or(AutoStartError::Unsupported)?;

        if enabled {
            autostart.enable().await?;
        } else {
            autostart.disable().await?;
        }

        let result = self
            .update_config(|config| {
                config.auto_start = enabled;
                Ok(())
            })
            .await;

        if result.is_err() {
            let revert = if enabled {
                autostart.disable().await
            } else {
                autostart.enable().await
            };
            if let Err(e) = revert {
                tracing::warn!("failed to revert autostart entry: {}", e);
            }
        }
        result
    }

    pub async fn auto_start_enabled(&self) -> bool {
        match &self.inner.autostart {
            Some(autostart) => autostart.is_enabled().await,
            None => false,
        }
    }

    /// Re-seal the configuration under `new`. Fails with
    /// [`StoreError::DecryptError`] if `current` does not open the file.
    pub async fn change_passphrase(&self, current: &str, new: &str) -> Result<(), StateError> {
        let config = self.inner.config.lock().await;

        let check = SecureConfigStore::new(self.inner.store.path());
        check.unlock(current);
        check.load()?;

        self.inner.store.unlock(new);
        if let Err(e) = self.inner.store.save(&config) {
            self.inner.store.unlock(current);
            return Err(e.into());
        }

        tracing::info!("passphrase changed");
        Ok(())
    }

    // backup

    pub async fn gist_transport(&self) -> Result<GistTransport, StateError> {
        let config = self.inner.config.lock().await;
        if config.gist_api_token.is_empty() {
            return Err(StateError::NoBackupToken);
        }
        Ok(GistTransport::new(&config.gist_api_token)?)
    }

    /// Upload the sealed configuration and remember where it went
    pub async fn backup_push(&self, transport: &dyn BackupTransport) -> Result<String, StateError> {
        let (sealed, existing) = {
            let config = self.inner.config.lock().await;
            let sealed = self.inner.store.export_sealed(&config)?;
            let existing = (!config.gist_id.is_empty()).then(|| config.gist_id.clone());
            (sealed, existing)
        };

        let id = transport.upload(&sealed, existing.as_deref()).await?;

        if existing.as_deref() != Some(id.as_str()) {
            let id = id.clone();
            self.update_config(|config| {
                config.gist_id = id;
                Ok(())
            })
            .await?;
        }
        Ok(id)
    }

    /// Replace the local configuration with the backup at `id` (or the
    /// configured gist). The backup must open with the current passphrase.
    pub async fn backup_pull(
        &self,
        transport: &dyn BackupTransport,
        id: Option<&str>,
    ) -> Result<AppConfig, StateError> {
        let id = match id {
            Some(id) => id.to_string(),
            None => {
                let config = self.inner.config.lock().await;
                if config.gist_id.is_empty() {
                    return Err(StateError::NoBackupId);
                }
                config.gist_id.clone()
            }
        };

        let sealed = transport.download(&id).await?;
        let mut restored = self.inner.store.import_sealed(&sealed)?;
        restored.gist_id = id;

        let mount_directory = restored.mount_directory.clone();
        let applied = restored.clone();
        self.update_config(move |config| {
            *config = restored;
            Ok(())
        })
        .await?;
        self.inner.registry.set_mount_directory(mount_directory).await;

        tracing::info!(
            sources = applied.s3_data_sources.len(),
            "configuration restored from backup"
        );
        Ok(applied)
    }

    // mounts

    pub async fn mount(&self, name: &str, remote_path: &str) -> Result<MountRecord, StateError> {
        // Resolve first; the config lock is released before the registry is touched
        self.source(name).await?;
        Ok(self.inner.registry.mount(name, remote_path).await?)
    }

    pub async fn unmount(&self, name: &str) -> Result<StopOutcome, StateError> {
        Ok(self.inner.registry.unmount(name).await?)
    }

    pub async fn mounts(&self) -> Vec<MountRecord> {
        self.inner.registry.list().await
    }

    /// Unmount everything this process mounted
    pub async fn shutdown(&self) {
        let results = self.inner.registry.unmount_all().await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        tracing::info!(unmounted = results.len() - failed, failed, "mounts released");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    AppState(#[from] AppStateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    AutoStart(#[from] AutoStartError),
    #[error("data source '{0}' is mounted; unmount it first")]
    SourceMounted(String),
    #[error("no backup token configured")]
    NoBackupToken,
    #[error("no backup gist id configured")]
    NoBackupId,
}
