pub mod app_state;
pub mod autostart;
pub mod backup;
mod config;
pub mod driver;
pub mod mount_manager;
pub mod process;
pub mod reconcile;
mod state;
pub mod storage;

pub use app_state::{AppState, AppStateError};
pub use config::{Config as ServiceConfig, MountRequest};
pub use process::spawn_service;
pub use state::{BackupSettings, State, StateError};
