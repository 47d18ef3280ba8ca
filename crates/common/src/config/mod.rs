//! Persisted application configuration
//!
//! [`AppConfig`] is the aggregate that the secure store seals to disk. It is
//! owned by the running process; every mutation is expected to be followed by
//! a save through [`crate::store::SecureConfigStore`].

mod catalog;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use catalog::{CatalogError, DataSourceCatalog, DataSourceView};

/// Name of the directory (under the user's home) that mounts default to
pub const DEFAULT_MOUNT_DIR_NAME: &str = "mounts";

/// A named S3-compatible endpoint usable as a mount target.
///
/// Identity is `name`; uniqueness is enforced by [`DataSourceCatalog`].
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3DataSource {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub description: String,
}

impl fmt::Debug for S3DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3DataSource")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[redacted]")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("description", &self.description)
            .finish()
    }
}

/// Aggregate root of everything the store persists.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Token for the backup transport (GitHub gist API)
    #[serde(
        rename = "gistAPIToken",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub gist_api_token: String,
    /// Id of the gist holding the last uploaded backup
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gist_id: String,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_mount_directory")]
    pub mount_directory: PathBuf,
    /// Ordered by insertion, names unique
    #[serde(default)]
    pub s3_data_sources: Vec<S3DataSource>,
}

pub fn default_mount_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_MOUNT_DIR_NAME)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gist_api_token: String::new(),
            gist_id: String::new(),
            auto_start: false,
            mount_directory: default_mount_directory(),
            s3_data_sources: Vec::new(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("gist_api_token", &mask_token(&self.gist_api_token))
            .field("gist_id", &self.gist_id)
            .field("auto_start", &self.auto_start)
            .field("mount_directory", &self.mount_directory)
            .field("s3_data_sources", &self.s3_data_sources)
            .finish()
    }
}

impl AppConfig {
    /// Read-only view over the data sources
    pub fn catalog(&self) -> DataSourceView<'_> {
        DataSourceView::new(&self.s3_data_sources)
    }

    /// Mutable catalog over the data sources. The catalog never persists.
    pub fn catalog_mut(&mut self) -> DataSourceCatalog<'_> {
        DataSourceCatalog::new(&mut self.s3_data_sources)
    }

    /// Deterministic serialization used as the sealed payload
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Masked form of a credential for display: first and last four characters,
/// or `set` when the token is too short to reveal anything.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n > 8 => {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{}...{}", head, tail)
        }
        _ => "set".to_string(),
    }
}
