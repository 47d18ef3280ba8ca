//! Bucket listing and connection checks for S3-compatible data sources.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::Serialize;

use common::config::S3DataSource;

const DEFAULT_REGION: &str = "us-east-1";
const DELIMITER: char = '/';
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("connection test failed for bucket '{bucket}': {reason}")]
    ConnectionTestFailed { bucket: String, reason: String },
    #[error("invalid object store configuration: {0}")]
    InvalidConfig(String),
    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),
}

/// One entry of a grouped listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Key relative to the listed prefix (first segment only for directories)
    pub name: String,
    /// Full key; directories without the trailing delimiter
    pub path: String,
    pub size: u64,
    pub mod_time: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

/// Minimal object metadata fed to [`group_listing`]
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

type Opener = dyn Fn(&str) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> + Send + Sync;

/// Lists and probes buckets reachable with one set of credentials
#[derive(Clone)]
pub struct ObjectStoreClient {
    open: Arc<Opener>,
}

impl ObjectStoreClient {
    pub fn from_data_source(ds: &S3DataSource) -> Self {
        let endpoint = ds.endpoint.clone();
        let access_key = ds.access_key.clone();
        let secret_key = ds.secret_key.clone();
        let region = if ds.region.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            ds.region.clone()
        };

        Self::with_opener(move |bucket| {
            let mut builder = AmazonS3Builder::new()
                .with_access_key_id(&access_key)
                .with_secret_access_key(&secret_key)
                .with_bucket_name(bucket)
                .with_region(&region);
            if !endpoint.is_empty() {
                builder = builder
                    .with_endpoint(&endpoint)
                    .with_allow_http(endpoint.starts_with("http://"));
            }

            let store = builder
                .build()
                .map_err(|e| ObjectStoreError::InvalidConfig(e.to_string()))?;
            Ok(Arc::new(store) as Arc<dyn ObjectStore>)
        })
    }

    /// Client whose buckets are produced by `open`. Used with in-memory stores.
    pub fn with_opener<F>(open: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> + Send + Sync + 'static,
    {
        Self {
            open: Arc::new(open),
        }
    }

    /// Lists at most one object to check credentials and bucket access.
    /// Enumerating buckets is not supported, so `bucket` must be set.
    pub async fn test_connection(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        let failed = |reason: String| ObjectStoreError::ConnectionTestFailed {
            bucket: bucket.to_string(),
            reason,
        };

        if bucket.is_empty() {
            return Err(failed("a bucket name is required".to_string()));
        }
        let store = (self.open)(bucket).map_err(|e| failed(e.to_string()))?;

        let mut stream = store.list(None);
        match tokio::time::timeout(REQUEST_TIMEOUT, stream.try_next()).await {
            Ok(Ok(_)) => {
                tracing::debug!(bucket, "connection test succeeded");
                Ok(())
            }
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(_) => Err(failed(format!(
                "timed out after {}s",
                REQUEST_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Directories and files directly below `prefix`
    pub async fn list_files(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<FileEntry>, ObjectStoreError> {
        if bucket.is_empty() {
            return Err(ObjectStoreError::InvalidConfig(
                "a bucket name is required".to_string(),
            ));
        }
        let store = (self.open)(bucket)?;

        let normalized = normalize_prefix(prefix);
        let location = ObjectPath::parse(&normalized)
            .map_err(|e| ObjectStoreError::InvalidConfig(e.to_string()))?;
        let listing = store
            .list_with_delimiter((!normalized.is_empty()).then_some(&location))
            .await?;

        let objects = listing.objects.into_iter().map(|meta| ObjectSummary {
            key: meta.location.to_string(),
            size: meta.size as u64,
            last_modified: Some(meta.last_modified),
        });
        let directories = listing.common_prefixes.iter().map(|p| p.to_string());

        Ok(group_listing(prefix, directories, objects))
    }
}

/// Strip leading delimiters and ensure a trailing one on non-empty prefixes
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_start_matches(DELIMITER);
    if trimmed.is_empty() || trimmed.ends_with(DELIMITER) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, DELIMITER)
    }
}

/// Build the entries of one delimited listing below `prefix`.
///
/// `directories` are the common prefixes and `objects` the keys at this
/// level, both as parsed store paths (no trailing delimiter). A folder
/// marker for the listed prefix itself parses to the prefix without its
/// delimiter and is dropped. Directories come first, then files, each sorted.
pub fn group_listing(
    prefix: &str,
    directories: impl IntoIterator<Item = String>,
    objects: impl IntoIterator<Item = ObjectSummary>,
) -> Vec<FileEntry> {
    let prefix = normalize_prefix(prefix);
    let mut dirs: BTreeMap<String, FileEntry> = BTreeMap::new();
    let mut files: BTreeMap<String, FileEntry> = BTreeMap::new();

    let mut add_dir = |name: &str| {
        dirs.entry(name.to_string()).or_insert_with(|| FileEntry {
            name: name.to_string(),
            path: format!("{}{}", prefix, name),
            size: 0,
            mod_time: None,
            is_dir: true,
        });
    };

    for dir in directories {
        let Some(rest) = dir.strip_prefix(prefix.as_str()) else {
            continue;
        };
        let name = rest.trim_matches(DELIMITER);
        let name = name.split(DELIMITER).next().unwrap_or(name);
        if !name.is_empty() {
            add_dir(name);
        }
    }

    for object in objects {
        let Some(rest) = object.key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if rest.trim_matches(DELIMITER).is_empty() {
            continue;
        }

        match rest.split_once(DELIMITER) {
            Some((dir, _)) if dir.is_empty() => continue,
            Some((dir, _)) => add_dir(dir),
            None => {
                files.insert(
                    rest.to_string(),
                    FileEntry {
                        name: rest.to_string(),
                        path: object.key.clone(),
                        size: object.size,
                        mod_time: object.last_modified,
                        is_dir: false,
                    },
                );
            }
        }
    }

    dirs.into_values().chain(files.into_values()).collect()
}
