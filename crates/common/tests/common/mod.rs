//! Shared test utilities for store and catalog integration tests
#![allow(dead_code)]

use ::common::config::{AppConfig, S3DataSource};
use ::common::crypto::KdfParams;
use ::common::store::SecureConfigStore;
use tempfile::TempDir;

pub const PASSPHRASE: &str = "correct horse battery staple";

/// A store in a fresh temp directory using cheap KDF parameters
pub fn setup_store() -> (SecureConfigStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = store_at(&temp_dir);
    (store, temp_dir)
}

/// A second handle on the same file, as a restarted process would see it
pub fn store_at(temp_dir: &TempDir) -> SecureConfigStore {
    SecureConfigStore::with_params(
        temp_dir.path().join("config.enc"),
        KdfParams::insecure_fast(),
    )
}

pub fn data_source(name: &str, bucket: &str) -> S3DataSource {
    S3DataSource {
        name: name.to_string(),
        endpoint: "http://localhost:9000".to_string(),
        access_key: "AKIAEXAMPLE".to_string(),
        secret_key: "wJalrXUtnFEMI/K7MDENG".to_string(),
        region: "us-east-1".to_string(),
        bucket: bucket.to_string(),
        description: format!("{} test source", name),
        ..Default::default()
    }
}

/// A config with every persisted field set to a non-default value
pub fn populated_config() -> AppConfig {
    let mut config = AppConfig {
        gist_api_token: "ghp_exampletoken1234".to_string(),
        gist_id: "0123abcd".to_string(),
        auto_start: true,
        mount_directory: "/tmp/rmount-test-mounts".into(),
        ..Default::default()
    };
    config
        .catalog_mut()
        .add(data_source("backup-bucket", "data"))
        .unwrap();
    config
        .catalog_mut()
        .add(data_source("photos", "media"))
        .unwrap();
    config
}
