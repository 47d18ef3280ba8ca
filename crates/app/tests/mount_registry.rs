//! Integration tests for the mount registry against a mock driver

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rmount::daemon::driver::{DriverError, StopOutcome};
use rmount::daemon::mount_manager::{MountError, MountRegistry, MountStatus};

use crate::common::{MockDriver, SETTLE};

fn registry(driver: Arc<MockDriver>) -> MountRegistry {
    MountRegistry::with_settle(driver, PathBuf::from("/Users/u/mounts"), SETTLE)
}

#[tokio::test]
async fn test_mount_records_derived_path() {
    let driver = MockDriver::new();
    let registry = registry(driver.clone());

    let record = registry.mount("backup-bucket", "data/2024").await.unwrap();
    assert_eq!(
        record.local_path,
        Path::new("/Users/u/mounts/backup-bucket/2024")
    );
    assert_eq!(record.status, MountStatus::Mounted);
    assert_eq!(record.pid, Some(1000));
    assert_eq!(registry.list().await, vec![record]);
}

#[tokio::test]
async fn test_second_mount_fails_without_starting_driver() {
    let driver = MockDriver::new();
    let registry = registry(driver.clone());

    registry.mount("photos", "").await.unwrap();
    let err = registry.mount("photos", "other").await.unwrap_err();

    assert!(matches!(err, MountError::AlreadyMounted(name) if name == "photos"));
    assert_eq!(driver.start_count(), 1);
    assert_eq!(registry.list().await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_mounts_of_same_name_start_once() {
    let driver = MockDriver::new();
    let registry = registry(driver.clone());

    let (a, b) = tokio::join!(registry.mount("photos", ""), registry.mount("photos", ""));

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let err = a.err().or(b.err()).unwrap();
    assert!(matches!(err, MountError::AlreadyMounted(_)));
    assert_eq!(driver.start_count(), 1);
}

#[tokio::test]
async fn test_unmount_unknown_name() {
    let registry = registry(MockDriver::new());
    let err = registry.unmount("ghost").await.unwrap_err();
    assert!(matches!(err, MountError::NotMounted(name) if name == "ghost"));
}

#[tokio::test]
async fn test_mount_then_unmount_leaves_no_record() {
    let driver = MockDriver::new();
    let registry = registry(driver.clone());

    registry.mount("photos", "").await.unwrap();
    let outcome = registry.unmount("photos").await.unwrap();

    assert_eq!(outcome, StopOutcome::Stopped);
    assert!(registry.list().await.is_empty());
    assert!(!registry.is_mounted("photos").await);
    assert_eq!(driver.stop_count(), 1);
}

#[tokio::test]
async fn test_unmount_of_already_unmounted_path_succeeds() {
    let driver = MockDriver::new();
    let registry = registry(driver.clone());

    registry.mount("photos", "").await.unwrap();
    driver.report_already_unmounted();

    let outcome = registry.unmount("photos").await.unwrap();
    assert_eq!(outcome, StopOutcome::AlreadyUnmounted);
    assert!(registry.get("photos").await.is_none());
}

#[tokio::test]
async fn test_helper_exit_during_settle_inserts_nothing() {
    let driver = MockDriver::new();
    driver.exit_on_probe("Fatal error: directory not empty");
    let registry = registry(driver.clone());

    let err = registry.mount("photos", "").await.unwrap_err();
    match err {
        MountError::MountTimeout { name, output, .. } => {
            assert_eq!(name, "photos");
            assert!(output.contains("directory not empty"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(registry.list().await.is_empty());

    // The name is free again
    assert!(matches!(
        registry.unmount("photos").await,
        Err(MountError::NotMounted(_))
    ));
}

#[tokio::test]
async fn test_mount_directory_change_applies_to_new_mounts() {
    let registry = registry(MockDriver::new());

    let before = registry.mount("a", "").await.unwrap();
    registry.set_mount_directory(PathBuf::from("/mnt/s3")).await;
    let after = registry.mount("b", "x/y").await.unwrap();

    assert_eq!(before.local_path, Path::new("/Users/u/mounts/a"));
    assert_eq!(after.local_path, Path::new("/mnt/s3/b/y"));
    assert_eq!(
        registry.get("a").await.unwrap().local_path,
        before.local_path
    );
}

#[tokio::test]
async fn test_unmount_all_clears_registry() {
    let driver = MockDriver::new();
    let registry = registry(driver.clone());
    for name in ["a", "b", "c"] {
        registry.mount(name, "").await.unwrap();
    }

    let results = registry.unmount_all().await;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert!(registry.list().await.is_empty());
    assert_eq!(driver.stop_count(), 3);
}

#[tokio::test]
async fn test_list_is_sorted_by_name() {
    let registry = registry(MockDriver::new());
    for name in ["zeta", "alpha", "mid"] {
        registry.mount(name, "").await.unwrap();
    }
    let names: Vec<String> = registry.list().await.into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn test_whitespace_target_rejected_when_listing_is_inexact() {
    let driver = MockDriver::new();
    driver.inexact_listing();
    let registry = registry(driver.clone());

    let err = registry.mount("photos", "2020/summer trip").await.unwrap_err();
    assert!(matches!(err, MountError::Driver(DriverError::UnlistablePath(_))));
    assert_eq!(driver.start_count(), 0);

    registry
        .set_mount_directory(PathBuf::from("/Users/u/My Mounts"))
        .await;
    let err = registry.mount("photos", "").await.unwrap_err();
    assert!(matches!(err, MountError::Driver(DriverError::UnlistablePath(_))));
    assert_eq!(driver.start_count(), 0);

    // Rejections reserve nothing
    registry
        .set_mount_directory(PathBuf::from("/Users/u/mounts"))
        .await;
    registry.mount("photos", "2020").await.unwrap();
}

#[tokio::test]
async fn test_spaced_paths_survive_reconcile_with_exact_listing() {
    let driver = MockDriver::new();
    let registry = MountRegistry::with_settle(
        driver.clone(),
        PathBuf::from("/home/u/My Mounts"),
        SETTLE,
    );

    let record = registry.mount("photos", "2020/summer trip").await.unwrap();
    assert_eq!(
        record.local_path,
        Path::new("/home/u/My Mounts/photos/summer trip")
    );

    let report = registry.reconcile().await.unwrap();
    assert!(report.is_noop());
    assert_eq!(report.confirmed, 1);
    assert_eq!(
        registry.get("photos").await.unwrap().status,
        MountStatus::Mounted
    );
}
