//! Integration tests for SecureConfigStore save/load persistence

mod common;

use ::common::config::AppConfig;
use ::common::crypto::NONCE_SIZE;
use ::common::store::{StoreError, HEADER_SIZE};

#[test]
fn test_load_without_file_returns_defaults_while_locked() {
    let (store, _temp) = common::setup_store();
    assert!(!store.is_unlocked());

    let config = store.load().unwrap();
    assert_eq!(config, AppConfig::default());
    assert!(config.s3_data_sources.is_empty());
}

#[test]
fn test_save_requires_unlock() {
    let (store, _temp) = common::setup_store();
    let err = store.save(&AppConfig::default()).unwrap_err();
    assert!(matches!(err, StoreError::NotUnlocked));
    assert!(!store.exists());
}

#[test]
fn test_save_load_round_trip_across_restart() {
    let (store, temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);
    let config = common::populated_config();
    store.save(&config).unwrap();

    // A fresh handle has no cached key, as after a process restart
    let reopened = common::store_at(&temp);
    reopened.unlock(common::PASSPHRASE);
    let loaded = reopened.load().unwrap();

    assert_eq!(loaded, config);
    let names: Vec<_> = loaded
        .s3_data_sources
        .iter()
        .map(|ds| ds.name.as_str())
        .collect();
    assert_eq!(names, vec!["backup-bucket", "photos"]);
}

#[test]
fn test_existing_file_requires_unlock() {
    let (store, temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);
    store.save(&common::populated_config()).unwrap();

    let reopened = common::store_at(&temp);
    assert!(matches!(reopened.load(), Err(StoreError::NotUnlocked)));
}

#[test]
fn test_wrong_passphrase_fails_decrypt() {
    let (store, temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);
    store.save(&common::populated_config()).unwrap();

    let reopened = common::store_at(&temp);
    reopened.unlock("not the passphrase");
    assert!(reopened.is_unlocked());
    assert!(matches!(reopened.load(), Err(StoreError::DecryptError)));
}

#[test]
fn test_truncated_file_is_corrupt() {
    let (store, _temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);
    store.save(&common::populated_config()).unwrap();

    std::fs::write(store.path(), vec![0u8; NONCE_SIZE - 1]).unwrap();
    assert!(matches!(store.load(), Err(StoreError::CorruptFormat(_))));

    let sealed = store.export_sealed(&common::populated_config()).unwrap();
    std::fs::write(store.path(), &sealed[..HEADER_SIZE + NONCE_SIZE - 1]).unwrap();
    assert!(matches!(store.load(), Err(StoreError::CorruptFormat(_))));
}

#[test]
fn test_tampering_is_detected() {
    let (store, _temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);
    store.save(&common::populated_config()).unwrap();

    let original = std::fs::read(store.path()).unwrap();

    // Flip a ciphertext byte
    let mut tampered = original.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    std::fs::write(store.path(), &tampered).unwrap();
    assert!(matches!(store.load(), Err(StoreError::DecryptError)));

    // Flip a salt byte in the authenticated header
    let mut tampered = original.clone();
    tampered[HEADER_SIZE - 1] ^= 0x01;
    std::fs::write(store.path(), &tampered).unwrap();
    assert!(matches!(store.load(), Err(StoreError::DecryptError)));
}

#[test]
fn test_each_save_uses_a_fresh_nonce() {
    let (store, _temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);
    let config = common::populated_config();

    store.save(&config).unwrap();
    let first = std::fs::read(store.path()).unwrap();
    store.save(&config).unwrap();
    let second = std::fs::read(store.path()).unwrap();

    // Same salt/header, different nonce
    assert_eq!(first[..HEADER_SIZE], second[..HEADER_SIZE]);
    assert_ne!(
        first[HEADER_SIZE..HEADER_SIZE + NONCE_SIZE],
        second[HEADER_SIZE..HEADER_SIZE + NONCE_SIZE]
    );
    assert_ne!(first, second);
}

#[test]
fn test_passphrase_change_rekeys() {
    let (store, temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);
    let config = common::populated_config();
    store.save(&config).unwrap();
    let old_header = std::fs::read(store.path()).unwrap()[..HEADER_SIZE].to_vec();

    let loaded = store.load().unwrap();
    store.unlock("new passphrase");
    store.save(&loaded).unwrap();
    let new_header = std::fs::read(store.path()).unwrap()[..HEADER_SIZE].to_vec();
    assert_ne!(old_header, new_header);

    let reopened = common::store_at(&temp);
    reopened.unlock(common::PASSPHRASE);
    assert!(matches!(reopened.load(), Err(StoreError::DecryptError)));
    reopened.unlock("new passphrase");
    assert_eq!(reopened.load().unwrap(), config);
}

#[test]
fn test_export_import_sealed() {
    let (store, temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);
    let config = common::populated_config();
    let sealed = store.export_sealed(&config).unwrap();
    assert!(!store.exists());

    let other = common::store_at(&temp);
    assert!(matches!(
        other.import_sealed(&sealed),
        Err(StoreError::NotUnlocked)
    ));
    other.unlock(common::PASSPHRASE);
    assert_eq!(other.import_sealed(&sealed).unwrap(), config);
}

#[test]
fn test_lock_forgets_passphrase() {
    let (store, _temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);
    store.save(&common::populated_config()).unwrap();

    store.lock();
    assert!(!store.is_unlocked());
    assert!(matches!(store.load(), Err(StoreError::NotUnlocked)));
}
