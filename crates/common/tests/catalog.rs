//! Integration tests for the data source catalog

mod common;

use std::collections::HashSet;

use ::common::config::{AppConfig, CatalogError};

/// Small deterministic generator so the operation mix is reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

fn assert_unique(config: &AppConfig) {
    let mut seen = HashSet::new();
    for ds in config.catalog().list() {
        assert!(seen.insert(ds.name.clone()), "duplicate name {}", ds.name);
    }
}

#[test]
fn test_names_stay_unique_under_random_mutations() {
    const NAMES: [&str; 5] = ["a", "b", "c", "d", "e"];

    for seed in 0..50u64 {
        let mut rng = Lcg(seed);
        let mut config = AppConfig::default();

        for _ in 0..200 {
            let name = NAMES[rng.next(NAMES.len() as u64) as usize];
            let target = NAMES[rng.next(NAMES.len() as u64) as usize];
            let existed = config.catalog().contains(name);

            match rng.next(3) {
                0 => {
                    let mut catalog = config.catalog_mut();
                    let result = catalog.add(common::data_source(name, "b"));
                    assert_eq!(result.is_err(), existed);
                }
                1 => {
                    let result = config.catalog_mut().remove(name);
                    assert_eq!(result.is_ok(), existed);
                }
                _ => {
                    let collides = name != target && config.catalog().contains(target);
                    let result = config
                        .catalog_mut()
                        .update(name, common::data_source(target, "b"))
                        .map(|ds| ds.name.clone());
                    match result {
                        Ok(new_name) => {
                            assert!(existed && !collides);
                            assert_eq!(new_name, target);
                        }
                        Err(CatalogError::NotFound(_)) => assert!(!existed),
                        Err(CatalogError::DuplicateName(_)) => assert!(collides),
                        Err(e) => panic!("unexpected error {e}"),
                    }
                }
            }

            assert_unique(&config);
        }
    }
}

#[test]
fn test_catalog_mutation_then_persist() {
    let (store, temp) = common::setup_store();
    store.unlock(common::PASSPHRASE);

    let mut config = store.load().unwrap();
    config
        .catalog_mut()
        .add(common::data_source("backup-bucket", "data"))
        .unwrap();
    store.save(&config).unwrap();

    let reopened = common::store_at(&temp);
    reopened.unlock(common::PASSPHRASE);
    let loaded = reopened.load().unwrap();
    let ds = loaded.catalog().get("backup-bucket").unwrap();
    assert_eq!(ds.bucket, "data");
    assert_eq!(ds.secret_key, "wJalrXUtnFEMI/K7MDENG");
}
