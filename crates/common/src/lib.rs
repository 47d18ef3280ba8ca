/**
 * Data model for the persisted configuration:
 *  data sources, mount directory, backup settings,
 *  and the catalog that keeps data source names unique.
 */
pub mod config;
/**
 * Passphrase key derivation and AEAD sealing.
 */
pub mod crypto;
/**
 * Encrypted on-disk store for the configuration.
 *  Atomic writes, versioned header, fresh nonce per save.
 */
pub mod store;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::config::{AppConfig, CatalogError, DataSourceCatalog, S3DataSource};
    pub use crate::crypto::KdfParams;
    pub use crate::store::{SecureConfigStore, StoreError};
    pub use crate::version::build_info;
}
