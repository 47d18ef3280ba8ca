//! Encrypted, passphrase-gated persistence of [`AppConfig`]
//!
//! File layout (`config.enc`):
//!
//! ```text
//! magic "RMNT" (4) | version (1) | m_cost u32le | t_cost u32le | p_cost u32le
//! | salt (16) | nonce (12) | ciphertext || tag (16)
//! ```
//!
//! Everything before the nonce is the header. It is authenticated as
//! associated data, so swapping the salt or cost parameters is detected the
//! same way as a wrong passphrase.
//!
//! The store guards its state with a single mutex but takes no inter-process
//! lock: only one process may own a configuration directory at a time.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use zeroize::Zeroizing;

use crate::config::AppConfig;
use crate::crypto::{
    derive_key, generate_salt, KdfError, KdfParams, Secret, SecretError, NONCE_SIZE, SALT_SIZE,
};

pub const CONFIG_FILE_NAME: &str = "config.enc";

const MAGIC: &[u8; 4] = b"RMNT";
/// Current key-derivation/sealing scheme. Bump when either changes.
pub const SCHEME_VERSION: u8 = 1;
/// magic + version + three u32 cost parameters + salt
pub const HEADER_SIZE: usize = MAGIC.len() + 1 + 3 * 4 + SALT_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("configuration store is locked; unlock it with the passphrase first")]
    NotUnlocked,
    #[error("failed to decrypt configuration: wrong passphrase or tampered file")]
    DecryptError,
    #[error("corrupt configuration file: {0}")]
    CorruptFormat(String),
    #[error("unsupported configuration format version {0}")]
    UnsupportedVersion(u8),
    #[error("key derivation failed: {0}")]
    Kdf(#[from] KdfError),
    #[error("failed to seal configuration: {0}")]
    Seal(SecretError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    params: KdfParams,
    salt: [u8; SALT_SIZE],
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(MAGIC);
        out[4] = SCHEME_VERSION;
        out[5..9].copy_from_slice(&self.params.m_cost.to_le_bytes());
        out[9..13].copy_from_slice(&self.params.t_cost.to_le_bytes());
        out[13..17].copy_from_slice(&self.params.p_cost.to_le_bytes());
        out[17..].copy_from_slice(&self.salt);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::CorruptFormat(format!(
                "header needs {} bytes, found {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        if &bytes[..4] != MAGIC {
            return Err(StoreError::CorruptFormat("bad magic".to_string()));
        }
        if bytes[4] != SCHEME_VERSION {
            return Err(StoreError::UnsupportedVersion(bytes[4]));
        }

        let u32_at = |at: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[at..at + 4]);
            u32::from_le_bytes(buf)
        };
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[17..HEADER_SIZE]);

        Ok(Self {
            params: KdfParams {
                m_cost: u32_at(5),
                t_cost: u32_at(9),
                p_cost: u32_at(13),
            },
            salt,
        })
    }
}

/// Key derived for one particular header, reused across saves until the
/// store is unlocked again.
struct DerivedKey {
    header: Header,
    key: Secret,
}

#[derive(Default)]
struct StoreState {
    passphrase: Option<Zeroizing<Vec<u8>>>,
    derived: Option<DerivedKey>,
}

impl StoreState {
    fn passphrase(&self) -> Result<&[u8], StoreError> {
        self.passphrase
            .as_ref()
            .map(|p| p.as_slice())
            .ok_or(StoreError::NotUnlocked)
    }

    fn key_for(&self, header: &Header) -> Result<Secret, StoreError> {
        match &self.derived {
            Some(derived) if derived.header == *header => Ok(derived.key.clone()),
            _ => Ok(derive_key(self.passphrase()?, &header.salt, &header.params)?),
        }
    }
}

pub struct SecureConfigStore {
    path: PathBuf,
    params: KdfParams,
    state: Mutex<StoreState>,
}

impl std::fmt::Debug for SecureConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureConfigStore")
            .field("path", &self.path)
            .field("params", &self.params)
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

impl SecureConfigStore {
    /// Store at `path` using the default Argon2id cost for new files
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_params(path, KdfParams::default())
    }

    /// `params` only applies to files this store creates; existing files
    /// carry their own parameters.
    pub fn with_params(path: impl Into<PathBuf>, params: KdfParams) -> Self {
        Self {
            path: path.into(),
            params,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Store at `<dir>/config.enc`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remember the passphrase. No verification happens here; a wrong
    /// passphrase surfaces as [`StoreError::DecryptError`] on the next load.
    pub fn unlock(&self, passphrase: &str) {
        let mut state = self.state.lock();
        state.passphrase = Some(Zeroizing::new(passphrase.as_bytes().to_vec()));
        state.derived = None;
    }

    pub fn lock(&self) {
        *self.state.lock() = StoreState::default();
    }

    pub fn is_unlocked(&self) -> bool {
        self.state.lock().passphrase.is_some()
    }

    /// Load the configuration. A missing file yields the default config and
    /// does not require the store to be unlocked.
    pub fn load(&self) -> Result<AppConfig, StoreError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no configuration file, using defaults");
                return Ok(AppConfig::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut state = self.state.lock();
        state.passphrase()?;
        let config = Self::open(&mut state, &data)?;
        tracing::debug!(
            path = %self.path.display(),
            data_sources = config.s3_data_sources.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Seal and atomically replace the configuration file.
    pub fn save(&self, config: &AppConfig) -> Result<(), StoreError> {
        let sealed = {
            let mut state = self.state.lock();
            self.seal(&mut state, config)?
        };

        write_atomic(&self.path, &sealed)?;
        tracing::debug!(path = %self.path.display(), bytes = sealed.len(), "saved configuration");
        Ok(())
    }

    /// Sealed bytes in the on-disk format, without touching the file.
    pub fn export_sealed(&self, config: &AppConfig) -> Result<Vec<u8>, StoreError> {
        let mut state = self.state.lock();
        self.seal(&mut state, config)
    }

    /// Open bytes produced by [`Self::export_sealed`] (or read from a
    /// `config.enc` file) with the unlocked passphrase.
    pub fn import_sealed(&self, data: &[u8]) -> Result<AppConfig, StoreError> {
        let mut state = self.state.lock();
        state.passphrase()?;
        Self::open(&mut state, data)
    }

    fn seal(&self, state: &mut StoreState, config: &AppConfig) -> Result<Vec<u8>, StoreError> {
        state.passphrase()?;

        if state.derived.is_none() {
            let header = Header {
                params: self.params,
                salt: generate_salt()?,
            };
            let key = state.key_for(&header)?;
            state.derived = Some(DerivedKey { header, key });
        }
        let derived = state.derived.as_ref().ok_or(StoreError::NotUnlocked)?;

        let header = derived.header.encode();
        let plaintext = Zeroizing::new(config.to_json_bytes()?);
        let sealed = derived
            .key
            .seal(&plaintext, &header)
            .map_err(StoreError::Seal)?;

        let mut out = Vec::with_capacity(HEADER_SIZE + sealed.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn open(state: &mut StoreState, data: &[u8]) -> Result<AppConfig, StoreError> {
        if data.len() < HEADER_SIZE + NONCE_SIZE {
            return Err(StoreError::CorruptFormat(format!(
                "file too short ({} bytes)",
                data.len()
            )));
        }

        let header = Header::decode(data)?;
        let key = state.key_for(&header)?;
        let plaintext = key
            .open(&data[HEADER_SIZE..], &data[..HEADER_SIZE])
            .map(Zeroizing::new)
            .map_err(|e| match e {
                SecretError::TooShort(n) => {
                    StoreError::CorruptFormat(format!("sealed payload too short ({} bytes)", n))
                }
                _ => StoreError::DecryptError,
            })?;

        let config = AppConfig::from_json_bytes(&plaintext)
            .map_err(|e| StoreError::CorruptFormat(format!("invalid payload: {}", e)))?;

        state.derived = Some(DerivedKey { header, key });
        Ok(config)
    }
}

/// Write to a sibling temporary file, fsync, then rename over `path` so a
/// crash never leaves a partially written file in place.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = Header {
            params: KdfParams {
                m_cost: 19456,
                t_cost: 2,
                p_cost: 1,
            },
            salt: [9u8; SALT_SIZE],
        };
        assert_eq!(Header::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn header_rejects_bad_magic_and_version() {
        let header = Header {
            params: KdfParams::insecure_fast(),
            salt: [0u8; SALT_SIZE],
        };
        let mut bytes = header.encode();
        bytes[4] = 9;
        assert!(matches!(
            Header::decode(&bytes),
            Err(StoreError::UnsupportedVersion(9))
        ));

        bytes[0] = b'X';
        assert!(matches!(
            Header::decode(&bytes),
            Err(StoreError::CorruptFormat(_))
        ));
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.bin");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.bin");
        write_atomic(&path, b"x").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
