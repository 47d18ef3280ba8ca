//! Passphrase key derivation (Argon2id)

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::secret::{Secret, SECRET_SIZE};

/// Size of the random salt persisted next to the sealed configuration
pub const SALT_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum KdfError {
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
    #[error("argon2: {0}")]
    Derive(String),
    #[error("failed to generate salt: {0}")]
    Rng(getrandom::Error),
}

/// Argon2id cost parameters. Persisted in the store header so they can be
/// raised later without breaking existing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Number of passes
    pub t_cost: u32,
    /// Degree of parallelism
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    /// Cheapest parameters argon2 accepts. Only meant for tests.
    pub fn insecure_fast() -> Self {
        Self {
            m_cost: Params::MIN_M_COST,
            t_cost: Params::MIN_T_COST,
            p_cost: 1,
        }
    }
}

pub fn generate_salt() -> Result<[u8; SALT_SIZE], KdfError> {
    let mut salt = [0u8; SALT_SIZE];
    getrandom::getrandom(&mut salt).map_err(KdfError::Rng)?;
    Ok(salt)
}

/// Derive the 32-byte sealing key from a passphrase.
///
/// Deterministic for a given `(passphrase, salt, params)`.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> Result<Secret, KdfError> {
    let argon_params = Params::new(
        params.m_cost,
        params.t_cost,
        params.p_cost,
        Some(SECRET_SIZE),
    )
    .map_err(|e| KdfError::Params(e.to_string()))?;

    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; SECRET_SIZE]);
    argon
        .hash_password_into(passphrase, salt, &mut key[..])
        .map_err(|e| KdfError::Derive(e.to_string()))?;

    Ok(Secret::from(*key))
}
