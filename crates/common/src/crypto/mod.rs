//! Cryptographic primitives for the configuration store
//!
//! - **Key derivation**: Argon2id over the user's passphrase, with a random
//!   per-file salt and cost parameters persisted in the file header
//! - **Sealing**: ChaCha20-Poly1305 with a fresh random nonce per write; the
//!   file header is bound as associated data
//!
//! Nothing here touches the filesystem; see [`crate::store`] for the on-disk
//! layout.

mod kdf;
mod secret;

pub use kdf::{derive_key, generate_salt, KdfError, KdfParams, SALT_SIZE};
pub use secret::{Secret, SecretError, NONCE_SIZE, SECRET_SIZE, TAG_SIZE};
