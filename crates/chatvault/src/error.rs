//! Error types for Chatvault.
//!
//! All errors are strongly typed and propagated without panicking.
//! Passphrases, credentials and record plaintext are never included in
//! error messages.

use crate::identity::IdentityId;

/// Vault error types covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Authenticated decryption rejected the data: wrong passphrase or
    /// tampered ciphertext.
    #[error("Authentication failed (wrong passphrase or tampered data)")]
    AuthFailed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("Passphrase too weak: {0}")]
    WeakPassphrase(String),

    #[error("Name '{name}' matches {} identities", candidates.len())]
    AmbiguousName {
        name: String,
        candidates: Vec<IdentityId>,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Passphrase required: {0}")]
    PassphraseRequired(String),

    #[error("Plaintext export requires explicit confirmation")]
    PlaintextNotConfirmed,

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, VaultError>;
