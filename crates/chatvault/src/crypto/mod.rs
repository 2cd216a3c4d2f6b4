//! Cryptographic primitives for Chatvault.
//!
//! This module provides:
//! - Argon2id passphrase hardening ([`kdf::derive_base`])
//! - HMAC-SHA256 per-identity, per-field key binding
//! - HKDF-SHA256 domain separation for the history journal
//! - ChaCha20-Poly1305 sealed text tokens
//! - Cryptographically secure random number generation

pub mod kdf;
pub mod random;
pub mod seal;

pub use kdf::{derive_base, derive_domain_key, derive_field_key, KdfParams, Key, HISTORY_DOMAIN};
pub use seal::{open, open_bytes, seal, seal_bytes};
