//! Authenticated encryption with ChaCha20-Poly1305.
//!
//! Two encodings are provided:
//! - raw bytes, `nonce(12) || ciphertext || tag(16)`, used inside dump
//!   documents where the envelope carries its own base64;
//! - text tokens, URL-safe unpadded base64 of `0x01 || nonce || ciphertext
//!   || tag`, used for vault fields and history lines. Tokens never contain
//!   `=`, whitespace or newlines, so they are safe inside `key = value`
//!   lines and line-oriented logs.
//!
//! Decryption distinguishes structural damage ([`VaultError::Corrupt`]) from
//! an authentication failure ([`VaultError::AuthFailed`]).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};

use crate::crypto::random::random_nonce_12;
use crate::error::{Result, VaultError};

/// Token format version byte.
const TOKEN_VERSION: u8 = 0x01;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt `plaintext`, returning `nonce || ciphertext`.
pub fn seal_bytes(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce_bytes = random_nonce_12();
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| VaultError::EncryptionFailed(format!("cipher init: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| VaultError::EncryptionFailed(format!("encrypt: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `nonce || ciphertext` produced by [`seal_bytes`].
pub fn open_bytes(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::Corrupt(format!(
            "sealed data too short ({} bytes)",
            sealed.len()
        )));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| VaultError::Corrupt(format!("cipher init: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::AuthFailed)
}

/// Encrypt `plaintext` into a single-line text token.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<String> {
    let sealed = seal_bytes(key, plaintext)?;
    let mut framed = Vec::with_capacity(1 + sealed.len());
    framed.push(TOKEN_VERSION);
    framed.extend_from_slice(&sealed);
    Ok(URL_SAFE_NO_PAD.encode(framed))
}

/// Decrypt a text token produced by [`seal`].
pub fn open(key: &[u8; 32], token: &str) -> Result<Vec<u8>> {
    let framed = URL_SAFE_NO_PAD
        .decode(token.trim().trim_end_matches('='))
        .map_err(|e| VaultError::Corrupt(format!("invalid token encoding: {e}")))?;
    match framed.split_first() {
        Some((&TOKEN_VERSION, sealed)) => open_bytes(key, sealed),
        Some((v, _)) => Err(VaultError::Corrupt(format!("unknown token version {v}"))),
        None => Err(VaultError::Corrupt("empty token".into())),
    }
}
