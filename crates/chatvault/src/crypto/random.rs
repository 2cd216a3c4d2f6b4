//! Randomness for salts, nonces and identity ids, drawn from the OS.
//!
//! Nothing here is seeded or reproducible; tests that need fixed bytes
//! build them by hand.

use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes of entropy behind an [`IdentityId`](crate::identity::IdentityId).
pub const ID_BYTES: usize = 16;

/// `N` fresh random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// 96-bit ChaCha20-Poly1305 nonce, fresh per sealed field or journal line.
pub fn random_nonce_12() -> [u8; 12] {
    random_bytes()
}

/// Argon2id salt for a new identity or dump.
pub fn random_salt_16() -> [u8; 16] {
    random_bytes()
}
