//! Key derivation: passphrase hardening, field binding and domain separation.
//!
//! All key material for one identity descends from a single Argon2id
//! derivation of the master passphrase and the identity's salt:
//!
//! ```text
//! passphrase, kdf_salt ──Argon2id──▶ base
//! base ──HMAC-SHA256("chatvault|v2|uid:<id>|field:<name>")──▶ field key
//! base ──HKDF-SHA256(salt = kdf_salt, info = domain)──────────▶ domain key
//! ```
//!
//! Field keys and domain keys are computed through different PRF
//! constructions with disjoint inputs, so neither can be used to recover
//! the other or the base.

use std::fmt;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// 32 bytes of symmetric key material, wiped on drop.
pub type Key = Zeroizing<[u8; 32]>;

/// HKDF info string for the history journal. Must remain stable across
/// versions; changing it makes every existing journal unreadable.
pub const HISTORY_DOMAIN: &str = "chatvault:history";

/// Format tag bound into every field key.
const FIELD_KEY_TAG: &str = "chatvault|v2";

/// Largest accepted memory cost in KiB (1 GiB).
pub const MAX_M_COST: u32 = 1 << 20;
/// Largest accepted pass count.
pub const MAX_T_COST: u32 = 64;
/// Largest accepted lane count.
pub const MAX_P_COST: u32 = 64;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of passes.
    pub t_cost: u32,
    /// Parallel lanes.
    pub p_cost: u32,
}

impl KdfParams {
    /// The cheapest parameters Argon2 accepts. Only for tests and benches.
    pub const fn minimal() -> Self {
        Self {
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }

    /// Reject costs beyond [`MAX_M_COST`], [`MAX_T_COST`] or [`MAX_P_COST`].
    ///
    /// Parameters read from a vault or dump are untrusted; an absurd memory
    /// cost would otherwise abort the process on allocation.
    pub fn validate(self) -> Result<Self> {
        if self.m_cost > MAX_M_COST || self.t_cost > MAX_T_COST || self.p_cost > MAX_P_COST {
            return Err(VaultError::Corrupt(format!(
                "KDF parameters out of range: {self}"
            )));
        }
        Ok(self)
    }

    fn to_argon2(self) -> Result<Argon2<'static>> {
        self.validate()?;
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(32))
            .map_err(|e| VaultError::DerivationFailed(format!("Argon2 params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536, // 64 MiB
            t_cost: 3,
            p_cost: 4,
        }
    }
}

impl fmt::Display for KdfParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "argon2id$m={},t={},p={}",
            self.m_cost, self.t_cost, self.p_cost
        )
    }
}

impl FromStr for KdfParams {
    type Err = VaultError;

    /// Parse `argon2id$m=<KiB>,t=<passes>,p=<lanes>`.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || VaultError::Corrupt(format!("invalid KDF parameters: {s:?}"));
        let body = s.trim().strip_prefix("argon2id$").ok_or_else(bad)?;

        let (mut m, mut t, mut p) = (None, None, None);
        for part in body.split(',') {
            let (k, v) = part.split_once('=').ok_or_else(bad)?;
            let v: u32 = v.trim().parse().map_err(|_| bad())?;
            match k.trim() {
                "m" => m = Some(v),
                "t" => t = Some(v),
                "p" => p = Some(v),
                _ => return Err(bad()),
            }
        }

        Self {
            m_cost: m.ok_or_else(bad)?,
            t_cost: t.ok_or_else(bad)?,
            p_cost: p.ok_or_else(bad)?,
        }
        .validate()
    }
}

/// Harden a passphrase into 32 bytes of base key material with Argon2id.
///
/// `salt` is always caller-supplied and persisted next to whatever the key
/// protects; it must never be shared between identities.
pub fn derive_base(passphrase: &[u8], salt: &[u8; 16], params: KdfParams) -> Result<Key> {
    let argon2 = params.to_argon2()?;
    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, &mut output[..])
        .map_err(|e| VaultError::DerivationFailed(format!("Argon2 hash: {e}")))?;
    Ok(output)
}

/// Bind a base key to one field of one identity.
///
/// Computed as `HMAC-SHA256(base, "chatvault|v2|uid:<id>|field:<field>")`.
pub fn derive_field_key(base: &[u8; 32], id: &str, field: &str) -> Result<Key> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(base)
        .map_err(|e| VaultError::DerivationFailed(format!("HMAC init: {e}")))?;
    mac.update(format!("{FIELD_KEY_TAG}|uid:{id}|field:{field}").as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&digest);
    Ok(key)
}

/// Derive a key for a separate subsystem from an already hardened base.
///
/// HKDF-SHA256 with `salt` as the extract salt and `domain` as the info
/// string.
pub fn domain_key_from_base(base: &[u8; 32], salt: &[u8; 16], domain: &str) -> Result<Key> {
    let hk = Hkdf::<Sha256>::new(Some(salt), base);
    let mut output = Zeroizing::new([0u8; 32]);
    hk.expand(domain.as_bytes(), &mut output[..])
        .map_err(|e| VaultError::DerivationFailed(format!("HKDF expand failed: {e}")))?;
    Ok(output)
}

/// Derive a domain key straight from a passphrase.
pub fn derive_domain_key(
    passphrase: &[u8],
    salt: &[u8; 16],
    params: KdfParams,
    domain: &str,
) -> Result<Key> {
    let base = derive_base(passphrase, salt, params)?;
    domain_key_from_base(&base, salt, domain)
}
