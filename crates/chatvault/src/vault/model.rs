//! Typed view of the vault file.
//!
//! Raw `key = value` strings stop here: everything past
//! [`VaultSnapshot::parse`] works with [`IdentityId`], decoded salts and
//! sealed-field newtypes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::crypto::KdfParams;
use crate::error::{Result, VaultError};
use crate::identity::IdentityId;

/// Current vault format version.
pub const VAULT_VERSION: u32 = 2;

pub const KEY_VERSION: &str = "version";
pub const KEY_ACTIVE: &str = "user.active";
const USER_PREFIX: &str = "user.";

/// Single-user keys from before multi-identity support.
const LEGACY_CREDENTIAL: &str = "api_key_enc";
const LEGACY_SALT: &str = "kdf_salt";
const LEGACY_KEY_CACHE: &str = "key_cache";

/// Top-level credential keys of the single-user format.
pub const LEGACY_KEYS: [&str; 3] = [LEGACY_CREDENTIAL, LEGACY_SALT, LEGACY_KEY_CACHE];

/// Per-identity fields stored as `user.<id>.<field>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    KdfSalt,
    Kdf,
    UsernameEnc,
    ApiKeyEnc,
    IsAdmin,
    UpdatedAt,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::KdfSalt,
        Field::Kdf,
        Field::UsernameEnc,
        Field::ApiKeyEnc,
        Field::IsAdmin,
        Field::UpdatedAt,
    ];

    /// Name used in the vault file key.
    pub fn as_str(self) -> &'static str {
        match self {
            Field::KdfSalt => "kdf_salt",
            Field::Kdf => "kdf",
            Field::UsernameEnc => "username_enc",
            Field::ApiKeyEnc => "api_key_enc",
            Field::IsAdmin => "is_admin",
            Field::UpdatedAt => "updated_at",
        }
    }

    /// Name bound into the field's encryption key.
    pub fn key_label(self) -> &'static str {
        match self {
            Field::UsernameEnc => "username",
            Field::ApiKeyEnc => "api_key",
            other => other.as_str(),
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

/// Vault file key for one identity field.
pub fn user_key(id: &IdentityId, field: Field) -> String {
    format!("{USER_PREFIX}{id}.{}", field.as_str())
}

/// Prefix shared by every field of one identity.
pub fn user_prefix(id: &IdentityId) -> String {
    format!("{USER_PREFIX}{id}.")
}

/// Raw identity segment of a `user.<id>.<field>` key.
///
/// `user.active` and other two-part keys have no identity segment.
pub fn identity_of_key(key: &str) -> Option<&str> {
    let (raw_id, _) = key.strip_prefix(USER_PREFIX)?.split_once('.')?;
    (!raw_id.is_empty()).then_some(raw_id)
}

/// Whether a key belongs to the identity section or the legacy credentials.
pub fn is_credential_key(key: &str) -> bool {
    key.starts_with(USER_PREFIX) || LEGACY_KEYS.contains(&key)
}

/// Encode a salt for storage (URL-safe base64, padded).
pub fn encode_salt(salt: &[u8; 16]) -> String {
    URL_SAFE.encode(salt)
}

/// Decode a stored salt, tolerating missing padding.
pub fn decode_salt(text: &str) -> Result<[u8; 16]> {
    let bytes = URL_SAFE_NO_PAD
        .decode(text.trim().trim_end_matches('='))
        .map_err(|e| VaultError::Corrupt(format!("invalid kdf_salt encoding: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| VaultError::Corrupt("kdf_salt must be 16 bytes".into()))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// A sealed token as stored in the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedField(pub String);

/// Everything the vault knows about one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: IdentityId,
    /// `None` when the field is missing or malformed.
    pub kdf_salt: Option<[u8; 16]>,
    /// `None` means "use the configured default".
    pub kdf: Option<KdfParams>,
    pub username: Option<SealedField>,
    pub credential: Option<SealedField>,
    pub is_admin: bool,
    pub updated_at: Option<String>,
}

impl IdentityRecord {
    fn empty(id: IdentityId) -> Self {
        Self {
            id,
            kdf_salt: None,
            kdf: None,
            username: None,
            credential: None,
            is_admin: false,
            updated_at: None,
        }
    }

    /// Salt, or `Corrupt` if it is missing or malformed.
    pub fn salt(&self) -> Result<[u8; 16]> {
        self.kdf_salt
            .ok_or_else(|| VaultError::Corrupt(format!("identity {} has no usable kdf_salt", self.id)))
    }

    /// KDF parameters for this identity.
    pub fn kdf_or(&self, default: KdfParams) -> KdfParams {
        self.kdf.unwrap_or(default)
    }

    fn apply(&mut self, field: Field, value: &str) {
        match field {
            Field::KdfSalt => match decode_salt(value) {
                Ok(salt) => self.kdf_salt = Some(salt),
                Err(e) => log::warn!("ignoring kdf_salt of {}: {e}", self.id),
            },
            Field::Kdf => match value.parse() {
                Ok(params) => self.kdf = Some(params),
                Err(e) => log::warn!("ignoring kdf parameters of {}: {e}", self.id),
            },
            Field::UsernameEnc if !value.is_empty() => {
                self.username = Some(SealedField(value.to_string()))
            }
            Field::ApiKeyEnc if !value.is_empty() => {
                self.credential = Some(SealedField(value.to_string()))
            }
            Field::IsAdmin => self.is_admin = parse_flag(value),
            Field::UpdatedAt => self.updated_at = Some(value.to_string()),
            Field::UsernameEnc | Field::ApiKeyEnc => {}
        }
    }
}

/// Bootstrap state of the vault file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    /// No file yet.
    Missing,
    /// A file exists but holds no identity and no legacy credential.
    Empty,
    /// At least one identity (or a legacy credential) is stored.
    Populated,
}

impl VaultStatus {
    /// Whether the caller should run first-time onboarding.
    pub fn needs_onboarding(self) -> bool {
        self != VaultStatus::Populated
    }
}

/// The parsed vault file.
#[derive(Debug, Clone, Default)]
pub struct VaultSnapshot {
    pub version: Option<u32>,
    /// Active identity. Only set when it names an existing identity.
    pub active: Option<IdentityId>,
    pub identities: BTreeMap<IdentityId, IdentityRecord>,
    /// A pre-multi-identity credential pair is present.
    pub legacy_credentials: bool,
}

impl VaultSnapshot {
    /// Build the typed view from raw entries (first occurrence wins).
    pub fn parse(entries: &[(String, String)]) -> Self {
        let mut first: HashMap<&str, &str> = HashMap::new();
        for (k, v) in entries {
            first.entry(k.as_str()).or_insert(v.as_str());
        }

        let mut snapshot = VaultSnapshot {
            version: first.get(KEY_VERSION).and_then(|v| v.parse().ok()),
            legacy_credentials: first.get(LEGACY_CREDENTIAL).is_some_and(|v| !v.is_empty())
                && first.get(LEGACY_SALT).is_some_and(|v| !v.is_empty()),
            ..Default::default()
        };

        // Walk entries in file order so records are filled deterministically.
        for (key, _) in entries {
            let Some(rest) = key.strip_prefix(USER_PREFIX) else {
                continue;
            };
            let Some((raw_id, field_name)) = rest.split_once('.') else {
                continue;
            };
            let Ok(id) = IdentityId::parse(raw_id) else {
                log::warn!("ignoring vault key with malformed identity id: {key}");
                continue;
            };
            let record = snapshot
                .identities
                .entry(id.clone())
                .or_insert_with(|| IdentityRecord::empty(id));
            match Field::from_name(field_name) {
                Some(field) => record.apply(field, first[key.as_str()]),
                None => log::debug!("ignoring unknown vault field {key}"),
            }
        }

        if let Some(active) = first.get(KEY_ACTIVE).map(|v| v.trim()) {
            if !active.is_empty() {
                match IdentityId::parse(active) {
                    Ok(id) if snapshot.identities.contains_key(&id) => snapshot.active = Some(id),
                    _ => log::warn!("active identity {active:?} does not exist; ignoring"),
                }
            }
        }

        snapshot
    }

    pub fn status(&self) -> VaultStatus {
        if self.identities.is_empty() && !self.legacy_credentials {
            VaultStatus::Empty
        } else {
            VaultStatus::Populated
        }
    }

    pub fn get(&self, id: &IdentityId) -> Option<&IdentityRecord> {
        self.identities.get(id)
    }

    /// All identity ids, sorted.
    pub fn ids(&self) -> BTreeSet<IdentityId> {
        self.identities.keys().cloned().collect()
    }

    /// Ids of identities flagged as admin, sorted.
    pub fn admin_ids(&self) -> Vec<IdentityId> {
        self.identities
            .values()
            .filter(|r| r.is_admin)
            .map(|r| r.id.clone())
            .collect()
    }
}
