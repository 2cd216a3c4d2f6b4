//! Identity identifiers.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::random::{random_bytes, ID_BYTES};
use crate::error::{Result, VaultError};

/// Unique identifier for an identity.
///
/// Format: URL-safe base64 of 16 random bytes, padding stripped (22 chars).
/// Never derived from the display name, so vault keys reveal nothing about
/// who an identity belongs to. The alphabet excludes `.`, `=` and
/// whitespace, which keeps ids safe inside `user.<id>.<field> = value`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityId(String);

impl IdentityId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(URL_SAFE_NO_PAD.encode(random_bytes::<ID_BYTES>()))
    }

    /// Validate an id read from storage or user input.
    pub fn parse(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(VaultError::ValidationFailed(format!(
                "invalid identity id: {s:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdentityId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IdentityId {
    type Error = VaultError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<IdentityId> for String {
    fn from(id: IdentityId) -> Self {
        id.0
    }
}
