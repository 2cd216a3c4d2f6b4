//! One conversation turn and its validation at the ingestion boundary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, VaultError};
use crate::time::{now, parse_iso, to_iso};

/// Speaker of a turn.
///
/// Anything other than `user` reads back as `Assistant`, so a forged role
/// string can never make stored text pose as user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse used on read: only an exact `"user"` is a user turn.
    pub fn normalize(s: &str) -> Self {
        if s == "user" {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Role::normalize(&s))
    }
}

mod iso_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&crate::time::to_iso(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(d)?;
        crate::time::parse_iso(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {text:?}")))
    }
}

/// One conversation turn as stored in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(with = "iso_seconds")]
    pub ts: DateTime<Utc>,
    pub role: Role,
    pub content: String,
}

impl Record {
    /// A record stamped with the current time.
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            ts: now(),
            role,
            content: content.into(),
        }
    }

    pub fn ts_iso(&self) -> String {
        to_iso(&self.ts)
    }

    /// Validate an untrusted JSON value into a record.
    ///
    /// `role` and `content` must be strings. A missing or unparsable `ts`
    /// is replaced by the current time.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| VaultError::ValidationFailed("record is not a JSON object".into()))?;
        let role = obj
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| VaultError::ValidationFailed("record has no role".into()))?;
        let content = obj
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| VaultError::ValidationFailed("record has no content".into()))?;
        let ts = obj
            .get("ts")
            .and_then(Value::as_str)
            .and_then(parse_iso)
            .unwrap_or_else(now);

        Ok(Self {
            ts,
            role: Role::normalize(role),
            content: content.to_string(),
        })
    }

    /// Parse and validate one JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| VaultError::ValidationFailed(format!("invalid JSON: {e}")))?;
        Self::from_value(&value)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VaultError::Serialization(e.to_string()))
    }
}
