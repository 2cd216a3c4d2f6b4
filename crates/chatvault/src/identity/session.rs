//! An unlocked identity.
//!
//! A [`Session`] keeps the hardened base key instead of the passphrase, so
//! repeated credential or history access does not rerun Argon2id. The key
//! is wiped when the session is dropped.

use std::fmt;

use crate::crypto::Key;
use crate::error::Result;
use crate::history::HistoryLog;
use crate::identity::credential::Credential;
use crate::identity::id::IdentityId;
use crate::identity::manager::{credential_with, IdentityManager};

pub struct Session {
    id: IdentityId,
    display_name: String,
    base: Key,
}

impl Session {
    pub(crate) fn new(id: IdentityId, display_name: String, base: Key) -> Self {
        Self {
            id,
            display_name,
            base,
        }
    }

    pub fn id(&self) -> &IdentityId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Decrypt this identity's credential.
    pub fn credential(&self, manager: &IdentityManager) -> Result<Credential> {
        let record = manager.record_for_session(&self.id)?;
        credential_with(&record, &self.base)
    }

    /// Open this identity's history journal.
    pub fn history(&self, manager: &IdentityManager) -> Result<HistoryLog> {
        let record = manager.record_for_session(&self.id)?;
        manager.history_with(&record, &self.base)
    }

    /// End the session, wiping the key material.
    pub fn logout(self) {
        log::debug!("session closed for {}", self.id);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}
