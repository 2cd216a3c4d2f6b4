//! Identity management over the vault store.
//!
//! Every identity owns a random id, a random salt and two sealed fields
//! (display name and credential). Field keys are derived from the identity's
//! master passphrase, so different identities in one vault may use
//! different passphrases: operations that sweep the whole vault (`list`,
//! name resolution) silently skip identities the given passphrase does not
//! open.

use std::collections::BTreeSet;

use zeroize::Zeroizing;

use crate::config::{DataLayout, VaultConfig};
use crate::crypto::kdf::{derive_base, derive_field_key, domain_key_from_base};
use crate::crypto::random::random_salt_16;
use crate::crypto::{open, seal, Key, HISTORY_DOMAIN};
use crate::error::{Result, VaultError};
use crate::history::HistoryLog;
use crate::identity::credential::Credential;
use crate::identity::id::IdentityId;
use crate::identity::policy::{validate_passphrase_with, StrengthEstimator};
use crate::identity::session::Session;
use crate::time::now_iso;
use crate::vault::model::{
    encode_salt, user_key, user_prefix, Field, IdentityRecord, SealedField, VaultSnapshot,
    VaultStatus, KEY_ACTIVE, KEY_VERSION, VAULT_VERSION,
};
use crate::vault::{ResetMode, VaultStore};

/// Result of [`IdentityManager::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub id: IdentityId,
    /// New active identity if the removed one was active (`None` if the
    /// pointer was cleared or untouched).
    pub new_active: Option<IdentityId>,
    /// The caller asked for a hard removal and should purge the identity's
    /// data directory (see [`DataLayout::purge_identity`]).
    pub purge_requested: bool,
}

/// Case-, whitespace- and width-insensitive form of a display name.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// CRUD over the identities stored in one vault file.
pub struct IdentityManager {
    config: VaultConfig,
    store: VaultStore,
    layout: DataLayout,
    estimator: Option<Box<dyn StrengthEstimator + Send + Sync>>,
}

impl IdentityManager {
    pub fn new(config: VaultConfig) -> Self {
        let layout = config.layout();
        let store = VaultStore::new(layout.secrets_file());
        Self {
            config,
            store,
            layout,
            estimator: None,
        }
    }

    /// Use a stronger passphrase estimator instead of the built-in rules.
    pub fn with_estimator(mut self, estimator: Box<dyn StrengthEstimator + Send + Sync>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn store(&self) -> &VaultStore {
        &self.store
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn status(&self) -> Result<VaultStatus> {
        self.store.status()
    }

    pub fn snapshot(&self) -> Result<VaultSnapshot> {
        self.store.snapshot()
    }

    /// The active identity, if one is set.
    pub fn active(&self) -> Result<Option<IdentityId>> {
        Ok(self.snapshot()?.active)
    }

    fn record(&self, id: &IdentityId) -> Result<IdentityRecord> {
        self.snapshot()?
            .identities
            .remove(id)
            .ok_or_else(|| VaultError::NotFound(format!("identity {id}")))
    }

    /// Create an identity, make it active and return its id.
    ///
    /// The first identity created in an empty vault becomes admin.
    ///
    /// # Errors
    ///
    /// `WeakPassphrase` if `passphrase` fails the policy, `ValidationFailed`
    /// for an empty display name.
    pub fn create(&self, display_name: &str, passphrase: &str, credential: &str) -> Result<IdentityId> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(VaultError::ValidationFailed(
                "display name must not be empty".into(),
            ));
        }
        let estimator = self
            .estimator
            .as_deref()
            .map(|e| e as &dyn StrengthEstimator);
        validate_passphrase_with(passphrase, estimator)?;

        let snapshot = self.snapshot()?;
        let is_first = snapshot.identities.is_empty();
        let id = loop {
            let candidate = IdentityId::generate();
            if !snapshot.identities.contains_key(&candidate) {
                break candidate;
            }
        };

        let salt = random_salt_16();
        let params = self.config.kdf;
        let base = derive_base(passphrase.as_bytes(), &salt, params)?;
        let name_token = seal_field(&base, &id, Field::UsernameEnc, display_name.as_bytes())?;
        let credential_token = seal_field(&base, &id, Field::ApiKeyEnc, credential.as_bytes())?;

        let version = VAULT_VERSION.to_string();
        let salt_text = encode_salt(&salt);
        let params_text = params.to_string();
        let updated_at = now_iso();
        let keys: Vec<(String, &str)> = vec![
            (KEY_VERSION.to_string(), version.as_str()),
            (user_key(&id, Field::KdfSalt), salt_text.as_str()),
            (user_key(&id, Field::Kdf), params_text.as_str()),
            (user_key(&id, Field::UsernameEnc), name_token.as_str()),
            (user_key(&id, Field::ApiKeyEnc), credential_token.as_str()),
            (user_key(&id, Field::UpdatedAt), updated_at.as_str()),
            (user_key(&id, Field::IsAdmin), if is_first { "1" } else { "0" }),
            (KEY_ACTIVE.to_string(), id.as_str()),
        ];
        let pairs: Vec<(&str, &str)> = keys.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        self.store.set_many(&pairs)?;

        self.layout.provision(&id)?;
        log::debug!("created identity {id} (admin: {is_first})");
        Ok(id)
    }

    /// Decrypt every display name the passphrase opens, sorted by name.
    ///
    /// Identities that do not open with `passphrase` are skipped, not
    /// reported: in a shared vault they belong to someone else.
    pub fn list(&self, passphrase: &str) -> Result<Vec<(IdentityId, String)>> {
        let snapshot = self.snapshot()?;
        let mut out = Vec::new();

        for record in snapshot.identities.values() {
            match self.unlock(record, passphrase).and_then(|base| display_name_with(record, &base)) {
                Ok(name) => out.push((record.id.clone(), name)),
                Err(VaultError::AuthFailed) => continue,
                Err(e) => {
                    log::debug!("skipping identity {} while listing: {e}", record.id);
                    continue;
                }
            }
        }

        out.sort_by(|a, b| {
            normalize_name(&a.1)
                .cmp(&normalize_name(&b.1))
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(out)
    }

    /// Resolve a display name or id to an id.
    ///
    /// An exact id match needs no passphrase. Otherwise names are decrypted
    /// with `passphrase` and compared after [`normalize_name`].
    ///
    /// # Errors
    ///
    /// `PassphraseRequired` if a name lookup has no passphrase, `NotFound`
    /// if nothing matches, `AmbiguousName` if several identities match.
    pub fn resolve(&self, name_or_id: &str, passphrase: Option<&str>) -> Result<IdentityId> {
        let input = name_or_id.trim();
        if let Ok(id) = IdentityId::parse(input) {
            if self.snapshot()?.identities.contains_key(&id) {
                return Ok(id);
            }
        }

        let passphrase = passphrase.ok_or_else(|| {
            VaultError::PassphraseRequired(format!("resolving name {input:?}"))
        })?;
        let target = normalize_name(input);
        let candidates: Vec<IdentityId> = self
            .list(passphrase)?
            .into_iter()
            .filter(|(_, name)| normalize_name(name) == target)
            .map(|(id, _)| id)
            .collect();

        match candidates.as_slice() {
            [] => Err(VaultError::NotFound(format!("identity named {input:?}"))),
            [only] => Ok(only.clone()),
            _ => Err(VaultError::AmbiguousName {
                name: input.to_string(),
                candidates,
            }),
        }
    }

    /// Make `id` the active identity and make sure its files exist.
    pub fn activate(&self, id: &IdentityId) -> Result<()> {
        self.record(id)?;
        self.store.set(KEY_ACTIVE, id.as_str())?;
        self.layout.provision(id)?;
        log::debug!("activated identity {id}");
        Ok(())
    }

    /// Delete every `user.<id>.*` field.
    ///
    /// If `id` was active the pointer moves to the first remaining identity
    /// or is cleared. `hard` is passed back as a purge request for the
    /// caller's data layer.
    pub fn remove(&self, id: &IdentityId, hard: bool) -> Result<Removal> {
        let before = self.snapshot()?;
        if !before.identities.contains_key(id) {
            return Err(VaultError::NotFound(format!("identity {id}")));
        }

        let prefix = user_prefix(id);
        let removed = self.store.remove_where(|k| k.starts_with(&prefix))?;

        let mut new_active = None;
        if before.active.as_ref() == Some(id) {
            new_active = before.ids().into_iter().find(|other| other != id);
            let pointer = new_active.as_ref().map(IdentityId::as_str).unwrap_or("");
            self.store.set(KEY_ACTIVE, pointer)?;
        }

        log::debug!("removed identity {id} ({removed} fields, hard: {hard})");
        Ok(Removal {
            id: id.clone(),
            new_active,
            purge_requested: hard,
        })
    }

    /// Delete data directories that no identity in the vault owns.
    pub fn prune_orphan_dirs(&self) -> Result<usize> {
        let removed = self.layout.prune_orphans(&self.snapshot()?.ids())?;
        log::debug!("pruned {removed} orphaned data directories");
        Ok(removed)
    }

    /// Drop vault entries of identities whose data directory is gone.
    ///
    /// Returns the raw ids that were dropped. An active pointer to one of
    /// them moves to the first remaining identity.
    pub fn prune_orphan_entries(&self) -> Result<BTreeSet<String>> {
        let present = self.layout.user_dir_names()?;
        let active = self.snapshot()?.active;
        let pruned = self.store.prune_identities(|id| !present.contains(id))?;

        if active.is_some_and(|a| pruned.contains(a.as_str())) {
            let next = self.snapshot()?.ids().into_iter().next();
            let pointer = next.as_ref().map(IdentityId::as_str).unwrap_or("");
            self.store.set(KEY_ACTIVE, pointer)?;
        }
        Ok(pruned)
    }

    /// Wipe every stored credential. Journals are left alone.
    pub fn reset_vault(&self, mode: ResetMode) -> Result<usize> {
        let discarded = self.store.reset(mode)?;
        log::warn!("vault reset ({mode:?}): {discarded} entries discarded");
        Ok(discarded)
    }

    /// Decrypt an identity's credential.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id or missing field, `AuthFailed` for a
    /// wrong passphrase, `Corrupt` for malformed stored data.
    pub fn get_credential(&self, id: &IdentityId, passphrase: &str) -> Result<Credential> {
        let record = self.record(id)?;
        let base = self.unlock(&record, passphrase)?;
        credential_with(&record, &base)
    }

    /// Decrypt an identity's display name.
    pub fn display_name(&self, id: &IdentityId, passphrase: &str) -> Result<String> {
        let record = self.record(id)?;
        let base = self.unlock(&record, passphrase)?;
        display_name_with(&record, &base)
    }

    /// Replace an identity's credential. The passphrase is verified against
    /// the stored display name first.
    pub fn set_credential(&self, id: &IdentityId, passphrase: &str, credential: &str) -> Result<()> {
        let record = self.record(id)?;
        let base = self.unlock(&record, passphrase)?;
        display_name_with(&record, &base)?;

        let token = seal_field(&base, id, Field::ApiKeyEnc, credential.as_bytes())?;
        let updated_at = now_iso();
        let credential_key = user_key(id, Field::ApiKeyEnc);
        let updated_key = user_key(id, Field::UpdatedAt);
        self.store.set_many(&[
            (credential_key.as_str(), token.as_str()),
            (updated_key.as_str(), updated_at.as_str()),
        ])?;
        log::debug!("rotated credential of {id}");
        Ok(())
    }

    pub fn set_admin(&self, id: &IdentityId, admin: bool) -> Result<()> {
        self.record(id)?;
        self.store
            .set(&user_key(id, Field::IsAdmin), if admin { "1" } else { "0" })
    }

    pub fn is_admin(&self, id: &IdentityId) -> Result<bool> {
        Ok(self.snapshot()?.get(id).is_some_and(|r| r.is_admin))
    }

    pub fn admin_ids(&self) -> Result<Vec<IdentityId>> {
        Ok(self.snapshot()?.admin_ids())
    }

    /// Open an identity's history journal after verifying the passphrase.
    pub fn history(&self, id: &IdentityId, passphrase: &str) -> Result<HistoryLog> {
        let record = self.record(id)?;
        let base = self.unlock(&record, passphrase)?;
        display_name_with(&record, &base)?;
        self.history_with(&record, &base)
    }

    /// Verify a passphrase for `name_or_id` and start a session.
    pub fn login(&self, name_or_id: &str, passphrase: &str) -> Result<Session> {
        let id = self.resolve(name_or_id, Some(passphrase))?;
        let record = self.record(&id)?;
        let base = self.unlock(&record, passphrase)?;
        let name = display_name_with(&record, &base)?;
        log::debug!("session opened for {id}");
        Ok(Session::new(id, name, base))
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    /// Harden `passphrase` with this identity's salt and parameters.
    fn unlock(&self, record: &IdentityRecord, passphrase: &str) -> Result<Key> {
        let salt = record.salt()?;
        derive_base(passphrase.as_bytes(), &salt, record.kdf_or(self.config.kdf))
    }

    pub(crate) fn record_for_session(&self, id: &IdentityId) -> Result<IdentityRecord> {
        self.record(id)
    }

    pub(crate) fn history_with(&self, record: &IdentityRecord, base: &Key) -> Result<HistoryLog> {
        let salt = record.salt()?;
        let key = domain_key_from_base(base, &salt, HISTORY_DOMAIN)?;
        self.layout.provision(&record.id)?;
        Ok(HistoryLog::new(
            self.layout.history_file(&record.id),
            key,
            self.config.tail_chunk_size,
        ))
    }
}

fn seal_field(base: &Key, id: &IdentityId, field: Field, plaintext: &[u8]) -> Result<String> {
    let key = derive_field_key(base, id.as_str(), field.key_label())?;
    seal(&key, plaintext)
}

fn open_field(base: &Key, record: &IdentityRecord, field: Field) -> Result<Zeroizing<Vec<u8>>> {
    let sealed: &SealedField = match field {
        Field::UsernameEnc => record.username.as_ref(),
        Field::ApiKeyEnc => record.credential.as_ref(),
        _ => None,
    }
    .ok_or_else(|| VaultError::NotFound(format!("{} of identity {}", field.as_str(), record.id)))?;
    let key = derive_field_key(base, record.id.as_str(), field.key_label())?;
    Ok(Zeroizing::new(open(&key, &sealed.0)?))
}

fn utf8(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| VaultError::Corrupt(format!("{what} is not valid UTF-8")))
}

pub(crate) fn display_name_with(record: &IdentityRecord, base: &Key) -> Result<String> {
    let plain = open_field(base, record, Field::UsernameEnc)?;
    utf8(&plain, "display name")
}

pub(crate) fn credential_with(record: &IdentityRecord, base: &Key) -> Result<Credential> {
    let plain = open_field(base, record, Field::ApiKeyEnc)?;
    utf8(&plain, "credential").map(Credential::new)
}
