//! Portable export and import of a journal.
//!
//! An encrypted dump is one JSON document:
//!
//! ```json
//! {
//!   "fmt": "chatvault-hist-v1",
//!   "ts": 1700000000,
//!   "salt_b64": "...",
//!   "kdf": {"alg": "argon2id", "m_cost": 65536, "t_cost": 3, "p_cost": 4, "dklen": 32},
//!   "ciphertext_b64": "..."
//! }
//! ```
//!
//! The ciphertext seals the newline-joined record JSON under a key hardened
//! from an export passphrase that is unrelated to any identity's master
//! passphrase. A plaintext dump is bare JSON lines. Readers tell the two
//! apart by the `fmt` tag.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{open_private, restrict_file};
use crate::crypto::random::random_salt_16;
use crate::crypto::{derive_base, open_bytes, seal_bytes, KdfParams};
use crate::error::{Result, VaultError};
use crate::history::log::HistoryLog;
use crate::history::record::Record;
use crate::time::now_epoch;

/// Format tag of encrypted dumps.
pub const DUMP_FORMAT: &str = "chatvault-hist-v1";
const KDF_ALG: &str = "argon2id";
const DKLEN: u32 = 32;

/// KDF block of a dump document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpKdf {
    pub alg: String,
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
    pub dklen: u32,
}

impl From<KdfParams> for DumpKdf {
    fn from(p: KdfParams) -> Self {
        Self {
            alg: KDF_ALG.to_string(),
            m_cost: p.m_cost,
            t_cost: p.t_cost,
            p_cost: p.p_cost,
            dklen: DKLEN,
        }
    }
}

impl DumpKdf {
    fn params(&self) -> Result<KdfParams> {
        if self.alg != KDF_ALG || self.dklen != DKLEN {
            return Err(VaultError::Corrupt(format!(
                "unsupported dump KDF {} with dklen {}",
                self.alg, self.dklen
            )));
        }
        KdfParams {
            m_cost: self.m_cost,
            t_cost: self.t_cost,
            p_cost: self.p_cost,
        }
        .validate()
    }
}

/// An encrypted dump document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpDocument {
    pub fmt: String,
    /// Creation time, seconds since the Unix epoch.
    pub ts: i64,
    pub salt_b64: String,
    pub kdf: DumpKdf,
    pub ciphertext_b64: String,
}

impl DumpDocument {
    /// Encrypt `records` under `export_passphrase` with a fresh salt.
    pub fn seal(records: &[Record], export_passphrase: &str, params: KdfParams) -> Result<Self> {
        let salt = random_salt_16();
        let key = derive_base(export_passphrase.as_bytes(), &salt, params)?;
        let blob = to_jsonl(records)?;
        let ciphertext = seal_bytes(&key, blob.as_bytes())?;
        Ok(Self {
            fmt: DUMP_FORMAT.to_string(),
            ts: now_epoch(),
            salt_b64: STANDARD.encode(salt),
            kdf: params.into(),
            ciphertext_b64: STANDARD.encode(ciphertext),
        })
    }

    /// Decrypt back into validated records.
    pub fn open(&self, export_passphrase: &str) -> Result<Vec<Record>> {
        let salt: [u8; 16] = STANDARD
            .decode(self.salt_b64.trim())
            .map_err(|e| VaultError::Corrupt(format!("dump salt: {e}")))?
            .try_into()
            .map_err(|_| VaultError::Corrupt("dump salt must be 16 bytes".into()))?;
        let ciphertext = STANDARD
            .decode(self.ciphertext_b64.trim())
            .map_err(|e| VaultError::Corrupt(format!("dump ciphertext: {e}")))?;

        let key = derive_base(export_passphrase.as_bytes(), &salt, self.kdf.params()?)?;
        let plain = open_bytes(&key, &ciphertext)?;
        let text = String::from_utf8(plain)
            .map_err(|_| VaultError::Corrupt("dump payload is not UTF-8".into()))?;
        Ok(parse_jsonl(&text))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| VaultError::Serialization(e.to_string()))
    }
}

/// What a dump file turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dump {
    Encrypted(DumpDocument),
    Plain(Vec<Record>),
}

/// How [`HistoryLog::import`] treats existing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Keep existing records and add the imported ones after them.
    #[default]
    Append,
    /// Reset the journal first.
    Replace,
}

fn to_jsonl(records: &[Record]) -> Result<String> {
    let lines = records
        .iter()
        .map(Record::to_json)
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/// Validated records from JSON lines; invalid lines are dropped.
fn parse_jsonl(text: &str) -> Vec<Record> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| Record::from_json(l).ok())
        .collect()
}

/// Classify raw dump bytes.
///
/// A leading BOM is ignored. A JSON object whose `fmt` is the dump tag is
/// an encrypted dump; it must carry every envelope field. Anything else is
/// read as plaintext JSON lines.
pub fn detect(bytes: &[u8]) -> Result<Dump> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}').trim();

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.get("fmt").and_then(Value::as_str) == Some(DUMP_FORMAT) {
            let doc: DumpDocument = serde_json::from_value(value)
                .map_err(|e| VaultError::Corrupt(format!("dump document: {e}")))?;
            return Ok(Dump::Encrypted(doc));
        }
    }
    Ok(Dump::Plain(parse_jsonl(text)))
}

/// Decode a dump into records without importing them.
///
/// # Errors
///
/// `PassphraseRequired` for an encrypted dump without `export_passphrase`,
/// `AuthFailed` for a wrong one, `Corrupt` for a damaged envelope.
pub fn preview(bytes: &[u8], export_passphrase: Option<&str>) -> Result<Vec<Record>> {
    match detect(bytes)? {
        Dump::Plain(records) => Ok(records),
        Dump::Encrypted(doc) => {
            let passphrase = export_passphrase.ok_or_else(|| {
                VaultError::PassphraseRequired("the dump is encrypted".into())
            })?;
            doc.open(passphrase)
        }
    }
}

/// Write dump bytes via a temporary file and rename, mode 0600.
pub fn write_dump(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    let mut file = open_private(
        tmp,
        OpenOptions::new().write(true).create(true).truncate(true),
    )?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    restrict_file(tmp)?;
    fs::rename(tmp, path)?;
    Ok(())
}

impl HistoryLog {
    /// Export every readable record as an encrypted dump.
    pub fn export_encrypted(&self, export_passphrase: &str, params: KdfParams) -> Result<DumpDocument> {
        DumpDocument::seal(&self.load_all()?, export_passphrase, params)
    }

    /// Export every readable record as plaintext JSON lines.
    ///
    /// Refuses with `PlaintextNotConfirmed` unless `confirmed` is set.
    pub fn export_plain(&self, confirmed: bool) -> Result<String> {
        if !confirmed {
            return Err(VaultError::PlaintextNotConfirmed);
        }
        let mut out = to_jsonl(&self.load_all()?)?;
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }

    /// Import a dump (encrypted or plain) into this journal.
    ///
    /// Records are re-appended under this journal's own key with fresh
    /// timestamps. Returns the number of records written.
    pub fn import(&self, bytes: &[u8], export_passphrase: Option<&str>, mode: ImportMode) -> Result<usize> {
        let records = preview(bytes, export_passphrase)?;
        if mode == ImportMode::Replace {
            self.reset()?;
        }

        let mut written = 0;
        for record in &records {
            if self.reappend(record)? {
                written += 1;
            }
        }
        log::debug!(
            "imported {written} of {} records into {}",
            records.len(),
            self.path().display()
        );
        Ok(written)
    }
}
