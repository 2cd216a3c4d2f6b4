//! Line-oriented `key = value` persistence for the vault file.
//!
//! File format:
//! ```text
//! # comment lines start with '#' or ';'
//! version = 2
//! user.active = <id>
//! user.<id>.kdf_salt = <urlsafe base64>
//! user.<id>.username_enc = <sealed token>
//! ```
//!
//! Only the first occurrence of a key counts. Writers rewrite the matching
//! line in place and leave every unrelated line and comment untouched.
//! The file is rewritten in place rather than swapped: every field is
//! self-contained, so a torn write damages at most one line.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::{open_private, restrict_file};
use crate::error::{Result, VaultError};
use crate::vault::model::{identity_of_key, is_credential_key, VaultSnapshot, VaultStatus};

const FILE_HEADER: &str = "\
# =========================================================
# Chatvault secrets file
#
# Managed by chatvault. Every identity field is encrypted
# under that identity's own master passphrase.
# One `key = value` per line; '#' and ';' start comments.
# =========================================================
";

/// Split a line into `(key, value)`, or `None` for blanks, comments and
/// lines without `=`.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let (k, v) = trimmed.split_once('=')?;
    Some((k.trim(), v.trim()))
}

/// Byte offset where the value of a `key = value` line begins.
fn value_offset(line: &str) -> usize {
    match line.find('=') {
        Some(eq) => {
            let rest = &line[eq + 1..];
            eq + 1 + (rest.len() - rest.trim_start().len())
        }
        None => line.len(),
    }
}

fn check_pair(key: &str, value: &str) -> Result<()> {
    if key.is_empty() || key.contains(['=', '\n', '\r']) || key.trim() != key {
        return Err(VaultError::ValidationFailed(format!(
            "invalid vault key {key:?}"
        )));
    }
    if value.contains(['\n', '\r']) {
        return Err(VaultError::ValidationFailed(format!(
            "value for {key} spans multiple lines"
        )));
    }
    Ok(())
}

/// How much of the vault [`VaultStore::reset`] discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Drop identity entries, the active pointer and legacy credentials.
    /// Comments and unrelated settings stay.
    #[default]
    Soft,
    /// Delete the file.
    Hard,
}

/// The vault file on disk.
#[derive(Debug, Clone)]
pub struct VaultStore {
    path: PathBuf,
}

impl VaultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole file as text; a missing file reads as empty.
    fn read_text(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(VaultError::Io(e)),
        }
    }

    fn write_text(&self, text: &str) -> Result<()> {
        let mut file = open_private(
            &self.path,
            OpenOptions::new().write(true).create(true).truncate(true),
        )?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        restrict_file(&self.path)?;
        Ok(())
    }

    /// All `key = value` pairs in file order, duplicates included.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .read_text()?
            .lines()
            .filter_map(parse_line)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect())
    }

    /// First-wins key/value map.
    pub fn read_map(&self) -> Result<HashMap<String, String>> {
        let mut map = HashMap::new();
        for (k, v) in self.entries()? {
            map.entry(k).or_insert(v);
        }
        Ok(map)
    }

    /// Value of the first line with `key`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_text()?
            .lines()
            .filter_map(parse_line)
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string()))
    }

    /// Set one key, rewriting its line in place or appending it.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    /// Set several keys with a single read-modify-write.
    pub fn set_many(&self, pairs: &[(&str, &str)]) -> Result<()> {
        for (k, v) in pairs {
            check_pair(k, v)?;
        }

        let text = self.read_text()?;
        let text = if text.trim().is_empty() {
            FILE_HEADER.to_string()
        } else {
            text
        };
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();

        for (key, value) in pairs {
            let existing = lines
                .iter()
                .position(|line| matches!(parse_line(line), Some((k, _)) if k == *key));
            match existing {
                Some(i) => {
                    let offset = value_offset(&lines[i]);
                    lines[i] = format!("{}{}", &lines[i][..offset], value);
                }
                None => lines.push(format!("{key} = {value}")),
            }
        }

        self.write_text(&(lines.join("\n") + "\n"))
    }

    /// Drop every `key = value` line whose key satisfies `pred`. Comments and
    /// blank lines are kept. Returns the number of removed lines.
    pub fn remove_where(&self, pred: impl Fn(&str) -> bool) -> Result<usize> {
        let text = self.read_text()?;
        if text.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let kept: Vec<&str> = text
            .lines()
            .filter(|line| match parse_line(line) {
                Some((k, _)) if pred(k) => {
                    removed += 1;
                    false
                }
                _ => true,
            })
            .collect();

        if removed > 0 {
            self.write_text(&(kept.join("\n").trim_end().to_string() + "\n"))?;
        }
        Ok(removed)
    }

    /// Drop every `user.<id>.*` line whose raw id satisfies `orphaned`.
    ///
    /// Returns the distinct ids that lost entries.
    pub fn prune_identities(&self, orphaned: impl Fn(&str) -> bool) -> Result<BTreeSet<String>> {
        let doomed: BTreeSet<String> = self
            .entries()?
            .iter()
            .filter_map(|(k, _)| identity_of_key(k))
            .filter(|&id| orphaned(id))
            .map(str::to_string)
            .collect();
        if doomed.is_empty() {
            return Ok(doomed);
        }

        let removed =
            self.remove_where(|k| identity_of_key(k).is_some_and(|id| doomed.contains(id)))?;
        log::debug!("pruned {removed} vault lines of {} identities", doomed.len());
        Ok(doomed)
    }

    /// Wipe stored credentials. Returns the number of entries discarded.
    pub fn reset(&self, mode: ResetMode) -> Result<usize> {
        match mode {
            ResetMode::Soft => self.remove_where(is_credential_key),
            ResetMode::Hard => {
                let count = self.entries()?.len();
                match fs::remove_file(&self.path) {
                    Ok(()) => Ok(count),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
                    Err(e) => Err(VaultError::Io(e)),
                }
            }
        }
    }

    /// Parse the file into the typed identity map.
    pub fn snapshot(&self) -> Result<VaultSnapshot> {
        Ok(VaultSnapshot::parse(&self.entries()?))
    }

    /// Bootstrap state of the file.
    pub fn status(&self) -> Result<VaultStatus> {
        if !self.path.exists() {
            return Ok(VaultStatus::Missing);
        }
        Ok(self.snapshot()?.status())
    }
}
