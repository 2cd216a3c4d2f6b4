//! The per-identity encrypted journal.
//!
//! # File format
//!
//! ```text
//! {"_comment": "..."}        optional plain header, never a record
//! <sealed token>             one encrypted Record JSON per line
//! <sealed token>
//! ```
//!
//! Lines are independent: a line that is blank, starts with `{` or `#`, or
//! fails to decrypt or validate is skipped without affecting its
//! neighbours. Writes only ever append one whole line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::config::{ensure_dir_secure, open_private};
use crate::crypto::{open, seal, Key};
use crate::error::Result;
use crate::history::record::{Record, Role};
use crate::history::reverse::ReverseLines;
use crate::history::search::{search, Hit, SearchQuery};

/// Plain first line of every journal.
pub const HEADER: &str =
    r#"{"_comment": "chatvault history: one encrypted record per line; this line is not a record"}"#;

/// Upper bound on the tail buffer reserved up front.
const TAIL_PREALLOC: usize = 1024;

/// Order of records returned by [`HistoryLog::load_tail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailOrder {
    /// Oldest first.
    #[default]
    Chronological,
    NewestFirst,
}

/// Create the journal with its header if it does not exist yet.
pub fn init_if_missing(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_secure(parent)?;
    }
    match open_private(path, OpenOptions::new().write(true).create_new(true)) {
        Ok(mut file) => {
            file.write_all(HEADER.as_bytes())?;
            file.write_all(b"\n")?;
            file.flush()?;
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether a raw line can never hold a record.
fn is_metadata_line(line: &str) -> bool {
    line.is_empty() || line.starts_with('{') || line.starts_with('#')
}

/// An open handle on one identity's journal.
///
/// Holds the history-domain key; the passphrase it came from is not kept.
/// A single writer per file is assumed.
pub struct HistoryLog {
    path: PathBuf,
    key: Key,
    chunk_size: usize,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>, key: Key, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            key,
            chunk_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one turn stamped with the current time.
    ///
    /// Empty content is dropped and `Ok(None)` returned.
    pub fn append(&self, role: Role, content: &str) -> Result<Option<Record>> {
        if content.is_empty() {
            return Ok(None);
        }
        let record = Record::now(role, content);
        self.write_record(&record)?;
        Ok(Some(record))
    }

    fn write_record(&self, record: &Record) -> Result<()> {
        init_if_missing(&self.path)?;
        let token = seal(&self.key, record.to_json()?.as_bytes())?;
        let mut line = token.into_bytes();
        line.push(b'\n');

        let mut file = open_private(&self.path, OpenOptions::new().append(true))?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    /// Decrypt one raw line, or `None` if it is not a readable record.
    fn decode_line(&self, raw: &[u8]) -> Option<Record> {
        let line = std::str::from_utf8(raw).ok()?.trim();
        if is_metadata_line(line) {
            return None;
        }
        let plain = open(&self.key, line).ok()?;
        let text = std::str::from_utf8(&plain).ok()?;
        Record::from_json(text).ok()
    }

    fn open_file(&self) -> Result<Option<File>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every readable record, oldest first. A missing file reads as empty.
    pub fn load_all(&self) -> Result<Vec<Record>> {
        let Some(file) = self.open_file()? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for line in BufReader::new(file).split(b'\n') {
            let line = line?;
            match self.decode_line(&line) {
                Some(record) => records.push(record),
                None if is_blank_or_meta(&line) => {}
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::debug!(
                "skipped {skipped} unreadable lines in {}",
                self.path.display()
            );
        }
        Ok(records)
    }

    /// The last `n` readable records, reading the file backward.
    ///
    /// I/O is proportional to the size of the returned tail (plus any
    /// unreadable lines inside it), not to the size of the file.
    pub fn load_tail(&self, n: usize, order: TailOrder) -> Result<Vec<Record>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let Some(file) = self.open_file()? else {
            return Ok(Vec::new());
        };

        let mut newest_first = Vec::with_capacity(n.min(TAIL_PREALLOC));
        for line in ReverseLines::new(file, self.chunk_size)? {
            if let Some(record) = self.decode_line(&line?) {
                newest_first.push(record);
                if newest_first.len() == n {
                    break;
                }
            }
        }

        if order == TailOrder::Chronological {
            newest_first.reverse();
        }
        Ok(newest_first)
    }

    /// Delete the journal and start over with just the header.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        init_if_missing(&self.path)?;
        log::debug!("reset history {}", self.path.display());
        Ok(())
    }

    /// Search the whole journal.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<Hit>> {
        Ok(search(&self.load_all()?, query))
    }

    /// Last `n` non-blank user inputs, newest first.
    pub fn recent_user_inputs(&self, n: usize) -> Result<Vec<String>> {
        self.recent_user_where(n, |text| {
            (!text.trim().is_empty()).then(|| text.to_string())
        })
    }

    /// Last `n` user inputs starting with `/` or `:`, newest first.
    pub fn recent_commands(&self, n: usize) -> Result<Vec<String>> {
        self.recent_user_where(n, |text| {
            let text = text.trim_start();
            (text.starts_with('/') || text.starts_with(':')).then(|| text.to_string())
        })
    }

    fn recent_user_where(
        &self,
        n: usize,
        pick: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<String>> {
        Ok(self
            .load_all()?
            .iter()
            .rev()
            .filter(|r| r.role == Role::User)
            .filter_map(|r| pick(&r.content))
            .take(n)
            .collect())
    }

    /// Append a validated record under this journal's key with a fresh
    /// timestamp.
    pub(crate) fn reappend(&self, record: &Record) -> Result<bool> {
        Ok(self.append(record.role, &record.content)?.is_some())
    }
}

fn is_blank_or_meta(raw: &[u8]) -> bool {
    std::str::from_utf8(raw).is_ok_and(|s| is_metadata_line(s.trim()))
}
