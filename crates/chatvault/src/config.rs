//! Runtime configuration and on-disk layout.
//!
//! # Directory layout
//!
//! ```text
//! <root>/                       default: ~/.chatvault, override: CHATVAULT_HOME
//! ├── secrets.conf              vault store (key = value)
//! └── users/
//!     └── {id}/
//!         ├── history.jsonl     encrypted conversation journal
//!         ├── conf/
//!         └── attachments/
//! ```
//!
//! Directories are created 0700 and files 0600 on Unix.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::crypto::KdfParams;
use crate::error::{Result, VaultError};
use crate::identity::IdentityId;

/// Environment variable overriding the data root.
pub const ENV_HOME: &str = "CHATVAULT_HOME";
/// Environment variable overriding the identity KDF cost parameters.
pub const ENV_KDF: &str = "CHATVAULT_KDF";

const DEFAULT_DIR_NAME: &str = ".chatvault";
const SECRETS_FILE_NAME: &str = "secrets.conf";
const USERS_DIR_NAME: &str = "users";
const HISTORY_FILE_NAME: &str = "history.jsonl";

/// Default chunk size for backward tail reads.
pub const DEFAULT_TAIL_CHUNK: usize = 64 * 1024;

/// Configuration shared by the identity manager and the history journal.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Root directory holding the vault file and per-identity data.
    pub root: PathBuf,
    /// Argon2id parameters for newly created identities.
    pub kdf: KdfParams,
    /// Argon2id parameters written into new dump documents.
    pub dump_kdf: KdfParams,
    /// Chunk size used when reading a journal backwards.
    pub tail_chunk_size: usize,
}

impl VaultConfig {
    /// Configuration rooted at `root` with default cost parameters.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            kdf: KdfParams::default(),
            dump_kdf: KdfParams::default(),
            tail_chunk_size: DEFAULT_TAIL_CHUNK,
        }
    }

    /// Build a configuration from the environment.
    ///
    /// Uses `CHATVAULT_HOME` or `$HOME/.chatvault` for the root, and
    /// `CHATVAULT_KDF` (`argon2id$m=..,t=..,p=..`) for the KDF cost.
    pub fn from_env() -> Result<Self> {
        let root = match std::env::var_os(ENV_HOME) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = std::env::var_os("HOME").ok_or_else(|| {
                    VaultError::NotFound(format!("neither {ENV_HOME} nor HOME is set"))
                })?;
                PathBuf::from(home).join(DEFAULT_DIR_NAME)
            }
        };

        let mut config = Self::with_root(root);
        if let Ok(spec) = std::env::var(ENV_KDF) {
            config.kdf = spec.parse()?;
            config.dump_kdf = config.kdf;
        }
        Ok(config)
    }

    /// Override the identity and dump KDF cost parameters.
    pub fn kdf(mut self, params: KdfParams) -> Self {
        self.kdf = params;
        self.dump_kdf = params;
        self
    }

    /// Path layout derived from this configuration.
    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.root)
    }
}

/// Resolves and provisions the per-identity file layout.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the vault store file.
    pub fn secrets_file(&self) -> PathBuf {
        self.root.join(SECRETS_FILE_NAME)
    }

    pub fn users_dir(&self) -> PathBuf {
        self.root.join(USERS_DIR_NAME)
    }

    pub fn user_dir(&self, id: &IdentityId) -> PathBuf {
        self.users_dir().join(id.as_str())
    }

    pub fn history_file(&self, id: &IdentityId) -> PathBuf {
        self.user_dir(id).join(HISTORY_FILE_NAME)
    }

    /// Create the identity's directories and an empty journal. Idempotent.
    pub fn provision(&self, id: &IdentityId) -> Result<()> {
        let base = self.user_dir(id);
        ensure_dir_secure(&base)?;
        ensure_dir_secure(&base.join("conf"))?;
        ensure_dir_secure(&base.join("attachments"))?;
        crate::history::log::init_if_missing(&self.history_file(id))?;
        Ok(())
    }

    /// Delete every file belonging to one identity. Missing data is not an
    /// error.
    pub fn purge_identity(&self, id: &IdentityId) -> Result<()> {
        match fs::remove_dir_all(self.user_dir(id)) {
            Ok(()) => {
                log::debug!("purged data directory of {id}");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::Io(e)),
        }
    }

    /// Names of the directories under `users/`, sorted.
    pub fn user_dir_names(&self) -> Result<BTreeSet<String>> {
        let users = self.users_dir();
        if !users.exists() {
            return Ok(BTreeSet::new());
        }

        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&users)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    /// Identity directories whose id is not in `known`.
    pub fn orphan_user_dirs(&self, known: &BTreeSet<IdentityId>) -> Result<Vec<PathBuf>> {
        let users = self.users_dir();
        Ok(self
            .user_dir_names()?
            .into_iter()
            .filter(|name| !known.iter().any(|id| id.as_str() == name))
            .map(|name| users.join(name))
            .collect())
    }

    /// Remove orphaned identity directories, returning how many were removed.
    pub fn prune_orphans(&self, known: &BTreeSet<IdentityId>) -> Result<usize> {
        let orphans = self.orphan_user_dirs(known)?;
        for dir in &orphans {
            log::debug!("removing orphaned user directory {}", dir.display());
            fs::remove_dir_all(dir)?;
        }
        Ok(orphans.len())
    }
}

/// Create `path` and its parents, tightening the leaf to 0700 on Unix.
pub(crate) fn ensure_dir_secure(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)?.permissions().mode() & 0o777;
        if mode != 0o700 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

/// Open `path` with `options`, creating it 0600 on Unix if missing.
pub(crate) fn open_private(path: &Path, options: &mut OpenOptions) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Force 0600 on an existing file. No-op off Unix.
pub(crate) fn restrict_file(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
