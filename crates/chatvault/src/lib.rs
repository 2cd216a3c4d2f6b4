//! Chatvault: a local multi-identity secret vault with per-identity
//! encrypted conversation journals.
//!
//! Each identity owns a master passphrase. From it (and the identity's
//! salt) Chatvault derives field keys for the identity's vault entries and
//! an unrelated key for its history journal. Journals support tail reads
//! that never scan the whole file, linear search, and encrypted dumps keyed
//! by a separate export passphrase.
//!
//! Everything is synchronous and blocking.

pub mod config;
pub mod crypto;
pub mod error;
pub mod history;
pub mod identity;
pub mod time;
pub mod vault;

// Re-export primary types
pub use config::{DataLayout, VaultConfig};
pub use crypto::KdfParams;
pub use error::{Result, VaultError};
pub use history::{
    preview, write_dump, DumpDocument, Hit, HistoryLog, ImportMode, Record, Role, SearchMode,
    SearchQuery, TailOrder,
};
pub use identity::{mask_secrets, Credential, IdentityId, IdentityManager, Removal, Session};
pub use vault::{ResetMode, VaultStatus, VaultStore};
