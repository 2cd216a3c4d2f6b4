//! Vault store: the flat `key = value` file holding every identity.
//!
//! - [`store`]: line-oriented persistence with in-place rewrites.
//! - [`model`]: typed parsing into [`VaultSnapshot`].

pub mod model;
pub mod store;

pub use model::{Field, IdentityRecord, SealedField, VaultSnapshot, VaultStatus};
pub use store::{ResetMode, VaultStore};
