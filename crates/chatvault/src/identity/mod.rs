//! Identities: ids, passphrase policy, credentials and the manager that
//! stores them in the vault.

pub mod credential;
pub mod id;
pub mod manager;
pub mod policy;
pub mod session;

pub use credential::{mask_secrets, redact, Credential};
pub use id::IdentityId;
pub use manager::{normalize_name, IdentityManager, Removal};
pub use policy::{validate_passphrase, validate_passphrase_with, StrengthEstimator, MIN_LENGTH};
pub use session::Session;
