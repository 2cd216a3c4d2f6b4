//! Encrypted conversation journal.
//!
//! - [`log`]: append, full and tail reads, reset.
//! - [`search`]: linear search with snippets and context.
//! - [`dump`]: encrypted or plaintext export and import.

pub mod dump;
pub mod log;
pub mod record;
pub mod reverse;
pub mod search;

pub use dump::{preview, write_dump, Dump, DumpDocument, ImportMode, DUMP_FORMAT};
pub use log::{HistoryLog, TailOrder};
pub use record::{Record, Role};
pub use reverse::ReverseLines;
pub use search::{ContextLine, Hit, SearchMode, SearchQuery};
