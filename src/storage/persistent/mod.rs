//! On-disk journal for persistent guards.
//!
//! ```text
//! <dir>/
//! ├── .lock            exclusive FileLock (flock / LockFileEx)
//! └── journal.ndjson   header line + one CRC-framed JournalEntry per line
//! ```
//!
//! [`ProvenanceGuard::open`](crate::ProvenanceGuard::open) replays the
//! journal through the same validating code paths as live mutation.

mod codec;
mod file_lock;
mod journal;

pub use file_lock::{FileLock, LOCK_FILE};
pub use journal::{Journal, JournalHeader, Replay, FORMAT_VERSION, JOURNAL_FILE, MAGIC};
