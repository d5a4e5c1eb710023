//! Durable storage for guard runs.
//!
//! Every appended fact of a run (graph change, seal, observation, verdict)
//! is a [`JournalRecord`]. The record types are always available; the
//! on-disk journal that writes and replays them sits behind the
//! `persistent` feature.

mod record;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use record::{JournalEntry, JournalRecord};
