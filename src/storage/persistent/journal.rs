//! Append-only NDJSON journal.
//!
//! # File format
//! ```text
//! <crc> {"magic":"provenance-guard","format_version":1,"run_id":"..."}
//! <crc> {"sequence":1,"recorded_at":"...","records":[{...},{...}]}
//! <crc> {"sequence":4,"recorded_at":"...","records":[{...}]}
//! ...
//! ```
//!
//! Entries are written before the change they describe becomes visible.
//! One entry holds every record of one mutation. A failed append is cut
//! back off the file before the error is returned.
//! On open, the file is read up to the first torn or corrupt line; anything
//! after it is cut off so new entries never follow garbage.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec;
use crate::error::PersistenceError;
use crate::storage::{JournalEntry, JournalRecord};

/// File name of the journal inside a guard directory.
pub const JOURNAL_FILE: &str = "journal.ndjson";

/// Identifies a provenance journal.
pub const MAGIC: &str = "provenance-guard";

/// Current journal format version.
pub const FORMAT_VERSION: u32 = 1;

/// First line of every journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalHeader {
    /// Always [`MAGIC`].
    pub magic: String,
    /// Always [`FORMAT_VERSION`] for readable journals.
    pub format_version: u32,
    /// Audited run this journal belongs to.
    pub run_id: Uuid,
}

impl JournalHeader {
    fn fresh() -> Self {
        Self {
            magic: MAGIC.to_string(),
            format_version: FORMAT_VERSION,
            run_id: Uuid::new_v4(),
        }
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.magic != MAGIC {
            return Err(PersistenceError::Corrupt {
                line: 1,
                reason: format!("bad magic '{}'", self.magic),
            });
        }
        if self.format_version != FORMAT_VERSION {
            return Err(PersistenceError::Corrupt {
                line: 1,
                reason: format!(
                    "unsupported format version {} (expected {FORMAT_VERSION})",
                    self.format_version
                ),
            });
        }
        Ok(())
    }
}

/// What was read back from an existing journal.
#[derive(Debug, Clone)]
pub struct Replay {
    /// Header line.
    pub header: JournalHeader,
    /// Valid entries in file order.
    pub entries: Vec<JournalEntry>,
    /// 1-based line number of the first line that was cut off, if any.
    pub truncated_at: Option<usize>,
}

/// Writer half of an open journal.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    /// Length of the valid prefix; a failed append is truncated back to it.
    len: u64,
    sync_on_write: bool,
    header: JournalHeader,
    entries_written: u64,
    #[cfg(test)]
    fail_next_write: bool,
}

impl Journal {
    /// Opens or creates the journal at `path` and returns what it contains.
    ///
    /// # Errors
    /// - `Corrupt { line: 1 }` if an existing header is unreadable
    /// - `Io` on filesystem failures
    pub fn open(path: &Path, sync_on_write: bool) -> Result<(Self, Replay), PersistenceError> {
        let existing = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let (replay, len) = if existing.is_empty() {
            let header = JournalHeader::fresh();
            let line = codec::encode_line(&header)?;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.write_all(line.as_bytes())?;
            if sync_on_write {
                file.sync_all()?;
            }
            info!(path = %path.display(), run_id = %header.run_id, "created journal");
            let replay = Replay {
                header,
                entries: Vec::new(),
                truncated_at: None,
            };
            (replay, line.len() as u64)
        } else {
            let (replay, valid_len) = read(&existing)?;
            if let Some(line) = replay.truncated_at {
                warn!(
                    path = %path.display(),
                    line,
                    kept = replay.entries.len(),
                    "journal cut off at corrupt line"
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(valid_len as u64)?;
                file.sync_all()?;
            }
            info!(
                path = %path.display(),
                run_id = %replay.header.run_id,
                entries = replay.entries.len(),
                "opened journal"
            );
            (replay, valid_len as u64)
        };

        let file = OpenOptions::new().append(true).open(path)?;
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                len,
                sync_on_write,
                header: replay.header.clone(),
                entries_written: 0,
                #[cfg(test)]
                fail_next_write: false,
            },
            replay,
        ))
    }

    /// Appends the records of one mutation as a single entry and flushes
    /// it (and fsyncs, if configured). An empty batch writes nothing.
    ///
    /// # Errors
    /// `Io` if the write fails. Whatever part of the entry reached the file
    /// is truncated away first, so a later append never follows a torn line.
    pub fn append(&mut self, records: impl IntoIterator<Item = JournalRecord>) -> Result<(), PersistenceError> {
        let records: Vec<JournalRecord> = records.into_iter().collect();
        if records.is_empty() {
            return Ok(());
        }
        let entry = JournalEntry::new(records);
        let line = codec::encode_line(&entry)?;
        if let Err(e) = self.write_line(line.as_bytes()) {
            warn!(path = %self.path.display(), error = %e, "journal append failed, rolling back");
            self.file.set_len(self.len)?;
            return Err(e.into());
        }
        self.len += line.len() as u64;
        self.entries_written += 1;
        debug!(sequence = %entry.sequence, records = entry.records.len(), "journaled entry");
        Ok(())
    }

    fn write_line(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        {
            if std::mem::take(&mut self.fail_next_write) {
                self.file.write_all(&bytes[..bytes.len() / 2])?;
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected write failure"));
            }
        }
        self.file.write_all(bytes)?;
        self.file.flush()?;
        if self.sync_on_write {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Header of this journal.
    #[must_use]
    pub fn header(&self) -> &JournalHeader {
        &self.header
    }

    /// Location of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries appended through this handle.
    #[must_use]
    pub const fn entries_written(&self) -> u64 {
        self.entries_written
    }
}

/// Parses a whole journal. Returns the replay and the byte length of the
/// valid prefix.
fn read(bytes: &[u8]) -> Result<(Replay, usize), PersistenceError> {
    let mut lines = complete_lines(bytes);

    let header: JournalHeader = match lines.next() {
        Some((text, _)) => decode_utf8(text, 1).and_then(|s| codec::decode_line(s, 1))?,
        None => {
            return Err(PersistenceError::Corrupt {
                line: 1,
                reason: "torn header".to_string(),
            })
        }
    };
    header.check()?;

    let mut valid_len = header_len(bytes);
    let mut entries = Vec::new();
    let mut truncated_at = None;
    for (idx, (text, end)) in lines.enumerate() {
        let line_no = idx + 2;
        match decode_utf8(text, line_no).and_then(|s| codec::decode_line::<JournalEntry>(s, line_no)) {
            Ok(entry) => {
                entries.push(entry);
                valid_len = end;
            }
            Err(e) => {
                debug!(error = %e, "stopping journal read");
                truncated_at = Some(line_no);
                break;
            }
        }
    }
    if truncated_at.is_none() && valid_len < bytes.len() {
        // Trailing bytes without a newline: a torn final write.
        truncated_at = Some(entries.len() + 2);
    }

    Ok((
        Replay {
            header,
            entries,
            truncated_at,
        },
        valid_len,
    ))
}

/// Newline-terminated lines with the byte offset just past each newline.
/// A trailing fragment without a newline is not yielded.
fn complete_lines(bytes: &[u8]) -> impl Iterator<Item = (&[u8], usize)> {
    let mut start = 0;
    std::iter::from_fn(move || {
        let rel = bytes.get(start..)?.iter().position(|&b| b == b'\n')?;
        let line = &bytes[start..start + rel];
        start += rel + 1;
        Some((line, start))
    })
}

fn header_len(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == b'\n').map_or(0, |p| p + 1)
}

fn decode_utf8(bytes: &[u8], line: usize) -> Result<&str, PersistenceError> {
    std::str::from_utf8(bytes).map_err(|e| PersistenceError::Corrupt {
        line,
        reason: format!("invalid UTF-8: {e}"),
    })
}
