//! Logical clock.
//!
//! Every node, edge, seal, observation and verdict is stamped with a
//! [`Sequence`] issued by one [`LogicalClock`]. Wall-clock time never takes
//! part in ordering decisions: the falsification ordering check compares
//! sequences only.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Position in the single logical order of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    /// The sequence before anything was issued.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw sequence number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Strictly increasing sequence issuer.
///
/// Thread-safe; `tick` is linearizable.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicU64,
}

impl LogicalClock {
    /// Creates a clock that has issued nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next sequence number.
    pub fn tick(&self) -> Sequence {
        Sequence(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns the most recently issued sequence ([`Sequence::ZERO`] if none).
    #[must_use]
    pub fn current(&self) -> Sequence {
        Sequence(self.last.load(Ordering::SeqCst))
    }

    /// Moves the clock forward so that `seen` counts as issued.
    ///
    /// Used when replaying a journal or ingesting externally sequenced
    /// observations. Never moves the clock backwards.
    pub fn observe(&self, seen: Sequence) {
        self.last.fetch_max(seen.0, Ordering::SeqCst);
    }

    /// Advances the clock to `seen` only if `seen` is strictly newer than
    /// everything issued so far.
    ///
    /// On failure returns the current sequence, which is at least `seen`.
    pub fn try_advance(&self, seen: Sequence) -> Result<(), Sequence> {
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| (seen.0 > last).then_some(seen.0))
            .map(|_| ())
            .map_err(Sequence)
    }
}
