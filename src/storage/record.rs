//! Journal record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Sequence;
use crate::falsify::{Observation, Verdict};
use crate::graph::GraphChange;
use crate::seal::Seal;

/// One appended fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", content = "data", rename_all = "snake_case")]
pub enum JournalRecord {
    /// Node, edge or classification.
    Graph(GraphChange),
    /// A newly appended seal.
    Seal(Seal),
    /// An observation taken on record.
    Observation(Observation),
    /// A comparison verdict.
    Verdict(Verdict),
}

impl JournalRecord {
    /// Logical time stamped on the record.
    #[must_use]
    pub fn sequence(&self) -> Sequence {
        match self {
            Self::Graph(change) => change.sequence(),
            Self::Seal(seal) => seal.created_at,
            Self::Observation(obs) => obs.arrival_sequence,
            Self::Verdict(verdict) => verdict.created_at,
        }
    }
}

/// One mutation as written to the journal.
///
/// Every record a mutation produced shares one checksummed line, so replay
/// sees either all of them or none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Logical time of the first record.
    pub sequence: Sequence,
    /// Wall-clock write time. Informational only; never used for ordering.
    pub recorded_at: DateTime<Utc>,
    /// Records in the order they are applied.
    pub records: Vec<JournalRecord>,
}

impl JournalEntry {
    /// Wraps the records of one mutation, stamping the current wall-clock time.
    #[must_use]
    pub fn new(records: Vec<JournalRecord>) -> Self {
        Self {
            sequence: records.first().map_or(Sequence::ZERO, JournalRecord::sequence),
            recorded_at: Utc::now(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use crate::value::Value;

    #[test]
    fn entry_takes_sequence_from_first_record() {
        let record = JournalRecord::Observation(Observation {
            node_id: NodeId::new("p").unwrap(),
            value: Value::from(1.5),
            arrival_sequence: Sequence::new(9),
        });
        let entry = JournalEntry::new(vec![record]);
        assert_eq!(entry.sequence, Sequence::new(9));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["records"][0]["record"], "observation");
        let back: JournalEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
