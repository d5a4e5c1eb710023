//! Error types for the provenance guard.
//!
//! Errors are strongly typed using thiserror and split by what they signal:
//! structural errors reject a malformed mutation or query, integrity errors
//! signal a trust violation. Reports (contamination, gaps, failed verdicts)
//! are never errors.

use thiserror::Error;

use crate::clock::Sequence;
use crate::node::{NodeId, NodeKind};
use crate::seal::Digest;

/// Structural errors. The offending operation is rejected with no partial mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// A node with this identifier is already registered.
    #[error("Node already exists: {id}")]
    DuplicateId {
        /// Node concerned.
        id: NodeId,
    },

    /// The dependency edge already exists.
    #[error("Edge already exists: {from} -> {to}")]
    DuplicateEdge {
        /// Source of the edge.
        from: NodeId,
        /// Target of the edge.
        to: NodeId,
    },

    /// No node has this identifier.
    #[error("Node not found: {id}")]
    MissingNode {
        /// Node concerned.
        id: NodeId,
    },

    /// The edge would close a cycle.
    #[error("Edge {from} -> {to} would create a cycle")]
    Cycle {
        /// Source of the edge.
        from: NodeId,
        /// Target of the edge.
        to: NodeId,
    },

    /// The label does not fit the node's structure.
    #[error("Node {id} cannot be classified {kind}: {reason}")]
    InvalidClassification {
        /// Node concerned.
        id: NodeId,
        /// Label concerned.
        kind: NodeKind,
        /// Human-readable cause.
        reason: String,
    },

    /// An Empirical label without a declared exception under an enforcing policy.
    #[error("Node {id} is labelled empirical without a declared exception")]
    UndeclaredEmpirical {
        /// Node concerned.
        id: NodeId,
    },

    /// Labels are final.
    #[error("Node {id} is already classified {kind}; supersede it with a new node instead")]
    AlreadyClassified {
        /// Node concerned.
        id: NodeId,
        /// Label concerned.
        kind: NodeKind,
    },

    /// The operation needs a classified node.
    #[error("Node {id} has not been classified")]
    Unclassified {
        /// Node concerned.
        id: NodeId,
    },

    /// A Derived node with no Axiom ancestor.
    #[error("Derived node {id} does not rest on any axiom")]
    OrphanedDerivation {
        /// Node concerned.
        id: NodeId,
    },

    /// A node field failed validation.
    #[error("Invalid node field '{field}': {reason}")]
    InvalidNode {
        /// Name of the offending field.
        field: String,
        /// Human-readable cause.
        reason: String,
    },

    /// A traversal visited more nodes than configured.
    #[error("Traversal exceeded limit of {limit} nodes")]
    TraversalLimitExceeded {
        /// Configured node limit.
        limit: usize,
    },
}

/// Integrity errors. Always surfaced, never auto-corrected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// A seal no longer matches its recomputed digest.
    #[error("Seal mismatch for {node_id}: recorded {recorded}, recomputed {recomputed}")]
    SealMismatch {
        /// Node concerned.
        node_id: NodeId,
        /// Digest stored in the seal.
        recorded: Digest,
        /// Digest computed now.
        recomputed: Digest,
    },

    /// A dependency must be sealed before its dependent.
    #[error("Cannot seal {node_id}: dependency {dependency} has no seal")]
    UnsealedDependency {
        /// Node concerned.
        node_id: NodeId,
        /// Dependency without a seal.
        dependency: NodeId,
    },

    /// Comparison needs a sealed prediction.
    #[error("Prediction {node_id} has not been sealed")]
    UnsealedPrediction {
        /// Node concerned.
        node_id: NodeId,
    },

    /// The prediction was sealed after the observation became visible.
    #[error(
        "Ordering violated for {node_id}: sealed at {sealed_at}, observation visible at {observed_at}"
    )]
    OrderingViolated {
        /// Node concerned.
        node_id: NodeId,
        /// Logical time of the seal.
        sealed_at: Sequence,
        /// Logical time the observation became visible.
        observed_at: Sequence,
    },

    /// No hasher is registered for the version.
    #[error("Unknown hash version: {version}")]
    UnknownHashVersion {
        /// Requested hash version.
        version: u16,
    },

    /// An external observation did not advance the logical clock.
    #[error("Observation sequence {sequence} is not after the last issued sequence {last}")]
    NonMonotonicObservation {
        /// Sequence carried by the observation.
        sequence: Sequence,
        /// Most recent sequence already issued.
        last: Sequence,
    },
}

/// Errors raised while evaluating a prediction against an observation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComparisonError {
    /// Negative or non-finite tolerance.
    #[error("Tolerance {value} must be finite and non-negative")]
    InvalidTolerance {
        /// Rejected tolerance.
        value: f64,
    },

    /// The predicted and observed values cannot be compared.
    #[error("Values cannot be compared: {reason}")]
    IncomparableValues {
        /// Human-readable cause.
        reason: String,
    },
}

/// Errors from the on-disk journal.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("Journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A journal line failed its checksum, did not parse, or did not apply.
    #[error("Journal corrupt at line {line}: {reason}")]
    Corrupt {
        /// 1-based line number; the header is line 1.
        line: usize,
        /// Human-readable cause.
        reason: String,
    },

    /// A record could not be encoded.
    #[error("Journal serialization error: {0}")]
    Serialization(String),

    /// Another guard holds the directory lock.
    #[error("Journal directory is locked by another process: {path}")]
    Locked {
        /// Locked directory.
        path: String,
    },
}

/// Top-level error type for all guard operations.
#[derive(Debug, Error)]
pub enum GuardError {
    /// See [`StructuralError`].
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    /// See [`IntegrityError`].
    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// See [`ComparisonError`].
    #[error("Comparison error: {0}")]
    Comparison(#[from] ComparisonError),

    /// See [`PersistenceError`].
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration failed validation.
    #[error("Invalid configuration '{field}': {reason}")]
    Config {
        /// Name of the offending field.
        field: String,
        /// Human-readable cause.
        reason: String,
    },

    /// Broken internal invariant, such as a poisoned lock.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl GuardError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a structural error.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }

    /// Returns true if this is an integrity error.
    #[must_use]
    pub const fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// Returns true if this is a persistence error.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Distinct non-zero process exit code for CLI wrappers.
    ///
    /// Structural errors occupy 10..=20, integrity errors 30..=35, comparison
    /// errors 40..=41, persistence errors 50..=53, configuration errors 60 and
    /// internal errors 70.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Structural(e) => match e {
                StructuralError::DuplicateId { .. } => 10,
                StructuralError::DuplicateEdge { .. } => 11,
                StructuralError::MissingNode { .. } => 12,
                StructuralError::Cycle { .. } => 13,
                StructuralError::InvalidClassification { .. } => 14,
                StructuralError::UndeclaredEmpirical { .. } => 15,
                StructuralError::AlreadyClassified { .. } => 16,
                StructuralError::Unclassified { .. } => 17,
                StructuralError::OrphanedDerivation { .. } => 18,
                StructuralError::InvalidNode { .. } => 19,
                StructuralError::TraversalLimitExceeded { .. } => 20,
            },
            Self::Integrity(e) => match e {
                IntegrityError::SealMismatch { .. } => 30,
                IntegrityError::UnsealedDependency { .. } => 31,
                IntegrityError::UnsealedPrediction { .. } => 32,
                IntegrityError::OrderingViolated { .. } => 33,
                IntegrityError::UnknownHashVersion { .. } => 34,
                IntegrityError::NonMonotonicObservation { .. } => 35,
            },
            Self::Comparison(e) => match e {
                ComparisonError::InvalidTolerance { .. } => 40,
                ComparisonError::IncomparableValues { .. } => 41,
            },
            Self::Persistence(e) => match e {
                PersistenceError::Io(_) => 50,
                PersistenceError::Corrupt { .. } => 51,
                PersistenceError::Serialization(_) => 52,
                PersistenceError::Locked { .. } => 53,
            },
            Self::Config { .. } => 60,
            Self::Internal { .. } => 70,
        }
    }
}

/// Result type alias for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn test_structural_error_cycle_message() {
        let err = StructuralError::Cycle {
            from: id("b"),
            to: id("a"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("b -> a"));
        assert!(msg.contains("cycle"));
    }

    #[test]
    fn test_integrity_error_ordering_message() {
        let err = IntegrityError::OrderingViolated {
            node_id: id("alpha"),
            sealed_at: Sequence::new(9),
            observed_at: Sequence::new(4),
        };
        let msg = format!("{err}");
        assert!(msg.contains("alpha"));
        assert!(msg.contains('9'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_guard_error_categories() {
        let err: GuardError = StructuralError::MissingNode { id: id("x") }.into();
        assert!(err.is_structural());
        assert!(!err.is_integrity());

        let err: GuardError = IntegrityError::UnsealedPrediction { node_id: id("x") }.into();
        assert!(err.is_integrity());

        let err = GuardError::internal("lock poisoned");
        assert!(format!("{err}").contains("lock poisoned"));
    }

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors: Vec<GuardError> = vec![
            StructuralError::DuplicateId { id: id("a") }.into(),
            StructuralError::Cycle { from: id("a"), to: id("b") }.into(),
            StructuralError::OrphanedDerivation { id: id("a") }.into(),
            IntegrityError::UnsealedPrediction { node_id: id("a") }.into(),
            IntegrityError::OrderingViolated {
                node_id: id("a"),
                sealed_at: Sequence::new(2),
                observed_at: Sequence::new(1),
            }
            .into(),
            ComparisonError::InvalidTolerance { value: -1.0 }.into(),
            PersistenceError::Serialization("bad".to_string()).into(),
            GuardError::config("max_traversal_nodes", "zero"),
            GuardError::internal("x"),
        ];
        let codes: std::collections::HashSet<i32> = errors.iter().map(GuardError::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|c| *c != 0));
    }
}
