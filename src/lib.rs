//! # Provenance Guard
//!
//! Integrity engine for derivation pipelines that claim their results follow
//! from first principles alone. Every derived quantity is a node in an
//! append-only DAG whose edges record "was computed using". On top of that
//! graph the guard:
//!
//! - classifies nodes as Axiom, Derived or Empirical, explicitly and finally;
//! - finds every Derived node whose lineage reaches an undeclared Empirical
//!   input (contamination);
//! - reports missing axioms and empirical paths for a target (gap analysis);
//! - seals predictions bottom-up with content-addressed digests;
//! - compares sealed predictions against observations, refusing any
//!   prediction that was sealed after its observation became visible.
//!
//! All ordering uses one logical clock. Wall-clock time is informational.
//!
//! ## Usage
//!
//! ```rust
//! use provenance_guard::{
//!     DerivationSpec, GuardConfig, NodeId, NodeKind, NodeSpec, ProvenanceGuard, ScanRoot,
//! };
//!
//! # fn main() -> Result<(), provenance_guard::GuardError> {
//! let guard = ProvenanceGuard::new(GuardConfig::default())?;
//! guard.register(DerivationSpec::source(
//!     NodeSpec::builder("alpha").value(0.0072973525693).build()?,
//!     NodeKind::Axiom,
//! ))?;
//! guard.register(DerivationSpec::derived(
//!     NodeSpec::builder("alpha_inv").formula("1 / alpha").value(137.035999).build()?,
//!     vec![NodeId::new("alpha")?],
//! ))?;
//!
//! assert!(guard.scan(&ScanRoot::All)?.is_clean());
//! guard.seal(&NodeId::new("alpha")?)?;
//! let seal = guard.seal(&NodeId::new("alpha_inv")?)?;
//! assert!(guard.verify(&seal)?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_arguments)]

// Core types
pub mod clock;
pub mod config;
pub mod error;
pub mod node;
pub mod value;

// Graph and analyses
pub mod classify;
pub mod gap;
pub mod graph;
pub mod report;
pub mod scan;

// Sealing and falsification
pub mod falsify;
pub mod seal;

// Facade and durability
pub mod guard;
pub mod storage;

pub use classify::ClassificationViolation;
pub use clock::{LogicalClock, Sequence};
pub use config::{EmpiricalPolicy, GuardConfig, JournalConfig};
pub use error::{ComparisonError, GuardError, GuardResult, IntegrityError, PersistenceError, StructuralError};
pub use falsify::{
    AbsoluteTolerance, Comparator, FalsificationRunner, Observation, PredictionState, RelativeTolerance, Verdict,
    VerdictOutcome, VerdictTable,
};
pub use gap::GapReport;
pub use graph::{GraphChange, ProvenanceGraph};
pub use guard::ProvenanceGuard;
pub use node::{DerivationSpec, Edge, EdgeLabel, FormulaRef, Node, NodeId, NodeKind, NodeSpec, NodeSpecBuilder};
pub use report::TabularReport;
pub use scan::{ContaminationPath, ContaminationReport, ScanRoot};
pub use seal::{Blake3V1, Digest, HashVersion, HasherSet, Seal, SealHasher, SealRegistry, SealTable, Sha256V1};
pub use storage::{JournalEntry, JournalRecord};
pub use value::Value;
