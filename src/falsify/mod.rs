//! Falsification test runner.
//!
//! Consumes sealed predictions and observations and appends verdicts. A
//! prediction only counts if it was sealed strictly before the observation
//! became visible; otherwise the verdict records an ordering violation and the
//! comparison is refused.
//!
//! Observations and verdicts live in two append-only logs. Running a
//! comparison again appends a new verdict; nothing is recomputed in place.

mod comparator;

pub use comparator::{check_tolerance, AbsoluteTolerance, Comparator, RelativeTolerance};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{LogicalClock, Sequence};
use crate::error::{ComparisonError, GuardResult, IntegrityError, StructuralError};
use crate::graph::ProvenanceGraph;
use crate::node::NodeId;
use crate::report::TabularReport;
use crate::seal::{Digest, SealRegistry};
use crate::value::Value;

/// An externally supplied comparison value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Prediction node the value is for.
    pub node_id: NodeId,
    /// Observed value.
    pub value: Value,
    /// Logical time at which the value became visible to the engine.
    pub arrival_sequence: Sequence,
}

/// Final state of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    /// Agreed within tolerance.
    Passed,
    /// Disagreed beyond tolerance.
    Failed,
    /// The seal was not older than the observation; no comparison was made.
    OrderingViolated,
}

impl fmt::Display for VerdictOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::OrderingViolated => "ordering_violated",
        })
    }
}

/// Result of comparing a sealed prediction against an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Prediction node.
    pub node_id: NodeId,
    /// Output digest of the seal that was compared.
    pub predicted_digest: Digest,
    /// Value it was compared against.
    pub observed_value: Value,
    /// Tolerance handed to the comparator.
    pub tolerance: f64,
    /// Comparator result; always false for an ordering violation.
    pub passed: bool,
    /// False when the seal was not strictly older than the observation.
    pub ordering_valid: bool,
    /// Summary of `passed` and `ordering_valid`.
    pub outcome: VerdictOutcome,
    /// `created_at` of the compared seal.
    pub seal_sequence: Sequence,
    /// `arrival_sequence` of the observation.
    pub observation_sequence: Sequence,
    /// Logical time of the verdict itself.
    pub created_at: Sequence,
}

/// Where a prediction is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "outcome")]
pub enum PredictionState {
    /// No seal yet.
    Unsealed,
    /// Sealed, and the newest seal has not been compared.
    Sealed,
    /// Compared against its newest seal.
    Compared(VerdictOutcome),
}

/// Verdict log view rendered one row per verdict.
#[derive(Debug, Clone, Copy)]
pub struct VerdictTable<'a>(pub &'a [Verdict]);

impl TabularReport for VerdictTable<'_> {
    fn rows(&self) -> Vec<serde_json::Value> {
        self.0
            .iter()
            .map(|v| {
                serde_json::json!({
                    "node_id": v.node_id,
                    "predicted_digest": v.predicted_digest,
                    "observed_value": v.observed_value.to_string(),
                    "tolerance": v.tolerance,
                    "passed": v.passed,
                    "ordering_valid": v.ordering_valid,
                    "outcome": v.outcome,
                    "seal_sequence": v.seal_sequence,
                    "observation_sequence": v.observation_sequence,
                    "created_at": v.created_at,
                })
            })
            .collect()
    }
}

/// A comparison ready to be appended.
#[derive(Debug, Clone)]
pub(crate) struct PlannedComparison {
    /// Observation that has to be ingested first, if it was not on record.
    pub(crate) ingest: Option<Observation>,
    pub(crate) verdict: Verdict,
}

/// Owns the observation and verdict logs.
pub struct FalsificationRunner {
    clock: Arc<LogicalClock>,
    comparator: Arc<dyn Comparator>,
    observations: Vec<Observation>,
    verdicts: Vec<Verdict>,
}

impl fmt::Debug for FalsificationRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FalsificationRunner")
            .field("comparator", &self.comparator.name())
            .field("observations", &self.observations.len())
            .field("verdicts", &self.verdicts.len())
            .finish()
    }
}

impl FalsificationRunner {
    /// Creates a runner using [`AbsoluteTolerance`].
    #[must_use]
    pub fn new(clock: Arc<LogicalClock>) -> Self {
        Self::with_comparator(clock, Arc::new(AbsoluteTolerance))
    }

    /// Creates a runner with a domain-supplied comparator.
    #[must_use]
    pub fn with_comparator(clock: Arc<LogicalClock>, comparator: Arc<dyn Comparator>) -> Self {
        Self {
            clock,
            comparator,
            observations: Vec::new(),
            verdicts: Vec::new(),
        }
    }

    /// Comparator used by [`compare`](Self::compare).
    #[must_use]
    pub fn comparator(&self) -> Arc<dyn Comparator> {
        Arc::clone(&self.comparator)
    }

    /// Replaces the comparator used by [`compare`](Self::compare).
    pub fn set_comparator(&mut self, comparator: Arc<dyn Comparator>) {
        self.comparator = comparator;
    }

    /// Stamps `value` with the next logical time and records it.
    pub fn record_observation(&mut self, graph: &ProvenanceGraph, node_id: &NodeId, value: Value) -> GuardResult<Observation> {
        let observation = self.plan_record(graph, node_id, value)?;
        self.append_observation(observation.clone());
        Ok(observation)
    }

    /// Records an externally sequenced observation.
    ///
    /// # Errors
    /// `NonMonotonicObservation` unless the arrival sequence is strictly
    /// greater than every sequence issued or ingested so far.
    pub fn ingest_observation(&mut self, graph: &ProvenanceGraph, observation: Observation) -> GuardResult<()> {
        self.plan_ingest(graph, &observation)?;
        self.append_observation(observation);
        Ok(())
    }

    pub(crate) fn plan_record(&self, graph: &ProvenanceGraph, node_id: &NodeId, value: Value) -> GuardResult<Observation> {
        graph.node(node_id)?;
        check_value(&value)?;
        Ok(Observation {
            node_id: node_id.clone(),
            value,
            arrival_sequence: self.clock.tick(),
        })
    }

    /// Validates an external observation and claims its sequence on the clock.
    pub(crate) fn plan_ingest(&self, graph: &ProvenanceGraph, observation: &Observation) -> GuardResult<()> {
        graph.node(&observation.node_id)?;
        check_value(&observation.value)?;
        self.clock
            .try_advance(observation.arrival_sequence)
            .map_err(|last| IntegrityError::NonMonotonicObservation {
                sequence: observation.arrival_sequence,
                last,
            })?;
        Ok(())
    }

    /// Appends an observation whose sequence has already been issued.
    pub(crate) fn append_observation(&mut self, observation: Observation) {
        self.clock.observe(observation.arrival_sequence);
        debug!(
            node = %observation.node_id,
            sequence = %observation.arrival_sequence,
            "recorded observation"
        );
        self.observations.push(observation);
    }

    fn is_recorded(&self, observation: &Observation) -> bool {
        self.observations
            .iter()
            .rev()
            .any(|o| o == observation)
    }

    /// Compares the sealed prediction for `node_id` against `observation`
    /// using the runner's comparator.
    pub fn compare(
        &mut self,
        graph: &ProvenanceGraph,
        seals: &SealRegistry,
        node_id: &NodeId,
        observation: &Observation,
        tolerance: f64,
    ) -> GuardResult<Verdict> {
        let comparator = Arc::clone(&self.comparator);
        self.compare_with(graph, seals, node_id, observation, tolerance, comparator.as_ref())
    }

    /// Like [`compare`](Self::compare) with an explicit comparator.
    ///
    /// An observation not already on record is ingested first, so it is
    /// subject to the same monotonicity check as
    /// [`ingest_observation`](Self::ingest_observation). An observation that
    /// predates the seal is never ingested; it only yields the violating
    /// verdict.
    ///
    /// # Errors
    /// - `UnsealedPrediction` / `SealMismatch` if the newest seal is missing or
    ///   no longer verifies
    /// - `OrderingViolated` if the seal is not strictly older than the
    ///   observation; the violating verdict is still appended
    pub fn compare_with(
        &mut self,
        graph: &ProvenanceGraph,
        seals: &SealRegistry,
        node_id: &NodeId,
        observation: &Observation,
        tolerance: f64,
        comparator: &dyn Comparator,
    ) -> GuardResult<Verdict> {
        let plan = self.plan_compare(graph, seals, node_id, observation, tolerance, comparator)?;
        let verdict = plan.verdict.clone();
        self.apply_comparison(plan);
        ordering_result(verdict)
    }

    pub(crate) fn plan_compare(
        &self,
        graph: &ProvenanceGraph,
        seals: &SealRegistry,
        node_id: &NodeId,
        observation: &Observation,
        tolerance: f64,
        comparator: &dyn Comparator,
    ) -> GuardResult<PlannedComparison> {
        check_tolerance(tolerance)?;
        if observation.node_id != *node_id {
            return Err(ComparisonError::IncomparableValues {
                reason: format!("observation is for {}, not {node_id}", observation.node_id),
            }
            .into());
        }
        let seal = seals.verify_latest(graph, node_id)?;

        let ordering_valid = seal.created_at < observation.arrival_sequence;
        let ingest = if !ordering_valid {
            check_value(&observation.value)?;
            None
        } else if self.is_recorded(observation) {
            None
        } else {
            self.plan_ingest(graph, observation)?;
            Some(observation.clone())
        };

        let passed = if ordering_valid {
            let node = graph.node(node_id)?;
            let predicted = node.value.as_ref().ok_or_else(|| ComparisonError::IncomparableValues {
                reason: format!("{node_id} carries no predicted value"),
            })?;
            comparator.agrees(predicted, &observation.value, tolerance)?
        } else {
            false
        };
        let outcome = match (ordering_valid, passed) {
            (false, _) => VerdictOutcome::OrderingViolated,
            (true, true) => VerdictOutcome::Passed,
            (true, false) => VerdictOutcome::Failed,
        };

        Ok(PlannedComparison {
            ingest,
            verdict: Verdict {
                node_id: node_id.clone(),
                predicted_digest: seal.output_digest,
                observed_value: observation.value.clone(),
                tolerance,
                passed,
                ordering_valid,
                outcome,
                seal_sequence: seal.created_at,
                observation_sequence: observation.arrival_sequence,
                created_at: self.clock.tick(),
            },
        })
    }

    pub(crate) fn apply_comparison(&mut self, plan: PlannedComparison) {
        if let Some(observation) = plan.ingest {
            self.append_observation(observation);
        }
        self.append_verdict(plan.verdict);
    }

    /// Appends a verdict whose sequence has already been issued.
    pub(crate) fn append_verdict(&mut self, verdict: Verdict) {
        self.clock.observe(verdict.created_at);
        if verdict.ordering_valid {
            info!(
                node = %verdict.node_id,
                outcome = %verdict.outcome,
                tolerance = verdict.tolerance,
                sequence = %verdict.created_at,
                "verdict"
            );
        } else {
            warn!(
                node = %verdict.node_id,
                sealed_at = %verdict.seal_sequence,
                observed_at = %verdict.observation_sequence,
                "ordering violated"
            );
        }
        self.verdicts.push(verdict);
    }

    /// Current lifecycle state of the prediction at `node_id`.
    pub fn status(&self, graph: &ProvenanceGraph, seals: &SealRegistry, node_id: &NodeId) -> Result<PredictionState, StructuralError> {
        graph.node(node_id)?;
        let Some(seal) = seals.latest(node_id) else {
            return Ok(PredictionState::Unsealed);
        };
        Ok(self
            .verdicts
            .iter()
            .rev()
            .find(|v| v.node_id == *node_id && v.seal_sequence == seal.created_at)
            .map_or(PredictionState::Sealed, |v| PredictionState::Compared(v.outcome)))
    }

    /// Every observation in arrival order.
    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Every verdict in creation order.
    #[must_use]
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    /// Verdicts for one node in creation order.
    #[must_use]
    pub fn verdicts_for(&self, node_id: &NodeId) -> Vec<Verdict> {
        self.verdicts.iter().filter(|v| v.node_id == *node_id).cloned().collect()
    }
}

fn check_value(value: &Value) -> Result<(), ComparisonError> {
    if value.is_well_formed() {
        Ok(())
    } else {
        Err(ComparisonError::IncomparableValues {
            reason: "observation value must be finite".to_string(),
        })
    }
}

/// Turns an appended verdict into the caller-facing result.
pub(crate) fn ordering_result(verdict: Verdict) -> GuardResult<Verdict> {
    if verdict.ordering_valid {
        Ok(verdict)
    } else {
        Err(IntegrityError::OrderingViolated {
            node_id: verdict.node_id,
            sealed_at: verdict.seal_sequence,
            observed_at: verdict.observation_sequence,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmpiricalPolicy;
    use crate::error::GuardError;
    use crate::node::{DerivationSpec, NodeKind, NodeSpec};
    use crate::seal::HashVersion;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    struct Fixture {
        graph: ProvenanceGraph,
        seals: SealRegistry,
        runner: FalsificationRunner,
        clock: Arc<LogicalClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(LogicalClock::new());
        let mut graph = ProvenanceGraph::new(Arc::clone(&clock), EmpiricalPolicy::Enforce, 1000);
        graph
            .register(DerivationSpec::source(
                NodeSpec::builder("a").value(2.0).build().unwrap(),
                NodeKind::Axiom,
            ))
            .unwrap();
        graph
            .register(DerivationSpec::derived(
                NodeSpec::builder("p").formula("p = a^2").value(4.0).build().unwrap(),
                vec![id("a")],
            ))
            .unwrap();
        let seals = SealRegistry::new(Arc::clone(&clock), HashVersion::BLAKE3_V1).unwrap();
        let runner = FalsificationRunner::new(Arc::clone(&clock));
        Fixture {
            graph,
            seals,
            runner,
            clock,
        }
    }

    #[test]
    fn sealed_before_observation_passes_or_fails() {
        let mut f = fixture();
        f.seals.seal(&f.graph, &id("a")).unwrap();
        f.seals.seal(&f.graph, &id("p")).unwrap();
        assert_eq!(f.runner.status(&f.graph, &f.seals, &id("p")).unwrap(), PredictionState::Sealed);

        let obs = f.runner.record_observation(&f.graph, &id("p"), Value::from(4.1)).unwrap();
        let pass = f.runner.compare(&f.graph, &f.seals, &id("p"), &obs, 0.2).unwrap();
        assert!(pass.passed && pass.ordering_valid);
        assert_eq!(pass.outcome, VerdictOutcome::Passed);

        let fail = f.runner.compare(&f.graph, &f.seals, &id("p"), &obs, 0.01).unwrap();
        assert_eq!(fail.outcome, VerdictOutcome::Failed);
        assert_eq!(f.runner.verdicts().len(), 2);
        assert_eq!(f.runner.observations().len(), 1);
        assert_eq!(
            f.runner.status(&f.graph, &f.seals, &id("p")).unwrap(),
            PredictionState::Compared(VerdictOutcome::Failed)
        );
    }

    #[test]
    fn sealing_after_observation_is_an_ordering_violation() {
        let mut f = fixture();
        let obs = f.runner.record_observation(&f.graph, &id("p"), Value::from(4.0)).unwrap();
        f.seals.seal(&f.graph, &id("a")).unwrap();
        f.seals.seal(&f.graph, &id("p")).unwrap();

        let err = f.runner.compare(&f.graph, &f.seals, &id("p"), &obs, 1.0).unwrap_err();
        assert!(matches!(err, GuardError::Integrity(IntegrityError::OrderingViolated { .. })));
        let recorded = &f.runner.verdicts()[0];
        assert!(!recorded.ordering_valid);
        assert!(!recorded.passed);
        assert_eq!(recorded.outcome, VerdictOutcome::OrderingViolated);
    }

    #[test]
    fn unsealed_prediction_is_refused() {
        let mut f = fixture();
        assert_eq!(f.runner.status(&f.graph, &f.seals, &id("p")).unwrap(), PredictionState::Unsealed);
        let obs = f.runner.record_observation(&f.graph, &id("p"), Value::from(4.0)).unwrap();
        assert!(matches!(
            f.runner.compare(&f.graph, &f.seals, &id("p"), &obs, 0.0),
            Err(GuardError::Integrity(IntegrityError::UnsealedPrediction { .. }))
        ));
        assert!(f.runner.verdicts().is_empty());
    }

    #[test]
    fn ingested_observations_must_be_monotonic() {
        let mut f = fixture();
        let current = f.clock.current();
        let stale = Observation {
            node_id: id("p"),
            value: Value::from(4.0),
            arrival_sequence: current,
        };
        assert!(matches!(
            f.runner.ingest_observation(&f.graph, stale),
            Err(GuardError::Integrity(IntegrityError::NonMonotonicObservation { .. }))
        ));

        let fresh = Observation {
            node_id: id("p"),
            value: Value::from(4.0),
            arrival_sequence: Sequence::new(current.get() + 100),
        };
        f.runner.ingest_observation(&f.graph, fresh).unwrap();
        assert!(f.clock.tick() > Sequence::new(current.get() + 100));
    }

    #[test]
    fn invalid_tolerance_and_mismatched_observation() {
        let mut f = fixture();
        f.seals.seal(&f.graph, &id("a")).unwrap();
        f.seals.seal(&f.graph, &id("p")).unwrap();
        let obs = f.runner.record_observation(&f.graph, &id("p"), Value::from(4.0)).unwrap();
        assert!(matches!(
            f.runner.compare(&f.graph, &f.seals, &id("p"), &obs, -1.0),
            Err(GuardError::Comparison(ComparisonError::InvalidTolerance { .. }))
        ));
        assert!(matches!(
            f.runner.compare(&f.graph, &f.seals, &id("a"), &obs, 0.0),
            Err(GuardError::Comparison(ComparisonError::IncomparableValues { .. }))
        ));
    }

    #[test]
    fn custom_comparator_is_used() {
        let mut f = fixture();
        f.seals.seal(&f.graph, &id("a")).unwrap();
        f.seals.seal(&f.graph, &id("p")).unwrap();
        let obs = f.runner.record_observation(&f.graph, &id("p"), Value::from(4.3)).unwrap();
        let v = f
            .runner
            .compare_with(&f.graph, &f.seals, &id("p"), &obs, 0.1, &RelativeTolerance)
            .unwrap();
        assert!(v.passed);
        assert_eq!(VerdictTable(f.runner.verdicts()).rows().len(), 1);
    }
}
