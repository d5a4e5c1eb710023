//! The guard facade.
//!
//! [`ProvenanceGuard`] owns one audited run: the graph, the seal log, the
//! observation and verdict logs, and the logical clock they share. It is
//! `Send + Sync`; wrap it in an `Arc` to share it between threads.
//!
//! Locks are always taken in the order graph, seals, falsification logs,
//! journal. Every mutation is planned under its locks, journaled (for
//! persistent guards), and only then made visible, so the journal never
//! lags behind what readers can observe.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;
use uuid::Uuid;

use crate::classify::{self, ClassificationViolation};
use crate::clock::{LogicalClock, Sequence};
use crate::config::GuardConfig;
use crate::error::{GuardError, GuardResult, StructuralError};
use crate::falsify::{self, Comparator, FalsificationRunner, Observation, PredictionState, Verdict};
use crate::gap::{self, GapReport};
use crate::graph::{GraphChange, ProvenanceGraph};
use crate::node::{DerivationSpec, Edge, Node, NodeId, NodeKind, NodeSpec};
use crate::scan::{self, ContaminationReport, ScanRoot};
use crate::seal::{HashVersion, HasherSet, Seal, SealHasher, SealRegistry};
use crate::storage::JournalRecord;
use crate::value::Value;

#[cfg(feature = "persistent")]
use crate::storage::persistent::{FileLock, Journal, JOURNAL_FILE};

#[cfg(feature = "persistent")]
#[derive(Debug)]
struct Durable {
    journal: Mutex<Journal>,
    _lock: FileLock,
}

/// Applies one journaled record during [`ProvenanceGuard::open`].
#[cfg(feature = "persistent")]
fn replay_record(
    graph: &mut ProvenanceGraph,
    seals: &mut SealRegistry,
    falsify: &mut FalsificationRunner,
    record: JournalRecord,
    line: usize,
) -> GuardResult<()> {
    use crate::error::PersistenceError;

    let corrupt = |e: StructuralError| PersistenceError::Corrupt {
        line,
        reason: e.to_string(),
    };
    match record {
        JournalRecord::Graph(change) => graph.apply(change).map_err(corrupt)?,
        JournalRecord::Seal(seal) => seals.restore(graph, seal)?,
        JournalRecord::Observation(obs) => {
            graph.node(&obs.node_id).map_err(corrupt)?;
            falsify.append_observation(obs);
        }
        JournalRecord::Verdict(verdict) => falsify.append_verdict(verdict),
    }
    Ok(())
}

/// One audited derivation run.
#[derive(Debug)]
pub struct ProvenanceGuard {
    config: GuardConfig,
    run_id: Uuid,
    clock: Arc<LogicalClock>,
    graph: RwLock<ProvenanceGraph>,
    seals: Mutex<SealRegistry>,
    falsify: Mutex<FalsificationRunner>,
    #[cfg(feature = "persistent")]
    durable: Option<Durable>,
}

fn poisoned(what: &str) -> GuardError {
    GuardError::internal(format!("poisoned lock: {what}"))
}

impl ProvenanceGuard {
    /// Creates an in-memory guard.
    pub fn new(config: GuardConfig) -> GuardResult<Self> {
        Self::with_hashers(config, HasherSet::builtin())
    }

    /// Creates an in-memory guard with a custom set of hash constructions.
    pub fn with_hashers(config: GuardConfig, hashers: HasherSet) -> GuardResult<Self> {
        Self::build(config.validate()?, hashers, Uuid::new_v4())
    }

    fn build(config: GuardConfig, hashers: HasherSet, run_id: Uuid) -> GuardResult<Self> {
        let clock = Arc::new(LogicalClock::new());
        let graph = ProvenanceGraph::new(Arc::clone(&clock), config.empirical_policy, config.max_traversal_nodes);
        let seals = SealRegistry::with_hashers(Arc::clone(&clock), hashers, config.default_hash_version)?;
        let falsify = FalsificationRunner::new(Arc::clone(&clock));
        Ok(Self {
            config,
            run_id,
            clock,
            graph: RwLock::new(graph),
            seals: Mutex::new(seals),
            falsify: Mutex::new(falsify),
            #[cfg(feature = "persistent")]
            durable: None,
        })
    }

    /// Opens (or creates) a persistent guard in `dir`.
    ///
    /// The journal is replayed through the same validation as live
    /// mutation. Replay stops at the first torn or corrupt line; every
    /// replayed seal must verify against the graph as it stood at that
    /// point.
    ///
    /// # Errors
    /// - `Locked` if another guard holds `dir`
    /// - `Corrupt` if the header is unreadable or a checksummed entry does
    ///   not apply
    /// - `SealMismatch` if a replayed seal does not verify
    #[cfg(feature = "persistent")]
    pub fn open(dir: impl AsRef<std::path::Path>, config: GuardConfig) -> GuardResult<Self> {
        Self::open_with_hashers(dir, config, HasherSet::builtin())
    }

    /// Like [`open`](Self::open) with a custom set of hash constructions.
    #[cfg(feature = "persistent")]
    pub fn open_with_hashers(
        dir: impl AsRef<std::path::Path>,
        config: GuardConfig,
        hashers: HasherSet,
    ) -> GuardResult<Self> {
        use crate::error::PersistenceError;

        let config = config.validate()?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(PersistenceError::from)?;
        let lock = FileLock::acquire(dir)?;
        let (journal, replay) = Journal::open(&dir.join(JOURNAL_FILE), config.journal.sync_on_write)?;

        let mut guard = Self::build(config, hashers, replay.header.run_id)?;
        {
            let graph = guard.graph.get_mut().map_err(|_| poisoned("graph"))?;
            let seals = guard.seals.get_mut().map_err(|_| poisoned("seals"))?;
            let falsify = guard.falsify.get_mut().map_err(|_| poisoned("falsify"))?;
            for (idx, entry) in replay.entries.into_iter().enumerate() {
                for record in entry.records {
                    replay_record(graph, seals, falsify, record, idx + 2)?;
                }
            }
        }
        info!(
            dir = %dir.display(),
            run_id = %guard.run_id,
            nodes = guard.graph.get_mut().map_err(|_| poisoned("graph"))?.node_count(),
            sequence = %guard.clock.current(),
            "replayed journal"
        );

        guard.durable = Some(Durable {
            journal: Mutex::new(journal),
            _lock: lock,
        });
        Ok(guard)
    }

    /// Identifier of this run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Validated configuration.
    #[must_use]
    pub const fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Most recently issued logical time.
    #[must_use]
    pub fn current_sequence(&self) -> Sequence {
        self.clock.current()
    }

    fn read_graph(&self) -> GuardResult<RwLockReadGuard<'_, ProvenanceGraph>> {
        self.graph.read().map_err(|_| poisoned("graph.read"))
    }

    fn write_graph(&self) -> GuardResult<RwLockWriteGuard<'_, ProvenanceGraph>> {
        self.graph.write().map_err(|_| poisoned("graph.write"))
    }

    fn lock_seals(&self) -> GuardResult<MutexGuard<'_, SealRegistry>> {
        self.seals.lock().map_err(|_| poisoned("seals"))
    }

    fn lock_falsify(&self) -> GuardResult<MutexGuard<'_, FalsificationRunner>> {
        self.falsify.lock().map_err(|_| poisoned("falsify"))
    }

    #[cfg(feature = "persistent")]
    fn journal(&self, records: impl IntoIterator<Item = JournalRecord>) -> GuardResult<()> {
        if let Some(durable) = &self.durable {
            durable
                .journal
                .lock()
                .map_err(|_| poisoned("journal"))?
                .append(records)?;
        }
        Ok(())
    }

    #[cfg(not(feature = "persistent"))]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn journal(&self, _records: impl IntoIterator<Item = JournalRecord>) -> GuardResult<()> {
        Ok(())
    }

    fn mutate(
        &self,
        plan: impl FnOnce(&ProvenanceGraph) -> Result<Vec<GraphChange>, StructuralError>,
    ) -> GuardResult<Sequence> {
        let mut graph = self.write_graph()?;
        let changes = plan(&*graph)?;
        let at = changes
            .first()
            .map(GraphChange::sequence)
            .ok_or_else(|| GuardError::internal("empty graph plan"))?;
        self.journal(changes.iter().cloned().map(JournalRecord::Graph))?;
        graph.commit(changes)?;
        Ok(at)
    }

    // ------------------------------------------------------------------
    // Graph
    // ------------------------------------------------------------------

    /// Registers an unclassified node.
    pub fn add_node(&self, spec: NodeSpec) -> GuardResult<Sequence> {
        self.mutate(|g| g.plan_add_node(spec))
    }

    /// Adds the dependency edge `from -> to`.
    pub fn add_edge(&self, from: &NodeId, to: &NodeId) -> GuardResult<Sequence> {
        self.mutate(|g| g.plan_add_edge(from, to))
    }

    /// Labels a node. Labels are final.
    pub fn classify(&self, id: &NodeId, kind: NodeKind) -> GuardResult<Sequence> {
        self.mutate(|g| g.plan_classify(id, kind))
    }

    /// Registers a node with its inputs and (optionally) its classification
    /// as one atomic step.
    pub fn register(&self, spec: DerivationSpec) -> GuardResult<Sequence> {
        self.mutate(|g| g.plan_register(spec, None))
    }

    /// Registers `spec` as the next version of `old`.
    pub fn supersede(&self, old: &NodeId, spec: DerivationSpec) -> GuardResult<Sequence> {
        self.mutate(|g| g.plan_register(spec, Some(old.clone())))
    }

    /// Snapshot of one node.
    pub fn node(&self, id: &NodeId) -> GuardResult<Node> {
        Ok(self.read_graph()?.node(id)?.clone())
    }

    /// Newest version of `id` along its supersede chain.
    pub fn latest_version(&self, id: &NodeId) -> GuardResult<Node> {
        Ok(self.read_graph()?.latest_version(id)?.clone())
    }

    /// Direct dependencies of `id`.
    pub fn neighbors_in(&self, id: &NodeId) -> GuardResult<BTreeSet<NodeId>> {
        Ok(self.read_graph()?.neighbors_in(id)?.clone())
    }

    /// Direct dependents of `id`.
    pub fn neighbors_out(&self, id: &NodeId) -> GuardResult<BTreeSet<NodeId>> {
        Ok(self.read_graph()?.neighbors_out(id)?.clone())
    }

    /// Transitive dependencies of `id`.
    pub fn ancestors(&self, id: &NodeId) -> GuardResult<BTreeSet<NodeId>> {
        Ok(self.read_graph()?.ancestors(id)?)
    }

    /// Transitive dependents of `id`.
    pub fn descendants(&self, id: &NodeId) -> GuardResult<BTreeSet<NodeId>> {
        Ok(self.read_graph()?.descendants(id)?)
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> GuardResult<Vec<Node>> {
        Ok(self.read_graph()?.nodes().cloned().collect())
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> GuardResult<Vec<Edge>> {
        Ok(self.read_graph()?.edges().to_vec())
    }

    /// Dependencies before dependents; ties broken by identifier.
    pub fn topological_order(&self) -> GuardResult<Vec<NodeId>> {
        Ok(self.read_graph()?.topological_order())
    }

    /// Re-checks every classified node against the classification rules.
    pub fn check_invariants(&self) -> GuardResult<Vec<ClassificationViolation>> {
        Ok(classify::check_invariants(&*self.read_graph()?))
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    /// Scans the current graph for contamination.
    pub fn scan(&self, root: &ScanRoot) -> GuardResult<ContaminationReport> {
        Ok(scan::scan(&*self.read_graph()?, root)?)
    }

    /// Analyses the axiom coverage and contamination of `target`.
    pub fn analyze(&self, target: &NodeId) -> GuardResult<GapReport> {
        Ok(gap::analyze(&*self.read_graph()?, target)?)
    }

    // ------------------------------------------------------------------
    // Sealing
    // ------------------------------------------------------------------

    /// Seals `id` with the configured default construction.
    pub fn seal(&self, id: &NodeId) -> GuardResult<Seal> {
        self.seal_with(id, self.config.default_hash_version)
    }

    /// Seals `id` with a specific construction.
    pub fn seal_with(&self, id: &NodeId, version: HashVersion) -> GuardResult<Seal> {
        use crate::seal::PlannedSeal;

        let graph = self.read_graph()?;
        let mut seals = self.lock_seals()?;
        match seals.plan_seal(&graph, id, version)? {
            PlannedSeal::Existing(seal) => Ok(seal),
            PlannedSeal::New(seal) => {
                self.journal([JournalRecord::Seal(seal.clone())])?;
                seals.append(seal.clone())?;
                Ok(seal)
            }
        }
    }

    /// Makes another hash construction available to this guard.
    pub fn register_hasher(&self, hasher: Arc<dyn SealHasher>) -> GuardResult<()> {
        self.lock_seals()?.register_hasher(hasher);
        Ok(())
    }

    /// Recomputes `seal` against the current graph.
    pub fn verify(&self, seal: &Seal) -> GuardResult<bool> {
        let graph = self.read_graph()?;
        self.lock_seals()?.verify(&graph, seal)
    }

    /// Verifies the newest seal of `id`, failing with `SealMismatch`.
    pub fn verify_latest(&self, id: &NodeId) -> GuardResult<Seal> {
        let graph = self.read_graph()?;
        self.lock_seals()?.verify_latest(&graph, id)
    }

    /// Seals of `id`, newest last.
    pub fn list_seals(&self, id: &NodeId) -> GuardResult<Vec<Seal>> {
        Ok(self.lock_seals()?.list_seals(id))
    }

    /// The whole seal log.
    pub fn seals(&self) -> GuardResult<Vec<Seal>> {
        Ok(self.lock_seals()?.seals().to_vec())
    }

    // ------------------------------------------------------------------
    // Falsification
    // ------------------------------------------------------------------

    /// Replaces the comparator used by [`compare`](Self::compare).
    pub fn set_comparator(&self, comparator: Arc<dyn Comparator>) -> GuardResult<()> {
        self.lock_falsify()?.set_comparator(comparator);
        Ok(())
    }

    /// Records an observation, stamped with the next logical time.
    pub fn record_observation(&self, node_id: &NodeId, value: impl Into<Value>) -> GuardResult<Observation> {
        let graph = self.read_graph()?;
        let mut falsify = self.lock_falsify()?;
        let observation = falsify.plan_record(&graph, node_id, value.into())?;
        self.journal([JournalRecord::Observation(observation.clone())])?;
        falsify.append_observation(observation.clone());
        Ok(observation)
    }

    /// Records an externally sequenced observation.
    pub fn ingest_observation(&self, observation: Observation) -> GuardResult<()> {
        let graph = self.read_graph()?;
        let mut falsify = self.lock_falsify()?;
        falsify.plan_ingest(&graph, &observation)?;
        self.journal([JournalRecord::Observation(observation.clone())])?;
        falsify.append_observation(observation);
        Ok(())
    }

    /// Compares the sealed prediction for `node_id` against `observation`.
    ///
    /// See [`FalsificationRunner::compare_with`] for the ordering rules.
    pub fn compare(&self, node_id: &NodeId, observation: &Observation, tolerance: f64) -> GuardResult<Verdict> {
        self.compare_inner(node_id, observation, tolerance, None)
    }

    /// Like [`compare`](Self::compare) with an explicit comparator.
    pub fn compare_with(
        &self,
        node_id: &NodeId,
        observation: &Observation,
        tolerance: f64,
        comparator: &dyn Comparator,
    ) -> GuardResult<Verdict> {
        self.compare_inner(node_id, observation, tolerance, Some(comparator))
    }

    fn compare_inner(
        &self,
        node_id: &NodeId,
        observation: &Observation,
        tolerance: f64,
        comparator: Option<&dyn Comparator>,
    ) -> GuardResult<Verdict> {
        let graph = self.read_graph()?;
        let seals = self.lock_seals()?;
        let mut falsify = self.lock_falsify()?;
        let plan = match comparator {
            Some(c) => falsify.plan_compare(&graph, &seals, node_id, observation, tolerance, c)?,
            None => {
                let default = falsify.comparator();
                falsify.plan_compare(&graph, &seals, node_id, observation, tolerance, default.as_ref())?
            }
        };

        let mut records = Vec::with_capacity(2);
        if let Some(obs) = &plan.ingest {
            records.push(JournalRecord::Observation(obs.clone()));
        }
        records.push(JournalRecord::Verdict(plan.verdict.clone()));
        self.journal(records)?;

        let verdict = plan.verdict.clone();
        falsify.apply_comparison(plan);
        falsify::ordering_result(verdict)
    }

    /// Lifecycle state of the prediction at `node_id`.
    pub fn status(&self, node_id: &NodeId) -> GuardResult<PredictionState> {
        let graph = self.read_graph()?;
        let seals = self.lock_seals()?;
        Ok(self.lock_falsify()?.status(&graph, &seals, node_id)?)
    }

    /// Every observation in arrival order.
    pub fn observations(&self) -> GuardResult<Vec<Observation>> {
        Ok(self.lock_falsify()?.observations().to_vec())
    }

    /// Every verdict in creation order.
    pub fn verdicts(&self) -> GuardResult<Vec<Verdict>> {
        Ok(self.lock_falsify()?.verdicts().to_vec())
    }
}
