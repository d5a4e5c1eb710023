//! Append-only seal registry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{preimage, Digest, HashVersion, HasherSet, Seal, SealHasher};
use crate::clock::{LogicalClock, Sequence};
use crate::error::{GuardError, GuardResult, IntegrityError, StructuralError};
use crate::graph::ProvenanceGraph;
use crate::node::{Node, NodeId};

/// Result of planning a seal.
#[derive(Debug, Clone)]
pub(crate) enum PlannedSeal {
    /// The node is already sealed with this exact digest.
    Existing(Seal),
    /// A new seal to append.
    New(Seal),
}

/// Append-only log of seals.
///
/// A node is sealed at most once per distinct digest: resealing an unchanged
/// node returns the seal already on record, keeping its original sequence.
#[derive(Debug)]
pub struct SealRegistry {
    hashers: HasherSet,
    default_version: HashVersion,
    clock: Arc<LogicalClock>,
    log: Vec<Seal>,
    by_node: BTreeMap<NodeId, Vec<usize>>,
}

impl SealRegistry {
    /// Creates an empty registry using the built-in constructions.
    pub fn new(clock: Arc<LogicalClock>, default_version: HashVersion) -> Result<Self, IntegrityError> {
        Self::with_hashers(clock, HasherSet::builtin(), default_version)
    }

    /// Creates an empty registry with a custom set of constructions.
    pub fn with_hashers(
        clock: Arc<LogicalClock>,
        hashers: HasherSet,
        default_version: HashVersion,
    ) -> Result<Self, IntegrityError> {
        hashers.get(default_version)?;
        Ok(Self {
            hashers,
            default_version,
            clock,
            log: Vec::new(),
            by_node: BTreeMap::new(),
        })
    }

    /// Makes another construction available for sealing and verification.
    pub fn register_hasher(&mut self, hasher: Arc<dyn SealHasher>) {
        self.hashers.register(hasher);
    }

    /// Construction used by [`seal`](Self::seal).
    #[must_use]
    pub const fn default_version(&self) -> HashVersion {
        self.default_version
    }

    /// Seals `id` with the default construction.
    pub fn seal(&mut self, graph: &ProvenanceGraph, id: &NodeId) -> GuardResult<Seal> {
        self.seal_with(graph, id, self.default_version)
    }

    /// Seals `id` with a specific construction.
    pub fn seal_with(&mut self, graph: &ProvenanceGraph, id: &NodeId, version: HashVersion) -> GuardResult<Seal> {
        match self.plan_seal(graph, id, version)? {
            PlannedSeal::Existing(seal) => Ok(seal),
            PlannedSeal::New(seal) => {
                self.append(seal.clone())?;
                Ok(seal)
            }
        }
    }

    pub(crate) fn plan_seal(
        &self,
        graph: &ProvenanceGraph,
        id: &NodeId,
        version: HashVersion,
    ) -> GuardResult<PlannedSeal> {
        let node = graph.node(id)?;
        if node.kind.is_none() {
            return Err(StructuralError::Unclassified { id: id.clone() }.into());
        }

        let mut inputs = BTreeSet::new();
        for dep in graph.neighbors_in(id)? {
            let latest = self.latest(dep).ok_or_else(|| IntegrityError::UnsealedDependency {
                node_id: id.clone(),
                dependency: dep.clone(),
            })?;
            inputs.insert(latest.output_digest);
        }

        let output_digest = self.compute(node, &inputs, version)?;
        if let Some(existing) = self
            .seals_of(id)
            .find(|s| s.output_digest == output_digest && s.hash_version == version)
        {
            debug!(node = %id, digest = %output_digest, "node already sealed with identical digest");
            return Ok(PlannedSeal::Existing(existing.clone()));
        }

        Ok(PlannedSeal::New(Seal {
            node_id: id.clone(),
            input_digests: inputs,
            formula_ref: node.formula_ref.clone(),
            output_digest,
            hash_version: version,
            created_at: self.clock.tick(),
        }))
    }

    /// Appends a seal to the log, advancing the clock past it.
    ///
    /// Used for planned seals and journal replay. Sequences must be strictly
    /// increasing along the log.
    pub(crate) fn append(&mut self, seal: Seal) -> GuardResult<()> {
        self.hashers.get(seal.hash_version)?;
        if let Some(last) = self.log.last() {
            if seal.created_at <= last.created_at {
                return Err(GuardError::internal(format!(
                    "seal sequence {} is not after {}",
                    seal.created_at, last.created_at
                )));
            }
        }
        self.clock.observe(seal.created_at);
        info!(
            node = %seal.node_id,
            digest = %seal.output_digest,
            version = %seal.hash_version,
            sequence = %seal.created_at,
            "sealed node"
        );
        self.by_node
            .entry(seal.node_id.clone())
            .or_default()
            .push(self.log.len());
        self.log.push(seal);
        Ok(())
    }

    /// Replays a recorded seal, checking it against the graph as it stood
    /// at that point of the journal.
    pub(crate) fn restore(&mut self, graph: &ProvenanceGraph, seal: Seal) -> GuardResult<()> {
        let recomputed = self.recompute(graph, &seal)?;
        if recomputed != seal.output_digest {
            warn!(node = %seal.node_id, sequence = %seal.created_at, "replayed seal does not verify");
            return Err(IntegrityError::SealMismatch {
                node_id: seal.node_id,
                recorded: seal.output_digest,
                recomputed,
            }
            .into());
        }
        self.append(seal)
    }

    fn compute(&self, node: &Node, inputs: &BTreeSet<Digest>, version: HashVersion) -> GuardResult<Digest> {
        let hasher = self.hashers.get(version)?;
        let value = node.value.as_ref().map(crate::value::Value::canonical_bytes);
        let bytes = preimage(&node.id, node.formula_ref.as_ref(), inputs, value.as_deref());
        Ok(hasher.digest(&bytes))
    }

    /// Recomputes `seal` from the node's recorded state and its current
    /// dependency set.
    ///
    /// Returns `Ok(false)` on mismatch: the dependency set changed after
    /// sealing, or the record itself was altered.
    pub fn verify(&self, graph: &ProvenanceGraph, seal: &Seal) -> GuardResult<bool> {
        Ok(self.recompute(graph, seal)? == seal.output_digest)
    }

    fn recompute(&self, graph: &ProvenanceGraph, seal: &Seal) -> GuardResult<Digest> {
        let node = graph.node(&seal.node_id)?;
        if node.formula_ref != seal.formula_ref {
            // Still hash: the recorded digest binds the node's formula, so
            // the mismatch surfaces as a digest difference.
            debug!(node = %seal.node_id, "formula differs from seal record");
        }

        let mut inputs = BTreeSet::new();
        for dep in graph.neighbors_in(&seal.node_id)? {
            // Prefer the dependency seal the record names; otherwise the
            // latest one, which will not match.
            let chosen = self
                .seals_of(dep)
                .find(|s| seal.input_digests.contains(&s.output_digest))
                .or_else(|| self.latest(dep));
            match chosen {
                Some(s) => {
                    inputs.insert(s.output_digest);
                }
                None => {
                    // An unsealed dependency can never reproduce the record.
                    inputs.insert(Digest::from_bytes([0; 32]));
                }
            }
        }
        self.compute(node, &inputs, seal.hash_version)
    }

    /// Verifies the newest seal of `id`.
    ///
    /// # Errors
    /// - `UnsealedPrediction` if `id` has no seal
    /// - `SealMismatch` if the newest seal no longer verifies
    pub fn verify_latest(&self, graph: &ProvenanceGraph, id: &NodeId) -> GuardResult<Seal> {
        graph.node(id)?;
        let seal = self
            .latest(id)
            .ok_or_else(|| IntegrityError::UnsealedPrediction { node_id: id.clone() })?;
        let recomputed = self.recompute(graph, seal)?;
        if recomputed != seal.output_digest {
            warn!(node = %id, recorded = %seal.output_digest, recomputed = %recomputed, "seal mismatch");
            return Err(IntegrityError::SealMismatch {
                node_id: id.clone(),
                recorded: seal.output_digest,
                recomputed,
            }
            .into());
        }
        Ok(seal.clone())
    }

    fn seals_of<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a Seal> + 'a {
        self.by_node
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.log.get(i))
    }

    /// Newest seal of `id`.
    #[must_use]
    pub fn latest(&self, id: &NodeId) -> Option<&Seal> {
        self.by_node
            .get(id)
            .and_then(|idx| idx.last())
            .and_then(|&i| self.log.get(i))
    }

    /// All seals of `id` in creation order, newest last.
    #[must_use]
    pub fn list_seals(&self, id: &NodeId) -> Vec<Seal> {
        self.seals_of(id).cloned().collect()
    }

    /// The whole log in append order.
    #[must_use]
    pub fn seals(&self) -> &[Seal] {
        &self.log
    }

    /// Number of seals in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Returns true before the first seal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Sequence of the newest seal, if any.
    #[must_use]
    pub fn last_sequence(&self) -> Option<Sequence> {
        self.log.last().map(|s| s.created_at)
    }
}
