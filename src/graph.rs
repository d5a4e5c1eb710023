//! Provenance graph store.
//!
//! Append-only DAG of classified nodes and labelled dependency edges.
//! `DerivedFrom` edges form the dependency structure every analysis walks;
//! `Supersedes` edges only link versions and are kept for lineage. The
//! store is the only writer of graph state: every mutation is first planned
//! (validated as a whole and stamped with sequences) and then applied, so an
//! operation either fully succeeds or leaves the graph untouched.
//!
//! Planning and applying are split so that a persistent guard can journal
//! the planned changes before they become visible, and so that journal
//! replay goes through the same validation as live mutation.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify;
use crate::clock::{LogicalClock, Sequence};
use crate::config::EmpiricalPolicy;
use crate::error::StructuralError;
use crate::node::{DerivationSpec, Edge, EdgeLabel, Node, NodeId, NodeKind, NodeSpec};

/// One validated, sequenced graph mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum GraphChange {
    /// A node was registered.
    Node {
        /// Registered spec.
        spec: NodeSpec,
        /// Older version this node replaces.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        supersedes: Option<NodeId>,
        /// Registration time.
        at: Sequence,
    },
    /// An edge was added.
    Edge {
        /// The edge, stamped with its creation time.
        edge: Edge,
    },
    /// A node was classified.
    Classify {
        /// Classified node.
        id: NodeId,
        /// Final label.
        kind: NodeKind,
        /// Classification time.
        at: Sequence,
    },
}

impl GraphChange {
    /// Sequence stamped on this change.
    #[must_use]
    pub fn sequence(&self) -> Sequence {
        match self {
            Self::Node { at, .. } | Self::Classify { at, .. } => *at,
            Self::Edge { edge } => edge.created_at,
        }
    }
}

fn missing(id: &NodeId) -> StructuralError {
    StructuralError::MissingNode { id: id.clone() }
}

/// The provenance DAG.
#[derive(Debug)]
pub struct ProvenanceGraph {
    nodes: BTreeMap<NodeId, Node>,
    order: Vec<NodeId>,
    incoming: BTreeMap<NodeId, BTreeSet<NodeId>>,
    outgoing: BTreeMap<NodeId, BTreeSet<NodeId>>,
    edges: Vec<Edge>,
    successors: BTreeMap<NodeId, NodeId>,
    clock: Arc<LogicalClock>,
    policy: EmpiricalPolicy,
    max_traversal_nodes: usize,
}

impl ProvenanceGraph {
    /// Creates an empty graph stamped by `clock`.
    #[must_use]
    pub fn new(clock: Arc<LogicalClock>, policy: EmpiricalPolicy, max_traversal_nodes: usize) -> Self {
        Self {
            nodes: BTreeMap::new(),
            order: Vec::new(),
            incoming: BTreeMap::new(),
            outgoing: BTreeMap::new(),
            edges: Vec::new(),
            successors: BTreeMap::new(),
            clock,
            policy,
            max_traversal_nodes: max_traversal_nodes.max(1),
        }
    }

    /// Creates a standalone graph with its own clock and default limits.
    #[must_use]
    pub fn standalone(policy: EmpiricalPolicy) -> Self {
        Self::new(Arc::new(LogicalClock::new()), policy, 1_000_000)
    }

    /// Classification policy for undeclared empirical inputs.
    #[must_use]
    pub const fn policy(&self) -> EmpiricalPolicy {
        self.policy
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Registers an unclassified node.
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<Sequence, StructuralError> {
        let changes = self.plan_add_node(spec)?;
        let at = changes[0].sequence();
        self.commit(changes)?;
        Ok(at)
    }

    /// Adds the dependency edge `from -> to` ("`to` was derived using `from`").
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId) -> Result<Sequence, StructuralError> {
        let changes = self.plan_add_edge(from, to)?;
        let at = changes[0].sequence();
        self.commit(changes)?;
        Ok(at)
    }

    /// Classifies a node. Reclassification is never allowed in place.
    pub fn classify(&mut self, id: &NodeId, kind: NodeKind) -> Result<Sequence, StructuralError> {
        let changes = self.plan_classify(id, kind)?;
        let at = changes[0].sequence();
        self.commit(changes)?;
        Ok(at)
    }

    /// Registers a node together with its input edges and classification.
    pub fn register(&mut self, spec: DerivationSpec) -> Result<Sequence, StructuralError> {
        let changes = self.plan_register(spec, None)?;
        let at = changes[0].sequence();
        self.commit(changes)?;
        Ok(at)
    }

    /// Registers `spec` as a new version of `old`.
    ///
    /// The old node stays in place; the new node gains a `Supersedes` edge
    /// from it, which counts as a dependency like any other.
    pub fn supersede(&mut self, old: &NodeId, spec: DerivationSpec) -> Result<Sequence, StructuralError> {
        let changes = self.plan_register(spec, Some(old.clone()))?;
        let at = changes[0].sequence();
        self.commit(changes)?;
        Ok(at)
    }

    pub(crate) fn plan_add_node(&self, spec: NodeSpec) -> Result<Vec<GraphChange>, StructuralError> {
        spec.validate()?;
        if self.nodes.contains_key(&spec.id) {
            return Err(StructuralError::DuplicateId { id: spec.id });
        }
        Ok(vec![GraphChange::Node {
            spec,
            supersedes: None,
            at: self.clock.tick(),
        }])
    }

    pub(crate) fn plan_add_edge(&self, from: &NodeId, to: &NodeId) -> Result<Vec<GraphChange>, StructuralError> {
        self.check_edge(from, to)?;
        Ok(vec![GraphChange::Edge {
            edge: Edge {
                from: from.clone(),
                to: to.clone(),
                label: EdgeLabel::DerivedFrom,
                created_at: self.clock.tick(),
            },
        }])
    }

    pub(crate) fn plan_classify(&self, id: &NodeId, kind: NodeKind) -> Result<Vec<GraphChange>, StructuralError> {
        let node = self.node(id)?;
        classify::check(node, self.in_degree(id), kind, self.policy)?;
        Ok(vec![GraphChange::Classify {
            id: id.clone(),
            kind,
            at: self.clock.tick(),
        }])
    }

    pub(crate) fn plan_register(
        &self,
        spec: DerivationSpec,
        supersedes: Option<NodeId>,
    ) -> Result<Vec<GraphChange>, StructuralError> {
        let DerivationSpec { node, inputs, kind } = spec;
        node.validate()?;
        if self.nodes.contains_key(&node.id) {
            return Err(StructuralError::DuplicateId { id: node.id });
        }

        let mut sources: Vec<(NodeId, EdgeLabel)> = Vec::with_capacity(inputs.len() + 1);
        if let Some(old) = &supersedes {
            self.node(old)?;
            if let Some(newer) = self.successors.get(old) {
                return Err(StructuralError::InvalidNode {
                    field: "supersedes".to_string(),
                    reason: format!("{old} is already superseded by {newer}"),
                });
            }
            sources.push((old.clone(), EdgeLabel::Supersedes));
        }
        for input in inputs {
            self.node(&input)?;
            if sources.iter().any(|(seen, _)| *seen == input) {
                return Err(StructuralError::DuplicateEdge {
                    from: input,
                    to: node.id,
                });
            }
            sources.push((input, EdgeLabel::DerivedFrom));
        }

        if let Some(kind) = kind {
            // The node does not exist yet; check against its would-be shape.
            let pending = Node::from_spec(node.clone(), supersedes.clone(), Sequence::ZERO);
            let in_degree = sources
                .iter()
                .filter(|(_, label)| *label == EdgeLabel::DerivedFrom)
                .count();
            classify::check(&pending, in_degree, kind, self.policy)?;
        }

        let id = node.id.clone();
        let mut changes = Vec::with_capacity(sources.len() + 2);
        changes.push(GraphChange::Node {
            spec: node,
            supersedes,
            at: self.clock.tick(),
        });
        for (from, label) in sources {
            changes.push(GraphChange::Edge {
                edge: Edge {
                    from,
                    to: id.clone(),
                    label,
                    created_at: self.clock.tick(),
                },
            });
        }
        if let Some(kind) = kind {
            changes.push(GraphChange::Classify {
                id,
                kind,
                at: self.clock.tick(),
            });
        }
        Ok(changes)
    }

    /// Applies planned changes in order.
    ///
    /// Each change is re-validated; planned changes always pass because the
    /// plan was checked as a whole against the same state.
    pub(crate) fn commit(&mut self, changes: Vec<GraphChange>) -> Result<(), StructuralError> {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }

    /// Validates and applies a single change, advancing the clock past it.
    pub(crate) fn apply(&mut self, change: GraphChange) -> Result<(), StructuralError> {
        self.clock.observe(change.sequence());
        match change {
            GraphChange::Node { spec, supersedes, at } => {
                spec.validate()?;
                if self.nodes.contains_key(&spec.id) {
                    return Err(StructuralError::DuplicateId { id: spec.id });
                }
                if let Some(old) = &supersedes {
                    self.node(old)?;
                    if self.successors.contains_key(old) {
                        return Err(StructuralError::InvalidNode {
                            field: "supersedes".to_string(),
                            reason: format!("{old} is already superseded"),
                        });
                    }
                }
                let id = spec.id.clone();
                debug!(node = %id, sequence = %at, "registered node");
                if let Some(old) = &supersedes {
                    self.successors.insert(old.clone(), id.clone());
                }
                self.incoming.insert(id.clone(), BTreeSet::new());
                self.outgoing.insert(id.clone(), BTreeSet::new());
                self.order.push(id.clone());
                self.nodes.insert(id, Node::from_spec(spec, supersedes, at));
            }
            GraphChange::Edge { edge } => {
                self.check_edge(&edge.from, &edge.to)?;
                if edge.label == EdgeLabel::Supersedes {
                    let recorded = self.nodes.get(&edge.to).and_then(|n| n.supersedes.as_ref());
                    if recorded != Some(&edge.from) {
                        return Err(StructuralError::InvalidNode {
                            field: "supersedes".to_string(),
                            reason: format!("{} does not supersede {}", edge.to, edge.from),
                        });
                    }
                }
                debug!(from = %edge.from, to = %edge.to, label = ?edge.label, "added edge");
                // Version links are lineage only; they carry no derivation input.
                if edge.label == EdgeLabel::DerivedFrom {
                    if let Some(out) = self.outgoing.get_mut(&edge.from) {
                        out.insert(edge.to.clone());
                    }
                    if let Some(inc) = self.incoming.get_mut(&edge.to) {
                        inc.insert(edge.from.clone());
                    }
                }
                self.edges.push(edge);
            }
            GraphChange::Classify { id, kind, at } => {
                let in_degree = self.in_degree(&id);
                let node = self.nodes.get_mut(&id).ok_or_else(|| missing(&id))?;
                classify::check(node, in_degree, kind, self.policy)?;
                node.kind = Some(kind);
                node.classified_at = Some(at);
                info!(node = %id, kind = %kind, sequence = %at, "classified node");
            }
        }
        Ok(())
    }

    fn check_edge(&self, from: &NodeId, to: &NodeId) -> Result<(), StructuralError> {
        self.node(from)?;
        let target = self.node(to)?;
        if target.is(NodeKind::Axiom) {
            return Err(StructuralError::InvalidClassification {
                id: to.clone(),
                kind: NodeKind::Axiom,
                reason: "axioms cannot gain dependencies".to_string(),
            });
        }
        if self.outgoing.get(from).is_some_and(|out| out.contains(to)) {
            return Err(StructuralError::DuplicateEdge {
                from: from.clone(),
                to: to.clone(),
            });
        }
        if self.reaches(to, from)? {
            return Err(StructuralError::Cycle {
                from: from.clone(),
                to: to.clone(),
            });
        }
        Ok(())
    }

    /// Bounded iterative DFS from `start` along outgoing edges looking for `goal`.
    fn reaches(&self, start: &NodeId, goal: &NodeId) -> Result<bool, StructuralError> {
        if start == goal {
            return Ok(true);
        }
        let mut visited: BTreeSet<&NodeId> = BTreeSet::new();
        let mut stack: Vec<&NodeId> = vec![start];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if visited.len() > self.max_traversal_nodes {
                return Err(StructuralError::TraversalLimitExceeded {
                    limit: self.max_traversal_nodes,
                });
            }
            if let Some(next) = self.outgoing.get(current) {
                for n in next {
                    if n == goal {
                        return Ok(true);
                    }
                    if !visited.contains(n) {
                        stack.push(n);
                    }
                }
            }
        }
        Ok(false)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Looks up a node.
    pub fn node(&self, id: &NodeId) -> Result<&Node, StructuralError> {
        self.nodes.get(id).ok_or_else(|| missing(id))
    }

    /// Returns true if the node exists.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Direct dependencies of `id`.
    pub fn neighbors_in(&self, id: &NodeId) -> Result<&BTreeSet<NodeId>, StructuralError> {
        self.incoming.get(id).ok_or_else(|| missing(id))
    }

    /// Direct dependents of `id`.
    pub fn neighbors_out(&self, id: &NodeId) -> Result<&BTreeSet<NodeId>, StructuralError> {
        self.outgoing.get(id).ok_or_else(|| missing(id))
    }

    /// Number of direct dependencies (0 for unknown nodes).
    #[must_use]
    pub fn in_degree(&self, id: &NodeId) -> usize {
        self.incoming.get(id).map_or(0, BTreeSet::len)
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges of either label.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Follows the supersede chain forward to the newest version of `id`.
    pub fn latest_version(&self, id: &NodeId) -> Result<&Node, StructuralError> {
        let mut current = self.node(id)?;
        // The chain is linear and acyclic, so it is bounded by the node count.
        for _ in 0..=self.nodes.len() {
            match self.successors.get(&current.id) {
                Some(next) => current = self.node(next)?,
                None => return Ok(current),
            }
        }
        Err(StructuralError::TraversalLimitExceeded {
            limit: self.nodes.len(),
        })
    }

    /// All transitive dependencies of `id` (excluding `id`).
    pub fn ancestors(&self, id: &NodeId) -> Result<BTreeSet<NodeId>, StructuralError> {
        self.closure(id, &self.incoming)
    }

    /// All transitive dependents of `id` (excluding `id`).
    pub fn descendants(&self, id: &NodeId) -> Result<BTreeSet<NodeId>, StructuralError> {
        self.closure(id, &self.outgoing)
    }

    fn closure(
        &self,
        id: &NodeId,
        adjacency: &BTreeMap<NodeId, BTreeSet<NodeId>>,
    ) -> Result<BTreeSet<NodeId>, StructuralError> {
        self.node(id)?;
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&NodeId> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for next in adjacency.get(current).into_iter().flatten() {
                if seen.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
        Ok(seen)
    }

    /// Kahn topological order; ties broken by identifier.
    ///
    /// Always covers every node because the graph is acyclic.
    #[must_use]
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut remaining: BTreeMap<&NodeId, usize> = self
            .incoming
            .iter()
            .map(|(id, deps)| (id, deps.len()))
            .collect();
        let mut ready: BTreeSet<&NodeId> = remaining
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut out = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            out.push(id.clone());
            for next in self.outgoing.get(id).into_iter().flatten() {
                if let Some(d) = remaining.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(next);
                    }
                }
            }
        }
        out
    }

    /// Returns true if no cycle is present.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        self.topological_order().len() == self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn spec(s: &str) -> NodeSpec {
        NodeSpec::builder(s).build().unwrap()
    }

    fn graph() -> ProvenanceGraph {
        ProvenanceGraph::standalone(EmpiricalPolicy::Enforce)
    }

    #[test]
    fn add_node_rejects_duplicates() {
        let mut g = graph();
        g.add_node(spec("a")).unwrap();
        let err = g.add_node(spec("a")).unwrap_err();
        assert_eq!(err, StructuralError::DuplicateId { id: id("a") });
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn add_edge_requires_both_nodes() {
        let mut g = graph();
        g.add_node(spec("a")).unwrap();
        let err = g.add_edge(&id("a"), &id("b")).unwrap_err();
        assert_eq!(err, StructuralError::MissingNode { id: id("b") });
    }

    #[test]
    fn add_edge_rejects_cycles_and_self_loops() {
        let mut g = graph();
        for n in ["a", "b", "c"] {
            g.add_node(spec(n)).unwrap();
        }
        g.add_edge(&id("a"), &id("b")).unwrap();
        g.add_edge(&id("b"), &id("c")).unwrap();

        assert!(matches!(
            g.add_edge(&id("c"), &id("a")),
            Err(StructuralError::Cycle { .. })
        ));
        assert!(matches!(
            g.add_edge(&id("b"), &id("b")),
            Err(StructuralError::Cycle { .. })
        ));
        assert_eq!(g.edge_count(), 2);
        assert!(g.is_acyclic());
    }

    #[test]
    fn add_edge_rejects_duplicate() {
        let mut g = graph();
        g.add_node(spec("a")).unwrap();
        g.add_node(spec("b")).unwrap();
        g.add_edge(&id("a"), &id("b")).unwrap();
        assert!(matches!(
            g.add_edge(&id("a"), &id("b")),
            Err(StructuralError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn traversal_bound_rejects_deep_checks() {
        let mut g = ProvenanceGraph::new(Arc::new(LogicalClock::new()), EmpiricalPolicy::Enforce, 2);
        for n in ["a", "b", "c", "d", "e"] {
            g.add_node(spec(n)).unwrap();
        }
        g.add_edge(&id("b"), &id("c")).unwrap();
        g.add_edge(&id("c"), &id("d")).unwrap();
        g.add_edge(&id("d"), &id("e")).unwrap();
        assert!(matches!(
            g.add_edge(&id("a"), &id("b")),
            Err(StructuralError::TraversalLimitExceeded { limit: 2 })
        ));
    }

    #[test]
    fn edges_into_axioms_are_rejected() {
        let mut g = graph();
        g.add_node(spec("a")).unwrap();
        g.add_node(spec("b")).unwrap();
        g.classify(&id("a"), NodeKind::Axiom).unwrap();
        assert!(matches!(
            g.add_edge(&id("b"), &id("a")),
            Err(StructuralError::InvalidClassification { kind: NodeKind::Axiom, .. })
        ));
    }

    #[test]
    fn register_is_atomic() {
        let mut g = graph();
        g.register(DerivationSpec::source(spec("a"), NodeKind::Axiom)).unwrap();

        // Missing input: nothing is applied.
        let bad = DerivationSpec::derived(
            NodeSpec::builder("b").formula("f").build().unwrap(),
            vec![id("a"), id("ghost")],
        );
        assert!(g.register(bad).is_err());
        assert!(!g.contains(&id("b")));
        assert_eq!(g.edge_count(), 0);

        // Derived without formula: nothing is applied.
        let bad = DerivationSpec::derived(spec("b"), vec![id("a")]);
        assert!(matches!(
            g.register(bad),
            Err(StructuralError::InvalidClassification { .. })
        ));
        assert!(!g.contains(&id("b")));

        let ok = DerivationSpec::derived(
            NodeSpec::builder("b").formula("f").value(Value::Number(1.0)).build().unwrap(),
            vec![id("a")],
        );
        g.register(ok).unwrap();
        assert!(g.node(&id("b")).unwrap().is(NodeKind::Derived));
        assert_eq!(g.neighbors_in(&id("b")).unwrap().len(), 1);
        assert!(g.neighbors_out(&id("a")).unwrap().contains(&id("b")));
    }

    #[test]
    fn supersede_links_versions() {
        let mut g = graph();
        g.register(DerivationSpec::source(spec("a"), NodeKind::Axiom)).unwrap();
        g.register(DerivationSpec::derived(
            NodeSpec::builder("b1").formula("f").value(1.0).build().unwrap(),
            vec![id("a")],
        ))
        .unwrap();
        g.supersede(
            &id("b1"),
            DerivationSpec::derived(
                NodeSpec::builder("b2").formula("f'").value(1.5).build().unwrap(),
                vec![id("a")],
            ),
        )
        .unwrap();

        assert_eq!(g.latest_version(&id("b1")).unwrap().id, id("b2"));
        let b2 = g.node(&id("b2")).unwrap();
        assert_eq!(b2.supersedes, Some(id("b1")));
        // The version link is lineage, not a dependency.
        assert!(!g.neighbors_in(&id("b2")).unwrap().contains(&id("b1")));
        assert!(g
            .edges()
            .iter()
            .any(|e| e.label == EdgeLabel::Supersedes && e.from == id("b1") && e.to == id("b2")));
        // Old version is untouched.
        assert_eq!(g.node(&id("b1")).unwrap().value, Some(Value::Number(1.0)));

        // A second fork from b1 is rejected.
        let fork = DerivationSpec::derived(
            NodeSpec::builder("b3").formula("f''").build().unwrap(),
            vec![id("a")],
        );
        assert!(g.supersede(&id("b1"), fork).is_err());
    }

    #[test]
    fn axiom_can_be_replaced_by_a_new_version() {
        let mut g = graph();
        g.register(DerivationSpec::source(spec("a1"), NodeKind::Axiom)).unwrap();
        g.supersede(&id("a1"), DerivationSpec::source(spec("a2"), NodeKind::Axiom))
            .unwrap();
        assert!(g.node(&id("a2")).unwrap().is(NodeKind::Axiom));
        assert_eq!(g.in_degree(&id("a2")), 0);
        assert!(g.descendants(&id("a1")).unwrap().is_empty());
        assert!(classify::check_invariants(&g).is_empty());
    }

    #[test]
    fn ancestors_descendants_and_topological_order() {
        let mut g = graph();
        for n in ["a", "b", "c", "d"] {
            g.add_node(spec(n)).unwrap();
        }
        g.add_edge(&id("a"), &id("b")).unwrap();
        g.add_edge(&id("b"), &id("d")).unwrap();
        g.add_edge(&id("c"), &id("d")).unwrap();

        let anc = g.ancestors(&id("d")).unwrap();
        assert_eq!(anc, [id("a"), id("b"), id("c")].into_iter().collect());
        let desc = g.descendants(&id("a")).unwrap();
        assert_eq!(desc, [id("b"), id("d")].into_iter().collect());

        let order = g.topological_order();
        let pos = |n: &str| order.iter().position(|x| x.as_str() == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn sequences_increase_across_mutations() {
        let mut g = graph();
        let s1 = g.add_node(spec("a")).unwrap();
        let s2 = g.add_node(spec("b")).unwrap();
        let s3 = g.add_edge(&id("a"), &id("b")).unwrap();
        assert!(s1 < s2 && s2 < s3);
        let created: Vec<_> = g.nodes().map(|n| n.created_at).collect();
        assert_eq!(created, vec![s1, s2]);
    }
}
