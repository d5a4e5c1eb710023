//! Contamination scanner.
//!
//! Finds Derived nodes whose lineage reaches an Empirical node. Taint flows
//! forward along dependency edges from every Empirical source and marks each
//! Derived node it reaches. One witness path (shortest, ties broken by id)
//! is reported per (source, contaminated node) pair.
//!
//! An edge `u -> v` stops taint only when three human-set flags line up:
//! the Empirical source is declared, `u` is declared, and `v` accepts
//! empirical input. Taint from an undeclared source is therefore never
//! shielded, and no single flag can silence a report.
//!
//! Every scan is a full O(V+E) pass over the current graph. There is no
//! incremental cache: one new edge can change reachability anywhere.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StructuralError;
use crate::graph::ProvenanceGraph;
use crate::node::{Node, NodeId, NodeKind};
use crate::report::TabularReport;

/// Where a scan starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanRoot {
    /// Every Empirical node in the graph (`"*"`).
    All,
    /// One node. An Empirical root is scanned forward; any other root is
    /// scanned over its own ancestry.
    Node(NodeId),
}

impl ScanRoot {
    /// Parses `"*"` as [`ScanRoot::All`] and anything else as a node id.
    pub fn parse(s: &str) -> Result<Self, StructuralError> {
        if s.trim() == "*" {
            Ok(Self::All)
        } else {
            Ok(Self::Node(NodeId::new(s)?))
        }
    }
}

impl fmt::Display for ScanRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Node(id) => write!(f, "{id}"),
        }
    }
}

/// A witness path from an Empirical source to a contaminated Derived node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContaminationPath {
    /// The Empirical node the taint originates from.
    pub source: NodeId,
    /// The contaminated Derived node.
    pub contaminated: NodeId,
    /// `[source, ..., contaminated]`.
    pub path: Vec<NodeId>,
}

/// Result of a scan. Contamination is a finding, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContaminationReport {
    /// Root the scan was asked for.
    pub root: ScanRoot,
    /// One shortest witness path per contaminated node.
    pub paths: Vec<ContaminationPath>,
    /// Nodes visited.
    pub scanned_nodes: usize,
}

impl ContaminationReport {
    /// True when no contamination path was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.paths.is_empty()
    }

    /// Distinct contaminated nodes.
    #[must_use]
    pub fn contaminated_nodes(&self) -> BTreeSet<&NodeId> {
        self.paths.iter().map(|p| &p.contaminated).collect()
    }
}

impl TabularReport for ContaminationReport {
    fn rows(&self) -> Vec<serde_json::Value> {
        self.paths
            .iter()
            .map(|p| {
                serde_json::json!({
                    "root": self.root.to_string(),
                    "source": p.source,
                    "contaminated": p.contaminated,
                    "path": p.path.iter().map(NodeId::as_str).collect::<Vec<_>>().join(" -> "),
                    "length": p.path.len(),
                })
            })
            .collect()
    }
}

fn shielded(source: &Node, from: &Node, to: &Node) -> bool {
    source.declared_exception && from.declared_exception && to.accepted_empirical_input
}

/// Scans the graph for contamination.
pub fn scan(graph: &ProvenanceGraph, root: &ScanRoot) -> Result<ContaminationReport, StructuralError> {
    let (sources, within) = match root {
        ScanRoot::All => (empirical_sources(graph, None), None),
        ScanRoot::Node(id) => {
            let node = graph.node(id)?;
            if node.is(NodeKind::Empirical) {
                (vec![id.clone()], None)
            } else {
                let mut cone = graph.ancestors(id)?;
                cone.insert(id.clone());
                (empirical_sources(graph, Some(&cone)), Some(cone))
            }
        }
    };

    let (paths, scanned_nodes) = trace(graph, &sources, within.as_ref())?;
    if paths.is_empty() {
        debug!(root = %root, scanned = scanned_nodes, "scan clean");
    } else {
        warn!(root = %root, paths = paths.len(), "contamination detected");
    }
    Ok(ContaminationReport {
        root: root.clone(),
        paths,
        scanned_nodes,
    })
}

fn empirical_sources(graph: &ProvenanceGraph, within: Option<&BTreeSet<NodeId>>) -> Vec<NodeId> {
    graph
        .nodes()
        .filter(|n| n.is(NodeKind::Empirical))
        .filter(|n| within.map_or(true, |w| w.contains(&n.id)))
        .map(|n| n.id.clone())
        .collect()
}

/// Follows taint forward from each source, optionally restricted to `within`.
///
/// Returns the witness paths sorted by (source, contaminated) and the number
/// of node visits performed.
pub(crate) fn trace(
    graph: &ProvenanceGraph,
    sources: &[NodeId],
    within: Option<&BTreeSet<NodeId>>,
) -> Result<(Vec<ContaminationPath>, usize), StructuralError> {
    let mut paths = Vec::new();
    let mut visits = 0usize;

    for source_id in sources {
        let source = graph.node(source_id)?;
        let mut parent: BTreeMap<&NodeId, &NodeId> = BTreeMap::new();
        let mut queue: VecDeque<&Node> = VecDeque::from([source]);
        visits += 1;

        while let Some(current) = queue.pop_front() {
            for next_id in graph.neighbors_out(&current.id)? {
                if within.is_some_and(|w| !w.contains(next_id)) {
                    continue;
                }
                if next_id == source_id || parent.contains_key(next_id) {
                    continue;
                }
                let next = graph.node(next_id)?;
                if shielded(source, current, next) {
                    continue;
                }
                parent.insert(&next.id, &current.id);
                visits += 1;
                if next.is(NodeKind::Derived) {
                    paths.push(ContaminationPath {
                        source: source_id.clone(),
                        contaminated: next.id.clone(),
                        path: walk_back(&parent, source_id, &next.id),
                    });
                }
                queue.push_back(next);
            }
        }
    }

    paths.sort_by(|a, b| (&a.source, &a.contaminated).cmp(&(&b.source, &b.contaminated)));
    Ok((paths, visits))
}

fn walk_back<'a>(
    parent: &BTreeMap<&'a NodeId, &'a NodeId>,
    source: &NodeId,
    end: &'a NodeId,
) -> Vec<NodeId> {
    let mut path = vec![end.clone()];
    let mut current = end;
    while current != source {
        match parent.get(current) {
            Some(&prev) => {
                path.push(prev.clone());
                current = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmpiricalPolicy;
    use crate::node::{DerivationSpec, NodeSpec};

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn audit_graph() -> ProvenanceGraph {
        ProvenanceGraph::standalone(EmpiricalPolicy::Audit)
    }

    fn axiom(g: &mut ProvenanceGraph, name: &str) {
        g.register(DerivationSpec::source(NodeSpec::builder(name).value(1.0).build().unwrap(), NodeKind::Axiom))
            .unwrap();
    }

    fn empirical(g: &mut ProvenanceGraph, name: &str, declared: bool) {
        g.register(DerivationSpec::source(
            NodeSpec::builder(name).value(2.0).declared_exception(declared).build().unwrap(),
            NodeKind::Empirical,
        ))
        .unwrap();
    }

    fn derived(g: &mut ProvenanceGraph, name: &str, inputs: &[&str], declared: bool, accepts: bool) {
        g.register(DerivationSpec::derived(
            NodeSpec::builder(name)
                .formula(format!("f_{name}"))
                .declared_exception(declared)
                .accepted_empirical_input(accepts)
                .build()
                .unwrap(),
            inputs.iter().map(|s| id(s)).collect(),
        ))
        .unwrap();
    }

    #[test]
    fn clean_graph_reports_nothing() {
        let mut g = audit_graph();
        axiom(&mut g, "a");
        derived(&mut g, "b", &["a"], false, false);
        let report = scan(&g, &ScanRoot::All).unwrap();
        assert!(report.is_clean());
        assert!(report.rows().is_empty());
    }

    #[test]
    fn undeclared_source_taints_transitively() {
        let mut g = audit_graph();
        axiom(&mut g, "a");
        empirical(&mut g, "e", false);
        derived(&mut g, "c", &["a", "e"], false, false);
        derived(&mut g, "d", &["c"], false, false);

        let report = scan(&g, &ScanRoot::All).unwrap();
        let got: Vec<Vec<&str>> = report
            .paths
            .iter()
            .map(|p| p.path.iter().map(NodeId::as_str).collect())
            .collect();
        assert_eq!(got, vec![vec!["e", "c"], vec!["e", "c", "d"]]);
    }

    #[test]
    fn dual_flag_shields_declared_source() {
        let mut g = audit_graph();
        empirical(&mut g, "e", true);
        derived(&mut g, "c", &["e"], false, true);
        derived(&mut g, "d", &["c"], false, false);
        assert!(scan(&g, &ScanRoot::All).unwrap().is_clean());
    }

    #[test]
    fn one_flag_alone_does_not_shield() {
        // Declared source, consumer does not accept.
        let mut g = audit_graph();
        empirical(&mut g, "e", true);
        derived(&mut g, "c", &["e"], false, false);
        assert_eq!(scan(&g, &ScanRoot::All).unwrap().paths.len(), 1);

        // Consumer accepts, source undeclared.
        let mut g = audit_graph();
        empirical(&mut g, "e", false);
        derived(&mut g, "c", &["e"], true, true);
        assert_eq!(scan(&g, &ScanRoot::All).unwrap().paths.len(), 1);
    }

    #[test]
    fn undeclared_taint_cannot_be_shielded_downstream() {
        let mut g = audit_graph();
        empirical(&mut g, "e", false);
        derived(&mut g, "x", &["e"], true, false);
        derived(&mut g, "y", &["x"], false, true);
        let report = scan(&g, &ScanRoot::All).unwrap();
        let hit: Vec<&str> = report.paths.iter().map(|p| p.contaminated.as_str()).collect();
        assert_eq!(hit, vec!["x", "y"]);
    }

    #[test]
    fn node_root_scans_ancestry_or_forward() {
        let mut g = audit_graph();
        axiom(&mut g, "a");
        empirical(&mut g, "e", false);
        derived(&mut g, "b", &["a"], false, false);
        derived(&mut g, "c", &["a", "e"], false, false);

        assert!(scan(&g, &ScanRoot::Node(id("b"))).unwrap().is_clean());
        let c = scan(&g, &ScanRoot::Node(id("c"))).unwrap();
        assert_eq!(c.paths.len(), 1);
        let e = scan(&g, &ScanRoot::Node(id("e"))).unwrap();
        assert_eq!(e.paths[0].path, vec![id("e"), id("c")]);

        assert!(matches!(
            scan(&g, &ScanRoot::Node(id("nope"))),
            Err(StructuralError::MissingNode { .. })
        ));
    }

    #[test]
    fn scan_root_parse() {
        assert_eq!(ScanRoot::parse("*").unwrap(), ScanRoot::All);
        assert_eq!(ScanRoot::parse("c").unwrap(), ScanRoot::Node(id("c")));
        assert!(ScanRoot::parse("").is_err());
    }
}
