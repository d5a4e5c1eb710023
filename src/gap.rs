//! Gap analyzer.
//!
//! Given a target, reports which axioms its derivation requires, which of
//! those are actually present in its ancestry, and every contamination path
//! that ends at the target. `critical_gap_count` counts both kinds of gap.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StructuralError;
use crate::graph::ProvenanceGraph;
use crate::node::{NodeId, NodeKind};
use crate::report::TabularReport;
use crate::scan::{self, ContaminationPath};

/// Result of analysing one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    /// Analysed node.
    pub target_id: NodeId,
    /// Axiom ancestors plus the axioms the target explicitly requires.
    pub required_axioms: BTreeSet<NodeId>,
    /// Required axioms that exist, are classified Axiom, and feed the target.
    pub present_axioms: BTreeSet<NodeId>,
    /// `required_axioms - present_axioms`.
    pub missing_axioms: BTreeSet<NodeId>,
    /// Contamination paths ending at the target.
    pub empirical_paths: Vec<ContaminationPath>,
    /// `empirical_paths.len() + missing_axioms.len()`.
    pub critical_gap_count: usize,
}

impl GapReport {
    /// True when no gap of either kind was found.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.critical_gap_count == 0
    }
}

impl TabularReport for GapReport {
    fn rows(&self) -> Vec<serde_json::Value> {
        let axioms = self.missing_axioms.iter().map(|a| {
            serde_json::json!({
                "target": self.target_id,
                "gap": "missing_axiom",
                "detail": a,
            })
        });
        let paths = self.empirical_paths.iter().map(|p| {
            serde_json::json!({
                "target": self.target_id,
                "gap": "empirical_path",
                "detail": p.path.iter().map(NodeId::as_str).collect::<Vec<_>>().join(" -> "),
            })
        });
        axioms.chain(paths).collect()
    }
}

/// Analyses the derivation of `target`.
///
/// # Errors
/// - `MissingNode` if the target does not exist
/// - `Unclassified` if the target has no classification yet
/// - `OrphanedDerivation` if a Derived target has no Axiom in its ancestry
pub fn analyze(graph: &ProvenanceGraph, target: &NodeId) -> Result<GapReport, StructuralError> {
    let node = graph.node(target)?;
    let kind = node
        .kind
        .ok_or_else(|| StructuralError::Unclassified { id: target.clone() })?;

    let ancestors = graph.ancestors(target)?;
    let is_axiom = |id: &NodeId| graph.node(id).is_ok_and(|n| n.is(NodeKind::Axiom));

    let mut required: BTreeSet<NodeId> = ancestors.iter().filter(|a| is_axiom(a)).cloned().collect();
    if kind == NodeKind::Derived && required.is_empty() {
        return Err(StructuralError::OrphanedDerivation { id: target.clone() });
    }
    if kind == NodeKind::Axiom {
        required.insert(target.clone());
    }
    required.extend(node.required_axioms.iter().cloned());

    let present: BTreeSet<NodeId> = required
        .iter()
        .filter(|a| (*a == target || ancestors.contains(*a)) && is_axiom(a))
        .cloned()
        .collect();
    let missing: BTreeSet<NodeId> = required.difference(&present).cloned().collect();

    let empirical_paths = match kind {
        NodeKind::Empirical if !node.declared_exception => vec![ContaminationPath {
            source: target.clone(),
            contaminated: target.clone(),
            path: vec![target.clone()],
        }],
        NodeKind::Derived => {
            let sources: Vec<NodeId> = ancestors
                .iter()
                .filter(|a| graph.node(a).is_ok_and(|n| n.is(NodeKind::Empirical)))
                .cloned()
                .collect();
            let mut cone = ancestors.clone();
            cone.insert(target.clone());
            let (paths, _) = scan::trace(graph, &sources, Some(&cone))?;
            paths.into_iter().filter(|p| p.contaminated == *target).collect()
        }
        _ => Vec::new(),
    };

    let critical_gap_count = empirical_paths.len() + missing.len();
    if critical_gap_count > 0 {
        info!(
            target = %target,
            missing = missing.len(),
            empirical = empirical_paths.len(),
            "gaps found"
        );
    } else {
        debug!(target = %target, required = required.len(), "no gaps");
    }

    Ok(GapReport {
        target_id: target.clone(),
        required_axioms: required,
        present_axioms: present,
        missing_axioms: missing,
        empirical_paths,
        critical_gap_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmpiricalPolicy;
    use crate::node::{DerivationSpec, NodeSpec};

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn scenario() -> ProvenanceGraph {
        let mut g = ProvenanceGraph::standalone(EmpiricalPolicy::Audit);
        g.register(DerivationSpec::source(
            NodeSpec::builder("a").value(1.0).build().unwrap(),
            NodeKind::Axiom,
        ))
        .unwrap();
        g.register(DerivationSpec::source(
            NodeSpec::builder("e").value(0.5).build().unwrap(),
            NodeKind::Empirical,
        ))
        .unwrap();
        g.register(DerivationSpec::derived(
            NodeSpec::builder("b").formula("b = a").build().unwrap(),
            vec![id("a")],
        ))
        .unwrap();
        g.register(DerivationSpec::derived(
            NodeSpec::builder("c").formula("c = a * e").build().unwrap(),
            vec![id("a"), id("e")],
        ))
        .unwrap();
        g
    }

    #[test]
    fn clean_and_contaminated_targets() {
        let g = scenario();
        let b = analyze(&g, &id("b")).unwrap();
        assert!(b.is_clean());
        assert_eq!(b.present_axioms, BTreeSet::from([id("a")]));

        let c = analyze(&g, &id("c")).unwrap();
        assert_eq!(c.critical_gap_count, 1);
        assert_eq!(c.empirical_paths[0].path, vec![id("e"), id("c")]);
        assert_eq!(c.rows().len(), 1);
    }

    #[test]
    fn declared_requirement_not_in_ancestry_is_missing() {
        let mut g = scenario();
        g.register(DerivationSpec::source(
            NodeSpec::builder("z").value(0.0).build().unwrap(),
            NodeKind::Axiom,
        ))
        .unwrap();
        g.register(DerivationSpec::derived(
            NodeSpec::builder("d")
                .formula("d = b")
                .requires_axiom("z")
                .requires_axiom("ghost")
                .build()
                .unwrap(),
            vec![id("b")],
        ))
        .unwrap();
        let report = analyze(&g, &id("d")).unwrap();
        assert_eq!(report.present_axioms, BTreeSet::from([id("a")]));
        assert_eq!(report.missing_axioms, BTreeSet::from([id("ghost"), id("z")]));
        assert_eq!(report.critical_gap_count, 2);
    }

    #[test]
    fn orphaned_derivation() {
        let mut g = ProvenanceGraph::standalone(EmpiricalPolicy::Enforce);
        g.add_node(NodeSpec::builder("r").build().unwrap()).unwrap();
        g.register(DerivationSpec::derived(
            NodeSpec::builder("d").formula("d = r").build().unwrap(),
            vec![id("r")],
        ))
        .unwrap();
        assert!(matches!(
            analyze(&g, &id("d")),
            Err(StructuralError::OrphanedDerivation { .. })
        ));
        assert!(matches!(
            analyze(&g, &id("r")),
            Err(StructuralError::Unclassified { .. })
        ));
    }

    #[test]
    fn axiom_and_empirical_targets() {
        let g = scenario();
        let a = analyze(&g, &id("a")).unwrap();
        assert!(a.is_clean());
        assert_eq!(a.required_axioms, BTreeSet::from([id("a")]));

        let e = analyze(&g, &id("e")).unwrap();
        assert_eq!(e.critical_gap_count, 1);
        assert_eq!(e.empirical_paths[0].path, vec![id("e")]);
    }
}
