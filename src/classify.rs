//! Node classifier.
//!
//! Classification is an explicit, deliberate label. It is never inferred from
//! identifiers or values, and an applied label is never changed in place:
//! the only way to relabel is to supersede the node with a new id, which
//! keeps the contamination history inspectable.
//!
//! Rules:
//! - Axiom: in-degree 0 and no formula.
//! - Derived: in-degree >= 1 and a formula reference.
//! - Empirical: any in-degree; must carry `declared_exception` unless the
//!   guard runs under [`EmpiricalPolicy::Audit`].

use tracing::warn;

use crate::config::EmpiricalPolicy;
use crate::error::StructuralError;
use crate::graph::ProvenanceGraph;
use crate::node::{Node, NodeId, NodeKind};

/// Checks whether `node`, with `in_degree` dependencies, may be labelled `kind`.
pub fn check(
    node: &Node,
    in_degree: usize,
    kind: NodeKind,
    policy: EmpiricalPolicy,
) -> Result<(), StructuralError> {
    if let Some(existing) = node.kind {
        return Err(StructuralError::AlreadyClassified {
            id: node.id.clone(),
            kind: existing,
        });
    }

    let invalid = |reason: &str| StructuralError::InvalidClassification {
        id: node.id.clone(),
        kind,
        reason: reason.to_string(),
    };

    match kind {
        NodeKind::Axiom => {
            if in_degree != 0 {
                return Err(invalid("axioms must have no dependencies"));
            }
            if node.formula_ref.is_some() {
                return Err(invalid("axioms cannot carry a formula reference"));
            }
        }
        NodeKind::Derived => {
            if in_degree == 0 {
                return Err(invalid("derived nodes need at least one dependency"));
            }
            if node.formula_ref.is_none() {
                return Err(invalid("derived nodes need a formula reference"));
            }
        }
        NodeKind::Empirical => {
            if !node.declared_exception {
                match policy {
                    EmpiricalPolicy::Enforce => {
                        return Err(StructuralError::UndeclaredEmpirical {
                            id: node.id.clone(),
                        });
                    }
                    EmpiricalPolicy::Audit => {
                        warn!(node = %node.id, "recording undeclared empirical input");
                    }
                }
            }
        }
    }
    Ok(())
}

/// A node whose classification disagrees with its in-degree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationViolation {
    /// Offending node.
    pub id: NodeId,
    /// Label it carries.
    pub kind: NodeKind,
    /// Dependency count it actually has.
    pub in_degree: usize,
}

/// Checks classification consistency across the whole graph.
///
/// `Axiom => in-degree 0` and `Derived => in-degree >= 1`. Returns every
/// violating node; an empty result means the invariant holds.
#[must_use]
pub fn check_invariants(graph: &ProvenanceGraph) -> Vec<ClassificationViolation> {
    graph
        .nodes()
        .filter_map(|node| {
            let kind = node.kind?;
            let in_degree = graph.in_degree(&node.id);
            let ok = match kind {
                NodeKind::Axiom => in_degree == 0,
                NodeKind::Derived => in_degree >= 1,
                NodeKind::Empirical => true,
            };
            (!ok).then(|| ClassificationViolation {
                id: node.id.clone(),
                kind,
                in_degree,
            })
        })
        .collect()
}
