//! Nodes and edges of the provenance graph.
//!
//! A node is one symbolic quantity or statement. An edge `from -> to` records
//! that `to` was derived using `from`. Classification (`kind`) is only ever
//! set through the classifier; registration never infers it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::Sequence;
use crate::error::StructuralError;
use crate::value::Value;

/// Stable, unique node identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Maximum identifier length in bytes.
    pub const MAX_LEN: usize = 256;

    /// Creates a validated identifier.
    ///
    /// Surrounding whitespace is trimmed. Empty, over-long or
    /// control-character identifiers are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, StructuralError> {
        let raw = id.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StructuralError::InvalidNode {
                field: "id".to_string(),
                reason: "identifier cannot be empty".to_string(),
            });
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(StructuralError::InvalidNode {
                field: "id".to_string(),
                reason: format!("identifier exceeds {} bytes", Self::MAX_LEN),
            });
        }
        if trimmed.chars().any(char::is_control) {
            return Err(StructuralError::InvalidNode {
                field: "id".to_string(),
                reason: "identifier contains control characters".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = StructuralError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NodeId {
    type Error = StructuralError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Foundational input by fiat; no dependencies.
    Axiom,
    /// Computed from at least one other node by an external formula.
    Derived,
    /// Originates outside the derivation system (measured, fitted, observed).
    Empirical,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Axiom => f.write_str("axiom"),
            Self::Derived => f.write_str("derived"),
            Self::Empirical => f.write_str("empirical"),
        }
    }
}

/// Opaque reference to the external derivation function that produced a value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormulaRef(String);

impl FormulaRef {
    /// Creates a formula reference. Must be non-empty after trimming.
    pub fn new(formula: impl Into<String>) -> Result<Self, StructuralError> {
        let raw = formula.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StructuralError::InvalidNode {
                field: "formula_ref".to_string(),
                reason: "formula reference cannot be empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormulaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registration request for a node, as reported by a derivation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node identifier.
    pub id: NodeId,

    /// Formula that produced the value (absent for axioms and raw inputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_ref: Option<FormulaRef>,

    /// Reported value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Human-set flag marking a knowingly tolerated empirical input.
    #[serde(default)]
    pub declared_exception: bool,

    /// Human-set opt-in on a consumer accepting a declared empirical input.
    #[serde(default)]
    pub accepted_empirical_input: bool,

    /// Axioms this node is declared to rest on.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required_axioms: BTreeSet<NodeId>,
}

impl NodeSpec {
    /// Starts a builder for the given identifier.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> NodeSpecBuilder {
        NodeSpecBuilder::new(id)
    }

    pub(crate) fn validate(&self) -> Result<(), StructuralError> {
        if let Some(value) = &self.value {
            if !value.is_well_formed() {
                return Err(StructuralError::InvalidNode {
                    field: "value".to_string(),
                    reason: format!("{} value is not finite", value.type_name()),
                });
            }
        }
        if self.required_axioms.contains(&self.id) {
            return Err(StructuralError::InvalidNode {
                field: "required_axioms".to_string(),
                reason: "a node cannot require itself".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`NodeSpec`].
#[derive(Debug, Clone, Default)]
pub struct NodeSpecBuilder {
    id: String,
    formula_ref: Option<String>,
    value: Option<Value>,
    declared_exception: bool,
    accepted_empirical_input: bool,
    required_axioms: Vec<String>,
}

impl NodeSpecBuilder {
    /// Creates a builder for the given identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the formula reference.
    #[must_use]
    pub fn formula(mut self, formula: impl Into<String>) -> Self {
        self.formula_ref = Some(formula.into());
        self
    }

    /// Set the value.
    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Mark the node as a knowingly tolerated empirical input.
    #[must_use]
    pub fn declared_exception(mut self, declared: bool) -> Self {
        self.declared_exception = declared;
        self
    }

    /// Opt the node in to consuming declared empirical inputs.
    #[must_use]
    pub fn accepted_empirical_input(mut self, accepted: bool) -> Self {
        self.accepted_empirical_input = accepted;
        self
    }

    /// Declare an axiom this node must rest on.
    #[must_use]
    pub fn requires_axiom(mut self, axiom: impl Into<String>) -> Self {
        self.required_axioms.push(axiom.into());
        self
    }

    /// Build and validate the spec.
    pub fn build(self) -> Result<NodeSpec, StructuralError> {
        let id = NodeId::new(self.id)?;
        let formula_ref = self.formula_ref.map(FormulaRef::new).transpose()?;
        let required_axioms = self
            .required_axioms
            .into_iter()
            .map(NodeId::new)
            .collect::<Result<BTreeSet<_>, _>>()?;

        let spec = NodeSpec {
            id,
            formula_ref,
            value: self.value,
            declared_exception: self.declared_exception,
            accepted_empirical_input: self.accepted_empirical_input,
            required_axioms,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// A registered node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier.
    pub id: NodeId,

    /// Classification, `None` until labelled.
    pub kind: Option<NodeKind>,

    /// Logical time of classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classified_at: Option<Sequence>,

    /// Formula that produced the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_ref: Option<FormulaRef>,

    /// Reported value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Knowingly tolerated empirical input.
    pub declared_exception: bool,

    /// Consumer opt-in for declared empirical inputs.
    pub accepted_empirical_input: bool,

    /// The node this one supersedes, if it is a new version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<NodeId>,

    /// Axioms this node is declared to rest on.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required_axioms: BTreeSet<NodeId>,

    /// Logical registration time.
    pub created_at: Sequence,
}

impl Node {
    pub(crate) fn from_spec(spec: NodeSpec, supersedes: Option<NodeId>, created_at: Sequence) -> Self {
        Self {
            id: spec.id,
            kind: None,
            classified_at: None,
            formula_ref: spec.formula_ref,
            value: spec.value,
            declared_exception: spec.declared_exception,
            accepted_empirical_input: spec.accepted_empirical_input,
            supersedes,
            required_axioms: spec.required_axioms,
            created_at,
        }
    }

    /// Returns true if the node is classified as `kind`.
    #[must_use]
    pub fn is(&self, kind: NodeKind) -> bool {
        self.kind == Some(kind)
    }
}

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLabel {
    /// `to` was computed using `from`.
    DerivedFrom,
    /// `to` is a newer version of `from`.
    Supersedes,
}

/// Directed dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Input, or the older version.
    pub from: NodeId,
    /// Dependent, or the newer version.
    pub to: NodeId,
    /// What the edge means.
    pub label: EdgeLabel,
    /// Logical time the edge was added.
    pub created_at: Sequence,
}

/// Atomic registration of one derivation step: the node, its inputs and
/// optionally its classification.
///
/// This is the shape a derivation step provider hands to the engine:
/// `(inputs, formula_ref, value)` plus the human-set flags on the spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivationSpec {
    /// The node to register.
    pub node: NodeSpec,
    /// Existing nodes it was computed from.
    pub inputs: Vec<NodeId>,
    /// Label applied in the same step, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
}

impl DerivationSpec {
    /// A source node (axiom or empirical input) with no inputs.
    #[must_use]
    pub fn source(node: NodeSpec, kind: NodeKind) -> Self {
        Self {
            node,
            inputs: Vec::new(),
            kind: Some(kind),
        }
    }

    /// A derived node computed from `inputs`.
    #[must_use]
    pub fn derived(node: NodeSpec, inputs: Vec<NodeId>) -> Self {
        Self {
            node,
            inputs,
            kind: Some(NodeKind::Derived),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_trims_and_validates() {
        assert_eq!(NodeId::new("  alpha ").unwrap().as_str(), "alpha");
        assert!(NodeId::new("   ").is_err());
        assert!(NodeId::new("a\nb").is_err());
        assert!(NodeId::new("x".repeat(NodeId::MAX_LEN + 1)).is_err());
    }

    #[test]
    fn node_id_deserialization_validates() {
        let ok: NodeId = serde_json::from_str("\"m_e\"").unwrap();
        assert_eq!(ok.as_str(), "m_e");
        assert!(serde_json::from_str::<NodeId>("\"\"").is_err());
    }

    #[test]
    fn builder_rejects_empty_formula_and_nan() {
        assert!(NodeSpec::builder("a").formula("  ").build().is_err());
        assert!(NodeSpec::builder("a").value(f64::NAN).build().is_err());
        assert!(NodeSpec::builder("a").requires_axiom("a").build().is_err());
    }

    #[test]
    fn builder_sets_flags() {
        let spec = NodeSpec::builder("g")
            .formula("g = f(a, e)")
            .value(2.0)
            .declared_exception(true)
            .accepted_empirical_input(true)
            .requires_axiom("a")
            .build()
            .unwrap();
        assert_eq!(spec.formula_ref.as_ref().unwrap().as_str(), "g = f(a, e)");
        assert!(spec.declared_exception);
        assert!(spec.accepted_empirical_input);
        assert!(spec.required_axioms.contains(&NodeId::new("a").unwrap()));
    }

    #[test]
    fn node_kind_display() {
        assert_eq!(NodeKind::Axiom.to_string(), "axiom");
        assert_eq!(NodeKind::Empirical.to_string(), "empirical");
    }
}
