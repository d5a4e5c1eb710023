//! Node payloads.
//!
//! The engine treats a node's value as opaque: it records what the
//! derivation step reported and hashes a canonical byte encoding of it.
//! Only the falsification comparator looks inside, and only for numbers.

use serde::{Deserialize, Serialize};

/// Payload carried by a node.
///
/// # Examples
///
/// ```
/// use provenance_guard::Value;
///
/// let alpha = Value::Number(0.007_297);
/// let label = Value::Symbolic("phi^2".to_string());
///
/// assert!(alpha.is_number());
/// assert_eq!(label.as_number(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Finite floating-point number.
    Number(f64),
    /// Exact integer; compares numerically with numbers.
    Integer(i64),
    /// Symbolic expression or label, compared exactly.
    Symbolic(String),
    /// Opaque bytes, compared exactly.
    Bytes(Vec<u8>),
    /// No value.
    Null,
}

impl Value {
    /// Returns true for numbers and integers.
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_) | Self::Integer(_))
    }

    /// Returns true for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value; integers widen to `f64`.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Symbolic view of the value.
    pub fn as_symbolic(&self) -> Option<&str> {
        match self {
            Self::Symbolic(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Integer(_) => "integer",
            Self::Symbolic(_) => "symbolic",
            Self::Bytes(_) => "bytes",
            Self::Null => "null",
        }
    }

    /// Returns true if the value can be hashed and compared stably.
    ///
    /// Non-finite numbers have no stable comparison or JSON form and are
    /// refused at registration.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self {
            Self::Number(v) => v.is_finite(),
            _ => true,
        }
    }

    /// Stable, type-tagged byte encoding used as seal digest input.
    ///
    /// `-0.0` encodes identically to `0.0`.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        match self {
            Self::Number(v) => {
                out.push(b'n');
                let v = if *v == 0.0 { 0.0_f64 } else { *v };
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            Self::Integer(v) => {
                out.push(b'i');
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::Symbolic(s) => {
                out.push(b's');
                out.extend_from_slice(&(s.len() as u64).to_be_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Self::Bytes(b) => {
                out.push(b'b');
                out.extend_from_slice(&(b.len() as u64).to_be_bytes());
                out.extend_from_slice(b);
            }
            Self::Null => out.push(b'0'),
        }
        out
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Symbolic(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "bytes[{}]", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Symbolic(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Symbolic(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}
