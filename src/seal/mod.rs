//! Cryptographic sealing.
//!
//! A seal is an immutable, content-addressed record of a node's derivation at
//! the moment it was sealed. Seals are written bottom-up (every dependency
//! must already be sealed) into an append-only registry, and each seal names
//! the hash construction that produced it so that old seals stay verifiable
//! after the default construction changes.

mod hasher;
mod registry;

pub use hasher::{Blake3V1, HasherSet, SealHasher, Sha256V1};
pub use registry::SealRegistry;
pub(crate) use registry::PlannedSeal;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::Sequence;
use crate::node::{FormulaRef, NodeId};
use crate::report::TabularReport;

/// Fixed-length (256-bit) digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifies a hash construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashVersion(u16);

impl HashVersion {
    /// BLAKE3 over the length-prefixed seal preimage.
    pub const BLAKE3_V1: Self = Self(1);
    /// SHA-256 over the same preimage.
    pub const SHA256_V1: Self = Self(2);

    /// Wraps a raw version tag.
    #[must_use]
    pub const fn new(version: u16) -> Self {
        Self(version)
    }

    /// Raw version tag.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// True for the constructions built into this crate.
    #[must_use]
    pub const fn is_known(self) -> bool {
        matches!(self.0, 1 | 2)
    }
}

impl fmt::Display for HashVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Immutable integrity record for one node derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seal {
    /// The sealed node.
    pub node_id: NodeId,
    /// Output digests of the dependency seals at sealing time.
    pub input_digests: BTreeSet<Digest>,
    /// Formula that produced the sealed value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_ref: Option<FormulaRef>,
    /// Digest binding the node, formula, inputs and value.
    pub output_digest: Digest,
    /// Construction that produced `output_digest`.
    pub hash_version: HashVersion,
    /// Logical sealing time.
    pub created_at: Sequence,
}

/// Domain separation tag for seal preimages.
const SEAL_DOMAIN: &[u8] = b"provenance-guard/seal";

/// Builds the length-prefixed preimage that every seal digest covers.
///
/// Layout: domain tag, node id, formula (presence byte + bytes), sorted
/// input digests (count + 32 bytes each), value (presence byte + canonical
/// bytes). Every variable-length field carries a big-endian u64 length.
pub(crate) fn preimage(
    node_id: &NodeId,
    formula_ref: Option<&FormulaRef>,
    inputs: &BTreeSet<Digest>,
    value_bytes: Option<&[u8]>,
) -> Vec<u8> {
    fn put(out: &mut Vec<u8>, bytes: &[u8]) {
        out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
        out.extend_from_slice(bytes);
    }

    let mut out = Vec::with_capacity(128 + inputs.len() * 32);
    put(&mut out, SEAL_DOMAIN);
    put(&mut out, node_id.as_str().as_bytes());
    match formula_ref {
        Some(f) => {
            out.push(1);
            put(&mut out, f.as_str().as_bytes());
        }
        None => out.push(0),
    }
    out.extend_from_slice(&(inputs.len() as u64).to_be_bytes());
    for d in inputs {
        out.extend_from_slice(d.as_bytes());
    }
    match value_bytes {
        Some(v) => {
            out.push(1);
            put(&mut out, v);
        }
        None => out.push(0),
    }
    out
}

/// Seal log view rendered one row per seal.
#[derive(Debug, Clone, Copy)]
pub struct SealTable<'a>(pub &'a [Seal]);

impl TabularReport for SealTable<'_> {
    fn rows(&self) -> Vec<serde_json::Value> {
        self.0
            .iter()
            .map(|s| {
                serde_json::json!({
                    "node_id": s.node_id,
                    "input_digests": s.input_digests.iter().map(Digest::to_hex).collect::<Vec<_>>(),
                    "formula_ref": s.formula_ref,
                    "output_digest": s.output_digest,
                    "hash_version": s.hash_version,
                    "created_at": s.created_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_hex_roundtrip_and_serde() {
        let d = Digest::from_bytes([0xab; 32]);
        assert_eq!(d.to_hex().len(), 64);
        assert_eq!(Digest::from_hex(&d.to_hex()).unwrap(), d);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d.to_hex()));
        assert!(serde_json::from_str::<Digest>("\"zz\"").is_err());
    }

    #[test]
    fn preimage_is_order_independent_for_inputs() {
        let id = NodeId::new("c").unwrap();
        let a = Digest::from_bytes([1; 32]);
        let b = Digest::from_bytes([2; 32]);
        let x: BTreeSet<_> = [a, b].into_iter().collect();
        let y: BTreeSet<_> = [b, a].into_iter().collect();
        assert_eq!(preimage(&id, None, &x, None), preimage(&id, None, &y, None));
    }

    #[test]
    fn preimage_separates_fields() {
        let id = NodeId::new("n").unwrap();
        let f = FormulaRef::new("ab").unwrap();
        let empty = BTreeSet::new();
        // Moving bytes between formula and value must change the preimage.
        let p1 = preimage(&id, Some(&f), &empty, Some(b"c"));
        let f2 = FormulaRef::new("a").unwrap();
        let p2 = preimage(&id, Some(&f2), &empty, Some(b"bc"));
        assert_ne!(p1, p2);
    }

    #[test]
    fn known_hash_versions() {
        assert!(HashVersion::BLAKE3_V1.is_known());
        assert!(HashVersion::SHA256_V1.is_known());
        assert!(!HashVersion::new(7).is_known());
    }
}
