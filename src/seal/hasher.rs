//! Pluggable hash constructions for seals.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sha2::Digest as _;

use super::{Digest, HashVersion};
use crate::error::IntegrityError;

/// A collision-resistant hash producing 256-bit digests.
pub trait SealHasher: Send + Sync {
    /// Version recorded in every seal this hasher produces.
    fn version(&self) -> HashVersion;

    /// Hashes a complete seal preimage.
    fn digest(&self, preimage: &[u8]) -> Digest;
}

/// BLAKE3 construction (default).
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3V1;

impl SealHasher for Blake3V1 {
    fn version(&self) -> HashVersion {
        HashVersion::BLAKE3_V1
    }

    fn digest(&self, preimage: &[u8]) -> Digest {
        Digest::from_bytes(*blake3::hash(preimage).as_bytes())
    }
}

/// SHA-256 construction.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256V1;

impl SealHasher for Sha256V1 {
    fn version(&self) -> HashVersion {
        HashVersion::SHA256_V1
    }

    fn digest(&self, preimage: &[u8]) -> Digest {
        let out = sha2::Sha256::digest(preimage);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&out);
        Digest::from_bytes(bytes)
    }
}

/// Every hash construction a registry can verify, keyed by version.
#[derive(Clone)]
pub struct HasherSet {
    by_version: BTreeMap<HashVersion, Arc<dyn SealHasher>>,
}

impl HasherSet {
    /// The built-in constructions.
    #[must_use]
    pub fn builtin() -> Self {
        let mut set = Self {
            by_version: BTreeMap::new(),
        };
        set.register(Arc::new(Blake3V1));
        set.register(Arc::new(Sha256V1));
        set
    }

    /// Adds (or replaces) a construction under its own version.
    pub fn register(&mut self, hasher: Arc<dyn SealHasher>) {
        self.by_version.insert(hasher.version(), hasher);
    }

    /// Looks up the construction for `version`.
    pub fn get(&self, version: HashVersion) -> Result<&Arc<dyn SealHasher>, IntegrityError> {
        self.by_version
            .get(&version)
            .ok_or(IntegrityError::UnknownHashVersion {
                version: version.get(),
            })
    }

    /// Registered versions in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = HashVersion> + '_ {
        self.by_version.keys().copied()
    }
}

impl Default for HasherSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for HasherSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.by_version.keys()).finish()
    }
}
