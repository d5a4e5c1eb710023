//! Guard configuration.

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, GuardResult};
use crate::seal::HashVersion;

/// How the classifier treats an empirical label without a declared exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmpiricalPolicy {
    /// Reject with `UndeclaredEmpirical`.
    #[default]
    Enforce,
    /// Record the label and leave it to the contamination scanner to report.
    ///
    /// For auditing an existing pipeline whose undeclared inputs must be
    /// surfaced rather than refused.
    Audit,
}

/// Journal settings for persistent guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Whether to fsync after every appended record.
    #[serde(default = "default_sync_on_write")]
    pub sync_on_write: bool,
}

const fn default_sync_on_write() -> bool {
    true
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
        }
    }
}

/// Configuration for one [`ProvenanceGuard`](crate::ProvenanceGuard).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Classification policy for undeclared empirical inputs.
    pub empirical_policy: EmpiricalPolicy,

    /// Hash construction used for new seals.
    pub default_hash_version: HashVersion,

    /// Upper bound on nodes visited by a single cycle check.
    pub max_traversal_nodes: usize,

    /// Journal settings; only consulted by persistent guards.
    pub journal: JournalConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            empirical_policy: EmpiricalPolicy::Enforce,
            default_hash_version: HashVersion::BLAKE3_V1,
            max_traversal_nodes: 1_000_000,
            journal: JournalConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Configuration for auditing an existing pipeline.
    #[must_use]
    pub fn audit() -> Self {
        Self {
            empirical_policy: EmpiricalPolicy::Audit,
            ..Self::default()
        }
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> GuardResult<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| GuardError::config("json", e.to_string()))?;
        cfg.validate()
    }

    /// Rejects a zero traversal bound and unknown default hash versions.
    pub fn validate(self) -> GuardResult<Self> {
        if self.max_traversal_nodes == 0 {
            return Err(GuardError::config("max_traversal_nodes", "must be at least 1"));
        }
        if !self.default_hash_version.is_known() {
            return Err(GuardError::config(
                "default_hash_version",
                format!("unknown hash version {}", self.default_hash_version.get()),
            ));
        }
        Ok(self)
    }
}
