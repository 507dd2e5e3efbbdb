//! Registry configuration.

use concord_audit::AuditConfig;
use concord_ledger::LedgerConfig;
use concord_resonance::ScorerConfig;
use serde::{Deserialize, Serialize};

/// What finalization does with an outcome below the coherence threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherencePolicy {
    /// Promulgate the decree with `coherent = false`.
    #[default]
    FlagOnly,
    /// Refuse finalization with `IncoherentOutcome`.
    RequireCoherence,
}

/// Whether a proposal's deadline closes voting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlinePolicy {
    /// The deadline is informational.
    #[default]
    Advisory,
    /// Votes after the deadline fail with `DeadlinePassed`.
    Enforce,
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Author id hashed into decrees and status entries.
    #[serde(default = "default_author_id")]
    pub author_id: String,

    #[serde(default)]
    pub coherence_policy: CoherencePolicy,

    #[serde(default)]
    pub deadline_policy: DeadlinePolicy,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            author_id: default_author_id(),
            coherence_policy: CoherencePolicy::default(),
            deadline_policy: DeadlinePolicy::default(),
            scorer: ScorerConfig::default(),
            ledger: LedgerConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Defaults with the ledger file at `path`.
    pub fn with_ledger_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            ledger: LedgerConfig::at(path),
            ..Default::default()
        }
    }
}

fn default_author_id() -> String {
    "concord-registry".to_string()
}
