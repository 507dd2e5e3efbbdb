//! Registry error types.

use chrono::{DateTime, Utc};
use concord_ledger::{HashError, LedgerError};
use concord_resonance::ScorerError;
use concord_types::{ProposalId, Resonance};
use thiserror::Error;

/// Errors returned by registry operations.
///
/// Ledger persistence failures and audit delivery failures are not here: both
/// are logged and the operation still succeeds.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Malformed input. Nothing was changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced proposal, decree or status key does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The proposal is already finalized. No block was appended.
    #[error("proposal {0} is already finalized")]
    AlreadyFinalized(ProposalId),

    /// A vote arrived after the deadline under the enforcing deadline policy.
    #[error("voting on proposal {proposal_id} closed at {deadline}")]
    DeadlinePassed {
        proposal_id: ProposalId,
        deadline: DateTime<Utc>,
    },

    /// Finalization refused under the require-coherence policy.
    #[error("proposal {proposal_id} is incoherent: resonance {resonance} below threshold {threshold}")]
    IncoherentOutcome {
        proposal_id: ProposalId,
        resonance: Resonance,
        threshold: f64,
    },

    /// A ledger event does not fit the state rebuilt so far.
    #[error("ledger block {index} cannot be applied: {reason}")]
    InconsistentEvent { index: u64, reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Scorer(#[from] ScorerError),
}

impl RegistryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
