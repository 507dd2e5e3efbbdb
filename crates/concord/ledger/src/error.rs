use crate::block::Block;
use thiserror::Error;

/// Errors from canonicalization and digesting.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("canonical serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the on-disk ledger file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ledger file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger file serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ledger write timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A block does not link to, or does not hash like, what the chain requires.
    #[error("chain integrity violated at block {index}: {reason}")]
    ChainIntegrity { index: u64, reason: String },

    /// The block was appended in memory but could not be written durably.
    #[error("ledger persistence failed for block {}: {reason}", block.index)]
    Persistence { block: Box<Block>, reason: String },

    /// Durable storage failed outside of an append.
    #[error("ledger storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("unknown ledger event '{0}'")]
    UnknownEvent(String),

    #[error("malformed '{event}' payload: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error(transparent)]
    Hash(#[from] HashError),
}

impl LedgerError {
    pub fn integrity(index: u64, reason: impl Into<String>) -> Self {
        Self::ChainIntegrity {
            index,
            reason: reason.into(),
        }
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::Storage(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
