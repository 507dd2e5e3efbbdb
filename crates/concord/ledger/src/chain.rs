//! The append-only, hash-chained ledger.

use crate::block::{Block, LedgerEvent};
use crate::error::{LedgerError, LedgerResult};
use crate::integrity::{verify_chain, ChainVerificationReport};
use crate::store::LedgerStore;
use concord_types::{format_timestamp, now, ProposalId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON file holding the chain.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,

    /// Upper bound on one durable write.
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
}

impl LedgerConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            persist_timeout_ms: default_persist_timeout_ms(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger.json")
}

fn default_persist_timeout_ms() -> u64 {
    5_000
}

/// Append-only chain of [`Block`]s mirrored to a JSON file.
///
/// Invariant handling:
/// - A block is pushed in memory first and then the whole chain is written.
/// - A failed write leaves the block in memory and marks the ledger not durable
///   until [`HashChainLedger::persist`] succeeds.
/// - A loaded chain is verified before it is trusted.
#[derive(Debug)]
pub struct HashChainLedger {
    blocks: Vec<Block>,
    store: LedgerStore,
    durable: bool,
}

impl HashChainLedger {
    /// Load the chain at `config.path`, or start a fresh genesis-only chain.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let store = LedgerStore::new(
            &config.path,
            Duration::from_millis(config.persist_timeout_ms),
        );

        let loaded = match store.load().await {
            Ok(Some(blocks)) => {
                verify_chain(&blocks)?;
                info!(
                    path = %store.path().display(),
                    blocks = blocks.len(),
                    "loaded ledger"
                );
                Some(blocks)
            }
            Ok(None) => {
                info!(path = %store.path().display(), "no ledger found; starting from genesis");
                None
            }
            Err(err) => {
                warn!(
                    path = %store.path().display(),
                    error = %err,
                    "ledger unreadable; falling back to genesis"
                );
                match store.quarantine().await {
                    Ok(moved) => warn!(moved_to = %moved.display(), "unreadable ledger moved aside"),
                    Err(e) => warn!(error = %e, "could not move unreadable ledger aside"),
                }
                None
            }
        };

        let ledger = match loaded {
            Some(blocks) => Self {
                blocks,
                store,
                durable: true,
            },
            None => {
                let mut fresh = Self {
                    blocks: vec![Block::genesis()],
                    store,
                    durable: false,
                };
                if let Err(err) = fresh.persist().await {
                    warn!(error = %err, "could not persist genesis block");
                }
                fresh
            }
        };

        Ok(ledger)
    }

    /// Verify the stored chain without opening it for writes.
    ///
    /// Nothing is created or moved, and a tampered chain comes back as an
    /// invalid report instead of an error. `None` when no chain is stored.
    pub async fn inspect(config: &LedgerConfig) -> LedgerResult<Option<ChainVerificationReport>> {
        let store = LedgerStore::new(
            &config.path,
            Duration::from_millis(config.persist_timeout_ms),
        );
        let blocks = store.load().await.map_err(LedgerError::Storage)?;
        Ok(blocks.map(|blocks| ChainVerificationReport::for_chain(&blocks)))
    }

    /// Append `event` as the next block and write the chain durably.
    ///
    /// On a write failure the block stays in memory and is returned inside
    /// `LedgerError::Persistence`.
    pub async fn append(&mut self, event: LedgerEvent) -> LedgerResult<Block> {
        let block = self.build_block(&event)?;
        self.blocks.push(block.clone());

        match self.store.save(&self.blocks).await {
            Ok(()) => {
                self.durable = true;
                debug!(index = block.index, event = %block.event, hash = %block.hash, "block committed");
                Ok(block)
            }
            Err(err) => {
                self.durable = false;
                warn!(index = block.index, error = %err, "block appended in memory but not persisted");
                Err(LedgerError::Persistence {
                    block: Box::new(block),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Build the next block without mutating the chain.
    pub fn build_block(&self, event: &LedgerEvent) -> LedgerResult<Block> {
        let head = self.head();
        let block = Block::seal(
            head.index + 1,
            format_timestamp(&now()),
            event,
            head.hash.clone(),
        )?;
        Ok(block)
    }

    /// Rewrite the full chain to storage.
    pub async fn persist(&mut self) -> LedgerResult<()> {
        self.store.save(&self.blocks).await?;
        self.durable = true;
        Ok(())
    }

    /// Snapshot of the chain.
    pub fn chain(&self) -> Vec<Block> {
        self.blocks.clone()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn head(&self) -> &Block {
        // `blocks` always holds at least the genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a ledger holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether the in-memory chain matches what was last written.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn verify(&self) -> LedgerResult<()> {
        verify_chain(&self.blocks)
    }

    pub fn verification_report(&self) -> ChainVerificationReport {
        ChainVerificationReport::for_chain(&self.blocks)
    }

    /// Blocks recording the given proposal, in chain order.
    pub fn blocks_for(&self, proposal_id: &ProposalId) -> Vec<Block> {
        self.blocks
            .iter()
            .filter(|block| {
                block
                    .decode_event()
                    .ok()
                    .and_then(|event| event.proposal_id().cloned())
                    .as_ref()
                    == Some(proposal_id)
            })
            .cloned()
            .collect()
    }
}
