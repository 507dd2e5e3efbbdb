//! Concord Ledger - tamper-evident record of every registry state change.
//!
//! Each [`Block`] commits to the hash of its predecessor, starting from a
//! fixed genesis block. The full chain is written atomically to a JSON file on
//! every append and verified whenever it is loaded.

#![deny(unsafe_code)]

pub mod block;
pub mod chain;
pub mod error;
pub mod hash;
pub mod integrity;
pub mod store;

pub use block::{
    Block, DeliberationFinalized, EventKind, GenesisRecord, LedgerEvent, ProposalCreated,
    StatusUpdated, VoteCast, GENESIS_LABEL, GENESIS_TIMESTAMP,
};
pub use chain::{HashChainLedger, LedgerConfig};
pub use error::{HashError, LedgerError, LedgerResult, StoreError};
pub use hash::{canonical_json, content_hash, hash_record, GENESIS_PREV_HASH};
pub use integrity::{verify_chain, ChainVerificationReport};
pub use store::LedgerStore;
