//! Concord Registry - the proposal, vote and decree state machine.
//!
//! A [`DeliberationRegistry`] owns the hash-chained ledger and every record
//! derived from it. Each operation validates, hashes, appends one block and
//! applies it; reopening a registry replays the ledger to rebuild the same
//! state.
//!
//! ```text
//! create_proposal ──► Open ──cast_vote*──► Open ──finalize_deliberation──► Finalized
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod registry;
mod state;

pub use config::{CoherencePolicy, DeadlinePolicy, RegistryConfig};
pub use error::{RegistryError, RegistryResult};
pub use registry::DeliberationRegistry;
