//! Chain verification.

use crate::block::Block;
use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};

/// Verify genesis shape, index sequence, `prev_hash` links and block hashes.
///
/// Stops at the first broken block and reports it as `ChainIntegrity`.
pub fn verify_chain(blocks: &[Block]) -> LedgerResult<()> {
    let Some(first) = blocks.first() else {
        return Err(LedgerError::integrity(0, "chain is empty"));
    };

    let genesis = Block::genesis();
    if first != &genesis {
        return Err(LedgerError::integrity(
            first.index,
            "first block is not the genesis block",
        ));
    }

    for (position, pair) in blocks.windows(2).enumerate() {
        let (prev, block) = (&pair[0], &pair[1]);
        let expected_index = position as u64 + 1;

        if block.index != expected_index {
            return Err(LedgerError::integrity(
                block.index,
                format!("index gap: expected {expected_index}"),
            ));
        }

        if block.prev_hash != prev.hash {
            return Err(LedgerError::integrity(
                block.index,
                format!(
                    "prev_hash {} does not match block {} hash {}",
                    block.prev_hash, prev.index, prev.hash
                ),
            ));
        }

        let computed = block
            .compute_hash()
            .map_err(|e| LedgerError::integrity(block.index, e.to_string()))?;
        if computed != block.hash {
            return Err(LedgerError::integrity(
                block.index,
                format!("stored hash {} differs from computed {}", block.hash, computed),
            ));
        }
    }

    Ok(())
}

/// Non-failing summary of a verification pass, for audit tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerificationReport {
    pub valid: bool,
    pub total_blocks: usize,
    pub verified_blocks: usize,
    pub first_invalid_index: Option<u64>,
    pub message: Option<String>,
    pub head_hash: Option<String>,
}

impl ChainVerificationReport {
    pub fn for_chain(blocks: &[Block]) -> Self {
        let head_hash = blocks.last().map(|b| b.hash.clone());
        match verify_chain(blocks) {
            Ok(()) => Self {
                valid: true,
                total_blocks: blocks.len(),
                verified_blocks: blocks.len(),
                first_invalid_index: None,
                message: None,
                head_hash,
            },
            Err(err) => {
                let first_invalid_index = match &err {
                    LedgerError::ChainIntegrity { index, .. } => Some(*index),
                    _ => None,
                };
                Self {
                    valid: false,
                    total_blocks: blocks.len(),
                    verified_blocks: first_invalid_index.unwrap_or(0) as usize,
                    first_invalid_index,
                    message: Some(err.to_string()),
                    head_hash,
                }
            }
        }
    }
}
