//! In-memory registry state and its ledger.
//!
//! Every change goes through [`RegistryState::commit`]: the event is appended
//! to the ledger first and then applied to the maps. Opening a registry replays
//! the same [`RegistryState::apply`] over every stored block, so a reloaded
//! registry holds exactly what the live one did.

use crate::error::{RegistryError, RegistryResult};
use concord_ledger::{Block, HashChainLedger, LedgerError, LedgerEvent};
use concord_types::{Decree, DecreeId, Proposal, ProposalId, ProposalStatus, StatusEntry};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) struct RegistryState {
    pub ledger: HashChainLedger,
    pub proposals: HashMap<ProposalId, Proposal>,
    pub decrees: HashMap<DecreeId, Decree>,
    pub statuses: BTreeMap<String, StatusEntry>,
}

impl RegistryState {
    /// Rebuild the maps from every block of `ledger`.
    pub fn replay(ledger: HashChainLedger) -> RegistryResult<Self> {
        let mut state = Self {
            ledger,
            proposals: HashMap::new(),
            decrees: HashMap::new(),
            statuses: BTreeMap::new(),
        };

        let events = state
            .ledger
            .blocks()
            .iter()
            .map(|block| block.decode_event().map(|event| (block.index, event)))
            .collect::<Result<Vec<_>, LedgerError>>()?;

        for (index, event) in &events {
            state
                .apply(event)
                .map_err(|reason| RegistryError::InconsistentEvent {
                    index: *index,
                    reason,
                })?;
        }
        Ok(state)
    }

    /// Append `event` to the ledger and apply it.
    ///
    /// A failed durable write is logged and the change is kept; the returned
    /// block is part of the in-memory chain either way.
    pub async fn commit(&mut self, event: LedgerEvent) -> RegistryResult<Block> {
        let block = match self.ledger.append(event.clone()).await {
            Ok(block) => block,
            Err(LedgerError::Persistence { block, reason }) => {
                warn!(
                    index = block.index,
                    event = %block.event,
                    %reason,
                    "change kept in memory; ledger is not durable"
                );
                *block
            }
            Err(err) => return Err(err.into()),
        };

        self.apply(&event)
            .map_err(|reason| RegistryError::InconsistentEvent {
                index: block.index,
                reason,
            })?;
        debug!(index = block.index, event = %block.event, "event applied");
        Ok(block)
    }

    /// Apply one event to the maps.
    pub fn apply(&mut self, event: &LedgerEvent) -> Result<(), String> {
        match event {
            LedgerEvent::Genesis(_) => Ok(()),
            LedgerEvent::ProposalCreated(e) => {
                if self.proposals.contains_key(&e.proposal.id) {
                    return Err(format!("proposal {} created twice", e.proposal.id));
                }
                self.proposals
                    .insert(e.proposal.id.clone(), e.proposal.clone());
                Ok(())
            }
            LedgerEvent::VoteCast(e) => {
                let proposal = self
                    .proposals
                    .get_mut(&e.proposal_id)
                    .ok_or_else(|| format!("vote for unknown proposal {}", e.proposal_id))?;
                if !proposal.is_open() {
                    return Err(format!("vote for finalized proposal {}", e.proposal_id));
                }
                proposal
                    .votes
                    .insert(e.vote.member_id.clone(), e.vote.clone());
                Ok(())
            }
            LedgerEvent::DeliberationFinalized(e) => {
                let decree = &e.decree;
                let proposal = self
                    .proposals
                    .get_mut(&decree.proposal_id)
                    .ok_or_else(|| format!("decree for unknown proposal {}", decree.proposal_id))?;
                if !proposal.is_open() {
                    return Err(format!("proposal {} finalized twice", decree.proposal_id));
                }
                proposal.status = ProposalStatus::Finalized;
                self.decrees.insert(decree.id.clone(), decree.clone());
                Ok(())
            }
            LedgerEvent::StatusUpdated(e) => {
                self.statuses.insert(e.entry.key.clone(), e.entry.clone());
                Ok(())
            }
        }
    }
}
