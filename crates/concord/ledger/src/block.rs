//! Blocks and the typed events they carry.

use crate::error::{HashError, LedgerError, LedgerResult};
use crate::hash::{canonical_json, digest_hex, GENESIS_PREV_HASH};
use concord_types::{Decree, Proposal, ProposalId, Resonance, StatusEntry, Vote};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Timestamp of the genesis block; fixed so every ledger shares one genesis hash.
pub const GENESIS_TIMESTAMP: &str = "1970-01-01T00:00:00.000000Z";

/// Label carried in the genesis payload.
pub const GENESIS_LABEL: &str = "concord-genesis";

/// One immutable ledger entry.
///
/// `event` and `payload` keep the open wire shape; [`Block::decode_event`]
/// turns them back into a [`LedgerEvent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    pub event: String,
    pub payload: Value,
    pub prev_hash: String,
    pub hash: String,
}

impl Block {
    /// The fixed first block of every chain.
    pub fn genesis() -> Self {
        let event = LedgerEvent::Genesis(GenesisRecord {
            label: GENESIS_LABEL.to_string(),
        });
        let payload = serde_json::json!({ "label": GENESIS_LABEL });
        let mut block = Self {
            index: 0,
            timestamp: GENESIS_TIMESTAMP.to_string(),
            event: event.kind().as_str().to_string(),
            payload,
            prev_hash: GENESIS_PREV_HASH.to_string(),
            hash: String::new(),
        };
        // The genesis material is a fixed literal and always serializes.
        block.hash = block.compute_hash().unwrap_or_default();
        block
    }

    /// Build and hash a block for `event`.
    pub fn seal(
        index: u64,
        timestamp: String,
        event: &LedgerEvent,
        prev_hash: String,
    ) -> Result<Self, HashError> {
        let mut block = Self {
            index,
            timestamp,
            event: event.kind().as_str().to_string(),
            payload: event.to_payload()?,
            prev_hash,
            hash: String::new(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// Digest over every field except `hash`.
    pub fn compute_hash(&self) -> Result<String, HashError> {
        let material = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "event": self.event,
            "payload": self.payload,
            "prev_hash": self.prev_hash,
        });
        Ok(digest_hex(canonical_json(&material)?.as_bytes()))
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn decode_event(&self) -> LedgerResult<LedgerEvent> {
        LedgerEvent::from_parts(&self.event, &self.payload)
    }
}

/// Event names as they appear in the `event` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Genesis,
    CreateProposal,
    CastVote,
    FinalizeDeliberation,
    UpdateStatus,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Genesis => "genesis",
            Self::CreateProposal => "create_proposal",
            Self::CastVote => "cast_vote",
            Self::FinalizeDeliberation => "finalize_deliberation",
            Self::UpdateStatus => "update_status",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "genesis" => Ok(Self::Genesis),
            "create_proposal" => Ok(Self::CreateProposal),
            "cast_vote" => Ok(Self::CastVote),
            "finalize_deliberation" => Ok(Self::FinalizeDeliberation),
            "update_status" => Ok(Self::UpdateStatus),
            other => Err(LedgerError::UnknownEvent(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenesisRecord {
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposalCreated {
    pub proposal: Proposal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteCast {
    pub proposal_id: ProposalId,
    pub vote: Vote,
    /// Whether this vote replaced an earlier one from the same member.
    pub replaced: bool,
    pub resonance: Resonance,
    pub decision_energy: f64,
    pub vote_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliberationFinalized {
    pub decree: Decree,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdated {
    pub entry: StatusEntry,
}

/// Everything the ledger can record.
#[derive(Clone, Debug, PartialEq)]
pub enum LedgerEvent {
    Genesis(GenesisRecord),
    ProposalCreated(ProposalCreated),
    VoteCast(VoteCast),
    DeliberationFinalized(DeliberationFinalized),
    StatusUpdated(StatusUpdated),
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Genesis(_) => EventKind::Genesis,
            Self::ProposalCreated(_) => EventKind::CreateProposal,
            Self::VoteCast(_) => EventKind::CastVote,
            Self::DeliberationFinalized(_) => EventKind::FinalizeDeliberation,
            Self::StatusUpdated(_) => EventKind::UpdateStatus,
        }
    }

    /// The proposal this event belongs to, if any.
    pub fn proposal_id(&self) -> Option<&ProposalId> {
        match self {
            Self::ProposalCreated(e) => Some(&e.proposal.id),
            Self::VoteCast(e) => Some(&e.proposal_id),
            Self::DeliberationFinalized(e) => Some(&e.decree.proposal_id),
            Self::Genesis(_) | Self::StatusUpdated(_) => None,
        }
    }

    pub fn to_payload(&self) -> Result<Value, HashError> {
        let value = match self {
            Self::Genesis(e) => serde_json::to_value(e)?,
            Self::ProposalCreated(e) => serde_json::to_value(e)?,
            Self::VoteCast(e) => serde_json::to_value(e)?,
            Self::DeliberationFinalized(e) => serde_json::to_value(e)?,
            Self::StatusUpdated(e) => serde_json::to_value(e)?,
        };
        Ok(value)
    }

    pub fn from_parts(event: &str, payload: &Value) -> LedgerResult<Self> {
        let kind: EventKind = event.parse()?;
        let decoded = match kind {
            EventKind::Genesis => Self::Genesis(decode(kind, payload)?),
            EventKind::CreateProposal => Self::ProposalCreated(decode(kind, payload)?),
            EventKind::CastVote => Self::VoteCast(decode(kind, payload)?),
            EventKind::FinalizeDeliberation => {
                Self::DeliberationFinalized(decode(kind, payload)?)
            }
            EventKind::UpdateStatus => Self::StatusUpdated(decode(kind, payload)?),
        };
        Ok(decoded)
    }
}

fn decode<T: DeserializeOwned>(kind: EventKind, payload: &Value) -> LedgerResult<T> {
    T::deserialize(payload).map_err(|e| LedgerError::MalformedPayload {
        event: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}
