//! Concord Types - shared records for the deliberation registry.
//!
//! Everything the registry stores, and everything a ledger block carries,
//! is defined here so the ledger, the scorer and the registry agree on one
//! serialized shape.

#![deny(unsafe_code)]

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Free-form JSON object used for metadata, decree content and status values.
///
/// Backed by a `BTreeMap` so keys always serialize in sorted order.
pub type Payload = BTreeMap<String, Value>;

/// Deepest payload nesting the registry accepts, counting the payload map as 1.
///
/// A ledger block wraps a payload in four more levels (file array, block,
/// event payload, record), and the ledger file must stay well inside
/// `serde_json`'s 128-level parse limit to load again.
pub const MAX_PAYLOAD_DEPTH: usize = 64;

/// Nesting depth of `payload`: 1 for a map of scalars, one more per level of
/// arrays or objects below it.
pub fn payload_depth(payload: &Payload) -> usize {
    let mut deepest = 1;
    let mut pending: Vec<(&Value, usize)> = payload.values().map(|v| (v, 1)).collect();
    while let Some((value, depth)) = pending.pop() {
        let depth = depth + 1;
        match value {
            Value::Array(items) => pending.extend(items.iter().map(|child| (child, depth))),
            Value::Object(map) => pending.extend(map.values().map(|child| (child, depth))),
            _ => continue,
        }
        deepest = deepest.max(depth);
    }
    deepest
}

/// Current UTC time truncated to microseconds.
///
/// Every timestamp that feeds a content hash goes through here, so the
/// RFC3339 rendering survives a serialize/deserialize round trip unchanged.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Canonical RFC3339 rendering used in hashes and ledger blocks.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Proposal identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub String);

impl ProposalId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProposalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Decree identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecreeId(pub String);

impl DecreeId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DecreeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The value a member casts: free text ("yes", "abstain", ...) or a number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoteValue {
    Number(f64),
    Text(String),
}

impl VoteValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

impl From<&str> for VoteValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for VoteValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for VoteValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Lifecycle of a proposal. `Finalized` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Open,
    Finalized,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized)
    }
}

/// One member's recorded position on a proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub member_id: String,
    pub value: VoteValue,
    pub content_hash: String,
    pub cast_at: DateTime<Utc>,
}

/// A unit of deliberation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    pub proposer_id: String,
    pub status: ProposalStatus,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    #[serde(default)]
    pub metadata: Payload,
    /// Latest vote per member, keyed by member id.
    #[serde(default)]
    pub votes: BTreeMap<String, Vote>,
}

impl Proposal {
    pub fn is_open(&self) -> bool {
        self.status == ProposalStatus::Open
    }

    /// Votes in member-id order.
    pub fn vote_list(&self) -> Vec<Vote> {
        self.votes.values().cloned().collect()
    }
}

/// Counts of the final vote set by stance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approve: usize,
    pub reject: usize,
    pub abstain: usize,
    pub total: usize,
}

/// The immutable outcome record of a finalized proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decree {
    pub id: DecreeId,
    pub proposal_id: ProposalId,
    pub outcome: String,
    #[serde(default)]
    pub content: Payload,
    pub promulgated_at: DateTime<Utc>,
    pub content_hash: String,
    pub resonance: Resonance,
    pub decision_energy: f64,
    pub coherent: bool,
    #[serde(default)]
    pub tally: VoteTally,
}

/// Overwritable key/value status record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub key: String,
    pub value: Payload,
    pub content_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// Complex-valued resonance, stored as a real/imaginary pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resonance {
    pub re: f64,
    pub im: f64,
}

impl Resonance {
    pub const ZERO: Resonance = Resonance { re: 0.0, im: 0.0 };

    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// `r · e^(iθ)`
    pub fn from_polar(r: f64, theta: f64) -> Self {
        Self {
            re: r * theta.cos(),
            im: r * theta.sin(),
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.re.hypot(self.im)
    }

    pub fn phase(&self) -> f64 {
        self.im.atan2(self.re)
    }
}

impl Add for Resonance {
    type Output = Resonance;

    fn add(self, rhs: Self) -> Self::Output {
        Resonance {
            re: self.re + rhs.re,
            im: self.im + rhs.im,
        }
    }
}

impl AddAssign for Resonance {
    fn add_assign(&mut self, rhs: Self) {
        self.re += rhs.re;
        self.im += rhs.im;
    }
}

impl fmt::Display for Resonance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im < 0.0 {
            write!(f, "{:.6}-{:.6}i", self.re, -self.im)
        } else {
            write!(f, "{:.6}+{:.6}i", self.re, self.im)
        }
    }
}
