use crate::error::ScorerError;
use crate::stance::{stance_score, Stance, Wave};
use concord_types::{Resonance, Vote, VoteTally};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Scorer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Minimum real part of the resonance for an outcome to count as coherent.
    #[serde(default = "default_coherence_threshold")]
    pub coherence_threshold: f64,

    /// Field weight of members without an explicit entry.
    #[serde(default = "default_weight")]
    pub default_weight: f64,

    /// Per-member field weights.
    #[serde(default)]
    pub member_weights: BTreeMap<String, f64>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            coherence_threshold: default_coherence_threshold(),
            default_weight: default_weight(),
            member_weights: BTreeMap::new(),
        }
    }
}

impl ScorerConfig {
    /// Reject negative or non-finite weights.
    pub fn validate(&self) -> Result<(), ScorerError> {
        check_weight("*", self.default_weight)?;
        for (member_id, weight) in &self.member_weights {
            check_weight(member_id, *weight)?;
        }
        Ok(())
    }

    pub fn weight_for(&self, member_id: &str) -> f64 {
        self.member_weights
            .get(member_id)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

fn default_coherence_threshold() -> f64 {
    0.5
}

fn default_weight() -> f64 {
    1.0
}

fn check_weight(member_id: &str, weight: f64) -> Result<(), ScorerError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(ScorerError::InvalidWeight {
            member_id: member_id.to_string(),
            weight,
        })
    }
}

/// One voter's share of the aggregate.
#[derive(Clone, Debug, PartialEq)]
pub struct Contribution {
    pub member_id: String,
    pub score: f64,
    pub amplitude: f64,
    pub field_weight: f64,
    pub phase: f64,
    pub energy: f64,
}

impl Contribution {
    fn new(vote: &Vote, field_weight: f64) -> Self {
        let score = stance_score(&vote.value);
        let wave = Wave::from_score(score);
        Self {
            member_id: vote.member_id.clone(),
            score,
            amplitude: wave.amplitude,
            field_weight,
            phase: wave.phase,
            energy: wave.energy,
        }
    }

    pub fn resonance(&self) -> Resonance {
        Resonance::from_polar(self.amplitude * self.field_weight, self.phase)
    }
}

/// Turns a proposal's votes into a resonance and a decision energy.
///
/// `resonance = Σ amplitude·weight·e^(i·phase)`,
/// `decision_energy = Σ weight·energy`. Contributions are summed in member-id
/// order, so the result does not depend on the order the votes were cast.
#[derive(Clone, Debug, Default)]
pub struct ResonanceScorer {
    config: ScorerConfig,
}

impl ResonanceScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn threshold(&self) -> f64 {
        self.config.coherence_threshold
    }

    /// Aggregate using the configured member weights.
    pub fn aggregate(&self, votes: &[Vote]) -> (Resonance, f64) {
        let contributions = votes
            .iter()
            .map(|vote| Contribution::new(vote, self.config.weight_for(&vote.member_id)))
            .collect();
        sum(contributions)
    }

    /// Aggregate with explicit per-vote weights, paired by position.
    pub fn aggregate_weighted(
        &self,
        votes: &[Vote],
        weights: &[f64],
    ) -> Result<(Resonance, f64), ScorerError> {
        if votes.len() != weights.len() {
            return Err(ScorerError::LengthMismatch {
                votes: votes.len(),
                weights: weights.len(),
            });
        }

        let mut contributions = Vec::with_capacity(votes.len());
        for (vote, weight) in votes.iter().zip(weights) {
            check_weight(&vote.member_id, *weight)?;
            contributions.push(Contribution::new(vote, *weight));
        }
        Ok(sum(contributions))
    }

    /// Per-voter breakdown in member-id order.
    pub fn contributions(&self, votes: &[Vote]) -> Vec<Contribution> {
        let mut contributions: Vec<Contribution> = votes
            .iter()
            .map(|vote| Contribution::new(vote, self.config.weight_for(&vote.member_id)))
            .collect();
        sort_contributions(&mut contributions);
        contributions
    }

    /// Coherence against the configured threshold.
    pub fn is_coherent(&self, resonance: Resonance) -> bool {
        check_coherence(resonance, self.config.coherence_threshold)
    }

    pub fn tally(votes: &[Vote]) -> VoteTally {
        let mut tally = VoteTally::default();
        for vote in votes {
            match Stance::of(stance_score(&vote.value)) {
                Stance::Approve => tally.approve += 1,
                Stance::Reject => tally.reject += 1,
                Stance::Abstain => tally.abstain += 1,
            }
        }
        tally.total = votes.len();
        tally
    }
}

/// `true` iff the real part of `resonance` reaches `threshold`.
pub fn check_coherence(resonance: Resonance, threshold: f64) -> bool {
    resonance.re >= threshold
}

fn sort_contributions(contributions: &mut [Contribution]) {
    contributions.sort_by(|a, b| {
        a.member_id
            .cmp(&b.member_id)
            .then(a.score.total_cmp(&b.score))
            .then(a.field_weight.total_cmp(&b.field_weight))
    });
}

fn sum(mut contributions: Vec<Contribution>) -> (Resonance, f64) {
    sort_contributions(&mut contributions);

    let mut resonance = Resonance::ZERO;
    let mut decision_energy = 0.0;
    for c in &contributions {
        resonance += c.resonance();
        decision_energy += c.field_weight * c.energy;
    }

    trace!(
        voters = contributions.len(),
        re = resonance.re,
        im = resonance.im,
        decision_energy,
        "aggregated votes"
    );
    (resonance, decision_energy)
}
