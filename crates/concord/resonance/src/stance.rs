//! Stance policy table.
//!
//! A vote value is reduced to a stance score in `[-1, 1]`, and the score
//! determines the voter's wave: approval-leaning votes have a larger amplitude
//! and a phase near zero, rejection-leaning votes a smaller amplitude and a
//! phase near π.

use concord_types::VoteValue;
use std::f64::consts::FRAC_PI_2;

const APPROVE_ALIASES: &[&str] = &["yes", "y", "approve", "aye", "for", "true", "support"];
const REJECT_ALIASES: &[&str] = &["no", "n", "reject", "nay", "against", "false", "oppose"];

/// Coarse reading of a stance score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stance {
    Approve,
    Reject,
    Abstain,
}

impl Stance {
    pub fn of(score: f64) -> Self {
        if score > 0.0 {
            Self::Approve
        } else if score < 0.0 {
            Self::Reject
        } else {
            Self::Abstain
        }
    }
}

/// Map a vote value to a score in `[-1, 1]`.
///
/// "abstain", unknown text and non-finite numbers all count as 0.
pub fn stance_score(value: &VoteValue) -> f64 {
    match value {
        VoteValue::Number(n) if n.is_finite() => n.clamp(-1.0, 1.0),
        VoteValue::Number(_) => 0.0,
        VoteValue::Text(text) => {
            let normalized = text.trim().to_lowercase();
            if APPROVE_ALIASES.contains(&normalized.as_str()) {
                1.0
            } else if REJECT_ALIASES.contains(&normalized.as_str()) {
                -1.0
            } else {
                0.0
            }
        }
    }
}

/// Per-voter wave parameters before the field weight is applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Wave {
    pub amplitude: f64,
    pub phase: f64,
    pub energy: f64,
}

impl Wave {
    pub fn from_score(score: f64) -> Self {
        let amplitude = 0.75 + 0.25 * score;
        Self {
            amplitude,
            phase: (1.0 - score) * FRAC_PI_2,
            energy: amplitude * amplitude,
        }
    }
}
