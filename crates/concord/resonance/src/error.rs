/// Errors from the resonance scorer.
#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("vote/weight length mismatch: {votes} votes, {weights} weights")]
    LengthMismatch { votes: usize, weights: usize },
    #[error("invalid field weight {weight} for member {member_id}")]
    InvalidWeight { member_id: String, weight: f64 },
}
