//! Concord Resonance - folds a proposal's votes into a complex resonance and a
//! decision energy.
//!
//! Each vote becomes a wave whose amplitude and phase follow from its stance;
//! the waves are weighted per member and summed. An outcome is coherent when
//! the real part of the sum reaches the configured threshold.

#![deny(unsafe_code)]

pub mod error;
pub mod scorer;
pub mod stance;

pub use error::ScorerError;
pub use scorer::{check_coherence, Contribution, ResonanceScorer, ScorerConfig};
pub use stance::{stance_score, Stance, Wave};
