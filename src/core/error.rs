use thiserror::Error;

use crate::services::{EmbeddingError, GenerationError};

/// Failures the matching core can observe.
///
/// None of these abort a run: each is handled at the level named in its doc.
#[derive(Debug, Error)]
pub enum MatchingError {
    /// Logged; affected score terms degrade to zero.
    #[error("Profile incomplete for {agent_id}: missing {fields}")]
    ProfileIncomplete { agent_id: String, fields: String },

    /// Ends the current negotiation session as a failure.
    #[error("Generation service error: {0}")]
    GenerationService(#[from] GenerationError),

    /// Surfaced as a zeroed similarity term.
    #[error("Embedding service error: {0}")]
    EmbeddingService(#[from] EmbeddingError),

    /// The arbiter falls back to the first candidate.
    #[error("Decision parse error: {0}")]
    DecisionParse(String),

    /// The candidate is dropped and the next one attempted.
    #[error("Mentor {mentor_id} is at capacity ({capacity})")]
    CapacityExceeded { mentor_id: String, capacity: u32 },

    #[error("Mentee {0} already has a mentor")]
    AlreadyMatched(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),
}
