// Core algorithm exports
pub mod agreement;
pub mod arbiter;
pub mod coordinator;
pub mod error;
pub mod matcher;
pub mod negotiation;
pub mod progress;
pub mod prompts;
pub mod scoring;
pub mod similarity;

pub use agreement::{AgreementPolicy, KeywordPolicy, ModelPolicy, Verdict};
pub use arbiter::{Decision, DecisionArbiter, SuccessfulCandidate};
pub use coordinator::{CoordinatorConfig, MatchCoordinator};
pub use error::MatchingError;
pub use matcher::{MatchingSystem, ScoreEntry, ScoreTable};
pub use negotiation::{NegotiationConfig, NegotiationEngine, NegotiationRecord, NegotiationSession, SessionState};
pub use progress::{ProgressEvent, ProgressSink};
pub use scoring::{mbti_similarity, CompatibilityScorer};
pub use similarity::{cosine_similarity, mean_pool, split_sentences};
