// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Agent, Candidate, Match, MenteeSlot, MentorSlot, NegotiationOutcome, Profile, Role, RoleState,
    ScoreBreakdown, ScoringWeights, Speaker, Turn,
};
pub use requests::{MenteeInput, MentorInput, RunMatchingRequest, ScoreRequest};
pub use responses::{
    ErrorResponse, HealthResponse, MatchingReport, MenteeOutcome, MentorAssignment, OutcomeStatus,
};
