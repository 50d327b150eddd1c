//! Mentor Match - capacity-aware mentor/mentee matching service
//!
//! Scores mentor/mentee pairs from their profiles, ranks candidates under
//! live mentor capacity, confirms each candidate through a simulated
//! negotiation and assigns every mentee at most one mentor.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    CompatibilityScorer, DecisionArbiter, MatchCoordinator, MatchingError, MatchingSystem,
    NegotiationEngine, ProgressSink,
};
pub use models::{Agent, Match, MatchingReport, Profile, ScoreBreakdown, ScoringWeights};
