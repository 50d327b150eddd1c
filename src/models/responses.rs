use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::negotiation::NegotiationRecord;
use crate::models::domain::{Match, ScoreBreakdown};

/// Result of one matching run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub matches: Vec<Match>,
    pub outcomes: Vec<MenteeOutcome>,
    pub transcripts: Vec<NegotiationRecord>,
    pub mentor_assignments: Vec<MentorAssignment>,
    pub dropped_progress_events: u64,
}

impl MatchingReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            matches: Vec::new(),
            outcomes: Vec::new(),
            transcripts: Vec::new(),
            mentor_assignments: Vec::new(),
            dropped_progress_events: 0,
        }
    }

    pub fn unmatched_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Unmatched)
            .count()
    }

    pub fn outcome_for(&self, mentee_id: &str) -> Option<&MenteeOutcome> {
        self.outcomes.iter().find(|o| o.mentee_id == mentee_id)
    }
}

impl Default for MatchingReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Matched,
    Unmatched,
}

/// What happened to one mentee
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenteeOutcome {
    pub mentee_id: String,
    pub status: OutcomeStatus,
    pub mentor_id: Option<String>,
    pub score: Option<f64>,
    pub breakdown: Option<ScoreBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MenteeOutcome {
    pub fn matched(mentee_id: &str, matched: &Match, breakdown: Option<ScoreBreakdown>) -> Self {
        Self {
            mentee_id: mentee_id.to_string(),
            status: OutcomeStatus::Matched,
            mentor_id: Some(matched.mentor_id.clone()),
            score: Some(matched.final_score),
            breakdown,
            error: None,
        }
    }

    pub fn unmatched(mentee_id: &str, error: Option<String>) -> Self {
        Self {
            mentee_id: mentee_id.to_string(),
            status: OutcomeStatus::Unmatched,
            mentor_id: None,
            score: None,
            breakdown: None,
            error,
        }
    }
}

/// Final load of one mentor
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorAssignment {
    pub mentor_id: String,
    pub mentee_ids: Vec<String>,
    pub load: u32,
    pub capacity: u32,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
