use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::Profile;

/// Request to run a matching pass over an explicit pool
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunMatchingRequest {
    #[validate(length(min = 1), nested)]
    pub mentors: Vec<MentorInput>,
    #[validate(length(min = 1), nested)]
    pub mentees: Vec<MenteeInput>,
    #[validate(range(min = 1, max = 20))]
    #[serde(alias = "top_n", rename = "topN")]
    pub top_n: Option<usize>,
    #[validate(range(min = 1, max = 50))]
    #[serde(alias = "max_rounds", rename = "maxRounds")]
    pub max_rounds: Option<u32>,
}

/// A mentor in a run request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MentorInput {
    #[validate(length(min = 1))]
    pub id: String,
    /// Falls back to the configured default capacity
    #[validate(range(min = 1))]
    #[serde(alias = "max_mentees", alias = "maxMentees")]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub profile: Profile,
}

/// A mentee in a run request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MenteeInput {
    #[validate(length(min = 1))]
    pub id: String,
    #[serde(default)]
    pub profile: Profile,
}

/// Request to score a single pair without negotiating
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub mentor: Profile,
    pub mentee: Profile,
}
