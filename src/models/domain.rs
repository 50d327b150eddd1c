use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::core::error::MatchingError;

/// Participant attributes used for scoring and prompting.
///
/// Every field is optional on the wire; a missing list is simply empty and
/// degrades the score terms that depend on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub hobbies: Vec<String>,
    #[serde(alias = "lifeInterests", deserialize_with = "nullable")]
    pub life_interests: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub mbti: String,
    #[serde(alias = "careerInterests", deserialize_with = "nullable")]
    pub career_interests: Vec<String>,
    #[serde(alias = "courseDescriptions", deserialize_with = "nullable")]
    pub course_descriptions: Vec<String>,
    #[serde(alias = "jobDescription", deserialize_with = "nullable")]
    pub job_description: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub skills: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub experience: u32,
    #[serde(deserialize_with = "nullable")]
    pub availability: Vec<String>,
    #[serde(alias = "communicationStyle", deserialize_with = "nullable")]
    pub communication_style: String,
    #[serde(deserialize_with = "nullable")]
    pub goals: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub interests: Vec<String>,
}

/// Treat an explicit `null` the same as a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Profile {
    /// Hobby and life-interest text, in that order
    pub fn interest_text(&self) -> Vec<String> {
        self.hobbies
            .iter()
            .chain(self.life_interests.iter())
            .cloned()
            .collect()
    }

    /// Professional text as seen from the mentor side (career interests + jobs)
    pub fn mentor_professional_text(&self) -> Vec<String> {
        self.career_interests
            .iter()
            .chain(self.job_description.iter())
            .cloned()
            .collect()
    }

    /// Professional text as seen from the mentee side (career interests + coursework)
    pub fn mentee_professional_text(&self) -> Vec<String> {
        self.career_interests
            .iter()
            .chain(self.course_descriptions.iter())
            .cloned()
            .collect()
    }

    /// Names of scoring inputs that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.hobbies.is_empty() && self.life_interests.is_empty() {
            missing.push("interests");
        }
        if self.mbti.chars().count() != 4 {
            missing.push("mbti");
        }
        if self.career_interests.is_empty() {
            missing.push("career_interests");
        }
        if self.job_description.is_empty() && self.course_descriptions.is_empty() {
            missing.push("experience_text");
        }
        missing
    }

    /// Returns `ProfileIncomplete` when any scoring input is empty.
    ///
    /// Callers log this and carry on; it never stops a run.
    pub fn check_complete(&self, agent_id: &str) -> Result<(), MatchingError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MatchingError::ProfileIncomplete {
                agent_id: agent_id.to_string(),
                fields: missing.join(", "),
            })
        }
    }
}

/// Which side of the mentorship an agent is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mentor,
    Mentee,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Mentor => "Mentor",
            Role::Mentee => "Mentee",
        }
    }
}

/// Author of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Mentor,
    Mentee,
}

impl From<Role> for Speaker {
    fn from(role: Role) -> Self {
        match role {
            Role::Mentor => Speaker::Mentor,
            Role::Mentee => Speaker::Mentee,
        }
    }
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Mentor => "Mentor",
            Speaker::Mentee => "Mentee",
        }
    }
}

/// One negotiation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub round: u32,
}

/// Capacity bookkeeping for a mentor.
///
/// `current_load` only moves through [`MentorSlot::try_reserve`] and
/// [`MentorSlot::release`], both of which keep `0 <= load <= capacity`.
#[derive(Debug)]
pub struct MentorSlot {
    capacity: u32,
    current_load: AtomicU32,
}

impl MentorSlot {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            current_load: AtomicU32::new(0),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn current_load(&self) -> u32 {
        self.current_load.load(Ordering::Acquire)
    }

    pub fn has_capacity(&self) -> bool {
        self.current_load() < self.capacity
    }

    /// Atomically claim one unit of capacity, returning the new load.
    pub fn try_reserve(&self) -> Option<u32> {
        self.current_load
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |load| {
                (load < self.capacity).then_some(load + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Give back a unit claimed by `try_reserve`.
    pub fn release(&self) {
        let _ = self
            .current_load
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |load| load.checked_sub(1));
    }
}

/// Assignment state for a mentee; the mentor id can be set exactly once
#[derive(Debug, Default)]
pub struct MenteeSlot {
    matched_mentor_id: OnceLock<String>,
}

impl MenteeSlot {
    pub fn matched_mentor_id(&self) -> Option<&str> {
        self.matched_mentor_id.get().map(String::as_str)
    }

    /// Record the assignment; fails if one already exists.
    pub fn assign(&self, mentor_id: &str) -> Result<(), String> {
        self.matched_mentor_id.set(mentor_id.to_string())
    }
}

/// Role-specific state
#[derive(Debug)]
pub enum RoleState {
    Mentor(MentorSlot),
    Mentee(MenteeSlot),
}

/// A participant in a matching run.
///
/// Agents are shared behind `Arc` between the matching system and in-flight
/// negotiation sessions, so all mutable state lives behind the slot types
/// or a short-lived lock.
#[derive(Debug)]
pub struct Agent {
    pub id: String,
    pub profile: Profile,
    state: RoleState,
    compatibility_scores: Mutex<HashMap<String, f64>>,
    negotiation_history: Mutex<Vec<Turn>>,
    session_guard: tokio::sync::Mutex<()>,
}

impl Agent {
    pub fn mentor(id: impl Into<String>, profile: Profile, capacity: u32) -> Self {
        Self::with_state(id.into(), profile, RoleState::Mentor(MentorSlot::new(capacity)))
    }

    pub fn mentee(id: impl Into<String>, profile: Profile) -> Self {
        Self::with_state(id.into(), profile, RoleState::Mentee(MenteeSlot::default()))
    }

    fn with_state(id: String, profile: Profile, state: RoleState) -> Self {
        Self {
            id,
            profile,
            state,
            compatibility_scores: Mutex::new(HashMap::new()),
            negotiation_history: Mutex::new(Vec::new()),
            session_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn role(&self) -> Role {
        match self.state {
            RoleState::Mentor(_) => Role::Mentor,
            RoleState::Mentee(_) => Role::Mentee,
        }
    }

    /// Display name, falling back to the id when the profile has none
    pub fn name(&self) -> &str {
        if self.profile.name.trim().is_empty() {
            &self.id
        } else {
            &self.profile.name
        }
    }

    pub fn mentor_slot(&self) -> Option<&MentorSlot> {
        match &self.state {
            RoleState::Mentor(slot) => Some(slot),
            RoleState::Mentee(_) => None,
        }
    }

    pub fn mentee_slot(&self) -> Option<&MenteeSlot> {
        match &self.state {
            RoleState::Mentee(slot) => Some(slot),
            RoleState::Mentor(_) => None,
        }
    }

    pub fn record_score(&self, counterpart_id: &str, score: f64) {
        lock(&self.compatibility_scores).insert(counterpart_id.to_string(), score);
    }

    /// Last computed score against a counterpart
    pub fn score_for(&self, counterpart_id: &str) -> Option<f64> {
        lock(&self.compatibility_scores).get(counterpart_id).copied()
    }

    pub fn compatibility_scores(&self) -> HashMap<String, f64> {
        lock(&self.compatibility_scores).clone()
    }

    pub fn append_history(&self, turn: Turn) {
        lock(&self.negotiation_history).push(turn);
    }

    pub fn negotiation_history(&self) -> Vec<Turn> {
        lock(&self.negotiation_history).clone()
    }

    /// Exclusive negotiation access to this agent.
    pub async fn begin_session(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.session_guard.lock().await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A finalized assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(rename = "mentorId")]
    pub mentor_id: String,
    #[serde(rename = "menteeId")]
    pub mentee_id: String,
    #[serde(rename = "finalScore")]
    pub final_score: f64,
}

/// Compatibility score and its components
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(rename = "final")]
    pub final_score: f64,
    pub interpersonal: f64,
    pub professional: f64,
}

/// A ranked candidate mentor for one mentee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "mentorId")]
    pub mentor_id: String,
    pub score: f64,
}

/// Terminal state of a negotiation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationOutcome {
    Success,
    Failure,
    Undecided,
}

/// Scoring weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub interpersonal: f64,
    pub professional: f64,
    pub interests: f64,
    pub mbti: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            interpersonal: 0.4,
            professional: 0.6,
            interests: 0.7,
            mbti: 0.3,
        }
    }
}

impl ScoringWeights {
    /// Reject weights that could push a score outside [0, 1].
    pub fn validate(&self) -> Result<(), String> {
        let all = [self.interpersonal, self.professional, self.interests, self.mbti];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0 || *w > 1.0) {
            return Err(format!("weights must lie in [0, 1]: {:?}", self));
        }
        if self.interpersonal + self.professional > 1.0 + f64::EPSILON {
            return Err("interpersonal + professional weights exceed 1".to_string());
        }
        if self.interests + self.mbti > 1.0 + f64::EPSILON {
            return Err("interests + mbti weights exceed 1".to_string());
        }
        Ok(())
    }
}
