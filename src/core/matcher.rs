use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::MatchingError;
use crate::core::scoring::CompatibilityScorer;
use crate::models::{Agent, Candidate, Match, Role, ScoreBreakdown};

/// One scored mentor/mentee pair
#[derive(Debug, Clone)]
pub struct ScoreEntry {
    pub mentor_id: String,
    pub mentee_id: String,
    pub breakdown: ScoreBreakdown,
}

/// All pair scores from one `compute_scores` pass, in mentor-major order
#[derive(Debug, Clone, Default)]
pub struct ScoreTable {
    pub entries: Vec<ScoreEntry>,
}

impl ScoreTable {
    pub fn get(&self, mentor_id: &str, mentee_id: &str) -> Option<&ScoreBreakdown> {
        self.entries
            .iter()
            .find(|e| e.mentor_id == mentor_id && e.mentee_id == mentee_id)
            .map(|e| &e.breakdown)
    }
}

/// Pool of mentors and mentees with capacity-aware ranking.
///
/// Mentors keep their insertion order, which is the tie-break when two
/// mentors score the same for a mentee.
pub struct MatchingSystem {
    scorer: CompatibilityScorer,
    mentors: Vec<Arc<Agent>>,
    mentees: Vec<Arc<Agent>>,
    index: HashMap<String, Arc<Agent>>,
}

impl MatchingSystem {
    pub fn new(scorer: CompatibilityScorer) -> Self {
        Self {
            scorer,
            mentors: Vec::new(),
            mentees: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register an agent under its role. A repeated id replaces nothing and
    /// is ignored.
    pub fn add_agent(&mut self, agent: Agent) -> Arc<Agent> {
        if let Some(existing) = self.index.get(&agent.id) {
            tracing::warn!("Ignoring duplicate agent id {}", agent.id);
            return existing.clone();
        }

        let agent = Arc::new(agent);
        match agent.role() {
            Role::Mentor => self.mentors.push(agent.clone()),
            Role::Mentee => self.mentees.push(agent.clone()),
        }
        self.index.insert(agent.id.clone(), agent.clone());
        agent
    }

    pub fn mentors(&self) -> &[Arc<Agent>] {
        &self.mentors
    }

    pub fn mentees(&self) -> &[Arc<Agent>] {
        &self.mentees
    }

    pub fn agent(&self, id: &str) -> Option<&Arc<Agent>> {
        self.index.get(id)
    }

    pub fn scorer(&self) -> &CompatibilityScorer {
        &self.scorer
    }

    /// Score every mentor against every mentee, caching the final score on
    /// both agents.
    pub async fn compute_scores(&self) -> ScoreTable {
        let mut entries = Vec::with_capacity(self.mentors.len() * self.mentees.len());

        for mentor in &self.mentors {
            for mentee in &self.mentees {
                let breakdown = self.scorer.score(&mentor.profile, &mentee.profile).await;
                mentor.record_score(&mentee.id, breakdown.final_score);
                mentee.record_score(&mentor.id, breakdown.final_score);

                tracing::debug!(
                    "Scored {} -> {}: final={:.3} interpersonal={:.3} professional={:.3}",
                    mentor.id,
                    mentee.id,
                    breakdown.final_score,
                    breakdown.interpersonal,
                    breakdown.professional
                );

                entries.push(ScoreEntry {
                    mentor_id: mentor.id.clone(),
                    mentee_id: mentee.id.clone(),
                    breakdown,
                });
            }
        }

        ScoreTable { entries }
    }

    /// Ranked candidates for one mentee among mentors with free capacity now.
    pub fn top_matches_for(&self, mentee: &Agent, top_n: usize) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .mentors
            .iter()
            .filter(|mentor| mentor.mentor_slot().is_some_and(|slot| slot.has_capacity()))
            .map(|mentor| Candidate {
                mentor_id: mentor.id.clone(),
                score: mentor.score_for(&mentee.id).unwrap_or(0.0),
            })
            .collect();

        // sort_by is stable: equal scores keep mentor insertion order
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_n);
        candidates
    }

    /// Ranked candidates for every mentee
    pub fn find_top_matches(&self, top_n: usize) -> HashMap<String, Vec<Candidate>> {
        self.mentees
            .iter()
            .map(|mentee| (mentee.id.clone(), self.top_matches_for(mentee, top_n)))
            .collect()
    }

    /// Finalize an assignment.
    ///
    /// Capacity is claimed atomically here and nowhere else. If the mentee
    /// turns out to be taken already the claimed unit is given back.
    pub fn assign(&self, mentor_id: &str, mentee_id: &str, score: f64) -> Result<Match, MatchingError> {
        let mentor = self
            .agent(mentor_id)
            .ok_or_else(|| MatchingError::UnknownAgent(mentor_id.to_string()))?;
        let mentee = self
            .agent(mentee_id)
            .ok_or_else(|| MatchingError::UnknownAgent(mentee_id.to_string()))?;
        let mentor_slot = mentor
            .mentor_slot()
            .ok_or_else(|| MatchingError::UnknownAgent(format!("{} is not a mentor", mentor_id)))?;
        let mentee_slot = mentee
            .mentee_slot()
            .ok_or_else(|| MatchingError::UnknownAgent(format!("{} is not a mentee", mentee_id)))?;

        if mentee_slot.matched_mentor_id().is_some() {
            return Err(MatchingError::AlreadyMatched(mentee_id.to_string()));
        }

        let load = mentor_slot
            .try_reserve()
            .ok_or_else(|| MatchingError::CapacityExceeded {
                mentor_id: mentor_id.to_string(),
                capacity: mentor_slot.capacity(),
            })?;

        if mentee_slot.assign(mentor_id).is_err() {
            mentor_slot.release();
            return Err(MatchingError::AlreadyMatched(mentee_id.to_string()));
        }

        tracing::info!(
            "Assigned {} to {} (load {}/{})",
            mentee_id,
            mentor_id,
            load,
            mentor_slot.capacity()
        );

        Ok(Match {
            mentor_id: mentor_id.to_string(),
            mentee_id: mentee_id.to_string(),
            final_score: score,
        })
    }
}
