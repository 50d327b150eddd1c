use futures_util::stream::{self, StreamExt};
use std::sync::Arc;

use crate::core::arbiter::{DecisionArbiter, SuccessfulCandidate};
use crate::core::error::MatchingError;
use crate::core::matcher::{MatchingSystem, ScoreTable};
use crate::core::negotiation::{NegotiationEngine, NegotiationRecord};
use crate::core::progress::{ProgressEvent, ProgressSink};
use crate::models::{Agent, Match, MatchingReport, MenteeOutcome, MentorAssignment};

/// Driver settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub top_n: usize,
    /// Mentees processed at once; 1 is strictly sequential
    pub mentee_concurrency: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            top_n: 2,
            mentee_concurrency: 1,
        }
    }
}

struct MenteeResult {
    matched: Option<Match>,
    transcripts: Vec<NegotiationRecord>,
    error: Option<String>,
}

impl MenteeResult {
    fn unmatched(transcripts: Vec<NegotiationRecord>) -> Self {
        Self {
            matched: None,
            transcripts,
            error: None,
        }
    }
}

/// Runs a full matching pass: score, rank, negotiate, arbitrate, assign.
#[derive(Clone)]
pub struct MatchCoordinator {
    system: Arc<MatchingSystem>,
    engine: Arc<NegotiationEngine>,
    arbiter: Arc<DecisionArbiter>,
    config: CoordinatorConfig,
    progress: ProgressSink,
}

impl MatchCoordinator {
    pub fn new(
        system: MatchingSystem,
        engine: NegotiationEngine,
        arbiter: DecisionArbiter,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            system: Arc::new(system),
            engine: Arc::new(engine),
            arbiter: Arc::new(arbiter),
            config,
            progress: ProgressSink::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn system(&self) -> &MatchingSystem {
        &self.system
    }

    pub async fn run(&self) -> MatchingReport {
        let mentors = self.system.mentors().len();
        let mentees: Vec<Arc<Agent>> = self.system.mentees().to_vec();
        tracing::info!("Starting matching run: {} mentees, {} mentors", mentees.len(), mentors);
        self.progress.emit(ProgressEvent::RunStarted {
            mentors,
            mentees: mentees.len(),
        });

        let table = self.system.compute_scores().await;

        let concurrency = self.config.mentee_concurrency.max(1);
        let results: Vec<(Arc<Agent>, MenteeResult)> = stream::iter(mentees)
            .map(|mentee| {
                let this = self.clone();
                async move {
                    let task_mentee = mentee.clone();
                    let handle = tokio::spawn(async move { this.process_mentee(task_mentee).await });
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            tracing::error!("Processing mentee {} panicked: {}", mentee.id, e);
                            MenteeResult {
                                matched: None,
                                transcripts: Vec::new(),
                                error: Some(format!("mentee task failed: {}", e)),
                            }
                        }
                    };
                    (mentee, result)
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let report = self.build_report(&table, results);
        tracing::info!(
            "Matching run {} finished: {} matched, {} unmatched",
            report.run_id,
            report.matches.len(),
            report.unmatched_count()
        );
        self.progress.emit(ProgressEvent::RunFinished {
            matched: report.matches.len(),
            unmatched: report.unmatched_count(),
        });
        report
    }

    async fn process_mentee(&self, mentee: Arc<Agent>) -> MenteeResult {
        if let Err(e) = mentee.profile.check_complete(&mentee.id) {
            tracing::warn!("{}", e);
        }

        if let Some(mentor_id) = mentee.mentee_slot().and_then(|slot| slot.matched_mentor_id()) {
            tracing::info!("Mentee {} already matched with {}, skipping", mentee.id, mentor_id);
            return MenteeResult {
                matched: Some(Match {
                    mentor_id: mentor_id.to_string(),
                    mentee_id: mentee.id.clone(),
                    final_score: mentee.score_for(mentor_id).unwrap_or(0.0),
                }),
                transcripts: Vec::new(),
                error: None,
            };
        }

        let candidates = self.system.top_matches_for(&mentee, self.config.top_n);
        self.progress.emit(ProgressEvent::MenteeStarted {
            mentee: mentee.name().to_string(),
            candidates: candidates
                .iter()
                .filter_map(|c| self.system.agent(&c.mentor_id))
                .map(|m| m.name().to_string())
                .collect(),
        });

        let mut transcripts = Vec::with_capacity(candidates.len());
        let mut successes = Vec::new();
        for candidate in &candidates {
            let Some(mentor) = self.system.agent(&candidate.mentor_id).cloned() else {
                continue;
            };
            let record = self
                .engine
                .negotiate(&mentor, &mentee, candidate.score, &self.progress)
                .await;
            if record.is_success() {
                successes.push(SuccessfulCandidate {
                    mentor,
                    score: candidate.score,
                    transcript: record.turns.clone(),
                });
            }
            transcripts.push(record);
        }

        while let Some(decision) = self.arbiter.choose(&mentee, &successes).await {
            self.progress.emit(ProgressEvent::Decision {
                mentee: mentee.id.clone(),
                mentor: decision.mentor_id.clone(),
                reasoning: decision.reasoning.clone(),
                fallback: decision.fallback,
            });

            match self.system.assign(&decision.mentor_id, &mentee.id, decision.score) {
                Ok(matched) => {
                    let mentor_name = self
                        .system
                        .agent(&decision.mentor_id)
                        .map_or(decision.mentor_id.as_str(), |m| m.name());
                    self.progress.emit(ProgressEvent::Assigned {
                        mentee: mentee.name().to_string(),
                        mentor: mentor_name.to_string(),
                        score: matched.final_score,
                    });
                    return MenteeResult {
                        matched: Some(matched),
                        transcripts,
                        error: None,
                    };
                }
                Err(MatchingError::CapacityExceeded { mentor_id, capacity }) => {
                    tracing::warn!(
                        "Mentor {} filled up (capacity {}) before {} could be assigned; trying next",
                        mentor_id,
                        capacity,
                        mentee.id
                    );
                    successes.retain(|s| s.mentor.id != mentor_id);
                }
                Err(e) => {
                    tracing::warn!("Assignment of {} failed: {}", mentee.id, e);
                    self.progress.emit(ProgressEvent::Unmatched {
                        mentee: mentee.name().to_string(),
                    });
                    return MenteeResult {
                        matched: None,
                        transcripts,
                        error: Some(e.to_string()),
                    };
                }
            }
        }

        tracing::info!("No suitable mentor found for {}", mentee.id);
        self.progress.emit(ProgressEvent::Unmatched {
            mentee: mentee.name().to_string(),
        });
        MenteeResult::unmatched(transcripts)
    }

    fn build_report(&self, table: &ScoreTable, results: Vec<(Arc<Agent>, MenteeResult)>) -> MatchingReport {
        let mut report = MatchingReport::new();

        for (mentee, result) in results {
            let outcome = match &result.matched {
                Some(matched) => MenteeOutcome::matched(
                    &mentee.id,
                    matched,
                    table.get(&matched.mentor_id, &mentee.id).copied(),
                ),
                None => MenteeOutcome::unmatched(&mentee.id, result.error.clone()),
            };
            report.outcomes.push(outcome);
            report.matches.extend(result.matched);
            report.transcripts.extend(result.transcripts);
        }

        report.mentor_assignments = self
            .system
            .mentors()
            .iter()
            .filter_map(|mentor| {
                let slot = mentor.mentor_slot()?;
                Some(MentorAssignment {
                    mentor_id: mentor.id.clone(),
                    mentee_ids: report
                        .matches
                        .iter()
                        .filter(|m| m.mentor_id == mentor.id)
                        .map(|m| m.mentee_id.clone())
                        .collect(),
                    load: slot.current_load(),
                    capacity: slot.capacity(),
                })
            })
            .collect();
        report.dropped_progress_events = self.progress.dropped();

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agreement::KeywordPolicy;
    use crate::core::negotiation::NegotiationConfig;
    use crate::core::scoring::CompatibilityScorer;
    use crate::models::{OutcomeStatus, Profile};
    use crate::services::{Embedder, EmbeddingError, GenerationError, Generator};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FlatEmbedder;

    #[async_trait]
    impl Embedder for FlatEmbedder {
        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    /// Mentee agrees to everyone it talks to
    struct AgreeableGenerator;

    #[async_trait]
    impl Generator for AgreeableGenerator {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
            Ok("Sounds good, I'd love to.".to_string())
        }
    }

    fn coordinator(mentor_capacity: u32, mentees: usize) -> MatchCoordinator {
        let mut system =
            MatchingSystem::new(CompatibilityScorer::with_default_weights(Arc::new(FlatEmbedder)));
        system.add_agent(Agent::mentor("m1", Profile::default(), mentor_capacity));
        for i in 0..mentees {
            system.add_agent(Agent::mentee(format!("s{}", i), Profile::default()));
        }

        let generator: Arc<dyn Generator> = Arc::new(AgreeableGenerator);
        let engine = NegotiationEngine::new(
            generator.clone(),
            Arc::new(KeywordPolicy),
            NegotiationConfig {
                min_turns_before_decision: 0,
                ..Default::default()
            },
        );
        let arbiter = DecisionArbiter::new(generator, Duration::from_secs(1));
        MatchCoordinator::new(system, engine, arbiter, CoordinatorConfig::default())
    }

    #[tokio::test]
    async fn test_capacity_limits_assignments() {
        let report = coordinator(1, 3).run().await;

        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].mentee_id, "s0");
        assert_eq!(report.unmatched_count(), 2);
        assert_eq!(report.mentor_assignments[0].load, 1);
        assert_eq!(report.outcomes[0].status, OutcomeStatus::Matched);
    }

    #[tokio::test]
    async fn test_concurrent_run_respects_capacity() {
        let mut coordinator = coordinator(2, 6);
        coordinator.config.mentee_concurrency = 4;

        let report = coordinator.run().await;

        assert_eq!(report.matches.len(), 2);
        assert_eq!(report.outcomes.len(), 6);
        assert_eq!(report.mentor_assignments[0].mentee_ids.len(), 2);
    }

    /// Agrees to every mentor, then fills `target` while the mentee deliberates
    struct FillingGenerator {
        target: Arc<Agent>,
        decisions: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Generator for FillingGenerator {
        async fn generate(&self, system: &str, _user: &str) -> Result<String, GenerationError> {
            if system == crate::core::prompts::DECISION_SYSTEM {
                self.decisions.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let slot = self.target.mentor_slot().unwrap();
                while slot.try_reserve().is_some() {}
                return Ok(format!(
                    r#"{{"decision": "{}", "reasoning": "closest fit"}}"#,
                    self.target.id
                ));
            }
            Ok("Sounds good, I'd love to.".to_string())
        }
    }

    #[tokio::test]
    async fn test_full_choice_falls_back_to_remaining_success() {
        let mut system =
            MatchingSystem::new(CompatibilityScorer::with_default_weights(Arc::new(FlatEmbedder)));
        let first = system.add_agent(Agent::mentor("m1", Profile::default(), 1));
        system.add_agent(Agent::mentor("m2", Profile::default(), 1));
        system.add_agent(Agent::mentee("s0", Profile::default()));

        let generator = Arc::new(FillingGenerator {
            target: first,
            decisions: Default::default(),
        });
        let engine = NegotiationEngine::new(
            generator.clone(),
            Arc::new(KeywordPolicy),
            NegotiationConfig {
                min_turns_before_decision: 0,
                ..Default::default()
            },
        );
        let arbiter = DecisionArbiter::new(generator.clone(), Duration::from_secs(1));
        let (sink, mut rx) = ProgressSink::channel(256);
        let coordinator = MatchCoordinator::new(system, engine, arbiter, CoordinatorConfig::default())
            .with_progress(sink);

        let report = coordinator.run().await;

        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].mentor_id, "m2");
        assert_eq!(report.outcome_for("s0").unwrap().mentor_id.as_deref(), Some("m2"));
        assert_eq!(generator.decisions.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(report.transcripts.len(), 2);

        let mut chosen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::Decision { mentor, .. } = event {
                chosen.push(mentor);
            }
        }
        assert_eq!(chosen, vec!["m1", "m2"]);
        assert_eq!(report.mentor_assignments[1].mentee_ids, vec!["s0"]);
    }

    #[tokio::test]
    async fn test_second_run_keeps_existing_matches() {
        let coordinator = coordinator(1, 1);
        coordinator.run().await;

        let report = coordinator.run().await;

        assert_eq!(report.matches.len(), 1);
        assert!(report.transcripts.is_empty());
        assert_eq!(report.mentor_assignments[0].load, 1);
    }
}
