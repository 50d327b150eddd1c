use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::core::agreement::{recent_turns, AgreementPolicy, Verdict};
use crate::core::progress::{ProgressEvent, ProgressSink};
use crate::core::prompts;
use crate::models::{Agent, NegotiationOutcome, Speaker, Turn};
use crate::services::{clean_response, GenerationError, Generator, MarkerFilter};

const SUMMARY_SUCCESS: &str = "✅ Negotiation successful! Both parties have reached an agreement.";
const SUMMARY_FAILURE: &str = "❌ Negotiation unsuccessful. The parties could not reach an agreement.";
const SUMMARY_MAX_ROUNDS: &str = "ℹ️ Maximum negotiation rounds reached. No clear agreement was made.";

/// Negotiation tuning
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// A session runs at most `max_rounds * 2` turns
    pub max_rounds: u32,
    /// Agreement checks start after the turn with this 0-based index
    pub min_turns_before_decision: usize,
    /// Bound on each generation call, agreement checks included
    pub turn_timeout: Duration,
    /// Consume turns as chunk streams and forward deltas as progress
    pub stream: bool,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            min_turns_before_decision: 6,
            turn_timeout: Duration::from_secs(60),
            stream: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    InProgress,
    Concluded(NegotiationOutcome),
}

/// Transient state of one mentor/mentee exchange
#[derive(Debug)]
pub struct NegotiationSession {
    max_turns: usize,
    round: u32,
    turns: Vec<Turn>,
    state: SessionState,
}

impl NegotiationSession {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            max_turns: max_rounds as usize * 2,
            round: 0,
            turns: Vec::new(),
            state: SessionState::Start,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Speaker of the next turn; mentors always open
    pub fn next_speaker(&self) -> Speaker {
        if self.turns.len() % 2 == 0 {
            Speaker::Mentor
        } else {
            Speaker::Mentee
        }
    }

    pub fn has_turns_left(&self) -> bool {
        !matches!(self.state, SessionState::Concluded(_)) && self.turns.len() < self.max_turns
    }

    /// Append a generated message as the next turn.
    ///
    /// Returns `None` once the session is concluded or out of turns.
    pub fn record(&mut self, text: String) -> Option<&Turn> {
        if !self.has_turns_left() {
            return None;
        }
        let index = self.turns.len();
        let speaker = self.next_speaker();
        self.round = (index / 2 + 1) as u32;
        self.state = SessionState::InProgress;
        self.turns.push(Turn {
            speaker,
            text,
            round: self.round,
        });
        self.turns.last()
    }

    fn conclude(&mut self, outcome: NegotiationOutcome) {
        self.state = SessionState::Concluded(outcome);
    }
}

/// Audit record of a finished session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationRecord {
    pub mentor_id: String,
    pub mentee_id: String,
    pub outcome: NegotiationOutcome,
    pub turns: Vec<Turn>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NegotiationRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == NegotiationOutcome::Success
    }
}

/// Drives alternating mentor/mentee turns until a verdict or the turn limit
pub struct NegotiationEngine {
    generator: Arc<dyn Generator>,
    policy: Arc<dyn AgreementPolicy>,
    config: NegotiationConfig,
}

impl NegotiationEngine {
    pub fn new(
        generator: Arc<dyn Generator>,
        policy: Arc<dyn AgreementPolicy>,
        config: NegotiationConfig,
    ) -> Self {
        Self {
            generator,
            policy,
            config,
        }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Run one session between `mentor` and `mentee`.
    ///
    /// Holds both agents' session guards (mentor first) for the whole
    /// exchange. Never touches capacity or assignment state.
    pub async fn negotiate(
        &self,
        mentor: &Agent,
        mentee: &Agent,
        score: f64,
        progress: &ProgressSink,
    ) -> NegotiationRecord {
        let _mentor_guard = mentor.begin_session().await;
        let _mentee_guard = mentee.begin_session().await;

        tracing::info!("Negotiating {} <-> {} (score {:.3})", mentor.id, mentee.id, score);
        progress.emit(ProgressEvent::SessionStarted {
            mentor: mentor.name().to_string(),
            mentee: mentee.name().to_string(),
            score,
        });

        let mentor_system = prompts::mentor_system(mentor, mentee);
        let mentee_system = prompts::mentee_system(mentee, mentor);
        let mut session = NegotiationSession::new(self.config.max_rounds);
        let mut error = None;

        while session.has_turns_left() {
            let speaker = session.next_speaker();
            let system = match speaker {
                Speaker::Mentor => &mentor_system,
                Speaker::Mentee => &mentee_system,
            };
            let user = if session.turns().is_empty() {
                prompts::opening()
            } else {
                prompts::continuation(session.turns())
            };

            let text = match self.generate_turn(speaker, system, &user, progress).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        "Generation failed in {} <-> {} at turn {}: {}",
                        mentor.id,
                        mentee.id,
                        session.turns().len(),
                        e
                    );
                    error = Some(e);
                    session.conclude(NegotiationOutcome::Failure);
                    break;
                }
            };

            let Some(turn) = session.record(text) else {
                break;
            };
            mentor.append_history(turn.clone());
            mentee.append_history(turn.clone());

            // Only the mentee's reply can settle a session
            let index = session.turns().len() - 1;
            if speaker != Speaker::Mentee || index < self.config.min_turns_before_decision {
                continue;
            }

            match self.check_agreement(session.turns()).await {
                Ok(Verdict::Accept) => session.conclude(NegotiationOutcome::Success),
                Ok(Verdict::Reject) => session.conclude(NegotiationOutcome::Failure),
                Ok(Verdict::Continue) => {}
                Err(e) => {
                    tracing::warn!(
                        "Agreement check failed in {} <-> {}: {}",
                        mentor.id,
                        mentee.id,
                        e
                    );
                    error = Some(e);
                    session.conclude(NegotiationOutcome::Failure);
                }
            }
        }

        let outcome = match session.state() {
            SessionState::Concluded(outcome) => outcome,
            SessionState::Start | SessionState::InProgress => NegotiationOutcome::Undecided,
        };
        let summary = match (&error, outcome) {
            (Some(e), _) => format!("❌ Negotiation aborted: {}", e),
            (None, NegotiationOutcome::Success) => SUMMARY_SUCCESS.to_string(),
            (None, NegotiationOutcome::Failure) => SUMMARY_FAILURE.to_string(),
            (None, NegotiationOutcome::Undecided) => SUMMARY_MAX_ROUNDS.to_string(),
        };

        tracing::info!(
            "Negotiation {} <-> {} ended {:?} after {} turns",
            mentor.id,
            mentee.id,
            outcome,
            session.turns().len()
        );
        progress.emit(ProgressEvent::SessionConcluded {
            mentor: mentor.name().to_string(),
            outcome,
            summary: summary.clone(),
        });

        NegotiationRecord {
            mentor_id: mentor.id.clone(),
            mentee_id: mentee.id.clone(),
            outcome,
            turns: session.turns,
            summary,
            error: error.map(|e| e.to_string()),
        }
    }

    async fn check_agreement(&self, turns: &[Turn]) -> Result<Verdict, GenerationError> {
        let recent = recent_turns(turns, self.policy.window());
        tokio::time::timeout(self.config.turn_timeout, self.policy.classify(recent))
            .await
            .map_err(|_| GenerationError::Timeout(self.config.turn_timeout))?
    }

    async fn generate_turn(
        &self,
        speaker: Speaker,
        system: &str,
        user: &str,
        progress: &ProgressSink,
    ) -> Result<String, GenerationError> {
        let call = async {
            if self.config.stream {
                self.stream_turn(speaker, system, user, progress).await
            } else {
                self.generator.generate(system, user).await
            }
        };

        let raw = tokio::time::timeout(self.config.turn_timeout, call)
            .await
            .map_err(|_| GenerationError::Timeout(self.config.turn_timeout))??;

        let text = clean_response(&raw);
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        if !self.config.stream {
            progress.emit(ProgressEvent::Turn {
                speaker,
                text: text.clone(),
            });
        }
        Ok(text)
    }

    async fn stream_turn(
        &self,
        speaker: Speaker,
        system: &str,
        user: &str,
        progress: &ProgressSink,
    ) -> Result<String, GenerationError> {
        let mut chunks = self.generator.generate_stream(system, user).await?;
        progress.emit(ProgressEvent::TurnStarted { speaker });

        let mut text = String::new();
        let mut filter = MarkerFilter::default();
        let mut result = Ok(());
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(delta) if delta.is_empty() => {}
                Ok(delta) => {
                    let visible = filter.push(&delta);
                    if !visible.is_empty() {
                        progress.emit(ProgressEvent::TurnDelta { text: visible });
                    }
                    text.push_str(&delta);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        let tail = filter.finish();
        if result.is_ok() && !tail.is_empty() {
            progress.emit(ProgressEvent::TurnDelta { text: tail });
        }
        progress.emit(ProgressEvent::TurnFinished);
        result.map(|_| text)
    }
}
