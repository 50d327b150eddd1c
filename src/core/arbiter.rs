use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::MatchingError;
use crate::core::prompts::{self, DecisionOption};
use crate::models::{Agent, Turn};
use crate::services::{clean_response, Generator};

/// A mentor the mentee negotiated with successfully
#[derive(Debug, Clone)]
pub struct SuccessfulCandidate {
    pub mentor: Arc<Agent>,
    pub score: f64,
    pub transcript: Vec<Turn>,
}

/// The arbiter's pick
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub mentor_id: String,
    pub score: f64,
    pub reasoning: Option<String>,
    /// True when the pick is the first candidate because no usable answer came back
    pub fallback: bool,
}

#[derive(Debug, Deserialize)]
struct DecisionReply {
    decision: String,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Chooses one mentor when a mentee succeeded with several
pub struct DecisionArbiter {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl DecisionArbiter {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Pick one candidate.
    ///
    /// Callers pass candidates in descending score order so the fallback
    /// (first candidate) is also the best-scoring one.
    pub async fn choose(&self, mentee: &Agent, candidates: &[SuccessfulCandidate]) -> Option<Decision> {
        let first = candidates.first()?;
        if candidates.len() == 1 {
            return Some(Decision {
                mentor_id: first.mentor.id.clone(),
                score: first.score,
                reasoning: None,
                fallback: false,
            });
        }

        let options: Vec<DecisionOption<'_>> = candidates
            .iter()
            .map(|c| DecisionOption {
                mentor_id: &c.mentor.id,
                name: c.mentor.name(),
                profile: &c.mentor.profile,
                score: c.score,
                transcript: &c.transcript,
            })
            .collect();
        let prompt = prompts::decision(&mentee.profile, &options);

        let reply = match tokio::time::timeout(
            self.timeout,
            self.generator.generate(prompts::DECISION_SYSTEM, &prompt),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!("Decision request for {} failed: {}", mentee.id, e);
                return Some(Self::fallback(first));
            }
            Err(_) => {
                tracing::warn!("Decision request for {} timed out after {:?}", mentee.id, self.timeout);
                return Some(Self::fallback(first));
            }
        };

        match parse_decision(&reply, candidates) {
            Ok((candidate, reasoning)) => Some(Decision {
                mentor_id: candidate.mentor.id.clone(),
                score: candidate.score,
                reasoning,
                fallback: false,
            }),
            Err(e) => {
                tracing::warn!("{} for {}; defaulting to {}", e, mentee.id, first.mentor.id);
                Some(Self::fallback(first))
            }
        }
    }

    fn fallback(first: &SuccessfulCandidate) -> Decision {
        Decision {
            mentor_id: first.mentor.id.clone(),
            score: first.score,
            reasoning: None,
            fallback: true,
        }
    }
}

/// Extract `{decision, reasoning}` from a model reply and resolve the id.
///
/// Tolerates code fences and prose around the JSON object.
pub fn parse_decision<'a>(
    reply: &str,
    candidates: &'a [SuccessfulCandidate],
) -> Result<(&'a SuccessfulCandidate, Option<String>), MatchingError> {
    let cleaned = clean_response(reply);
    let body = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => return Err(MatchingError::DecisionParse("no JSON object in reply".to_string())),
    };

    let parsed: DecisionReply = serde_json::from_str(body)
        .map_err(|e| MatchingError::DecisionParse(format!("invalid decision JSON: {}", e)))?;

    let chosen = parsed.decision.trim();
    candidates
        .iter()
        .find(|c| c.mentor.id == chosen)
        .map(|c| (c, parsed.reasoning))
        .ok_or_else(|| MatchingError::DecisionParse(format!("unknown mentor id {:?}", chosen)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Profile;
    use crate::services::GenerationError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedGenerator {
        reply: Result<String, GenerationError>,
        calls: AtomicUsize,
    }

    impl CannedGenerator {
        fn new(reply: Result<&str, GenerationError>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Generator for CannedGenerator {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn candidate(id: &str, score: f64) -> SuccessfulCandidate {
        SuccessfulCandidate {
            mentor: Arc::new(Agent::mentor(id, Profile::default(), 1)),
            score,
            transcript: Vec::new(),
        }
    }

    fn mentee() -> Agent {
        Agent::mentee("s1", Profile::default())
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let arbiter = DecisionArbiter::new(CannedGenerator::new(Ok("{}")), Duration::from_secs(1));
        assert!(arbiter.choose(&mentee(), &[]).await.is_none());
    }

    #[tokio::test]
    async fn test_single_candidate_skips_generation() {
        let generator = CannedGenerator::new(Ok("{}"));
        let arbiter = DecisionArbiter::new(generator.clone(), Duration::from_secs(1));

        let decision = arbiter.choose(&mentee(), &[candidate("m1", 0.4)]).await.unwrap();

        assert_eq!(decision.mentor_id, "m1");
        assert!(!decision.fallback);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_decision_in_code_fence() {
        let reply = "```json\n{\"decision\": \"m2\", \"reasoning\": \"Better research fit\"}\n```";
        let arbiter = DecisionArbiter::new(CannedGenerator::new(Ok(reply)), Duration::from_secs(1));

        let decision = arbiter
            .choose(&mentee(), &[candidate("m1", 0.9), candidate("m2", 0.6)])
            .await
            .unwrap();

        assert_eq!(decision.mentor_id, "m2");
        assert_eq!(decision.score, 0.6);
        assert_eq!(decision.reasoning.as_deref(), Some("Better research fit"));
        assert!(!decision.fallback);
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back_to_first() {
        let arbiter = DecisionArbiter::new(
            CannedGenerator::new(Ok("I like both of them!")),
            Duration::from_secs(1),
        );

        let decision = arbiter
            .choose(&mentee(), &[candidate("m1", 0.9), candidate("m2", 0.6)])
            .await
            .unwrap();

        assert_eq!(decision.mentor_id, "m1");
        assert_eq!(decision.score, 0.9);
        assert!(decision.fallback);
    }

    #[tokio::test]
    async fn test_unknown_id_and_generation_error_fall_back() {
        let candidates = [candidate("m1", 0.9), candidate("m2", 0.6)];

        let arbiter = DecisionArbiter::new(
            CannedGenerator::new(Ok(r#"{"decision": "m9"}"#)),
            Duration::from_secs(1),
        );
        assert_eq!(arbiter.choose(&mentee(), &candidates).await.unwrap().mentor_id, "m1");

        let arbiter = DecisionArbiter::new(
            CannedGenerator::new(Err(GenerationError::Empty)),
            Duration::from_secs(1),
        );
        let decision = arbiter.choose(&mentee(), &candidates).await.unwrap();
        assert_eq!(decision.mentor_id, "m1");
        assert!(decision.fallback);
    }

    #[test]
    fn test_parse_decision_missing_field() {
        let candidates = [candidate("m1", 0.9)];
        let result = parse_decision(r#"{"reasoning": "no id"}"#, &candidates);
        assert!(matches!(result, Err(MatchingError::DecisionParse(_))));
    }
}
