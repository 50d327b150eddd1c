use async_trait::async_trait;
use std::sync::Arc;

use crate::core::prompts;
use crate::models::Turn;
use crate::services::{clean_response, GenerationError, Generator};

/// Reading of the latest exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
    Continue,
}

/// Decides whether a negotiation has reached an explicit agreement or
/// rejection.
#[async_trait]
pub trait AgreementPolicy: Send + Sync {
    /// How many trailing turns `classify` looks at
    fn window(&self) -> usize;

    async fn classify(&self, recent: &[Turn]) -> Result<Verdict, GenerationError>;
}

/// The trailing `window` turns of a transcript
pub fn recent_turns(turns: &[Turn], window: usize) -> &[Turn] {
    &turns[turns.len().saturating_sub(window)..]
}

fn joined_lowercase(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| t.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

pub const ACCEPT_PHRASES: &[&str] = &[
    "agree",
    "accept",
    "sounds good",
    "deal",
    "let's do it",
    "great",
    "perfect",
    "i accept",
    "i agree",
    "confirmed",
    "definitely",
    "let's proceed",
    "i'm in",
    "count me in",
    "sounds good to me",
    "i accept your terms",
    "i agree to your terms",
    "i'd love to",
    "i'm excited to start",
    "looking forward to it",
    "let's get started",
];

pub const REJECT_PHRASES: &[&str] = &[
    "no thanks",
    "i don't think so",
    "not interested",
    "i decline",
    "i don't agree",
    "i can't accept",
    "this won't work",
    "not a good fit",
    "not what i'm looking for",
    "i'll pass",
    "not for me",
    "not now",
    "maybe later",
    "i have to decline",
];

/// Phrases the model-backed policy scans for when the model gives no usable answer
const FALLBACK_REJECT_PHRASES: &[&str] = &["not interested", "i decline", "won't work"];

/// Counts curated accept/reject phrases in the last exchange.
///
/// Each phrase counts once however often it appears, and overlapping
/// phrases ("i agree" also contains "agree") each count.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordPolicy;

impl KeywordPolicy {
    pub fn evaluate(&self, recent: &[Turn]) -> Verdict {
        let exchange = joined_lowercase(recent);
        let positives = ACCEPT_PHRASES.iter().filter(|p| exchange.contains(*p)).count();
        let negatives = REJECT_PHRASES.iter().filter(|p| exchange.contains(*p)).count();

        if positives > negatives && positives > 0 {
            Verdict::Accept
        } else if negatives > 0 {
            Verdict::Reject
        } else {
            Verdict::Continue
        }
    }
}

#[async_trait]
impl AgreementPolicy for KeywordPolicy {
    fn window(&self) -> usize {
        2
    }

    async fn classify(&self, recent: &[Turn]) -> Result<Verdict, GenerationError> {
        Ok(self.evaluate(recent))
    }
}

/// Asks the generator whether the mentee has explicitly committed either way
pub struct ModelPolicy {
    generator: Arc<dyn Generator>,
}

impl ModelPolicy {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl AgreementPolicy for ModelPolicy {
    fn window(&self) -> usize {
        4
    }

    async fn classify(&self, recent: &[Turn]) -> Result<Verdict, GenerationError> {
        let exchange = recent
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let answer = self
            .generator
            .generate(prompts::AGREEMENT_SYSTEM, &prompts::agreement_query(&exchange))
            .await?;
        let answer = clean_response(&answer).to_uppercase();

        if answer.starts_with("ACCEPT") {
            return Ok(Verdict::Accept);
        }
        if answer.starts_with("REJECT") {
            return Ok(Verdict::Reject);
        }

        let lower = exchange.to_lowercase();
        if FALLBACK_REJECT_PHRASES.iter().any(|p| lower.contains(p)) {
            tracing::debug!("Agreement model undecided ({}), rejection phrase found", answer);
            return Ok(Verdict::Reject);
        }
        Ok(Verdict::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Speaker;
    use std::sync::Mutex;

    fn turn(speaker: Speaker, text: &str) -> Turn {
        Turn {
            speaker,
            text: text.to_string(),
            round: 1,
        }
    }

    struct FixedGenerator {
        answer: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(&self, _system: &str, user: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(user.to_string());
            Ok(self.answer.clone())
        }
    }

    fn model_policy(answer: &str) -> (ModelPolicy, Arc<FixedGenerator>) {
        let generator = Arc::new(FixedGenerator {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        (ModelPolicy::new(generator.clone()), generator)
    }

    #[test]
    fn test_keyword_accept() {
        let turns = [
            turn(Speaker::Mentor, "I can guide you through ML research."),
            turn(Speaker::Mentee, "That sounds good, I'd love to work with you."),
        ];
        assert_eq!(KeywordPolicy.evaluate(&turns), Verdict::Accept);
    }

    #[test]
    fn test_keyword_reject() {
        let turns = [
            turn(Speaker::Mentor, "I mostly teach painting."),
            turn(Speaker::Mentee, "Honestly this is not a good fit, I'll pass."),
        ];
        assert_eq!(KeywordPolicy.evaluate(&turns), Verdict::Reject);
    }

    #[test]
    fn test_keyword_tie_rejects() {
        // one positive ("perfect"), one negative ("not for me")
        let turns = [turn(Speaker::Mentee, "Your background is perfect but it's not for me.")];
        assert_eq!(KeywordPolicy.evaluate(&turns), Verdict::Reject);
    }

    #[test]
    fn test_keyword_continue_without_signal() {
        let turns = [turn(Speaker::Mentee, "What projects have you supervised?")];
        assert_eq!(KeywordPolicy.evaluate(&turns), Verdict::Continue);
    }

    #[test]
    fn test_recent_turns_window() {
        let turns: Vec<Turn> = (0..5).map(|i| turn(Speaker::Mentor, &i.to_string())).collect();
        let recent = recent_turns(&turns, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "3");
        assert_eq!(recent_turns(&turns[..1], 4).len(), 1);
    }

    #[tokio::test]
    async fn test_model_policy_parses_answer() {
        let turns = [turn(Speaker::Mentee, "I want to work with you.")];

        let (policy, generator) = model_policy("ACCEPT");
        assert_eq!(policy.classify(&turns).await.unwrap(), Verdict::Accept);
        assert!(generator.prompts.lock().unwrap()[0].contains("I want to work with you."));

        let (policy, _) = model_policy("  reject.");
        assert_eq!(policy.classify(&turns).await.unwrap(), Verdict::Reject);
    }

    #[tokio::test]
    async fn test_model_policy_undecided_never_accepts() {
        let turns = [turn(Speaker::Mentee, "Tell me more about your research.")];
        let (policy, _) = model_policy("UNDECIDED");
        assert_eq!(policy.classify(&turns).await.unwrap(), Verdict::Continue);
    }

    #[tokio::test]
    async fn test_model_policy_falls_back_to_rejection_scan() {
        let turns = [turn(Speaker::Mentee, "Sorry, I'm not interested in that area.")];
        let (policy, _) = model_policy("maybe");
        assert_eq!(policy.classify(&turns).await.unwrap(), Verdict::Reject);
    }
}
