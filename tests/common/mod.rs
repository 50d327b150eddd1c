// Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use mentor_match::core::prompts::DECISION_SYSTEM;
use mentor_match::models::Profile;
use mentor_match::services::{Embedder, EmbeddingError, GenerationError, Generator};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

const DIMENSIONS: usize = 64;

/// Hashes each word into one of 64 buckets
pub struct BagOfWordsEmbedder;

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; DIMENSIONS];
                for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
                    let mut hasher = DefaultHasher::new();
                    word.to_lowercase().hash(&mut hasher);
                    vector[hasher.finish() as usize % DIMENSIONS] += 1.0;
                }
                vector
            })
            .collect())
    }
}

pub const MENTOR_LINE: &str = "Here is how my background could help with your goals.";
pub const MENTEE_ACCEPT: &str = "Sounds good, I'd love to work with you.";
pub const MENTEE_REJECT: &str = "Sorry, this is not a good fit for me.";

/// Plays both sides of a negotiation.
///
/// Mentor turns are neutral. Mentee turns accept exactly the
/// (mentee name, mentor name) pairs listed in `accepted` and reject the rest.
/// Decision requests get `decision_reply`.
pub struct PairGenerator {
    accepted: HashSet<(String, String)>,
    decision_reply: String,
    pub calls: AtomicUsize,
    pub decision_calls: AtomicUsize,
}

impl PairGenerator {
    pub fn new(accepted: &[(&str, &str)], decision_reply: &str) -> Self {
        Self {
            accepted: accepted
                .iter()
                .map(|(mentee, mentor)| (mentee.to_string(), mentor.to_string()))
                .collect(),
            decision_reply: decision_reply.to_string(),
            calls: AtomicUsize::new(0),
            decision_calls: AtomicUsize::new(0),
        }
    }
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let (_, rest) = text.split_once(start)?;
    let (value, _) = rest.split_once(end)?;
    Some(value)
}

#[async_trait]
impl Generator for PairGenerator {
    async fn generate(&self, system_prompt: &str, _user_prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if system_prompt == DECISION_SYSTEM {
            self.decision_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(self.decision_reply.clone());
        }

        let mentee = between(system_prompt, "You are ", ", a mentee");
        let mentor = between(system_prompt, "You're talking to ", ", a potential mentor");
        match (mentee, mentor) {
            (Some(mentee), Some(mentor)) => {
                if self.accepted.contains(&(mentee.to_string(), mentor.to_string())) {
                    Ok(MENTEE_ACCEPT.to_string())
                } else {
                    Ok(MENTEE_REJECT.to_string())
                }
            }
            _ => Ok(MENTOR_LINE.to_string()),
        }
    }
}

/// Fails every call
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Request("connection refused".to_string()))
    }
}

pub fn profile(name: &str, hobbies: &[&str], mbti: &str, career: &[&str]) -> Profile {
    Profile {
        name: name.to_string(),
        hobbies: hobbies.iter().map(|s| s.to_string()).collect(),
        mbti: mbti.to_string(),
        career_interests: career.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}
