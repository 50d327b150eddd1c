use std::sync::Arc;

use crate::core::similarity::{cosine_similarity, mean_pool, split_sentences};
use crate::models::{Profile, ScoreBreakdown, ScoringWeights};
use crate::services::Embedder;

/// Scores a mentor/mentee pair from their profiles.
///
/// Scoring formula:
/// ```text
/// interpersonal = interests * interest_similarity + mbti * mbti_similarity
/// professional  = similarity(mentor career + jobs, mentee career + coursework)
/// final         = min(interpersonal_weight * interpersonal, 1)
///               + min(professional_weight  * professional,  1)
/// ```
/// Each term is capped on its own before the sum.
#[derive(Clone)]
pub struct CompatibilityScorer {
    embedder: Arc<dyn Embedder>,
    weights: ScoringWeights,
}

impl CompatibilityScorer {
    pub fn new(embedder: Arc<dyn Embedder>, weights: ScoringWeights) -> Self {
        Self { embedder, weights }
    }

    pub fn with_default_weights(embedder: Arc<dyn Embedder>) -> Self {
        Self::new(embedder, ScoringWeights::default())
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub async fn score(&self, mentor: &Profile, mentee: &Profile) -> ScoreBreakdown {
        let interpersonal = self.interpersonal_score(mentor, mentee).await;
        let professional = self.professional_score(mentor, mentee).await;

        let final_score = (self.weights.interpersonal * interpersonal).min(1.0)
            + (self.weights.professional * professional).min(1.0);

        ScoreBreakdown {
            final_score,
            interpersonal,
            professional,
        }
    }

    async fn interpersonal_score(&self, mentor: &Profile, mentee: &Profile) -> f64 {
        let interest = self
            .semantic_similarity(&mentor.interest_text(), &mentee.interest_text())
            .await;
        let mbti = mbti_similarity(&mentor.mbti, &mentee.mbti);

        self.weights.interests * interest + self.weights.mbti * mbti
    }

    async fn professional_score(&self, mentor: &Profile, mentee: &Profile) -> f64 {
        self.semantic_similarity(
            &mentor.mentor_professional_text(),
            &mentee.mentee_professional_text(),
        )
        .await
    }

    /// Cosine similarity of the mean-pooled embeddings of two text groups.
    ///
    /// An empty side scores 0. Embedding failures are logged and also score 0.
    pub async fn semantic_similarity(&self, left: &[String], right: &[String]) -> f64 {
        if left.is_empty() || right.is_empty() {
            return 0.0;
        }

        let left = split_sentences(left);
        let right = split_sentences(right);
        if left.is_empty() || right.is_empty() {
            return 0.0;
        }

        let (left_vectors, right_vectors) =
            match tokio::try_join!(self.embedder.encode(&left), self.embedder.encode(&right)) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("Embedding failed, similarity term set to 0: {}", e);
                    return 0.0;
                }
            };

        match (mean_pool(&left_vectors), mean_pool(&right_vectors)) {
            (Some(a), Some(b)) => cosine_similarity(&a, &b),
            _ => {
                tracing::warn!("Embedding returned unusable vectors, similarity term set to 0");
                0.0
            }
        }
    }
}

/// Fraction of matching letters across the four MBTI positions.
///
/// Case-insensitive. Anything that isn't exactly four characters on both
/// sides scores 0.
pub fn mbti_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.trim().chars().flat_map(char::to_uppercase).collect();
    let b: Vec<char> = b.trim().chars().flat_map(char::to_uppercase).collect();
    if a.len() != 4 || b.len() != 4 {
        return 0.0;
    }

    let shared = a.iter().zip(&b).filter(|(x, y)| x == y).count();
    shared as f64 / 4.0
}
