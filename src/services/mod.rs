// Service exports
pub mod cache;
pub mod embedding;
pub mod generation;
pub mod profiles;

pub use cache::{CacheKey, CacheStats, CachedEmbedder};
pub use embedding::{Embedder, EmbeddingError, HttpEmbedder};
pub use generation::{
    clean_response, collect_stream, GenerationError, Generator, MarkerFilter, OpenAiChatClient, TextStream,
};
pub use profiles::{MentorRecord, OnboardingDocument, ProfileSourceClient, ProfileSourceError};
