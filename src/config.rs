use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::{CoordinatorConfig, NegotiationConfig};
use crate::models::ScoringWeights;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub generation: GenerationSettings,
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    pub profile_source: ProfileSourceSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_embedding_cache_size")]
    pub embedding_cache_size: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            embedding_cache_size: default_embedding_cache_size(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileSourceSettings {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// How agreement is detected during negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionPolicy {
    Keyword,
    Model,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_min_turns_before_decision")]
    pub min_turns_before_decision: usize,
    #[serde(default = "default_decision_policy")]
    pub decision_policy: DecisionPolicy,
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
    #[serde(default = "default_mentee_concurrency")]
    pub mentee_concurrency: usize,
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
    #[serde(default = "default_capacity")]
    pub default_capacity: u32,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            max_rounds: default_max_rounds(),
            min_turns_before_decision: default_min_turns_before_decision(),
            decision_policy: default_decision_policy(),
            turn_timeout_secs: default_turn_timeout_secs(),
            mentee_concurrency: default_mentee_concurrency(),
            progress_buffer: default_progress_buffer(),
            default_capacity: default_capacity(),
        }
    }
}

impl MatchingSettings {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn negotiation(&self, stream: bool) -> NegotiationConfig {
        NegotiationConfig {
            max_rounds: self.max_rounds,
            min_turns_before_decision: self.min_turns_before_decision,
            turn_timeout: self.turn_timeout(),
            stream,
        }
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            top_n: self.top_n,
            mentee_concurrency: self.mentee_concurrency,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_interpersonal_weight")]
    pub interpersonal: f64,
    #[serde(default = "default_professional_weight")]
    pub professional: f64,
    #[serde(default = "default_interests_weight")]
    pub interests: f64,
    #[serde(default = "default_mbti_weight")]
    pub mbti: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            interpersonal: default_interpersonal_weight(),
            professional: default_professional_weight(),
            interests: default_interests_weight(),
            mbti: default_mbti_weight(),
        }
    }
}

impl WeightsConfig {
    /// Validated scoring weights
    pub fn to_weights(&self) -> Result<ScoringWeights, ConfigError> {
        let weights = ScoringWeights {
            interpersonal: self.interpersonal,
            professional: self.professional,
            interests: self.interests,
            mbti: self.mbti,
        };
        weights.validate().map_err(ConfigError::Message)?;
        Ok(weights)
    }
}

fn default_interpersonal_weight() -> f64 { 0.4 }
fn default_professional_weight() -> f64 { 0.6 }
fn default_interests_weight() -> f64 { 0.7 }
fn default_mbti_weight() -> f64 { 0.3 }

fn default_temperature() -> f32 { 0.7 }
fn default_timeout_secs() -> u64 { 30 }
fn default_embedding_cache_size() -> u64 { 10_000 }
fn default_cache_ttl_secs() -> u64 { 3600 }
fn default_top_n() -> usize { 2 }
fn default_max_rounds() -> u32 { 10 }
fn default_min_turns_before_decision() -> usize { 6 }
fn default_decision_policy() -> DecisionPolicy { DecisionPolicy::Keyword }
fn default_turn_timeout_secs() -> u64 { 60 }
fn default_mentee_concurrency() -> usize { 1 }
fn default_progress_buffer() -> usize { 1024 }
fn default_capacity() -> u32 { 3 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

const ENV_PREFIX: &str = "MENTOR_MATCH";

fn environment() -> Environment {
    // e.g., MENTOR_MATCH__SERVER__PORT -> server.port
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Configuration file (config/default.toml)
    /// 2. Local overrides (config/local.toml)
    /// 3. Environment variables (prefixed with MENTOR_MATCH__)
    /// 4. Well-known secret variables (OPENROUTER_API_KEY, EMBEDDING_API_KEY)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment())
            .build()?;

        let settings = substitute_env_vars(settings)?;
        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        let settings = substitute_env_vars(settings)?;
        settings.try_deserialize()
    }
}

/// Overlay API keys from their conventional environment variables
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let generation_key = env::var("OPENROUTER_API_KEY").ok().filter(|k| !k.is_empty());
    let embedding_key = env::var("EMBEDDING_API_KEY").ok().filter(|k| !k.is_empty());

    let mut builder = Config::builder().add_source(settings);
    if let Some(key) = generation_key {
        builder = builder.set_override("generation.api_key", key)?;
    }
    if let Some(key) = embedding_key {
        builder = builder.set_override("embedding.api_key", key)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const MINIMAL: &str = r#"
        [server]
        host = "127.0.0.1"
        port = 8080

        [generation]
        endpoint = "https://openrouter.ai/api/v1"
        model = "moonshotai/kimi-k2"

        [embedding]
        endpoint = "http://localhost:9000/v1"
        model = "all-MiniLM-L6-v2"

        [profile_source]
        base_url = "http://localhost:5000"
    "#;

    fn parse(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_weights() {
        let weights = WeightsConfig::default().to_weights().unwrap();
        assert_eq!(weights, ScoringWeights::default());
    }

    #[test]
    fn test_default_logging() {
        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "json");
    }

    #[test]
    fn test_minimal_file_gets_matching_defaults() {
        let settings = parse(MINIMAL);

        assert_eq!(settings.matching.top_n, 2);
        assert_eq!(settings.matching.max_rounds, 10);
        assert_eq!(settings.matching.min_turns_before_decision, 6);
        assert_eq!(settings.matching.decision_policy, DecisionPolicy::Keyword);
        assert_eq!(settings.matching.default_capacity, 3);
        assert!(!settings.generation.stream);
        assert!(settings.generation.api_key.is_none());
    }

    #[test]
    fn test_overrides_and_invalid_weights() {
        let toml = format!(
            "{}\n[matching]\ndecision_policy = \"model\"\nmentee_concurrency = 4\n\n[scoring.weights]\ninterpersonal = 0.8\n",
            MINIMAL
        );
        let settings = parse(&toml);

        assert_eq!(settings.matching.decision_policy, DecisionPolicy::Model);
        assert_eq!(settings.matching.coordinator().mentee_concurrency, 4);
        assert!(settings.scoring.weights.to_weights().is_err());
    }

    #[test]
    fn test_shipped_defaults_parse() {
        let raw = include_str!("../config/default.toml");
        let value: toml::Value = toml::from_str(raw).unwrap();
        assert_eq!(value["matching"]["top_n"].as_integer(), Some(2));

        let settings = parse(raw);
        assert_eq!(settings.server.port, 8080);
        assert!(settings.scoring.weights.to_weights().is_ok());
    }

    #[test]
    fn test_negotiation_config_from_settings() {
        let matching = MatchingSettings::default();
        let negotiation = matching.negotiation(true);
        assert_eq!(negotiation.max_rounds, 10);
        assert_eq!(negotiation.turn_timeout, Duration::from_secs(60));
        assert!(negotiation.stream);
    }
}
