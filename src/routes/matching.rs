use actix_web::{web, HttpResponse, Responder};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use validator::Validate;

use crate::config::{DecisionPolicy, MatchingSettings};
use crate::core::{
    AgreementPolicy, CompatibilityScorer, DecisionArbiter, KeywordPolicy, MatchCoordinator,
    MatchingSystem, ModelPolicy, NegotiationEngine, ProgressEvent, ProgressSink,
};
use crate::models::{Agent, ErrorResponse, HealthResponse, RunMatchingRequest, ScoreRequest};
use crate::services::{CachedEmbedder, Generator, HttpEmbedder, ProfileSourceClient, ProfileSourceError};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn Generator>,
    pub scorer: CompatibilityScorer,
    pub profiles: Arc<ProfileSourceClient>,
    pub matching: MatchingSettings,
    pub stream_generation: bool,
    pub embedding_cache: Option<Arc<CachedEmbedder<HttpEmbedder>>>,
}

/// Per-request overrides of the configured matching settings
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOverrides {
    pub top_n: Option<usize>,
    pub max_rounds: Option<u32>,
}

impl AppState {
    fn policy(&self) -> Arc<dyn AgreementPolicy> {
        match self.matching.decision_policy {
            DecisionPolicy::Keyword => Arc::new(KeywordPolicy),
            DecisionPolicy::Model => Arc::new(ModelPolicy::new(self.generator.clone())),
        }
    }

    /// Wire a coordinator over `system` using configured settings
    pub fn coordinator(&self, system: MatchingSystem, overrides: RunOverrides) -> MatchCoordinator {
        let mut negotiation = self.matching.negotiation(self.stream_generation);
        if let Some(max_rounds) = overrides.max_rounds {
            negotiation.max_rounds = max_rounds;
        }
        let mut coordinator_config = self.matching.coordinator();
        if let Some(top_n) = overrides.top_n {
            coordinator_config.top_n = top_n;
        }

        let engine = NegotiationEngine::new(self.generator.clone(), self.policy(), negotiation);
        let arbiter = DecisionArbiter::new(self.generator.clone(), self.matching.turn_timeout());
        MatchCoordinator::new(system, engine, arbiter, coordinator_config)
    }

    fn system_from_request(&self, req: &RunMatchingRequest) -> MatchingSystem {
        let mut system = MatchingSystem::new(self.scorer.clone());
        for mentor in &req.mentors {
            system.add_agent(Agent::mentor(
                mentor.id.clone(),
                mentor.profile.clone(),
                mentor.capacity.unwrap_or(self.matching.default_capacity),
            ));
        }
        for mentee in &req.mentees {
            system.add_agent(Agent::mentee(mentee.id.clone(), mentee.profile.clone()));
        }
        system
    }

    /// Mentor pool plus the newest onboarded mentee from the profile source
    pub async fn newest_pool(&self) -> Result<MatchingSystem, ProfileSourceError> {
        let (mentors, mentee) = tokio::try_join!(
            self.profiles.fetch_mentors(),
            self.profiles.fetch_newest_mentee()
        )?;

        let mut system = MatchingSystem::new(self.scorer.clone());
        for record in mentors {
            system.add_agent(record.into_agent(self.matching.default_capacity));
        }
        system.add_agent(mentee.into_agent());
        Ok(system)
    }
}

/// Configure all matching routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/matching/run", web::post().to(run_matching))
        .route("/matching/score", web::post().to(score_pair))
        .route("/matching/newest", web::post().to(match_newest))
        .route("/matching/stream/{session_id}", web::get().to(stream_matching));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    if let Some(cache) = &state.embedding_cache {
        tracing::debug!("Embedding cache entries: {}", cache.stats().entries);
    }

    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Run matching over an explicit pool
///
/// POST /api/v1/matching/run
///
/// Request body:
/// ```json
/// {
///   "mentors": [{"id": "m1", "capacity": 2, "profile": {...}}],
///   "mentees": [{"id": "s1", "profile": {...}}],
///   "topN": 2,
///   "maxRounds": 10
/// }
/// ```
async fn run_matching(state: web::Data<AppState>, req: web::Json<RunMatchingRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for run_matching request: {:?}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    tracing::info!(
        "Running matching for {} mentees over {} mentors",
        req.mentees.len(),
        req.mentors.len()
    );

    let system = state.system_from_request(&req);
    let overrides = RunOverrides {
        top_n: req.top_n,
        max_rounds: req.max_rounds,
    };
    let report = state.coordinator(system, overrides).run().await;

    HttpResponse::Ok().json(report)
}

/// Score one mentor/mentee pair
///
/// POST /api/v1/matching/score
async fn score_pair(state: web::Data<AppState>, req: web::Json<ScoreRequest>) -> impl Responder {
    let breakdown = state.scorer.score(&req.mentor, &req.mentee).await;
    tracing::debug!("Scored pair: {:?}", breakdown);
    HttpResponse::Ok().json(breakdown)
}

/// Match the newest onboarded mentee against the stored mentor pool
///
/// POST /api/v1/matching/newest
async fn match_newest(state: web::Data<AppState>) -> impl Responder {
    let system = match state.newest_pool().await {
        Ok(system) => system,
        Err(e) => {
            tracing::error!("Failed to load profiles for matching: {}", e);
            return profile_source_error(e);
        }
    };

    let report = state.coordinator(system, RunOverrides::default()).run().await;
    HttpResponse::Ok().json(report)
}

fn profile_source_error(e: ProfileSourceError) -> HttpResponse {
    match e {
        ProfileSourceError::NotFound(_) => HttpResponse::NotFound().json(ErrorResponse {
            error: "Profiles not found".to_string(),
            message: e.to_string(),
            status_code: 404,
        }),
        _ => HttpResponse::BadGateway().json(ErrorResponse {
            error: "Failed to load profiles".to_string(),
            message: e.to_string(),
            status_code: 502,
        }),
    }
}

/// Match the newest mentee, streaming progress lines as they happen
///
/// GET /api/v1/matching/stream/{session_id}
async fn stream_matching(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let session_id = path.into_inner();
    tracing::info!("Streaming matching session {}", session_id);

    let (sink, receiver) = ProgressSink::channel(state.matching.progress_buffer);
    let task_state = state.get_ref().clone();
    let task_session = session_id.clone();
    tokio::spawn(async move {
        match task_state.newest_pool().await {
            Ok(system) => {
                let report = task_state
                    .coordinator(system, RunOverrides::default())
                    .with_progress(sink)
                    .run()
                    .await;
                tracing::info!("Session {} finished run {}", task_session, report.run_id);
            }
            Err(e) => {
                tracing::error!("Session {} could not load profiles: {}", task_session, e);
                sink.emit(ProgressEvent::Failed {
                    message: e.to_string(),
                });
            }
        }
    });

    let body = stream::once(async move { format!("[session {}] streaming started\n", session_id) })
        .chain(ReceiverStream::new(receiver).map(|event| event.render()))
        .chain(stream::once(async { "[done]\n".to_string() }))
        .map(|line| Ok::<_, actix_web::Error>(web::Bytes::from(line)));

    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .streaming(body)
}
