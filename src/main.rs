use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use mentor_match::config::Settings;
use mentor_match::core::CompatibilityScorer;
use mentor_match::routes::{self, AppState};
use mentor_match::services::{CachedEmbedder, Embedder, Generator, HttpEmbedder, OpenAiChatClient, ProfileSourceClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn config_error(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(config_error(e));
        }
    };

    init_logging(&settings.logging.level, &settings.logging.format);
    info!("Starting mentor matching service...");

    let weights = settings.scoring.weights.to_weights().map_err(|e| {
        error!("Invalid scoring weights: {}", e);
        config_error(e)
    })?;

    let http_embedder = HttpEmbedder::new(
        settings.embedding.endpoint.clone(),
        settings.embedding.api_key.clone(),
        settings.embedding.model.clone(),
        Duration::from_secs(settings.embedding.timeout_secs),
    )
    .map_err(|e| {
        error!("Failed to build embedding client: {}", e);
        config_error(e)
    })?;
    let embedding_cache = Arc::new(CachedEmbedder::new(
        http_embedder,
        settings.cache.embedding_cache_size,
        settings.cache.ttl_secs,
    ));
    info!(
        "Embedding client initialized ({} via {}, cache: {} entries, TTL: {}s)",
        settings.embedding.model,
        settings.embedding.endpoint,
        settings.cache.embedding_cache_size,
        settings.cache.ttl_secs
    );

    if settings.generation.api_key.is_none() {
        tracing::warn!("No generation API key configured; requests will be sent unauthenticated");
    }
    let generator: Arc<dyn Generator> = Arc::new(
        OpenAiChatClient::new(
            settings.generation.endpoint.clone(),
            settings.generation.api_key.clone(),
            settings.generation.model.clone(),
            settings.generation.temperature,
            Duration::from_secs(settings.generation.timeout_secs),
        )
        .map_err(|e| {
            error!("Failed to build generation client: {}", e);
            config_error(e)
        })?,
    );
    info!(
        "Generation client initialized ({}, streaming: {})",
        settings.generation.model, settings.generation.stream
    );

    let profiles = Arc::new(
        ProfileSourceClient::new(
            settings.profile_source.base_url.clone(),
            Duration::from_secs(settings.profile_source.timeout_secs),
        )
        .map_err(|e| {
            error!("Failed to build profile source client: {}", e);
            config_error(e)
        })?,
    );

    let embedder: Arc<dyn Embedder> = embedding_cache.clone();
    let scorer = CompatibilityScorer::new(embedder, weights);
    info!("Scorer initialized with weights: {:?}", weights);

    let app_state = AppState {
        generator,
        scorer,
        profiles,
        matching: settings.matching.clone(),
        stream_generation: settings.generation.stream,
        embedding_cache: Some(embedding_cache),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
