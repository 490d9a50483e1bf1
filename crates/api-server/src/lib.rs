//! HTTP surface for the market pulse service.

use axum::{
    body::Body,
    http::{HeaderValue, Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use fmp_client::FmpClient;
use gemini_client::{GeminiClient, GeminiConfig};
use pulse_core::PulseError;
use pulse_orchestrator::{PulseCache, PulseOrchestrator};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
mod health_routes;
mod pulse_routes;
pub mod request_id;

pub use config::PulseConfig;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PulseOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<PulseOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Real upstream clients plus a fresh cache, as configured.
    pub fn from_config(config: &PulseConfig) -> anyhow::Result<Self> {
        let fmp = FmpClient::with_base_url(
            config.fmp_api_key.clone(),
            config.fmp_base_url.clone(),
            config.upstream_timeout,
        )?;

        let gemini = GeminiClient::new(GeminiConfig {
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_base_url.clone(),
            model: config.gemini_model.clone(),
            timeout: config.upstream_timeout,
        })?;

        let cache = Arc::new(PulseCache::new(config.cache_ttl()?, config.cache_capacity));

        Ok(Self::new(Arc::new(PulseOrchestrator::with_clients(
            fmp, gemini, cache,
        ))))
    }
}

/// Error returned by handlers; always rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum AppError {
    Pulse(PulseError),
}

impl From<PulseError> for AppError {
    fn from(err: PulseError) -> Self {
        AppError::Pulse(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Pulse(PulseError::Validation { input }) => {
                tracing::debug!("Rejected ticker {:?}", input);
                (StatusCode::BAD_REQUEST, "Invalid ticker format.".to_string())
            }
            AppError::Pulse(err) => {
                tracing::error!("Market pulse failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .merge(pulse_routes::pulse_routes())
        .merge(health_routes::health_routes())
        .with_state(state)
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(cors_layer(allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "api_server=info,pulse_orchestrator=info,fmp_client=info,gemini_client=info,tower_http=info"
            .into()
    });

    if json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = PulseConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  History/news provider: {}", config.fmp_base_url);
    tracing::info!("  Sentiment model: {} ({})", config.gemini_model, config.gemini_base_url);
    tracing::info!("  Upstream timeout: {}s", config.upstream_timeout.as_secs());
    tracing::info!(
        "  Cache: ttl {}s, capacity {}",
        config.cache_ttl_secs,
        config.cache_capacity
    );

    let state = AppState::from_config(&config)?;
    let app = build_router(state, &config.allowed_origins);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Market pulse API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
