//! HTTP surface.
//!
//! Routes are served both at the root and under `/api`, so the relay
//! references handed out by `/generate-video` can be redeemed directly
//! against this server as well as through a front-end dev proxy.

mod handlers;
mod server;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, GenerationMode};
use crate::error::ProxyError;
use crate::llm::{GeminiConfig, GeminiProvider};
use crate::media::{
    MediaProxy, MockVideoProvider, PollPolicy, VeoConfig, VeoProvider, VideoBackend,
    VideoJobSubmitter,
};
use crate::safety::DomainAllowlist;
use crate::transcript::{TranscriptBackend, TranscriptGenerator};

pub use handlers::{ApiError, ProxyParams};
pub use server::{HttpServer, HttpServerConfig};

/// Path under which finished clips are redeemed.
pub const PROXY_PATH: &str = "/api/proxy-video";

/// Shared, read-only request context.
pub struct AppState {
    pub mode: GenerationMode,
    pub transcripts: TranscriptGenerator,
    pub videos: VideoJobSubmitter,
    pub proxy: MediaProxy,
}

impl AppState {
    /// Wire every component from configuration.
    ///
    /// Provider calls share one HTTP client; the media relay builds its own
    /// so its redirect policy can enforce the relay allowlists.
    pub fn from_config(config: &Config) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("wishing-machine/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let api_key = config.provider.api_key.clone();

        let transcript_backend = match (config.mode, &api_key) {
            (GenerationMode::Mock, _) => TranscriptBackend::Simulated {
                latency: config.mock.latency,
                failure_rate: config.mock.failure_rate,
            },
            (GenerationMode::Live, Some(key)) => {
                let gemini = GeminiConfig::new(key.clone(), &config.provider.text_model)
                    .with_base_url(&config.provider.base_url);
                TranscriptBackend::Live(Arc::new(GeminiProvider::new(client.clone(), gemini)))
            }
            (GenerationMode::Live, None) => {
                tracing::warn!("GEMINI_API_KEY not set: transcripts will use the fallback letter");
                TranscriptBackend::Unconfigured
            }
        };

        let video_backend = match (config.mode, &api_key) {
            (GenerationMode::Mock, _) => VideoBackend::Live(Arc::new(
                MockVideoProvider::new(&config.mock.video_url, config.mock.video_ticks)
                    .with_ttl(config.video.poll_deadline),
            )),
            (GenerationMode::Live, Some(key)) => {
                let veo = VeoConfig::new(key.clone(), &config.provider.video_model)
                    .with_base_url(&config.provider.base_url);
                VideoBackend::Live(Arc::new(VeoProvider::new(client.clone(), veo)))
            }
            (GenerationMode::Live, None) => {
                tracing::warn!("GEMINI_API_KEY not set: video generation requests will be refused");
                VideoBackend::Unconfigured {
                    provider: "veo".to_string(),
                }
            }
        };

        let policy = PollPolicy {
            interval: config.video.poll_interval,
            max_attempts: config.video.max_poll_attempts,
            deadline: config.video.poll_deadline,
        };

        let allowed_hosts = config.proxy_allowed_hosts();
        tracing::info!(
            hosts = ?allowed_hosts,
            redirect_hosts = ?config.proxy.redirect_hosts,
            "Media relay allowlist"
        );
        let proxy = MediaProxy::new(
            DomainAllowlist::new(&allowed_hosts),
            DomainAllowlist::new(&config.proxy.redirect_hosts),
            api_key,
        )?
        .with_chunk_size(config.proxy.chunk_size);

        Ok(Self {
            mode: config.mode,
            transcripts: TranscriptGenerator::new(transcript_backend),
            videos: VideoJobSubmitter::new(video_backend, policy, config.video.duration_seconds)
                .with_proxy_path(PROXY_PATH),
            proxy,
        })
    }
}

fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate-transcript", post(handlers::generate_transcript))
        .route("/generate-video", post(handlers::generate_video))
        .route("/proxy-video", get(handlers::proxy_video))
        .route("/health", get(handlers::health))
}

/// Build the application router with tracing and CORS applied.
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .merge(routes())
        .nest("/api", routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

/// CORS scoped to the configured origins. A literal `*` opens it to all.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
