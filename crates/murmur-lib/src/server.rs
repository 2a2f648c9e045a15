//! HTTP API for the murmur TTS server.
//!
//! Runs on `localhost:4003` by default. Two routes, both GET:
//! `/` answers with a static HTML health page, `/generate?text=...`
//! renders the text and answers with the audio in the configured format.
//! Everything else is a 404.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use murmur_core::request::RequestError;
use murmur_core::types::{AudioFormat, HEALTH_BODY};
use murmur_core::wav::AudioClip;

use crate::adapter::{SynthesisAdapter, SynthesisError};
use crate::scratch::{ScratchDir, ScratchError};

/// Everything a handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    adapter: SynthesisAdapter,
    format: AudioFormat,
    scratch: Option<Arc<ScratchDir>>,
}

impl AppState {
    pub fn new(adapter: SynthesisAdapter, format: AudioFormat) -> Self {
        Self {
            adapter,
            format,
            scratch: None,
        }
    }

    /// Stage every rendered body in `scratch` before serving it.
    pub fn with_scratch(mut self, scratch: ScratchDir) -> Self {
        self.scratch = Some(Arc::new(scratch));
        self
    }
}

/// Build the axum router around an initialised engine adapter.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/generate", get(generate))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
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
    info!("shutdown signal received");
}

async fn home() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], HEALTH_BODY)
}

#[derive(serde::Deserialize)]
struct GenerateParams {
    text: Option<String>,
}

async fn generate(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
) -> Result<Response, ApiError> {
    let text = state.adapter.validate(params.text.as_deref())?;
    let clip = state.adapter.synthesize_text(&text).await?;

    let mut bytes = match state.format {
        AudioFormat::Wav => clip.to_wav(),
        AudioFormat::Pcm => clip.to_pcm_bytes(),
    };
    if let Some(scratch) = &state.scratch {
        let staged = scratch.stage(&bytes, state.format.extension()).await?;
        bytes = staged.read().await?;
    }

    let headers = match state.format {
        AudioFormat::Wav => wav_headers(bytes.len()),
        AudioFormat::Pcm => pcm_headers(&clip, bytes.len()),
    };
    Ok((headers, bytes).into_response())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

/// Download-style headers for the WAV variant.
fn wav_headers(len: usize) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::PRAGMA, HeaderValue::from_static("public"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"generated.wav\""),
    );
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/x-wav"));
    headers.insert(
        "content-transfer-encoding",
        HeaderValue::from_static("binary"),
    );
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.append(
        header::CACHE_CONTROL,
        HeaderValue::from_static("must-revalidate, post-check=0, pre-check=0"),
    );
    headers.append(header::CACHE_CONTROL, HeaderValue::from_static("public"));
    headers.insert("content-description", HeaderValue::from_static("wav file"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers
}

/// Raw PCM carries its layout in headers since there is no container.
fn pcm_headers(clip: &AudioClip, len: usize) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(AudioFormat::Pcm.content_type()),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert("x-sample-rate", HeaderValue::from(clip.sample_rate));
    headers.insert("x-channels", HeaderValue::from_static("1"));
    headers
}

#[derive(Debug, Error)]
enum ApiError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Scratch(#[from] ScratchError),
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        ApiError::Synthesis(SynthesisError::Request(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Synthesis(SynthesisError::Request(e)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Synthesis(SynthesisError::Busy) => {
                warn!("rejecting request: {self}");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ApiError::Synthesis(SynthesisError::Timeout(_)) => {
                error!("{self}");
                (StatusCode::GATEWAY_TIMEOUT, self.to_string())
            }
            ApiError::Synthesis(SynthesisError::Engine(e)) => {
                error!("engine failure: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "speech synthesis failed".to_string())
            }
            ApiError::Scratch(e) => {
                error!("{e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "speech synthesis failed".to_string())
            }
        };
        (status, message).into_response()
    }
}
