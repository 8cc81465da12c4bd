//! HTTP routes for remote analysis.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use super::download::download_to_temp;
use super::types::{AnalyzeRequest, AnalyzeResponse, ErrorResponse, HealthResponse};
use crate::error::{Result, SentimentError};
use crate::pipeline::Analyzer;

/// Builds the analyzer; invoked at startup and again per request until it succeeds
pub type AnalyzerLoader = Arc<dyn Fn() -> Result<Analyzer> + Send + Sync>;

/// Shared state for the analysis server
#[derive(Clone)]
pub struct AppState {
    analyzer: Arc<Mutex<Option<Arc<Analyzer>>>>,
    loader: AnalyzerLoader,
    http: reqwest::Client,
    download_dir: PathBuf,
}

impl AppState {
    /// State with nothing loaded yet
    pub fn new(loader: AnalyzerLoader) -> Self {
        Self {
            analyzer: Arc::new(Mutex::new(None)),
            loader,
            http: reqwest::Client::new(),
            download_dir: std::env::temp_dir(),
        }
    }

    /// Put downloaded audio in `dir` instead of the system temp directory
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Attempt the initial load; failure is logged and retried on the next request
    pub async fn preload(&self) -> bool {
        match self.analyzer().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Model not loaded at startup: {}", e);
                false
            }
        }
    }

    /// Loaded analyzer, loading it first if needed
    pub async fn analyzer(&self) -> Result<Arc<Analyzer>> {
        let mut slot = self.analyzer.lock().await;
        if let Some(analyzer) = slot.as_ref() {
            return Ok(analyzer.clone());
        }

        let loader = self.loader.clone();
        let analyzer = tokio::task::spawn_blocking(move || loader())
            .await
            .map_err(|e| SentimentError::ModelLoad(format!("Loader task failed: {}", e)))??;

        let analyzer = Arc::new(analyzer);
        *slot = Some(analyzer.clone());
        info!("Model loaded for serving");
        Ok(analyzer)
    }

    /// Whether the analyzer is loaded; false while a load is in progress
    pub fn is_loaded(&self) -> bool {
        self.analyzer
            .try_lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

/// Router with `/analyze`, `/health` and permissive CORS
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/health", get(health_endpoint))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind `addr` and serve until Ctrl+C
pub async fn start_server(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Analysis server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl+C, shutting down server...");
        })
        .await
}

async fn health_endpoint(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        model_loaded: state.is_loaded(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// `application/json` or any `application/*+json` media type
fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let analyzer = match state.analyzer().await {
        Ok(analyzer) => analyzer,
        Err(e) => {
            error!("Model unavailable: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    if !is_json(&headers) {
        return error_response(StatusCode::BAD_REQUEST, "Request must be JSON");
    }

    let request: AnalyzeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Request must be JSON"),
    };

    let Some(url) = request.audio_url() else {
        return error_response(StatusCode::BAD_REQUEST, "No audio_url provided");
    };

    info!("Analyzing audio from {}", url);

    match analyze_url(&state.http, analyzer, url, &state.download_dir).await {
        Ok(response) => {
            info!(
                "Analysis complete: {} ({:.1}%)",
                response.emotion,
                response.confidence * 100.0
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            if e.is_input_error() {
                warn!("Could not analyze {}: {}", url, e);
            } else {
                error!("Analysis of {} failed: {}", url, e);
            }
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn analyze_url(
    client: &reqwest::Client,
    analyzer: Arc<Analyzer>,
    url: &str,
    dir: &Path,
) -> Result<AnalyzeResponse> {
    let file = download_to_temp(client, url, dir).await?;

    // Temp file is removed when `file` drops at the end of the task
    let result = tokio::task::spawn_blocking(move || analyzer.analyze_file(file.path()))
        .await
        .map_err(|e| SentimentError::Analysis(format!("Analysis task failed: {}", e)))??;

    Ok(result.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_content_type(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_is_json() {
        assert!(is_json(&with_content_type("application/json")));
        assert!(is_json(&with_content_type("Application/JSON; charset=utf-8")));
        assert!(is_json(&with_content_type("application/vnd.api+json")));

        assert!(!is_json(&with_content_type("text/plain")));
        assert!(!is_json(&with_content_type("application/x-www-form-urlencoded")));
        assert!(!is_json(&HeaderMap::new()));
    }
}
