//! HTTP interface for analyzing remote audio.
//!
//! ## Endpoints
//!
//! - `POST /analyze` with `{"audio_url": "..."}` downloads the file, runs the
//!   single-shot pipeline and answers `{emotion, confidence, emotion_scores}`.
//!   Bad requests get 400, model or analysis failures 500, both as
//!   `{"error": "..."}`.
//! - `GET /health` reports liveness and whether the model is loaded.
//!
//! The model is loaded once and shared by all requests. If loading fails at
//! startup the server still comes up and retries on the next request.

mod download;
mod routes;
mod types;

pub use download::download_to_temp;
pub use routes::{build_router, start_server, AnalyzerLoader, AppState};
pub use types::{AnalyzeRequest, AnalyzeResponse, ErrorResponse, HealthResponse};
