//! Unified error type for the event interface.

use thiserror::Error;

/// All variants carry plain strings so the enum stays `Clone` — a single
/// computation outcome is fanned out to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(String),

    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    #[error("Coordinator error: {0}")]
    Coordinator(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Computation failed: {0}")]
    Compute(String),
}
