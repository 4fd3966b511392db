use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream reported {code}: {message}")]
    Api { code: String, message: String },

    #[error("Failed to fetch school list")]
    NoSchools,
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Completion returned no choices")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Secret {0} is not set")]
    MissingSecret(String),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    #[error("Invalid reaction type: {0}")]
    InvalidReaction(String),

    #[error("Review unavailable")]
    NotFound,

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::InvalidDate(_) | AppError::InvalidReaction(_) => {
                warn!("Rejected request: {self}");
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Upstream(_) | AppError::Store(_) | AppError::Io(_) => {
                error!("Request failed: {self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
