use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use murmur_types::validation::FieldError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => Self::Validation(vec![data_error(&e.body_text())]),
            other => Self::BadRequest(other.body_text()),
        }
    }
}

/// Turn a body deserialization failure into a field error. The rejection text
/// reads `<prefix>: <path>: <message> at line L column C`, where the path is
/// absent for errors at the document root.
fn data_error(text: &str) -> FieldError {
    let detail = text.split_once(": ").map_or(text, |(_, rest)| rest);
    let (path, message) = match detail.split_once(": ") {
        Some((path, message)) if !path.contains(char::is_whitespace) => (split_path(path), message),
        _ => (Vec::new(), detail),
    };
    let message = message.rsplit_once(" at line ").map_or(message, |(m, _)| m);
    FieldError::at(path, "invalid_type", message)
}

/// `mentionedUserIds[1]` → `["mentionedUserIds", "1"]`.
fn split_path(path: &str) -> Vec<String> {
    path.split(['.', '[', ']'])
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation(errors) => {
                warn!(fields = errors.len(), "Rejected invalid request");
                (status, Json(json!({ "error": errors }))).into_response()
            }
            Self::Internal(ref e) => {
                // Details stay in the log; the client gets the generic message.
                error!("Request failed: {:#}", e);
                (status, Json(json!({ "error": self.to_string() }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}
