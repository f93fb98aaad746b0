use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    RunStopped,
    Validation,
    Unavailable,
    Internal,
}

impl ErrorCode {
    pub fn from_http_status(status: u16) -> Self {
        match status {
            404 => Self::NotFound,
            409 => Self::RunStopped,
            400 | 422 => Self::Validation,
            502..=504 => Self::Unavailable,
            _ => Self::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    /// Builds an error from a robot-server `{"errors": [...]}` body, falling
    /// back to the raw body text when it is not in that shape.
    pub fn from_response(status: u16, body: &str) -> Self {
        let code = ErrorCode::from_http_status(status);
        let message = serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(|response| response.errors.into_iter().next())
            .map(|detail| detail.detail.unwrap_or(detail.title))
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("robot server responded with status {status}")
                } else {
                    trimmed.to_string()
                }
            });
        Self { code, message }
    }
}

#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ApiException {
    pub code: ErrorCode,
    pub message: String,
}

impl From<ApiError> for ApiException {
    fn from(value: ApiError) -> Self {
        Self {
            code: value.code,
            message: value.message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}
