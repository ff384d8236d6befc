use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use streamchat_protocol::ErrorResponse;
use thiserror::Error;

use crate::chat::ChatError;
use crate::engine::EngineError;

/// Failures reported before a stream is opened.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("failed to start reasoning engine")]
    EngineStart(String),

    #[error("internal error")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::BadRequest(_) => None,
            ApiError::EngineStart(details) | ApiError::Internal(details) => Some(details.clone()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            ChatError::EngineStart(EngineError::Start(msg)) => ApiError::EngineStart(msg),
            ChatError::EngineStart(other) => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::EngineStart(_) => (StatusCode::BAD_GATEWAY, "ENGINE_START_FAILED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_errors_map_to_status() {
        let cases = [
            (ChatError::InvalidRequest("query is required".into()), StatusCode::BAD_REQUEST),
            (
                ChatError::EngineStart(EngineError::Start("upstream 401".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ChatError::EngineStart(EngineError::Model("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_body_shape() {
        let response = ApiError::EngineStart("upstream 401".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, "ENGINE_START_FAILED");
        assert_eq!(body.details.as_deref(), Some("upstream 401"));
    }
}
