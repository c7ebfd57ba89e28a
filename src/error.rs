use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

/// Failures that cross the chat HTTP boundary. Tool and transport failures
/// never appear here: they flow back through the conversation as ordinary
/// `{error}` tool results.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Session not found. Create a new session first.")]
    SessionNotFound(Uuid),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Failed to create chat session: {0}")]
    SessionCreation(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    fn status(&self) -> StatusCode {
        match self {
            ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::MissingField(_) => StatusCode::BAD_REQUEST,
            ChatError::SessionCreation(_) | ChatError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({ "error": self.to_string(), "status": "error" }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ChatError::SessionNotFound(Uuid::new_v4()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ChatError::MissingField("message").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChatError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
