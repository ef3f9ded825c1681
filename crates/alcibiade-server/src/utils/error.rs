use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::ask_service::AskError;

/// Persona-flavored text returned alongside a validation error
pub const EMPTY_PROMPT_REPLY: &str = "Ah... *soupir* Vous ne m'avez rien demandé... *hic*";
pub const METHOD_NOT_ALLOWED_REPLY: &str = "Va-t'en, connard. *hic*";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Prompt is required")]
    PromptRequired,

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    response: String,
}

impl From<AskError> for ApiError {
    fn from(err: AskError) -> Self {
        match err {
            AskError::EmptyPrompt => ApiError::PromptRequired,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.to_string();
        let (status, reply) = match self {
            ApiError::PromptRequired => {
                tracing::warn!("Rejected ask without prompt");
                (StatusCode::BAD_REQUEST, EMPTY_PROMPT_REPLY)
            }
            ApiError::BadRequest(ref msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, EMPTY_PROMPT_REPLY)
            }
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_REPLY),
        };

        let body = Json(ErrorResponse {
            error,
            response: reply.to_string(),
        });

        (status, body).into_response()
    }
}
