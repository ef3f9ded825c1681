use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::models::ask::{AskBody, AskResponse};
use crate::services::{AskRequest, AskService, LogStatusSink};
use crate::utils::error::ApiError;

pub async fn ask_handler(
    State(ask_service): State<Arc<AskService>>,
    payload: Result<Json<AskBody>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let start_time = Instant::now();
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let request = AskRequest {
        prompt: body.prompt.unwrap_or_default(),
        document: body.context.unwrap_or_default(),
        selection: body.selection,
        conversation_id: body.conversation_id,
        config: body.config,
    };

    info!(
        "Ask request: prompt_len={}, document_len={}, has_selection={}",
        request.prompt.len(),
        request.document.len(),
        request.selection.is_some()
    );

    let answer = ask_service.ask(request, &LogStatusSink).await?;

    info!(
        conversation_id = %answer.conversation_id,
        source = ?answer.source,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Ask completed"
    );

    Ok(Json(AskResponse {
        response: answer.text,
    }))
}

/// CORS preflight
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
