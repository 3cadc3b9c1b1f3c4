use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Query};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use kbchat_core::deadline::cancel_pair;
use kbchat_core::types::ChatRequest;
use kbchat_pipeline::{ChatReply, Pipeline};

use crate::error::AppError;

const MESSAGE_REQUIRED: &str = "Message is required and must be a string";

fn optional_str(value: Option<&Value>) -> Option<String> { value.and_then(Value::as_str).map(str::to_string) }

/// Validate a `POST /api/chat` body.
///
/// The body is inspected as raw JSON so every malformed shape maps to a 400
/// with a message instead of an extractor rejection.
pub fn parse_chat_body(body: &[u8]) -> Result<ChatRequest, AppError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| AppError::BadRequest("Invalid JSON body".to_string()))?;
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest(MESSAGE_REQUIRED.to_string()))?;
    let channel = optional_str(value.get("meta").and_then(|m| m.get("channel")));
    Ok(ChatRequest::new(message)?
        .with_language_hint(optional_str(value.get("lang")))
        .with_session_id(optional_str(value.get("sessionId")))
        .with_channel(channel))
}

/// Run the turn on its own task. If this future is dropped (client gone), the
/// cancel handle drops with it and the task's in-flight call stops.
async fn run_turn(pipeline: Arc<Pipeline>, request: ChatRequest) -> Result<ChatReply, AppError> {
    let (_cancel, signal) = cancel_pair();
    let task = tokio::spawn(async move { pipeline.handle(&request, &signal).await });
    match task.await {
        Ok(outcome) => Ok(outcome?),
        Err(join) => Err(AppError::Internal(format!("pipeline task failed: {join}"))),
    }
}

pub async fn post_chat(Extension(pipeline): Extension<Arc<Pipeline>>, body: Bytes) -> Result<Json<ChatReply>, AppError> {
    let request = parse_chat_body(&body)?;
    Ok(Json(run_turn(pipeline, request).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    message: Option<String>,
    lang: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

pub async fn get_chat(
    Extension(pipeline): Extension<Arc<Pipeline>>,
    params: Result<Query<ChatParams>, QueryRejection>,
) -> Result<Json<ChatReply>, AppError> {
    let Query(params) = params.map_err(|rejection| AppError::BadRequest(format!("Invalid query string: {}", rejection.body_text())))?;
    let message = params.message.ok_or_else(|| AppError::BadRequest("Message parameter is required".to_string()))?;
    let request = ChatRequest::new(message)?.with_language_hint(params.lang).with_session_id(params.session_id);
    Ok(Json(run_turn(pipeline, request).await?))
}

pub async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }
