use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::conversation;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

// POST /api/chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let session_id = req.session_id.trim();
    let message = req.message.trim();
    if session_id.is_empty() || message.is_empty() {
        return Err(AppError::BadRequest(
            "session_id and message are required".to_string(),
        ));
    }

    tracing::info!(session = session_id, "incoming chat message");

    let reply = conversation::process_message(&state, session_id, message).await?;
    Ok(Json(ChatResponse { reply }))
}
