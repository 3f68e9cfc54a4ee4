use crate::state::AppState;
use aichat::models::chat::{ChatMessage, ChatRequest};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

// One non-streaming completion per user turn
async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatMessage>, (StatusCode, Json<ErrorResponse>)> {
    match state.chat.chat(&request).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            tracing::error!("Chat completion failed: {:#}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("{:#}", e),
                }),
            ))
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handler))
        .with_state(state)
}
