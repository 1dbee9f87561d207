use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::Message;
use crate::session::ChatView;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shipments/:id/chat", get(open_chat).delete(close_chat))
        .route("/shipments/:id/messages", post(send_message))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub accepted: bool,
    pub message: Option<Message>,
}

async fn open_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatView>, AppError> {
    let session = state.current_session().await?;
    Ok(Json(session.open_chat(id).await?))
}

async fn close_chat(
    State(state): State<Arc<AppState>>,
    Path(_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = state.current_session().await?;
    session.close_chat().await;
    Ok(Json(serde_json::json!({ "open_chat": null })))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let session = state.current_session().await?;
    let message = session.send_message(id, &payload.text).await?;

    Ok(Json(SendMessageResponse {
        accepted: message.is_some(),
        message,
    }))
}
