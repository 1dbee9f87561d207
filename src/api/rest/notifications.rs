use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_as_read))
        .route("/notifications/:id/read", post(mark_as_read))
}

#[derive(Serialize)]
pub struct FeedResponse {
    pub unread_count: usize,
    pub notifications: Vec<Notification>,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub changed: usize,
    pub unread_count: usize,
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FeedResponse>, AppError> {
    let session = state.current_session().await?;
    let notifications = session.notifications().await;
    let unread_count = notifications.iter().filter(|n| !n.read).count();

    Ok(Json(FeedResponse {
        unread_count,
        notifications,
    }))
}

async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let session = state.current_session().await?;
    let changed = session.mark_notification_as_read(id).await?;

    Ok(Json(MarkReadResponse {
        changed: usize::from(changed),
        unread_count: session.unread_notifications().await,
    }))
}

async fn mark_all_as_read(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let session = state.current_session().await?;
    let changed = session.mark_all_notifications_as_read().await?;

    Ok(Json(MarkReadResponse {
        changed,
        unread_count: session.unread_notifications().await,
    }))
}
