pub mod chat;
pub mod notifications;
pub mod shipments;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(shipments::router())
        .merge(chat::router())
        .merge(notifications::router())
        .route("/session", post(start_session).delete(end_session))
        .route("/refresh", post(refresh))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .fallback_service(ServeDir::new("static"))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    session: bool,
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: Uuid,
    shipments: usize,
    unread_notifications: usize,
}

#[derive(Serialize)]
struct RefreshResponse {
    applied: bool,
    shipments: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        session: state.current_session().await.is_ok(),
    })
}

async fn start_session(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let session = state.start_session().await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: session.id,
            shipments: session.shipments().await.len(),
            unread_notifications: session.unread_notifications().await,
        }),
    ))
}

async fn end_session(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    if state.end_session().await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NoSession)
    }
}

async fn refresh(State(state): State<Arc<AppState>>) -> Result<Json<RefreshResponse>, AppError> {
    let session = state.current_session().await?;
    let applied = session.refresh().await?;

    Ok(Json(RefreshResponse {
        applied,
        shipments: session.shipments().await.len(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
