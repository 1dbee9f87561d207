use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::selector::DashboardSummary;
use crate::engine::status::{
    is_cancellable, is_chat_presence_active, is_deletable, is_editable, is_operationally_active,
    is_ratable, status_label,
};
use crate::error::AppError;
use crate::models::shipment::{DriverRating, NewShipment, Shipment, ShipmentPatch};
use crate::session::{Session, ViewState};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shipments", post(create_shipment).get(list_shipments))
        .route("/shipments/active", get(active_shipment))
        .route("/shipments/summary", get(summary))
        .route(
            "/shipments/:id",
            get(get_shipment)
                .patch(update_shipment)
                .delete(delete_shipment),
        )
        .route("/shipments/:id/cancel", post(cancel_shipment))
        .route("/shipments/:id/rating", post(rate_driver))
        .route(
            "/selection",
            get(get_selection).put(set_selection).delete(clear_selection),
        )
}

#[derive(Serialize)]
pub struct Permissions {
    pub editable: bool,
    pub deletable: bool,
    pub cancellable: bool,
    pub ratable: bool,
    pub chat_with_driver: bool,
    pub in_progress: bool,
}

#[derive(Serialize)]
pub struct ShipmentView {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub label: String,
    pub permissions: Permissions,
    pub unread_messages: usize,
}

impl ShipmentView {
    fn build(session: &Session, shipment: Shipment) -> Self {
        let status = &shipment.status;
        let permissions = Permissions {
            editable: is_editable(status),
            deletable: is_deletable(status),
            cancellable: is_cancellable(status),
            ratable: is_ratable(&shipment),
            chat_with_driver: is_chat_presence_active(status),
            in_progress: is_operationally_active(status),
        };

        Self {
            label: status_label(status),
            unread_messages: session.unread_messages(shipment.id),
            permissions,
            shipment,
        }
    }
}

#[derive(Deserialize)]
pub struct SelectionRequest {
    pub shipment_id: Uuid,
}

#[derive(Serialize)]
pub struct SelectionResponse {
    #[serde(flatten)]
    pub view: ViewState,
    pub shipment: Option<ShipmentView>,
}

async fn create_shipment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewShipment>,
) -> Result<(StatusCode, Json<ShipmentView>), AppError> {
    let session = state.current_session().await?;
    let created = session.create_shipment(payload).await?;

    let shipment = session.shipment(created.id).await.unwrap_or(created);
    Ok((
        StatusCode::CREATED,
        Json(ShipmentView::build(&session, shipment)),
    ))
}

async fn list_shipments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ShipmentView>>, AppError> {
    let session = state.current_session().await?;
    let shipments = session
        .shipments()
        .await
        .into_iter()
        .map(|shipment| ShipmentView::build(&session, shipment))
        .collect();

    Ok(Json(shipments))
}

async fn active_shipment(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<ShipmentView>>, AppError> {
    let session = state.current_session().await?;
    let active = session
        .active_shipment()
        .await
        .map(|shipment| ShipmentView::build(&session, shipment));

    Ok(Json(active))
}

async fn summary(State(state): State<Arc<AppState>>) -> Result<Json<DashboardSummary>, AppError> {
    let session = state.current_session().await?;
    Ok(Json(session.summary().await))
}

async fn get_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentView>, AppError> {
    let session = state.current_session().await?;
    let shipment = session
        .shipment(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))?;

    Ok(Json(ShipmentView::build(&session, shipment)))
}

async fn update_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ShipmentPatch>,
) -> Result<Json<ShipmentView>, AppError> {
    let session = state.current_session().await?;
    session.update_shipment(id, payload).await?;
    get_shipment(State(state), Path(id)).await
}

async fn cancel_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentView>, AppError> {
    let session = state.current_session().await?;
    session.cancel_shipment(id).await?;
    get_shipment(State(state), Path(id)).await
}

async fn delete_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = state.current_session().await?;
    session.delete_shipment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rate_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRating>,
) -> Result<Json<ShipmentView>, AppError> {
    let session = state.current_session().await?;
    session.rate_driver(id, payload).await?;
    get_shipment(State(state), Path(id)).await
}

async fn selection_response(session: &Session) -> SelectionResponse {
    SelectionResponse {
        view: session.view().await,
        shipment: session
            .selected_shipment()
            .await
            .map(|shipment| ShipmentView::build(session, shipment)),
    }
}

async fn get_selection(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SelectionResponse>, AppError> {
    let session = state.current_session().await?;
    Ok(Json(selection_response(&session).await))
}

async fn set_selection(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SelectionRequest>,
) -> Result<Json<SelectionResponse>, AppError> {
    let session = state.current_session().await?;
    session.select(Some(payload.shipment_id)).await?;
    Ok(Json(selection_response(&session).await))
}

async fn clear_selection(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SelectionResponse>, AppError> {
    let session = state.current_session().await?;
    session.select(None).await?;
    Ok(Json(selection_response(&session).await))
}
