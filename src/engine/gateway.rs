use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::status::{is_cancellable, is_deletable, is_editable, is_ratable};
use crate::error::AppError;
use crate::models::shipment::{DriverRating, NewShipment, Shipment, ShipmentPatch};
use crate::observability::metrics::Metrics;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "target", content = "id", rename_all = "snake_case")]
pub enum MutationTarget {
    NewShipment,
    Shipment(Uuid),
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationTarget::NewShipment => f.write_str("new shipment"),
            MutationTarget::Shipment(id) => write!(f, "shipment {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Cancel,
    Delete,
    Rate,
    SendMessage,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Cancel => "cancel",
            MutationKind::Delete => "delete",
            MutationKind::Rate => "rate",
            MutationKind::SendMessage => "send_message",
        }
    }
}

pub struct InFlightGuard<'a> {
    gateway: &'a MutationGateway,
    target: MutationTarget,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.gateway.in_flight.remove(&self.target).is_some() {
            self.gateway.metrics.mutations_in_flight.dec();
        }
    }
}

// Status gates only inform logging; every request is forwarded to the backend.
pub struct MutationGateway {
    transport: Arc<dyn Transport>,
    in_flight: DashMap<MutationTarget, MutationKind>,
    metrics: Metrics,
}

impl MutationGateway {
    pub fn new(transport: Arc<dyn Transport>, metrics: Metrics) -> Self {
        Self {
            transport,
            in_flight: DashMap::new(),
            metrics,
        }
    }

    pub fn begin(
        &self,
        target: MutationTarget,
        kind: MutationKind,
    ) -> Result<InFlightGuard<'_>, AppError> {
        match self.in_flight.entry(target) {
            Entry::Occupied(entry) => Err(AppError::Conflict(format!(
                "{} already in flight for {target}",
                entry.get().as_str()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(kind);
                self.metrics.mutations_in_flight.inc();
                Ok(InFlightGuard {
                    gateway: self,
                    target,
                })
            }
        }
    }

    pub fn in_flight(&self, target: MutationTarget) -> Option<MutationKind> {
        self.in_flight.get(&target).map(|entry| *entry.value())
    }

    pub async fn create(&self, fields: NewShipment) -> Result<Shipment, AppError> {
        fields.validate()?;
        self.dispatch(
            MutationKind::Create,
            MutationTarget::NewShipment,
            self.transport.create_shipment(fields),
        )
        .await
    }

    pub async fn update(
        &self,
        id: Uuid,
        current: Option<&Shipment>,
        patch: ShipmentPatch,
    ) -> Result<(), AppError> {
        if patch.is_empty() {
            return Err(AppError::validation("patch", "nothing to update"));
        }
        patch.validate()?;
        self.note_local_gate(MutationKind::Update, id, current, |s| is_editable(&s.status));

        self.dispatch(
            MutationKind::Update,
            MutationTarget::Shipment(id),
            self.transport.update_shipment(id, patch),
        )
        .await
    }

    pub async fn cancel(&self, id: Uuid, current: Option<&Shipment>) -> Result<(), AppError> {
        self.note_local_gate(MutationKind::Cancel, id, current, |s| is_cancellable(&s.status));

        self.dispatch(
            MutationKind::Cancel,
            MutationTarget::Shipment(id),
            self.transport.cancel_shipment(id),
        )
        .await
    }

    pub async fn delete(&self, id: Uuid, current: Option<&Shipment>) -> Result<(), AppError> {
        self.note_local_gate(MutationKind::Delete, id, current, |s| is_deletable(&s.status));

        self.dispatch(
            MutationKind::Delete,
            MutationTarget::Shipment(id),
            self.transport.delete_shipment(id),
        )
        .await
    }

    pub async fn rate(
        &self,
        id: Uuid,
        current: Option<&Shipment>,
        rating: DriverRating,
    ) -> Result<(), AppError> {
        rating.validate()?;
        self.note_local_gate(MutationKind::Rate, id, current, is_ratable);

        self.dispatch(
            MutationKind::Rate,
            MutationTarget::Shipment(id),
            self.transport.rate_driver(id, rating.rating, rating.review),
        )
        .await
    }

    fn note_local_gate(
        &self,
        kind: MutationKind,
        id: Uuid,
        current: Option<&Shipment>,
        allowed: impl Fn(&Shipment) -> bool,
    ) {
        match current {
            Some(shipment) if !allowed(shipment) => warn!(
                shipment_id = %id,
                status = %shipment.status,
                kind = kind.as_str(),
                "local gate refuses mutation; forwarding to backend"
            ),
            None => warn!(
                shipment_id = %id,
                kind = kind.as_str(),
                "shipment unknown locally; forwarding to backend"
            ),
            Some(_) => {}
        }
    }

    async fn dispatch<T>(
        &self,
        kind: MutationKind,
        target: MutationTarget,
        request: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        let start = Instant::now();
        let result = request.await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(_) => {
                self.metrics.observe_mutation(kind.as_str(), "success", elapsed);
                info!(%target, kind = kind.as_str(), "mutation confirmed");
            }
            Err(err) => {
                self.metrics.observe_mutation(kind.as_str(), err.kind(), elapsed);
                warn!(%target, kind = kind.as_str(), error = %err, "mutation failed");
            }
        }

        result
    }
}
