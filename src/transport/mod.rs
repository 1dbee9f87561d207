pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::Message;
use crate::models::notification::Notification;
use crate::models::shipment::{NewShipment, Shipment, ShipmentPatch};

pub use memory::InMemoryTransport;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransportEvent {
    CounterpartMessage(Message),
    Typing { shipment_id: Uuid, typing: bool },
    Notification(Notification),
    ShipmentsChanged,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub shipments: Vec<Shipment>,
    pub notifications: Vec<Notification>,
    pub threads: HashMap<Uuid, Vec<Message>>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn create_shipment(&self, fields: NewShipment) -> Result<Shipment, AppError>;

    async fn update_shipment(&self, id: Uuid, patch: ShipmentPatch) -> Result<(), AppError>;

    async fn cancel_shipment(&self, id: Uuid) -> Result<(), AppError>;

    async fn delete_shipment(&self, id: Uuid) -> Result<(), AppError>;

    async fn rate_driver(&self, shipment_id: Uuid, rating: u8, review: String)
    -> Result<(), AppError>;

    async fn send_message(&self, message: Message) -> Result<(), AppError>;

    async fn mark_notification_as_read(&self, id: Uuid) -> Result<(), AppError>;

    // Only the ids in `seen` are marked; newer notifications stay unread.
    async fn mark_all_notifications_as_read(&self, seen: Vec<Uuid>) -> Result<(), AppError>;

    async fn refresh_data(&self) -> Result<Snapshot, AppError>;

    async fn driver_name(&self, driver_id: &str) -> Result<Option<String>, AppError>;

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
