use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{sleep, Duration};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::status::{
    is_cancellable, is_chat_presence_active, is_deletable, is_editable, status_label,
};
use crate::error::AppError;
use crate::models::message::Message;
use crate::models::notification::{Notification, NotificationKind};
use crate::models::shipment::{
    Address, GeoPoint, Instructions, NewShipment, Priority, Shipment, ShipmentPatch,
    ShipmentStatus,
};
use crate::transport::{Snapshot, Transport, TransportEvent};

const DRIVER_REPLY: &str = "Got it, I'll keep you posted on the delivery.";
const SUPPORT_REPLY: &str = "Thanks for reaching out! A support agent will get back to you shortly.";

pub struct InMemoryTransport {
    shipments: RwLock<Vec<Shipment>>,
    notifications: RwLock<Vec<Notification>>,
    threads: Arc<DashMap<Uuid, Vec<Message>>>,
    drivers: DashMap<String, String>,
    events_tx: broadcast::Sender<TransportEvent>,
    injected_failure: Mutex<Option<AppError>>,
    auto_reply: bool,
    reply_delay: Duration,
}

impl InMemoryTransport {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            shipments: RwLock::new(Vec::new()),
            notifications: RwLock::new(Vec::new()),
            threads: Arc::new(DashMap::new()),
            drivers: DashMap::new(),
            events_tx,
            injected_failure: Mutex::new(None),
            auto_reply: false,
            reply_delay: Duration::from_millis(0),
        }
    }

    pub fn with_auto_reply(mut self, delay: Duration) -> Self {
        self.auto_reply = true;
        self.reply_delay = delay;
        self
    }

    pub async fn fail_next(&self, err: AppError) {
        *self.injected_failure.lock().await = Some(err);
    }

    pub fn register_driver(&self, driver_id: impl Into<String>, name: impl Into<String>) {
        self.drivers.insert(driver_id.into(), name.into());
    }

    pub async fn assign_driver(&self, id: Uuid, driver_id: impl Into<String>) -> Result<(), AppError> {
        let mut shipments = self.shipments.write().await;
        let shipment = find_mut(&mut shipments, id)?;
        shipment.driver_id = Some(driver_id.into());
        drop(shipments);

        let _ = self.events_tx.send(TransportEvent::ShipmentsChanged);
        Ok(())
    }

    pub async fn set_status(&self, id: Uuid, status: ShipmentStatus) -> Result<(), AppError> {
        let mut shipments = self.shipments.write().await;
        let shipment = find_mut(&mut shipments, id)?;
        if shipment.rating.is_some() && status != ShipmentStatus::Delivered {
            return Err(AppError::Permission(format!(
                "shipment {} is rated and cannot leave DELIVERED",
                shipment.tracking_id
            )));
        }

        shipment.status = status.clone();
        let tracking_id = shipment.tracking_id.clone();
        drop(shipments);

        let kind = match status {
            ShipmentStatus::Delivered => NotificationKind::Success,
            ShipmentStatus::IssueReported | ShipmentStatus::Cancelled => NotificationKind::Alert,
            _ => NotificationKind::Info,
        };
        self.notify(
            kind,
            "Shipment status updated",
            format!("{tracking_id} is now {}.", status_label(&status)),
        )
        .await;
        let _ = self.events_tx.send(TransportEvent::ShipmentsChanged);

        info!(shipment_id = %id, status = %status, "shipment status changed");
        Ok(())
    }

    pub async fn notify(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Notification {
        let notification = Notification::new(kind, title, message);
        self.notifications.write().await.insert(0, notification.clone());
        let _ = self
            .events_tx
            .send(TransportEvent::Notification(notification.clone()));
        notification
    }

    pub async fn seed_demo(&self) -> Result<(), AppError> {
        self.register_driver("d1", "Musa");

        let delivered = self
            .create_shipment(demo_booking("Apapa Port, Lagos", "Ikeja Depot, Lagos"))
            .await?;
        self.set_status(delivered.id, ShipmentStatus::Delivered).await?;

        let in_transit = self
            .create_shipment(demo_booking("Lekki Phase 1, Lagos", "Wuse II, Abuja"))
            .await?;
        self.assign_driver(in_transit.id, "d1").await?;
        self.set_status(in_transit.id, ShipmentStatus::InTransit).await?;

        self.create_shipment(demo_booking("Trans-Amadi, Port Harcourt", "Onitsha Main Market"))
            .await?;

        info!("seeded demo shipments");
        Ok(())
    }

    async fn check_injected_failure(&self) -> Result<(), AppError> {
        match self.injected_failure.lock().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn spawn_reply(&self, shipment_id: Uuid, text: &'static str) {
        let events_tx = self.events_tx.clone();
        let threads = self.threads.clone();
        let delay = self.reply_delay;

        tokio::spawn(async move {
            let _ = events_tx.send(TransportEvent::Typing {
                shipment_id,
                typing: true,
            });
            sleep(delay).await;

            let reply = Message::incoming(shipment_id, text);
            threads.entry(shipment_id).or_default().push(reply.clone());
            let _ = events_tx.send(TransportEvent::CounterpartMessage(reply));
            let _ = events_tx.send(TransportEvent::Typing {
                shipment_id,
                typing: false,
            });
        });
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn create_shipment(&self, fields: NewShipment) -> Result<Shipment, AppError> {
        self.check_injected_failure().await?;
        fields.validate()?;

        let id = Uuid::new_v4();
        let shipment = Shipment {
            id,
            tracking_id: tracking_id_for(id),
            status: ShipmentStatus::PendingReview,
            pickup: fields.pickup,
            dropoff: fields.dropoff,
            driver_id: None,
            vehicle_type: fields.vehicle_type,
            weight: fields.weight,
            cargo_type: fields.cargo_type,
            instructions: fields.instructions,
            date: Utc::now(),
            rating: None,
            review: None,
        };

        self.shipments.write().await.insert(0, shipment.clone());
        self.notify(
            NotificationKind::Success,
            "Shipment created",
            format!("{} is pending review.", shipment.tracking_id),
        )
        .await;

        Ok(shipment)
    }

    async fn update_shipment(&self, id: Uuid, patch: ShipmentPatch) -> Result<(), AppError> {
        self.check_injected_failure().await?;
        patch.validate()?;

        let mut shipments = self.shipments.write().await;
        let shipment = find_mut(&mut shipments, id)?;
        if !is_editable(&shipment.status) {
            return Err(AppError::Permission(format!(
                "shipment {} cannot be edited while {}",
                shipment.tracking_id,
                status_label(&shipment.status)
            )));
        }

        patch.apply_to(shipment);
        let tracking_id = shipment.tracking_id.clone();
        drop(shipments);

        self.notify(
            NotificationKind::Info,
            "Shipment updated",
            format!("Changes to {tracking_id} were saved."),
        )
        .await;
        Ok(())
    }

    async fn cancel_shipment(&self, id: Uuid) -> Result<(), AppError> {
        self.check_injected_failure().await?;

        let mut shipments = self.shipments.write().await;
        let shipment = find_mut(&mut shipments, id)?;
        if !is_cancellable(&shipment.status) {
            return Err(AppError::Permission(format!(
                "shipment {} cannot be cancelled while {}",
                shipment.tracking_id,
                status_label(&shipment.status)
            )));
        }

        shipment.status = ShipmentStatus::Cancelled;
        let tracking_id = shipment.tracking_id.clone();
        drop(shipments);

        self.notify(
            NotificationKind::Alert,
            "Shipment cancelled",
            format!("{tracking_id} has been cancelled."),
        )
        .await;
        Ok(())
    }

    async fn delete_shipment(&self, id: Uuid) -> Result<(), AppError> {
        self.check_injected_failure().await?;

        let mut shipments = self.shipments.write().await;
        let index = shipments
            .iter()
            .position(|shipment| shipment.id == id)
            .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))?;
        if !is_deletable(&shipments[index].status) {
            return Err(AppError::Permission(format!(
                "shipment {} cannot be deleted while {}",
                shipments[index].tracking_id,
                status_label(&shipments[index].status)
            )));
        }

        let removed = shipments.remove(index);
        drop(shipments);
        self.threads.remove(&id);

        self.notify(
            NotificationKind::Info,
            "Shipment deleted",
            format!("{} was removed from your dashboard.", removed.tracking_id),
        )
        .await;
        Ok(())
    }

    async fn rate_driver(
        &self,
        shipment_id: Uuid,
        rating: u8,
        review: String,
    ) -> Result<(), AppError> {
        self.check_injected_failure().await?;
        if !(1..=5).contains(&rating) {
            return Err(AppError::validation("rating", "rating must be between 1 and 5"));
        }

        let mut shipments = self.shipments.write().await;
        let shipment = find_mut(&mut shipments, shipment_id)?;
        if shipment.status != ShipmentStatus::Delivered {
            return Err(AppError::Permission(format!(
                "shipment {} has not been delivered",
                shipment.tracking_id
            )));
        }
        if shipment.rating.is_some() {
            return Err(AppError::Permission(format!(
                "shipment {} has already been rated",
                shipment.tracking_id
            )));
        }

        shipment.rating = Some(rating);
        shipment.review = Some(review);
        drop(shipments);

        self.notify(
            NotificationKind::Success,
            "Thanks for your feedback",
            format!("You rated your driver {rating}/5."),
        )
        .await;
        Ok(())
    }

    async fn send_message(&self, message: Message) -> Result<(), AppError> {
        self.check_injected_failure().await?;

        let status = {
            let shipments = self.shipments.read().await;
            shipments
                .iter()
                .find(|shipment| shipment.id == message.shipment_id)
                .map(|shipment| shipment.status.clone())
                .ok_or_else(|| {
                    AppError::NotFound(format!("shipment {} not found", message.shipment_id))
                })?
        };

        let shipment_id = message.shipment_id;
        self.threads.entry(shipment_id).or_default().push(message);
        debug!(shipment_id = %shipment_id, "message stored");

        if self.auto_reply {
            let reply = if is_chat_presence_active(&status) {
                DRIVER_REPLY
            } else {
                SUPPORT_REPLY
            };
            self.spawn_reply(shipment_id, reply);
        }
        Ok(())
    }

    async fn mark_notification_as_read(&self, id: Uuid) -> Result<(), AppError> {
        self.check_injected_failure().await?;

        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .iter_mut()
            .find(|notification| notification.id == id)
            .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;
        notification.read = true;
        Ok(())
    }

    async fn mark_all_notifications_as_read(&self, seen: Vec<Uuid>) -> Result<(), AppError> {
        self.check_injected_failure().await?;

        let mut notifications = self.notifications.write().await;
        for notification in notifications.iter_mut() {
            if seen.contains(&notification.id) {
                notification.read = true;
            }
        }
        Ok(())
    }

    async fn refresh_data(&self) -> Result<Snapshot, AppError> {
        self.check_injected_failure().await?;

        let shipments = self.shipments.read().await.clone();
        let notifications = self.notifications.read().await.clone();
        let threads = self
            .threads
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        Ok(Snapshot {
            shipments,
            notifications,
            threads,
        })
    }

    async fn driver_name(&self, driver_id: &str) -> Result<Option<String>, AppError> {
        Ok(self.drivers.get(driver_id).map(|entry| entry.value().clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }
}

fn find_mut(shipments: &mut [Shipment], id: Uuid) -> Result<&mut Shipment, AppError> {
    shipments
        .iter_mut()
        .find(|shipment| shipment.id == id)
        .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))
}

fn tracking_id_for(id: Uuid) -> String {
    let simple = id.simple().to_string().to_uppercase();
    format!("FR-{}", &simple[..8])
}

fn demo_booking(pickup: &str, dropoff: &str) -> NewShipment {
    NewShipment {
        pickup: Address {
            address: pickup.to_string(),
            location: Some(GeoPoint { lat: 6.45, lng: 3.39 }),
        },
        dropoff: Address {
            address: dropoff.to_string(),
            location: None,
        },
        vehicle_type: Some("Box Truck".to_string()),
        weight: Some(1200.0),
        cargo_type: Some("General Goods".to_string()),
        instructions: Instructions {
            priority: Priority::Normal,
            notes: None,
        },
    }
}
