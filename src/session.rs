use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::feed::NotificationFeed;
use crate::engine::gateway::{MutationGateway, MutationKind, MutationTarget};
use crate::engine::messaging::{resolve_counterpart, ChatCounterpart, MessageRouter};
use crate::engine::selector::{select_active, summarize, DashboardSummary};
use crate::engine::status::is_chat_presence_active;
use crate::error::AppError;
use crate::models::message::Message;
use crate::models::notification::Notification;
use crate::models::shipment::{DriverRating, NewShipment, Shipment, ShipmentPatch};
use crate::observability::metrics::Metrics;
use crate::transport::{Snapshot, Transport, TransportEvent};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Refreshed { ticket: u64 },
    Message(Message),
    Typing { shipment_id: Uuid, typing: bool },
    Notification(Notification),
    MutationFailed {
        target: MutationTarget,
        kind: MutationKind,
        error: String,
    },
    SelectionCleared { shipment_id: Uuid },
}

// Only ids are held; shipments are always looked up in the current collection.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ViewState {
    pub selected: Option<Uuid>,
    pub open_chat: Option<Uuid>,
}

impl ViewState {
    fn forget(&mut self, shipment_id: Uuid) -> bool {
        let mut cleared = false;
        if self.selected == Some(shipment_id) {
            self.selected = None;
            cleared = true;
        }
        if self.open_chat == Some(shipment_id) {
            self.open_chat = None;
            cleared = true;
        }
        cleared
    }

    fn dangling(&self, live: &HashSet<Uuid>) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = [self.selected, self.open_chat]
            .into_iter()
            .flatten()
            .filter(|id| !live.contains(id))
            .collect();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Default)]
struct ShipmentBook {
    items: Vec<Shipment>,
    applied_ticket: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
    pub shipment_id: Uuid,
    pub counterpart: ChatCounterpart,
    pub messages: Vec<Message>,
    pub typing: bool,
}

pub struct Session {
    pub id: Uuid,
    transport: Arc<dyn Transport>,
    shipments: RwLock<ShipmentBook>,
    next_ticket: AtomicU64,
    view: RwLock<ViewState>,
    chat: MessageRouter,
    feed: NotificationFeed,
    gateway: MutationGateway,
    metrics: Metrics,
    events_tx: broadcast::Sender<SessionEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub async fn start(
        transport: Arc<dyn Transport>,
        metrics: Metrics,
        event_buffer_size: usize,
    ) -> Result<Arc<Self>, AppError> {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            chat: MessageRouter::new(transport.clone()),
            feed: NotificationFeed::new(transport.clone()),
            gateway: MutationGateway::new(transport.clone(), metrics.clone()),
            transport: transport.clone(),
            shipments: RwLock::new(ShipmentBook::default()),
            next_ticket: AtomicU64::new(0),
            view: RwLock::new(ViewState::default()),
            metrics,
            events_tx,
            pump: Mutex::new(None),
        });

        let pushes = transport.subscribe();
        let handle = tokio::spawn(run_event_pump(Arc::downgrade(&session), pushes));
        *session.pump.lock().await = Some(handle);

        if let Err(err) = session.refresh().await {
            session.end().await;
            return Err(err);
        }

        info!(session_id = %session.id, "session started");
        Ok(session)
    }

    pub async fn end(&self) {
        if let Some(handle) = self.pump.lock().await.take() {
            handle.abort();
        }
        info!(session_id = %self.id, "session ended");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    // Returns whether the snapshot was applied.
    pub async fn refresh(&self) -> Result<bool, AppError> {
        let ticket = self.issue_ticket();

        match self.transport.refresh_data().await {
            Ok(snapshot) => Ok(self.apply_snapshot(ticket, snapshot).await),
            Err(err) => {
                self.metrics
                    .refreshes_total
                    .with_label_values(&["error"])
                    .inc();
                warn!(session_id = %self.id, ticket, error = %err, "refresh failed");
                Err(err)
            }
        }
    }

    fn issue_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn apply_snapshot(&self, ticket: u64, snapshot: Snapshot) -> bool {
        let mut book = self.shipments.write().await;
        if ticket <= book.applied_ticket {
            self.metrics
                .refreshes_total
                .with_label_values(&["stale"])
                .inc();
            debug!(ticket, applied = book.applied_ticket, "discarding stale snapshot");
            return false;
        }

        for shipment in snapshot
            .shipments
            .iter()
            .filter(|shipment| !shipment.rating_is_consistent())
        {
            warn!(
                shipment_id = %shipment.id,
                status = %shipment.status,
                "snapshot carries a rating on an undelivered shipment"
            );
        }

        let live: HashSet<Uuid> = snapshot.shipments.iter().map(|shipment| shipment.id).collect();
        book.applied_ticket = ticket;
        book.items = snapshot.shipments;
        self.chat.absorb(snapshot.threads, &live);
        self.feed.absorb(snapshot.notifications).await;

        let dangling = {
            let mut view = self.view.write().await;
            let dangling = view.dangling(&live);
            for id in &dangling {
                view.forget(*id);
            }
            dangling
        };
        drop(book);

        for shipment_id in dangling {
            info!(shipment_id = %shipment_id, "cleared view of vanished shipment");
            let _ = self
                .events_tx
                .send(SessionEvent::SelectionCleared { shipment_id });
        }

        self.metrics
            .refreshes_total
            .with_label_values(&["applied"])
            .inc();
        let _ = self.events_tx.send(SessionEvent::Refreshed { ticket });
        true
    }

    pub async fn shipments(&self) -> Vec<Shipment> {
        self.shipments.read().await.items.clone()
    }

    pub async fn shipment(&self, id: Uuid) -> Option<Shipment> {
        self.shipments
            .read()
            .await
            .items
            .iter()
            .find(|shipment| shipment.id == id)
            .cloned()
    }

    pub async fn active_shipment(&self) -> Option<Shipment> {
        select_active(&self.shipments.read().await.items).cloned()
    }

    pub async fn summary(&self) -> DashboardSummary {
        summarize(&self.shipments.read().await.items)
    }

    pub async fn view(&self) -> ViewState {
        self.view.read().await.clone()
    }

    pub async fn select(&self, shipment_id: Option<Uuid>) -> Result<ViewState, AppError> {
        if let Some(id) = shipment_id {
            self.require_shipment(id).await?;
        }
        let mut view = self.view.write().await;
        view.selected = shipment_id;
        Ok(view.clone())
    }

    pub async fn selected_shipment(&self) -> Option<Shipment> {
        let selected = self.view.read().await.selected?;
        self.shipment(selected).await
    }

    pub async fn create_shipment(&self, fields: NewShipment) -> Result<Shipment, AppError> {
        let target = MutationTarget::NewShipment;
        let _guard = self.gateway.begin(target, MutationKind::Create)?;

        let created = self
            .report(target, MutationKind::Create, self.gateway.create(fields).await)?;
        self.refresh_after_mutation().await;
        Ok(created)
    }

    pub async fn update_shipment(&self, id: Uuid, patch: ShipmentPatch) -> Result<(), AppError> {
        let target = MutationTarget::Shipment(id);
        let _guard = self.gateway.begin(target, MutationKind::Update)?;

        let current = self.shipment(id).await;
        let result = self.gateway.update(id, current.as_ref(), patch).await;
        self.report(target, MutationKind::Update, result)?;
        self.refresh_after_mutation().await;
        Ok(())
    }

    pub async fn cancel_shipment(&self, id: Uuid) -> Result<(), AppError> {
        let target = MutationTarget::Shipment(id);
        let _guard = self.gateway.begin(target, MutationKind::Cancel)?;

        let current = self.shipment(id).await;
        let result = self.gateway.cancel(id, current.as_ref()).await;
        self.report(target, MutationKind::Cancel, result)?;
        self.refresh_after_mutation().await;
        Ok(())
    }

    // A confirmed delete clears the view even if the follow-up refresh fails.
    pub async fn delete_shipment(&self, id: Uuid) -> Result<(), AppError> {
        let target = MutationTarget::Shipment(id);
        let _guard = self.gateway.begin(target, MutationKind::Delete)?;

        let current = self.shipment(id).await;
        let result = self.gateway.delete(id, current.as_ref()).await;
        self.report(target, MutationKind::Delete, result)?;

        if self.view.write().await.forget(id) {
            let _ = self
                .events_tx
                .send(SessionEvent::SelectionCleared { shipment_id: id });
        }
        self.chat.forget(id);
        self.refresh_after_mutation().await;
        Ok(())
    }

    pub async fn rate_driver(&self, id: Uuid, rating: DriverRating) -> Result<(), AppError> {
        let target = MutationTarget::Shipment(id);
        let _guard = self.gateway.begin(target, MutationKind::Rate)?;

        let current = self.shipment(id).await;
        let result = self.gateway.rate(id, current.as_ref(), rating).await;
        self.report(target, MutationKind::Rate, result)?;
        self.refresh_after_mutation().await;
        Ok(())
    }

    pub async fn open_chat(&self, shipment_id: Uuid) -> Result<ChatView, AppError> {
        let shipment = self.require_shipment(shipment_id).await?;

        let driver_name = match &shipment.driver_id {
            Some(driver_id) if is_chat_presence_active(&shipment.status) => {
                match self.transport.driver_name(driver_id).await {
                    Ok(name) => name,
                    Err(err) => {
                        warn!(
                            shipment_id = %shipment_id,
                            driver_id = %driver_id,
                            error = %err,
                            "driver lookup failed; routing chat to support"
                        );
                        None
                    }
                }
            }
            _ => None,
        };
        let counterpart = resolve_counterpart(&shipment.status, driver_name.as_deref());

        // The thread may have been deleted while the driver lookup was pending.
        if self.shipment(shipment_id).await.is_none() {
            return Err(AppError::NotFound(format!("shipment {shipment_id} not found")));
        }
        self.view.write().await.open_chat = Some(shipment_id);
        self.chat.mark_seen(shipment_id);

        Ok(ChatView {
            shipment_id,
            counterpart,
            messages: self.chat.thread(shipment_id),
            typing: self.chat.is_typing(shipment_id),
        })
    }

    pub async fn close_chat(&self) {
        self.view.write().await.open_chat = None;
    }

    pub async fn send_message(
        &self,
        shipment_id: Uuid,
        text: &str,
    ) -> Result<Option<Message>, AppError> {
        self.require_shipment(shipment_id).await?;

        let result = self.chat.send(shipment_id, text).await;
        let sent = self.report(
            MutationTarget::Shipment(shipment_id),
            MutationKind::SendMessage,
            result,
        )?;
        if let Some(message) = &sent {
            self.metrics.messages_sent_total.inc();
            let _ = self.events_tx.send(SessionEvent::Message(message.clone()));
        }
        Ok(sent)
    }

    pub fn thread(&self, shipment_id: Uuid) -> Vec<Message> {
        self.chat.thread(shipment_id)
    }

    pub fn is_typing(&self, shipment_id: Uuid) -> bool {
        self.chat.is_typing(shipment_id)
    }

    pub fn unread_messages(&self, shipment_id: Uuid) -> usize {
        self.chat.unread(shipment_id)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.feed.list().await
    }

    pub async fn unread_notifications(&self) -> usize {
        self.feed.unread_count().await
    }

    pub async fn mark_notification_as_read(&self, id: Uuid) -> Result<bool, AppError> {
        self.feed.mark_as_read(id).await
    }

    pub async fn mark_all_notifications_as_read(&self) -> Result<usize, AppError> {
        self.feed.mark_all_as_read().await
    }

    async fn require_shipment(&self, id: Uuid) -> Result<Shipment, AppError> {
        self.shipment(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))
    }

    fn report<T>(
        &self,
        target: MutationTarget,
        kind: MutationKind,
        result: Result<T, AppError>,
    ) -> Result<T, AppError> {
        if let Err(err) = &result {
            let _ = self.events_tx.send(SessionEvent::MutationFailed {
                target,
                kind,
                error: err.to_string(),
            });
        }
        result
    }

    async fn refresh_after_mutation(&self) {
        if let Err(err) = self.refresh().await {
            warn!(
                session_id = %self.id,
                error = %err,
                "mutation confirmed but refresh failed; local state is stale"
            );
        }
    }

    async fn apply(&self, event: TransportEvent) {
        match event {
            TransportEvent::CounterpartMessage(message) => {
                if self.shipment(message.shipment_id).await.is_none() {
                    debug!(shipment_id = %message.shipment_id, "dropping message for unknown shipment");
                    return;
                }
                let shipment_id = message.shipment_id;
                if self.chat.receive(message.clone()) {
                    if self.view.read().await.open_chat == Some(shipment_id) {
                        self.chat.mark_seen(shipment_id);
                    }
                    let _ = self.events_tx.send(SessionEvent::Message(message));
                }
                let _ = self.events_tx.send(SessionEvent::Typing {
                    shipment_id,
                    typing: false,
                });
            }
            TransportEvent::Typing {
                shipment_id,
                typing,
            } => {
                self.chat.set_typing(shipment_id, typing);
                let _ = self.events_tx.send(SessionEvent::Typing {
                    shipment_id,
                    typing,
                });
            }
            TransportEvent::Notification(notification) => {
                if self.feed.push(notification.clone()).await {
                    let _ = self
                        .events_tx
                        .send(SessionEvent::Notification(notification));
                }
            }
            TransportEvent::ShipmentsChanged => {
                if let Err(err) = self.refresh().await {
                    error!(session_id = %self.id, error = %err, "refresh after backend change failed");
                }
            }
        }
    }
}

async fn run_event_pump(session: Weak<Session>, mut pushes: broadcast::Receiver<TransportEvent>) {
    loop {
        let event = match pushes.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event pump lagged; resynchronizing");
                TransportEvent::ShipmentsChanged
            }
            Err(RecvError::Closed) => break,
        };

        let Some(session) = session.upgrade() else {
            break;
        };
        session.apply(event).await;
    }

    debug!("event pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::shipment::{Address, Instructions, ShipmentStatus};
    use crate::transport::InMemoryTransport;

    fn booking(pickup: &str) -> NewShipment {
        NewShipment {
            pickup: Address {
                address: pickup.to_string(),
                location: None,
            },
            dropoff: Address {
                address: "Inland Depot 2".to_string(),
                location: None,
            },
            vehicle_type: Some("Flatbed".to_string()),
            weight: Some(800.0),
            cargo_type: None,
            instructions: Instructions::default(),
        }
    }

    async fn session() -> (Arc<Session>, Arc<InMemoryTransport>) {
        let transport = Arc::new(InMemoryTransport::new(64));
        let session = Session::start(transport.clone(), Metrics::new(), 64)
            .await
            .unwrap();
        (session, transport)
    }

    #[tokio::test]
    async fn deleting_selected_shipment_clears_selection() {
        let (session, _transport) = session().await;
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();

        session.select(Some(shipment.id)).await.unwrap();
        session.open_chat(shipment.id).await.unwrap();
        session.delete_shipment(shipment.id).await.unwrap();

        assert_eq!(session.view().await, ViewState::default());
        assert!(session.selected_shipment().await.is_none());
        assert!(session.shipment(shipment.id).await.is_none());
    }

    #[tokio::test]
    async fn failed_delete_keeps_shipment_and_selection() {
        let (session, transport) = session().await;
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();
        session.select(Some(shipment.id)).await.unwrap();
        let mut events = session.subscribe();

        transport
            .fail_next(AppError::Transport("gateway timeout".to_string()))
            .await;
        let err = session.delete_shipment(shipment.id).await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));

        assert_eq!(session.view().await.selected, Some(shipment.id));
        assert!(session.shipment(shipment.id).await.is_some());
        loop {
            if let SessionEvent::MutationFailed { kind, .. } = events.recv().await.unwrap() {
                assert_eq!(kind, MutationKind::Delete);
                break;
            }
        }

        session.delete_shipment(shipment.id).await.unwrap();
    }

    #[tokio::test]
    async fn update_reaches_local_state_only_through_refresh() {
        let (session, transport) = session().await;
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();

        transport
            .fail_next(AppError::Transport("reset".to_string()))
            .await;
        let patch = ShipmentPatch {
            cargo_type: Some("Electronics".to_string()),
            ..ShipmentPatch::default()
        };
        assert!(session.update_shipment(shipment.id, patch.clone()).await.is_err());
        assert_eq!(session.shipment(shipment.id).await.unwrap().cargo_type, None);

        session.update_shipment(shipment.id, patch).await.unwrap();
        let updated = session.shipment(shipment.id).await.unwrap();
        assert_eq!(updated.cargo_type.as_deref(), Some("Electronics"));
        assert_eq!(updated.tracking_id, shipment.tracking_id);
        assert_eq!(updated.date, shipment.date);
    }

    #[tokio::test]
    async fn cancelled_shipment_can_still_be_edited() {
        let (session, _transport) = session().await;
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();
        session.cancel_shipment(shipment.id).await.unwrap();

        let patch = ShipmentPatch {
            vehicle_type: Some("Van".to_string()),
            ..ShipmentPatch::default()
        };
        session.update_shipment(shipment.id, patch).await.unwrap();

        let stored = session.shipment(shipment.id).await.unwrap();
        assert_eq!(stored.status, ShipmentStatus::Cancelled);
        assert_eq!(stored.vehicle_type.as_deref(), Some("Van"));
    }

    #[tokio::test]
    async fn late_snapshot_never_overwrites_newer_state() {
        let (session, transport) = session().await;

        let early_ticket = session.issue_ticket();
        let early_snapshot = transport.refresh_data().await.unwrap();

        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();
        assert!(!session.apply_snapshot(early_ticket, early_snapshot).await);
        assert!(session.shipment(shipment.id).await.is_some());
    }

    #[tokio::test]
    async fn refresh_drops_selection_of_vanished_shipment() {
        let (session, transport) = session().await;
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();
        session.select(Some(shipment.id)).await.unwrap();

        transport.delete_shipment(shipment.id).await.unwrap();
        session.refresh().await.unwrap();

        assert_eq!(session.view().await.selected, None);
    }

    #[tokio::test]
    async fn rating_is_only_recorded_on_delivered_shipments() {
        let (session, transport) = session().await;
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();

        let err = session
            .rate_driver(
                shipment.id,
                DriverRating {
                    rating: 4,
                    review: "fine".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Permission(_)));

        transport
            .set_status(shipment.id, ShipmentStatus::Delivered)
            .await
            .unwrap();
        session.refresh().await.unwrap();
        session
            .rate_driver(
                shipment.id,
                DriverRating {
                    rating: 4,
                    review: "fine".to_string(),
                },
            )
            .await
            .unwrap();

        for shipment in session.shipments().await {
            assert!(shipment.rating_is_consistent());
        }
        assert_eq!(session.shipment(shipment.id).await.unwrap().rating, Some(4));
    }

    #[tokio::test]
    async fn chat_routes_to_driver_once_picked_up() {
        let (session, transport) = session().await;
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();

        let chat = session.open_chat(shipment.id).await.unwrap();
        assert_eq!(chat.counterpart.name, "Admin Support");
        assert_eq!(chat.counterpart.presence, "Available");

        transport.register_driver("d1", "Musa");
        transport.assign_driver(shipment.id, "d1").await.unwrap();
        transport
            .set_status(shipment.id, ShipmentStatus::PickedUp)
            .await
            .unwrap();
        session.refresh().await.unwrap();

        let chat = session.open_chat(shipment.id).await.unwrap();
        assert_eq!(chat.counterpart.name, "Musa");
        assert_eq!(chat.counterpart.initials, "M");
        assert_eq!(chat.counterpart.presence, "On Delivery");
    }

    #[tokio::test]
    async fn pushed_notifications_land_in_the_feed() {
        let (session, transport) = session().await;
        let mut events = session.subscribe();

        let pushed = transport
            .notify(
                crate::models::notification::NotificationKind::Alert,
                "Delay",
                "Weather on route",
            )
            .await;

        loop {
            if let SessionEvent::Notification(notification) = events.recv().await.unwrap() {
                assert_eq!(notification.id, pushed.id);
                break;
            }
        }
        assert_eq!(session.unread_notifications().await, 1);
        session.mark_all_notifications_as_read().await.unwrap();
        assert_eq!(session.unread_notifications().await, 0);
    }

    #[tokio::test]
    async fn counterpart_reply_arrives_through_the_pump() {
        let transport = Arc::new(
            InMemoryTransport::new(64).with_auto_reply(tokio::time::Duration::from_millis(10)),
        );
        let session = Session::start(transport.clone(), Metrics::new(), 64)
            .await
            .unwrap();
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();
        let mut events = session.subscribe();

        session
            .send_message(shipment.id, "  is it on schedule?  ")
            .await
            .unwrap();

        loop {
            if let SessionEvent::Message(message) = events.recv().await.unwrap() {
                if !message.is_me {
                    break;
                }
            }
        }

        let thread = session.thread(shipment.id);
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].text, "is it on schedule?");
        assert!(thread[0].is_me);
        assert!(!thread[1].is_me);
        assert!(!session.is_typing(shipment.id));
        assert_eq!(session.unread_messages(shipment.id), 1);

        session.open_chat(shipment.id).await.unwrap();
        assert_eq!(session.unread_messages(shipment.id), 0);
    }

    #[tokio::test]
    async fn undelivered_message_is_reported_and_dropped_on_refresh() {
        let (session, transport) = session().await;
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();
        let mut events = session.subscribe();

        transport
            .fail_next(AppError::Transport("socket closed".to_string()))
            .await;
        let err = session
            .send_message(shipment.id, "never delivered")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
        assert_eq!(session.thread(shipment.id).len(), 1);

        loop {
            if let SessionEvent::MutationFailed { target, kind, .. } = events.recv().await.unwrap() {
                assert_eq!(target, MutationTarget::Shipment(shipment.id));
                assert_eq!(kind, MutationKind::SendMessage);
                break;
            }
        }

        assert!(session.refresh().await.unwrap());
        assert!(session.thread(shipment.id).is_empty());

        session.send_message(shipment.id, "second try").await.unwrap();
        session.refresh().await.unwrap();
        let texts: Vec<String> = session
            .thread(shipment.id)
            .into_iter()
            .map(|message| message.text)
            .collect();
        assert_eq!(texts, vec!["second try"]);
    }

    struct DirectoryDown(Arc<InMemoryTransport>);

    #[async_trait::async_trait]
    impl Transport for DirectoryDown {
        async fn create_shipment(&self, fields: NewShipment) -> Result<Shipment, AppError> {
            self.0.create_shipment(fields).await
        }

        async fn update_shipment(&self, id: Uuid, patch: ShipmentPatch) -> Result<(), AppError> {
            self.0.update_shipment(id, patch).await
        }

        async fn cancel_shipment(&self, id: Uuid) -> Result<(), AppError> {
            self.0.cancel_shipment(id).await
        }

        async fn delete_shipment(&self, id: Uuid) -> Result<(), AppError> {
            self.0.delete_shipment(id).await
        }

        async fn rate_driver(
            &self,
            shipment_id: Uuid,
            rating: u8,
            review: String,
        ) -> Result<(), AppError> {
            self.0.rate_driver(shipment_id, rating, review).await
        }

        async fn send_message(&self, message: Message) -> Result<(), AppError> {
            self.0.send_message(message).await
        }

        async fn mark_notification_as_read(&self, id: Uuid) -> Result<(), AppError> {
            self.0.mark_notification_as_read(id).await
        }

        async fn mark_all_notifications_as_read(&self, seen: Vec<Uuid>) -> Result<(), AppError> {
            self.0.mark_all_notifications_as_read(seen).await
        }

        async fn refresh_data(&self) -> Result<Snapshot, AppError> {
            self.0.refresh_data().await
        }

        async fn driver_name(&self, _driver_id: &str) -> Result<Option<String>, AppError> {
            Err(AppError::Transport("driver directory down".to_string()))
        }

        fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
            self.0.subscribe()
        }
    }

    #[tokio::test]
    async fn driver_lookup_failure_falls_back_to_support() {
        let backend = Arc::new(InMemoryTransport::new(64));
        let session = Session::start(
            Arc::new(DirectoryDown(backend.clone())),
            Metrics::new(),
            64,
        )
        .await
        .unwrap();
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();
        backend.register_driver("d1", "Musa");
        backend.assign_driver(shipment.id, "d1").await.unwrap();
        session.refresh().await.unwrap();

        let chat = session.open_chat(shipment.id).await.unwrap();
        assert_eq!(chat.counterpart.name, "Admin Support");
        assert_eq!(chat.counterpart.presence, "Available");

        backend
            .set_status(shipment.id, ShipmentStatus::InTransit)
            .await
            .unwrap();
        session.refresh().await.unwrap();

        let chat = session.open_chat(shipment.id).await.unwrap();
        assert_eq!(chat.counterpart.name, "Admin Support");
        assert_eq!(chat.counterpart.initials, "AS");
    }

    #[tokio::test]
    async fn snapshot_with_rating_on_undelivered_shipment_still_applies() {
        let (session, transport) = session().await;
        let shipment = session.create_shipment(booking("Dock 7")).await.unwrap();

        let mut snapshot = transport.refresh_data().await.unwrap();
        snapshot.shipments[0].rating = Some(5);
        let ticket = session.issue_ticket();
        assert!(session.apply_snapshot(ticket, snapshot).await);

        let stored = session.shipment(shipment.id).await.unwrap();
        assert!(!stored.rating_is_consistent());
    }

    #[tokio::test]
    async fn unknown_shipment_chat_is_not_found() {
        let (session, _transport) = session().await;
        let err = session.send_message(Uuid::new_v4(), "hi").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
