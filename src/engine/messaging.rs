use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::status::is_chat_presence_active;
use crate::error::AppError;
use crate::models::message::Message;
use crate::models::shipment::ShipmentStatus;
use crate::transport::Transport;

pub const SUPPORT_NAME: &str = "Admin Support";
pub const SUPPORT_INITIALS: &str = "AS";
pub const PRESENCE_ON_DELIVERY: &str = "On Delivery";
pub const PRESENCE_AVAILABLE: &str = "Available";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartRole {
    Driver,
    Support,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatCounterpart {
    pub role: CounterpartRole,
    pub name: String,
    pub initials: String,
    pub presence: &'static str,
}

pub fn resolve_counterpart(status: &ShipmentStatus, driver_name: Option<&str>) -> ChatCounterpart {
    let driver_name = driver_name.map(str::trim).filter(|name| !name.is_empty());

    match driver_name {
        Some(name) if is_chat_presence_active(status) => ChatCounterpart {
            role: CounterpartRole::Driver,
            name: name.to_string(),
            initials: name.chars().take(1).collect(),
            presence: PRESENCE_ON_DELIVERY,
        },
        _ => ChatCounterpart {
            role: CounterpartRole::Support,
            name: SUPPORT_NAME.to_string(),
            initials: SUPPORT_INITIALS.to_string(),
            presence: PRESENCE_AVAILABLE,
        },
    }
}

// Threads are addressed solely by shipment id.
pub struct MessageRouter {
    transport: Arc<dyn Transport>,
    threads: DashMap<Uuid, Vec<Message>>,
    typing: DashMap<Uuid, bool>,
    seen: DashMap<Uuid, usize>,
    undelivered: DashMap<Uuid, Uuid>,
}

impl MessageRouter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            threads: DashMap::new(),
            typing: DashMap::new(),
            seen: DashMap::new(),
            undelivered: DashMap::new(),
        }
    }

    // A copy the transport refused stays visible until the next applied snapshot.
    pub async fn send(&self, shipment_id: Uuid, text: &str) -> Result<Option<Message>, AppError> {
        let text = text.trim();
        if text.is_empty() {
            debug!(shipment_id = %shipment_id, "ignoring empty message");
            return Ok(None);
        }

        let message = Message::outgoing(shipment_id, text);
        self.threads
            .entry(shipment_id)
            .or_default()
            .push(message.clone());
        self.mark_seen(shipment_id);

        if let Err(err) = self.transport.send_message(message.clone()).await {
            warn!(shipment_id = %shipment_id, message_id = %message.id, error = %err, "message not delivered");
            self.undelivered.insert(message.id, shipment_id);
            return Err(err);
        }
        Ok(Some(message))
    }

    // A counterpart message always ends that thread's typing indicator.
    pub fn receive(&self, message: Message) -> bool {
        let shipment_id = message.shipment_id;
        let appended = {
            let mut thread = self.threads.entry(shipment_id).or_default();
            if thread.iter().any(|existing| existing.id == message.id) {
                false
            } else {
                thread.push(message);
                true
            }
        };

        self.typing.insert(shipment_id, false);
        appended
    }

    pub fn set_typing(&self, shipment_id: Uuid, typing: bool) {
        self.typing.insert(shipment_id, typing);
    }

    pub fn is_typing(&self, shipment_id: Uuid) -> bool {
        self.typing
            .get(&shipment_id)
            .map(|entry| *entry.value())
            .unwrap_or(false)
    }

    pub fn thread(&self, shipment_id: Uuid) -> Vec<Message> {
        self.threads
            .get(&shipment_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn unread(&self, shipment_id: Uuid) -> usize {
        let seen = self
            .seen
            .get(&shipment_id)
            .map(|entry| *entry.value())
            .unwrap_or(0);

        self.threads
            .get(&shipment_id)
            .map(|thread| {
                thread
                    .iter()
                    .skip(seen)
                    .filter(|message| !message.is_me)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn mark_seen(&self, shipment_id: Uuid) {
        let len = self
            .threads
            .get(&shipment_id)
            .map(|thread| thread.len())
            .unwrap_or(0);
        self.seen.insert(shipment_id, len);
    }

    pub fn absorb(&self, snapshot: HashMap<Uuid, Vec<Message>>, live: &HashSet<Uuid>) {
        self.retain_live(live);
        self.drop_undelivered(&snapshot);

        for (shipment_id, messages) in snapshot {
            if !live.contains(&shipment_id) {
                continue;
            }

            let mut thread = self.threads.entry(shipment_id).or_default();
            let mut known: HashSet<Uuid> = thread.iter().map(|message| message.id).collect();
            for message in messages {
                if known.insert(message.id) {
                    thread.push(message);
                }
            }
        }
    }

    pub fn forget(&self, shipment_id: Uuid) {
        self.threads.remove(&shipment_id);
        self.typing.remove(&shipment_id);
        self.seen.remove(&shipment_id);
        self.undelivered.retain(|_, owner| *owner != shipment_id);
    }

    fn retain_live(&self, live: &HashSet<Uuid>) {
        self.threads.retain(|id, _| live.contains(id));
        self.typing.retain(|id, _| live.contains(id));
        self.seen.retain(|id, _| live.contains(id));
        self.undelivered.retain(|_, owner| live.contains(owner));
    }

    fn drop_undelivered(&self, snapshot: &HashMap<Uuid, Vec<Message>>) {
        let pending: Vec<(Uuid, Uuid)> = self
            .undelivered
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        for (message_id, shipment_id) in pending {
            self.undelivered.remove(&message_id);
            let delivered = snapshot
                .get(&shipment_id)
                .is_some_and(|messages| messages.iter().any(|message| message.id == message_id));
            if delivered {
                continue;
            }

            let Some(mut thread) = self.threads.get_mut(&shipment_id) else {
                continue;
            };
            let Some(position) = thread.iter().position(|message| message.id == message_id) else {
                continue;
            };
            thread.remove(position);
            drop(thread);

            if let Some(mut seen) = self.seen.get_mut(&shipment_id) {
                if position < *seen {
                    *seen -= 1;
                }
            }
            debug!(shipment_id = %shipment_id, message_id = %message_id, "dropped undelivered message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::shipment::{Address, Instructions, NewShipment};
    use crate::transport::InMemoryTransport;

    async fn router_with_shipment() -> (MessageRouter, Arc<InMemoryTransport>, Uuid) {
        let transport = Arc::new(InMemoryTransport::new(16));
        let shipment = transport
            .create_shipment(NewShipment {
                pickup: Address {
                    address: "Harbour Gate 4".to_string(),
                    location: None,
                },
                dropoff: Address {
                    address: "Inland Depot 2".to_string(),
                    location: None,
                },
                vehicle_type: None,
                weight: None,
                cargo_type: None,
                instructions: Instructions::default(),
            })
            .await
            .unwrap();

        (MessageRouter::new(transport.clone()), transport, shipment.id)
    }

    #[test]
    fn driver_is_counterpart_only_while_on_delivery() {
        for status in ShipmentStatus::KNOWN {
            let counterpart = resolve_counterpart(&status, Some("Musa"));
            let expected = if matches!(
                status,
                ShipmentStatus::Assigned | ShipmentStatus::PickedUp | ShipmentStatus::InTransit
            ) {
                CounterpartRole::Driver
            } else {
                CounterpartRole::Support
            };
            assert_eq!(counterpart.role, expected, "{status}");
        }
    }

    #[test]
    fn picked_up_with_named_driver_resolves_to_driver() {
        let counterpart = resolve_counterpart(&ShipmentStatus::PickedUp, Some("Musa"));
        assert_eq!(counterpart.name, "Musa");
        assert_eq!(counterpart.initials, "M");
        assert_eq!(counterpart.presence, "On Delivery");
    }

    #[test]
    fn driver_initials_keep_the_first_character_as_written() {
        let counterpart = resolve_counterpart(&ShipmentStatus::InTransit, Some(" ébo "));
        assert_eq!(counterpart.name, "ébo");
        assert_eq!(counterpart.initials, "é");
    }

    #[test]
    fn pending_review_without_driver_resolves_to_support() {
        let counterpart = resolve_counterpart(&ShipmentStatus::PendingReview, None);
        assert_eq!(counterpart.role, CounterpartRole::Support);
        assert_eq!(counterpart.name, "Admin Support");
        assert_eq!(counterpart.presence, "Available");
    }

    #[test]
    fn active_status_without_driver_name_falls_back_to_support() {
        let counterpart = resolve_counterpart(&ShipmentStatus::InTransit, Some("  "));
        assert_eq!(counterpart.role, CounterpartRole::Support);
    }

    #[tokio::test]
    async fn whitespace_message_leaves_thread_untouched() {
        let (router, _transport, shipment_id) = router_with_shipment().await;

        let sent = router.send(shipment_id, "   \n\t").await.unwrap();
        assert!(sent.is_none());
        assert!(router.thread(shipment_id).is_empty());
    }

    #[tokio::test]
    async fn threads_do_not_leak_between_shipments() {
        let (router, transport, first) = router_with_shipment().await;
        let second = transport
            .create_shipment(NewShipment {
                pickup: Address {
                    address: "Cold Store 1".to_string(),
                    location: None,
                },
                dropoff: Address {
                    address: "Retail Park 3".to_string(),
                    location: None,
                },
                vehicle_type: None,
                weight: None,
                cargo_type: None,
                instructions: Instructions::default(),
            })
            .await
            .unwrap()
            .id;

        router.send(first, "first thread").await.unwrap();
        router.send(second, "second thread").await.unwrap();
        router.send(first, "first again").await.unwrap();

        let texts: Vec<String> = router
            .thread(first)
            .into_iter()
            .map(|message| message.text)
            .collect();
        assert_eq!(texts, vec!["first thread", "first again"]);
        assert_eq!(router.thread(second).len(), 1);
        assert!(router.thread(first).iter().all(|message| message.is_me));
    }

    #[tokio::test]
    async fn failed_send_keeps_local_copy_and_reports_error() {
        let (router, transport, shipment_id) = router_with_shipment().await;
        transport
            .fail_next(AppError::Transport("offline".to_string()))
            .await;

        let err = router.send(shipment_id, "hello").await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
        assert_eq!(router.thread(shipment_id).len(), 1);
    }

    #[tokio::test]
    async fn snapshot_without_undelivered_copy_removes_it() {
        let (router, transport, shipment_id) = router_with_shipment().await;
        let delivered = router.send(shipment_id, "first").await.unwrap().unwrap();
        transport
            .fail_next(AppError::Transport("offline".to_string()))
            .await;
        router.send(shipment_id, "lost").await.unwrap_err();
        let reply = Message::incoming(shipment_id, "got the first one");
        router.receive(reply.clone());
        assert_eq!(router.unread(shipment_id), 1);

        let snapshot = HashMap::from([(shipment_id, vec![delivered.clone(), reply.clone()])]);
        router.absorb(snapshot, &HashSet::from([shipment_id]));

        let texts: Vec<String> = router
            .thread(shipment_id)
            .into_iter()
            .map(|message| message.text)
            .collect();
        assert_eq!(texts, vec!["first", "got the first one"]);
        assert_eq!(router.unread(shipment_id), 1);
    }

    #[tokio::test]
    async fn counterpart_message_clears_typing_and_counts_as_unread() {
        let (router, _transport, shipment_id) = router_with_shipment().await;
        router.set_typing(shipment_id, true);
        assert!(router.is_typing(shipment_id));

        let reply = Message::incoming(shipment_id, "on my way");
        assert!(router.receive(reply.clone()));
        assert!(!router.receive(reply));

        assert!(!router.is_typing(shipment_id));
        assert_eq!(router.unread(shipment_id), 1);
        router.mark_seen(shipment_id);
        assert_eq!(router.unread(shipment_id), 0);
    }

    #[tokio::test]
    async fn absorb_appends_unknown_messages_without_reordering() {
        let (router, _transport, shipment_id) = router_with_shipment().await;
        let local = router.send(shipment_id, "mine").await.unwrap().unwrap();
        let remote = Message::incoming(shipment_id, "theirs");

        let snapshot = HashMap::from([(shipment_id, vec![remote.clone(), local.clone()])]);
        router.absorb(snapshot, &HashSet::from([shipment_id]));

        let ids: Vec<Uuid> = router
            .thread(shipment_id)
            .into_iter()
            .map(|message| message.id)
            .collect();
        assert_eq!(ids, vec![local.id, remote.id]);

        router.absorb(HashMap::new(), &HashSet::new());
        assert!(router.thread(shipment_id).is_empty());
    }
}
