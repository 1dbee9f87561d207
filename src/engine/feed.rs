use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::Notification;
use crate::transport::Transport;

// Read state only ever moves to `true`.
pub struct NotificationFeed {
    transport: Arc<dyn Transport>,
    entries: RwLock<Vec<Notification>>,
}

impl NotificationFeed {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn list(&self) -> Vec<Notification> {
        self.entries.read().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|notification| !notification.read)
            .count()
    }

    pub async fn push(&self, notification: Notification) -> bool {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|existing| existing.id == notification.id) {
            return false;
        }
        entries.insert(0, notification);
        true
    }

    pub async fn mark_as_read(&self, id: Uuid) -> Result<bool, AppError> {
        let already_read = self
            .entries
            .read()
            .await
            .iter()
            .find(|notification| notification.id == id)
            .map(|notification| notification.read)
            .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

        if already_read {
            debug!(notification_id = %id, "notification already read");
            return Ok(false);
        }

        self.transport.mark_notification_as_read(id).await?;

        let mut entries = self.entries.write().await;
        if let Some(notification) = entries.iter_mut().find(|notification| notification.id == id) {
            notification.read = true;
        }
        Ok(true)
    }

    // Notifications pushed while the round-trip is pending stay unread.
    pub async fn mark_all_as_read(&self) -> Result<usize, AppError> {
        let seen: Vec<Uuid> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|notification| !notification.read)
            .map(|notification| notification.id)
            .collect();

        if seen.is_empty() {
            return Ok(0);
        }

        self.transport
            .mark_all_notifications_as_read(seen.clone())
            .await?;

        let seen: HashSet<Uuid> = seen.into_iter().collect();
        let mut entries = self.entries.write().await;
        let mut marked = 0;
        for notification in entries.iter_mut() {
            if seen.contains(&notification.id) && !notification.read {
                notification.read = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    pub async fn absorb(&self, snapshot: Vec<Notification>) {
        let mut entries = self.entries.write().await;

        let remote_ids: HashSet<Uuid> = snapshot.iter().map(|notification| notification.id).collect();
        let locally_read: HashSet<Uuid> = entries
            .iter()
            .filter(|notification| notification.read)
            .map(|notification| notification.id)
            .collect();

        let mut merged: Vec<Notification> = entries
            .iter()
            .filter(|notification| !remote_ids.contains(&notification.id))
            .cloned()
            .collect();
        merged.extend(snapshot.into_iter().map(|mut notification| {
            notification.read |= locally_read.contains(&notification.id);
            notification
        }));

        *entries = merged;
    }
}
