use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::session::Session;
use crate::transport::Transport;

pub struct AppState {
    pub transport: Arc<dyn Transport>,
    pub session: RwLock<Option<Arc<Session>>>,
    pub event_buffer_size: usize,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(transport: Arc<dyn Transport>, event_buffer_size: usize) -> Self {
        Self {
            transport,
            session: RwLock::new(None),
            event_buffer_size,
            metrics: Metrics::new(),
        }
    }

    pub async fn current_session(&self) -> Result<Arc<Session>, AppError> {
        self.session.read().await.clone().ok_or(AppError::NoSession)
    }

    pub async fn start_session(&self) -> Result<Arc<Session>, AppError> {
        let session = Session::start(
            self.transport.clone(),
            self.metrics.clone(),
            self.event_buffer_size,
        )
        .await?;

        let previous = self.session.write().await.replace(session.clone());
        if let Some(previous) = previous {
            previous.end().await;
        }
        Ok(session)
    }

    pub async fn end_session(&self) -> bool {
        let previous = self.session.write().await.take();
        match previous {
            Some(session) => {
                session.end().await;
                true
            }
            None => false,
        }
    }
}
