use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DISPLAY_TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub text: String,
    pub timestamp: String,
    pub is_me: bool,
}

impl Message {
    pub fn outgoing(shipment_id: Uuid, text: impl Into<String>) -> Self {
        Self::stamped(shipment_id, text.into(), true)
    }

    pub fn incoming(shipment_id: Uuid, text: impl Into<String>) -> Self {
        Self::stamped(shipment_id, text.into(), false)
    }

    fn stamped(shipment_id: Uuid, text: String, is_me: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            shipment_id,
            text,
            timestamp: Utc::now().format(DISPLAY_TIME_FORMAT).to_string(),
            is_me,
        }
    }
}
