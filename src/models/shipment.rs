use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Instructions {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// Values the client does not know yet are kept verbatim in `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShipmentStatus {
    PendingReview,
    Scheduled,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    IssueReported,
    Cancelled,
    Unrecognized(String),
}

impl ShipmentStatus {
    pub const KNOWN: [ShipmentStatus; 8] = [
        ShipmentStatus::PendingReview,
        ShipmentStatus::Scheduled,
        ShipmentStatus::Assigned,
        ShipmentStatus::PickedUp,
        ShipmentStatus::InTransit,
        ShipmentStatus::Delivered,
        ShipmentStatus::IssueReported,
        ShipmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ShipmentStatus::PendingReview => "PENDING_REVIEW",
            ShipmentStatus::Scheduled => "SCHEDULED",
            ShipmentStatus::Assigned => "ASSIGNED",
            ShipmentStatus::PickedUp => "PICKED_UP",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::IssueReported => "ISSUE_REPORTED",
            ShipmentStatus::Cancelled => "CANCELLED",
            ShipmentStatus::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for ShipmentStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PENDING_REVIEW" => ShipmentStatus::PendingReview,
            "SCHEDULED" => ShipmentStatus::Scheduled,
            "ASSIGNED" => ShipmentStatus::Assigned,
            "PICKED_UP" => ShipmentStatus::PickedUp,
            "IN_TRANSIT" => ShipmentStatus::InTransit,
            "DELIVERED" => ShipmentStatus::Delivered,
            "ISSUE_REPORTED" => ShipmentStatus::IssueReported,
            "CANCELLED" => ShipmentStatus::Cancelled,
            _ => ShipmentStatus::Unrecognized(raw),
        }
    }
}

impl From<ShipmentStatus> for String {
    fn from(status: ShipmentStatus) -> Self {
        match status {
            ShipmentStatus::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: Uuid,
    pub tracking_id: String,
    pub status: ShipmentStatus,
    pub pickup: Address,
    pub dropoff: Address,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub cargo_type: Option<String>,
    #[serde(default)]
    pub instructions: Instructions,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub review: Option<String>,
}

impl Shipment {
    pub fn rating_is_consistent(&self) -> bool {
        let rated = self.rating.is_some() || self.review.is_some();
        !rated || self.status == ShipmentStatus::Delivered
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShipment {
    pub pickup: Address,
    pub dropoff: Address,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub cargo_type: Option<String>,
    #[serde(default)]
    pub instructions: Instructions,
}

impl NewShipment {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_address("pickup", &self.pickup)?;
        validate_address("dropoff", &self.dropoff)?;
        validate_weight(self.weight)
    }
}

// Identity, tracking id, creation date and status are not patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipmentPatch {
    #[serde(default)]
    pub pickup: Option<Address>,
    #[serde(default)]
    pub dropoff: Option<Address>,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub cargo_type: Option<String>,
    #[serde(default)]
    pub instructions: Option<Instructions>,
}

impl ShipmentPatch {
    pub fn is_empty(&self) -> bool {
        self.pickup.is_none()
            && self.dropoff.is_none()
            && self.vehicle_type.is_none()
            && self.weight.is_none()
            && self.cargo_type.is_none()
            && self.instructions.is_none()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(pickup) = &self.pickup {
            validate_address("pickup", pickup)?;
        }
        if let Some(dropoff) = &self.dropoff {
            validate_address("dropoff", dropoff)?;
        }
        validate_weight(self.weight)
    }

    pub fn apply_to(self, shipment: &mut Shipment) {
        if let Some(pickup) = self.pickup {
            shipment.pickup = pickup;
        }
        if let Some(dropoff) = self.dropoff {
            shipment.dropoff = dropoff;
        }
        if let Some(vehicle_type) = self.vehicle_type {
            shipment.vehicle_type = Some(vehicle_type);
        }
        if let Some(weight) = self.weight {
            shipment.weight = Some(weight);
        }
        if let Some(cargo_type) = self.cargo_type {
            shipment.cargo_type = Some(cargo_type);
        }
        if let Some(instructions) = self.instructions {
            shipment.instructions = instructions;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRating {
    pub rating: u8,
    #[serde(default)]
    pub review: String,
}

impl DriverRating {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=5).contains(&self.rating) {
            return Err(AppError::validation("rating", "rating must be between 1 and 5"));
        }
        Ok(())
    }
}

fn validate_address(field: &'static str, address: &Address) -> Result<(), AppError> {
    if address.address.trim().is_empty() {
        return Err(AppError::validation(field, "address cannot be empty"));
    }
    Ok(())
}

fn validate_weight(weight: Option<f64>) -> Result<(), AppError> {
    match weight {
        Some(weight) if !weight.is_finite() || weight <= 0.0 => {
            Err(AppError::validation("weight", "weight must be > 0"))
        }
        _ => Ok(()),
    }
}
