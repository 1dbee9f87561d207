use crate::models::shipment::{Shipment, ShipmentStatus};

pub fn is_chat_presence_active(status: &ShipmentStatus) -> bool {
    match status {
        ShipmentStatus::Assigned | ShipmentStatus::PickedUp | ShipmentStatus::InTransit => true,
        ShipmentStatus::PendingReview
        | ShipmentStatus::Scheduled
        | ShipmentStatus::Delivered
        | ShipmentStatus::IssueReported
        | ShipmentStatus::Cancelled
        | ShipmentStatus::Unrecognized(_) => false,
    }
}

pub fn is_operationally_active(status: &ShipmentStatus) -> bool {
    match status {
        ShipmentStatus::PendingReview
        | ShipmentStatus::Assigned
        | ShipmentStatus::PickedUp
        | ShipmentStatus::InTransit => true,
        ShipmentStatus::Scheduled
        | ShipmentStatus::Delivered
        | ShipmentStatus::IssueReported
        | ShipmentStatus::Cancelled
        | ShipmentStatus::Unrecognized(_) => false,
    }
}

// Includes CANCELLED.
pub fn is_editable(status: &ShipmentStatus) -> bool {
    match status {
        ShipmentStatus::PendingReview | ShipmentStatus::Scheduled | ShipmentStatus::Cancelled => {
            true
        }
        ShipmentStatus::Assigned
        | ShipmentStatus::PickedUp
        | ShipmentStatus::InTransit
        | ShipmentStatus::Delivered
        | ShipmentStatus::IssueReported
        | ShipmentStatus::Unrecognized(_) => false,
    }
}

pub fn is_deletable(status: &ShipmentStatus) -> bool {
    is_editable(status)
}

pub fn is_cancellable(status: &ShipmentStatus) -> bool {
    matches!(
        status,
        ShipmentStatus::PendingReview | ShipmentStatus::Scheduled
    )
}

pub fn is_ratable(shipment: &Shipment) -> bool {
    shipment.status == ShipmentStatus::Delivered && shipment.rating.is_none()
}

pub fn status_label(status: &ShipmentStatus) -> String {
    let label = match status {
        ShipmentStatus::PendingReview => "Pending Review",
        ShipmentStatus::Scheduled => "Scheduled",
        ShipmentStatus::Assigned => "Driver Assigned",
        ShipmentStatus::PickedUp => "Picked Up",
        ShipmentStatus::InTransit => "In Transit",
        ShipmentStatus::Delivered => "Delivered",
        ShipmentStatus::IssueReported => "Issue Reported",
        ShipmentStatus::Cancelled => "Cancelled",
        ShipmentStatus::Unrecognized(raw) => return generic_label(raw),
    };
    label.to_string()
}

fn generic_label(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect()
}
