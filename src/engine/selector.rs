use serde::Serialize;

use crate::engine::status::{is_operationally_active, is_ratable};
use crate::models::shipment::{Shipment, ShipmentStatus};

pub fn select_active(shipments: &[Shipment]) -> Option<&Shipment> {
    shipments
        .iter()
        .find(|shipment| is_operationally_active(&shipment.status))
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DashboardSummary {
    pub total: usize,
    pub active: usize,
    pub delivered: usize,
    pub cancelled: usize,
    pub issues: usize,
    pub awaiting_rating: usize,
}

pub fn summarize(shipments: &[Shipment]) -> DashboardSummary {
    shipments
        .iter()
        .fold(DashboardSummary::default(), |mut summary, shipment| {
            summary.total += 1;
            if is_operationally_active(&shipment.status) {
                summary.active += 1;
            }
            if is_ratable(shipment) {
                summary.awaiting_rating += 1;
            }
            match shipment.status {
                ShipmentStatus::Delivered => summary.delivered += 1,
                ShipmentStatus::Cancelled => summary.cancelled += 1,
                ShipmentStatus::IssueReported => summary.issues += 1,
                _ => {}
            }
            summary
        })
}
