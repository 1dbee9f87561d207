pub mod message;
pub mod notification;
pub mod shipment;
