pub mod feed;
pub mod gateway;
pub mod messaging;
pub mod selector;
pub mod status;
