pub mod certificate;
pub mod client;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod notification;
pub mod wire_protocol;

pub use client::ApnsClient;
pub use config::{ApnsConfig, PoolSettings};
pub use errors::PushError;
pub use notification::{Payload, Priority, PushNotification};
