//! # Merchant notifications
//!
//! Every committed status change that merchants should hear about is queued here and published to the message bus
//! by a single background worker. See [`NotificationDelivery`] for the delivery guarantees.
mod config;
mod delivery;
mod worker;

pub use config::{NotificationConfig, DEFAULT_ALARM_CHANNEL, DEFAULT_NOTIFY_TOPIC};
pub use delivery::{DrainResult, NotificationDelivery, ORDER_UUID_HEADER, PUBLIC_STATUS_HEADER};
pub use worker::{notification_channel, start_notification_worker, NotificationSender};
