use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{db_types::Order, traits::PaymentGatewayError};

/// A notification that could not be delivered before the process stopped.
///
/// The stored order keeps its own `id`; `original_order_id` is carried separately so the entry can be restored as
/// the same logical order even if the backing table assigns its own row ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNotification {
    pub original_order_id: i64,
    pub order: Order,
}

impl StoredNotification {
    pub fn new(order: Order) -> Self {
        Self { original_order_id: order.id, order }
    }

    pub fn into_order(self) -> Order {
        let mut order = self.order;
        order.id = self.original_order_id;
        order
    }
}

/// Durable overflow storage for the notification queue.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Loads every stored notification, oldest first.
    async fn load_notifications(&self) -> Result<Vec<StoredNotification>, PaymentGatewayError>;

    /// Appends the given notifications in order.
    async fn save_notifications(&self, notifications: &[StoredNotification]) -> Result<(), PaymentGatewayError>;

    /// Removes all stored notifications, returning how many were deleted.
    async fn clear_notifications(&self) -> Result<u64, PaymentGatewayError>;

    /// Replaces the stored notifications with the given ones, atomically. If this fails, the store is left as it
    /// was.
    async fn replace_notifications(&self, notifications: &[StoredNotification]) -> Result<(), PaymentGatewayError>;
}
