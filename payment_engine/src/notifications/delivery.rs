//! # Notification delivery
//!
//! Merchants learn about order outcomes through the message bus. The bus may be down for minutes at a time, so
//! notifications are never published directly by the code that changes an order. Instead they are appended to an
//! in-memory FIFO queue that is drained front to back:
//!
//! * A drain pass publishes entries one by one and stops at the *first* failure. The failed entry and everything
//!   behind it stay queued, so delivery order always matches enqueue order.
//! * After a failed pass the queue is *stalled*. New notifications are only queued while it is stalled, and the
//!   next attempt waits for the retry timer.
//! * Only one drain pass runs at a time.
//! * [`NotificationDelivery::tick`] is called on a timer. Every tick that ends with a non-empty queue bumps a retry
//!   counter; a tick that empties the queue resets it. Each time the counter reaches a multiple of the alarm
//!   threshold, an alarm is pushed to operators. Retries carry on regardless.
//! * On shutdown, whatever is still queued is written to the durable [`NotificationStore`], and
//!   [`NotificationDelivery::restore`] loads it back at the next start.
//!
//! Restored entries stay in the store until the queue has been fully drained once, so a crash in between loses
//! nothing. The store is cleared at most once per instance; after that it is known to be empty until shutdown.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
        Mutex,
        MutexGuard,
    },
};

use log::*;
use serde_json::json;

use crate::{
    db_types::Order,
    notifications::NotificationConfig,
    pg_api::order_objects::OrderNotification,
    traits::{BusError, Headers, MessageBus, NotificationStore, PaymentGatewayError, PushGateway, StoredNotification},
};

pub const ORDER_UUID_HEADER: &str = "x-order-uuid";
pub const PUBLIC_STATUS_HEADER: &str = "x-public-status";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainResult {
    pub published: usize,
    pub remaining: usize,
}

pub struct NotificationDelivery {
    config: NotificationConfig,
    bus: Arc<dyn MessageBus>,
    push: Arc<dyn PushGateway>,
    store: Arc<dyn NotificationStore>,
    queue: Mutex<VecDeque<Order>>,
    drain_lock: tokio::sync::Mutex<()>,
    retries: AtomicU32,
    stalled: AtomicBool,
    store_cleaned: AtomicBool,
}

impl NotificationDelivery {
    pub fn new(
        config: NotificationConfig,
        bus: Arc<dyn MessageBus>,
        push: Arc<dyn PushGateway>,
        store: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            config,
            bus,
            push,
            store,
            queue: Mutex::new(VecDeque::new()),
            drain_lock: tokio::sync::Mutex::new(()),
            retries: AtomicU32::new(0),
            stalled: AtomicBool::new(false),
            store_cleaned: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Order>> {
        // The queue holds plain data and no code panics while holding the lock, so a poisoned lock is still usable
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn queue_len(&self) -> usize {
        self.queue().len()
    }

    /// A snapshot of the queued orders, front first.
    pub fn queued(&self) -> Vec<Order> {
        self.queue().iter().cloned().collect()
    }

    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// True when the last drain pass ended on a failed publish.
    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::SeqCst)
    }

    pub fn is_store_cleaned(&self) -> bool {
        self.store_cleaned.load(Ordering::SeqCst)
    }

    /// Loads notifications saved by a previous run. They go to the front of the queue, oldest first, ahead of
    /// anything enqueued since start-up.
    pub async fn restore(&self) -> Result<usize, PaymentGatewayError> {
        let stored = self.store.load_notifications().await?;
        let count = stored.len();
        if count > 0 {
            let mut queue = self.queue();
            for order in stored.into_iter().rev().map(StoredNotification::into_order) {
                queue.push_front(order);
            }
            info!("📬️ Restored {count} undelivered notifications from the store");
        }
        Ok(count)
    }

    /// Appends a notification to the back of the queue. Never blocks on delivery.
    pub fn enqueue(&self, order: Order) {
        trace!("📬️ Queueing notification for order {} ({})", order.uuid, order.public_status());
        self.queue().push_back(order);
    }

    /// Queues a new notification and tries to deliver it straight away, unless earlier entries are already waiting
    /// for the retry timer.
    pub async fn submit(&self, order: Order) {
        let stalled = self.is_stalled();
        self.enqueue(order);
        if stalled {
            trace!("📬️ Delivery is stalled. The new notification waits for the next retry tick.");
            return;
        }
        self.drain().await;
    }

    /// Publishes queued notifications, front to back, until the queue is empty or a publish fails.
    pub async fn drain(&self) -> DrainResult {
        let _guard = self.drain_lock.lock().await;
        let mut published = 0;
        loop {
            // Only a drain pass removes entries, and we hold the drain lock, so the front cannot change under us
            let Some(order) = self.queue().front().cloned() else {
                break;
            };
            match self.publish(&order).await {
                Ok(()) => {
                    self.queue().pop_front();
                    published += 1;
                    debug!("📬️ Notification for order {} ({}) delivered", order.uuid, order.public_status());
                },
                Err(e) => {
                    warn!("📬️ Could not deliver notification for order {}: {e}. Will retry later.", order.uuid);
                    break;
                },
            }
        }
        let remaining = self.queue_len();
        self.stalled.store(remaining > 0, Ordering::SeqCst);
        if remaining == 0 {
            self.clean_store_once().await;
        }
        DrainResult { published, remaining }
    }

    /// One retry-timer tick: drain the queue, then update the retry counter and raise an alarm if needed.
    pub async fn tick(&self) -> DrainResult {
        let result = self.drain().await;
        if result.remaining == 0 {
            self.retries.store(0, Ordering::SeqCst);
            return result;
        }
        let retries = self.retries.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("📬️ {} notifications still queued after retry #{retries}", result.remaining);
        let threshold = self.config.alarm_threshold;
        if threshold > 0 && retries % threshold == 0 {
            self.raise_alarm(retries, result.remaining).await;
        }
        result
    }

    /// Flushes the queue to the durable store. Call once, when the process is stopping.
    ///
    /// Until the store has been cleaned, it still holds the entries restored at start-up. Those are also in the
    /// queue, so the store is replaced in one step rather than appended to. A failed save leaves the store as it was
    /// and puts the entries back in the queue.
    pub async fn shutdown(&self) -> Result<usize, PaymentGatewayError> {
        let _guard = self.drain_lock.lock().await;
        let pending = self.queue().drain(..).map(StoredNotification::new).collect::<Vec<_>>();
        let result = if self.is_store_cleaned() {
            if pending.is_empty() {
                info!("📬️ Notification queue is empty at shutdown");
                return Ok(0);
            }
            self.store.save_notifications(&pending).await
        } else {
            self.store.replace_notifications(&pending).await
        };
        if let Err(e) = result {
            error!("📬️ Could not save {} undelivered notifications at shutdown: {e}", pending.len());
            let mut queue = self.queue();
            for n in pending.into_iter().rev() {
                queue.push_front(n.into_order());
            }
            return Err(e);
        }
        self.store_cleaned.store(true, Ordering::SeqCst);
        if pending.is_empty() {
            info!("📬️ Notification queue is empty at shutdown");
        } else {
            info!("📬️ Saved {} undelivered notifications for the next start", pending.len());
        }
        Ok(pending.len())
    }

    async fn clean_store_once(&self) {
        if self.is_store_cleaned() {
            return;
        }
        match self.store.clear_notifications().await {
            Ok(n) => {
                if n > 0 {
                    debug!("📬️ Removed {n} delivered notifications from the store");
                }
                self.store_cleaned.store(true, Ordering::SeqCst);
            },
            Err(e) => warn!("📬️ Could not clear the notification store: {e}. Will try again after the next drain."),
        }
    }

    async fn publish(&self, order: &Order) -> Result<(), BusError> {
        let payload = serde_json::to_value(OrderNotification::from(order))
            .map_err(|e| BusError::Serialization(e.to_string()))?;
        let mut headers = Headers::new();
        headers.insert(ORDER_UUID_HEADER.to_string(), order.uuid.to_string());
        headers.insert(PUBLIC_STATUS_HEADER.to_string(), order.public_status().to_string());
        let publish = self.bus.publish(&self.config.topic, &payload, &headers);
        match tokio::time::timeout(self.config.publish_timeout, publish).await {
            Ok(result) => result,
            Err(_) => Err(BusError::Timeout),
        }
    }

    async fn raise_alarm(&self, retries: u32, queued: usize) {
        error!("📬️🚨️ Notification delivery has failed {retries} times in a row. {queued} notifications are queued.");
        let message = json!({
            "kind": "notification_delivery_stalled",
            "retries": retries,
            "queued": queued,
            "topic": self.config.topic,
        });
        if let Err(e) = self.push.publish(&self.config.alarm_channel, &message).await {
            warn!("📬️ Could not push the delivery alarm: {e}");
        }
    }
}
