use std::sync::Arc;

use log::*;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::{db_types::Order, notifications::NotificationDelivery};

/// The producer side of the notification queue. Cheap to clone; enqueueing never waits for delivery.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<Order>,
}

impl NotificationSender {
    pub fn enqueue(&self, order: Order) {
        let uuid = order.uuid.clone();
        if self.tx.send(order).is_err() {
            error!("📬️ The notification worker has stopped. The notification for order {uuid} was dropped.");
        }
    }
}

pub fn notification_channel() -> (NotificationSender, mpsc::UnboundedReceiver<Order>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender { tx }, rx)
}

/// Starts the notification delivery worker.
///
/// The worker drains the queue whenever a notification arrives, unless delivery is stalled, and again on every
/// retry tick. When `shutdown` flips to `true` (or its sender is dropped) it picks up anything still in the channel,
/// makes one last delivery attempt and saves whatever is left to the durable store. Await the returned handle to know that this is done.
pub fn start_notification_worker(
    delivery: Arc<NotificationDelivery>,
    mut rx: mpsc::UnboundedReceiver<Order>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(delivery.config().retry_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately
        timer.tick().await;
        match delivery.restore().await {
            Ok(n) => debug!("📬️ {n} notifications restored"),
            Err(e) => error!("📬️ Could not restore saved notifications: {e}"),
        }
        info!("📬️ Notification delivery worker started");
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(order) => delivery.submit(order).await,
                    None => {
                        info!("📬️ All notification senders have been dropped");
                        break;
                    },
                },
                _ = timer.tick() => {
                    let result = delivery.tick().await;
                    if result.published > 0 || result.remaining > 0 {
                        debug!("📬️ Retry tick: {} delivered, {} still queued", result.published, result.remaining);
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("📬️ Notification delivery worker is shutting down");
                        break;
                    }
                },
            }
        }
        while let Ok(order) = rx.try_recv() {
            delivery.enqueue(order);
        }
        delivery.drain().await;
        match delivery.shutdown().await {
            Ok(n) => info!("📬️ Notification worker stopped. {n} notifications saved for later."),
            Err(e) => error!("📬️ Notification worker stopped, but undelivered notifications could not be saved: {e}"),
        }
    })
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::{
        notifications::{NotificationConfig, ORDER_UUID_HEADER},
        test_utils::{
            fakes::{MemoryNotificationStore, RecordingPush},
            fixtures::sample_order,
        },
        traits::{BusError, Headers, MessageBus, NotificationStore},
    };

    #[derive(Default)]
    struct SwitchableBus {
        down: Mutex<bool>,
        attempts: Mutex<usize>,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageBus for SwitchableBus {
        async fn publish(&self, _: &str, _: &Value, headers: &Headers) -> Result<(), BusError> {
            *self.attempts.lock().unwrap() += 1;
            if *self.down.lock().unwrap() {
                return Err(BusError::PublishFailed("broker down".into()));
            }
            self.delivered.lock().unwrap().push(headers.get(ORDER_UUID_HEADER).cloned().unwrap_or_default());
            Ok(())
        }
    }

    fn config() -> NotificationConfig {
        NotificationConfig {
            retry_interval: Duration::from_millis(20),
            publish_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn worker_delivers_and_retries() {
        let bus = Arc::new(SwitchableBus::default());
        *bus.down.lock().unwrap() = true;
        let store = Arc::new(MemoryNotificationStore::default());
        let delivery = Arc::new(NotificationDelivery::new(config(), bus.clone(), Arc::new(RecordingPush::default()), store));
        let (sender, rx) = notification_channel();
        let (stop, shutdown) = watch::channel(false);
        let handle = start_notification_worker(delivery.clone(), rx, shutdown);
        let order = sample_order(1);
        sender.enqueue(order.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(bus.delivered.lock().unwrap().is_empty());
        assert!(delivery.retry_count() > 0);

        *bus.down.lock().unwrap() = false;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*bus.delivered.lock().unwrap(), vec![order.uuid.to_string()]);
        assert_eq!(delivery.retry_count(), 0);

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn a_stalled_queue_waits_for_the_retry_timer() {
        let bus = Arc::new(SwitchableBus::default());
        *bus.down.lock().unwrap() = true;
        let store = Arc::new(MemoryNotificationStore::default());
        let config = NotificationConfig { retry_interval: Duration::from_secs(3600), ..config() };
        let delivery = Arc::new(NotificationDelivery::new(config, bus.clone(), Arc::new(RecordingPush::default()), store));
        let (sender, rx) = notification_channel();
        let (stop, shutdown) = watch::channel(false);
        let handle = start_notification_worker(delivery.clone(), rx, shutdown);
        for i in 1..=50 {
            sender.enqueue(sample_order(i));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(delivery.queue_len(), 50);
        assert!(delivery.is_stalled());
        // Only the first notification reached the broker. The rest were queued behind it.
        assert_eq!(*bus.attempts.lock().unwrap(), 1);
        assert_eq!(delivery.retry_count(), 0);

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn worker_saves_the_backlog_on_shutdown() {
        let bus = Arc::new(SwitchableBus::default());
        *bus.down.lock().unwrap() = true;
        let store = Arc::new(MemoryNotificationStore::default());
        let delivery =
            Arc::new(NotificationDelivery::new(config(), bus, Arc::new(RecordingPush::default()), store.clone()));
        let (sender, rx) = notification_channel();
        let (stop, shutdown) = watch::channel(false);
        let handle = start_notification_worker(delivery, rx, shutdown);
        sender.enqueue(sample_order(1));
        sender.enqueue(sample_order(2));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(true).unwrap();
        handle.await.unwrap();
        let saved = store.load_notifications().await.unwrap();
        assert_eq!(saved.iter().map(|n| n.original_order_id).collect::<Vec<_>>(), vec![1, 2]);
    }
}
