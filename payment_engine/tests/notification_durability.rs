use std::sync::Arc;

use payment_engine::{
    db_types::PublicStatus,
    notifications::{NotificationConfig, NotificationDelivery, ORDER_UUID_HEADER, PUBLIC_STATUS_HEADER},
    test_utils::fakes::{RecordingBus, RecordingPush},
    traits::NotificationStore,
};

use crate::support::{callback, paid_order_in_progress, setup, tear_down};

mod support;

fn init() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
}

fn config() -> NotificationConfig {
    NotificationConfig { alarm_threshold: 2, ..NotificationConfig::default() }
}

#[tokio::test]
async fn notifications_survive_a_restart() {
    init();
    let mut env = setup().await;
    let order = paid_order_in_progress(&env, "durable-1").await;
    let (body, signature) = callback(&order, "completed");
    env.api.process_callback(&order.uuid, &body, &signature).await.unwrap();
    env.api.refund(&order.uuid, "Out of stock").await.unwrap();
    let declined = paid_order_in_progress(&env, "durable-2").await;
    let (body, signature) = callback(&declined, "declined");
    env.api.process_callback(&declined.uuid, &body, &signature).await.unwrap();

    let pending = env.notifications();
    assert_eq!(pending.len(), 3);

    // First run: the broker is down for the whole session
    let bus = Arc::new(RecordingBus::default());
    bus.set_down(true);
    let push = Arc::new(RecordingPush::default());
    let store: Arc<dyn NotificationStore> = Arc::new(env.db.clone());
    let delivery = NotificationDelivery::new(config(), bus.clone(), push.clone(), store.clone());
    assert_eq!(delivery.restore().await.unwrap(), 0);
    for order in pending {
        delivery.enqueue(order);
    }
    for _ in 0..4 {
        let result = delivery.tick().await;
        assert_eq!(result.published, 0);
        assert_eq!(result.remaining, 3);
    }
    assert_eq!(delivery.retry_count(), 4);
    assert_eq!(push.messages().len(), 2, "an alarm is raised on every second failed tick");
    assert_eq!(delivery.shutdown().await.unwrap(), 3);
    assert_eq!(store.load_notifications().await.unwrap().len(), 3);

    // Second run: the broker is back
    bus.set_down(false);
    let delivery = NotificationDelivery::new(config(), bus.clone(), push.clone(), store.clone());
    assert_eq!(delivery.restore().await.unwrap(), 3);
    let result = delivery.tick().await;
    assert_eq!(result.published, 3);
    assert_eq!(result.remaining, 0);
    assert_eq!(delivery.retry_count(), 0);
    assert!(delivery.is_store_cleaned());
    assert!(store.load_notifications().await.unwrap().is_empty());

    let uuids = bus.header_values(ORDER_UUID_HEADER);
    assert_eq!(uuids, vec![order.uuid.to_string(), order.uuid.to_string(), declined.uuid.to_string()]);
    let statuses = bus.header_values(PUBLIC_STATUS_HEADER);
    let expected = [PublicStatus::Processed, PublicStatus::Refunded, PublicStatus::Declined]
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    assert_eq!(statuses, expected);

    // Nothing is left over for a third run
    assert_eq!(delivery.shutdown().await.unwrap(), 0);
    assert!(store.load_notifications().await.unwrap().is_empty());
    tear_down(env).await;
}

#[tokio::test]
async fn restored_backlog_is_replaced_not_duplicated() {
    init();
    let mut env = setup().await;
    let order = paid_order_in_progress(&env, "durable-3").await;
    let (body, signature) = callback(&order, "completed");
    env.api.process_callback(&order.uuid, &body, &signature).await.unwrap();
    let pending = env.notifications();
    assert_eq!(pending.len(), 1);
    let store: Arc<dyn NotificationStore> = Arc::new(env.db.clone());
    let bus = Arc::new(RecordingBus::default());
    bus.set_down(true);

    for run in 0..3 {
        // Each run restores the backlog, fails to deliver it and saves it again
        let delivery = NotificationDelivery::new(config(), bus.clone(), Arc::new(RecordingPush::default()), store.clone());
        delivery.restore().await.unwrap();
        if run == 0 {
            pending.iter().cloned().for_each(|o| delivery.enqueue(o));
        }
        delivery.tick().await;
        delivery.shutdown().await.unwrap();
        let stored = store.load_notifications().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].order.uuid, order.uuid);
    }
    tear_down(env).await;
}
