#![allow(dead_code)]
use std::{collections::HashMap, sync::Arc, time::Duration};

use log::*;
use payment_engine::{
    catalog::MemoryCatalog,
    db_types::{Order, OrderType, OrderUuid},
    events::EventProducers,
    helpers::calculate_hmac,
    notifications::notification_channel,
    order_objects::{OrderCreateRequest, OrderUserRequest, PaymentCreateRequest},
    test_utils::{
        fakes::FakeProvider,
        fixtures::{sample_catalog, sample_services, CARD_CALLBACK_SECRET},
        prepare_env::{prepare_test_env, random_db_path},
    },
    traits::OrderManagement,
    EngineConfig,
    OrderFlowApi,
    SqliteDatabase,
};
use pg_common::Amount;
use serde_json::json;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::sync::mpsc::UnboundedReceiver;

pub const RU_IP: &str = "95.173.136.70";

pub struct TestEnv {
    pub api: OrderFlowApi<SqliteDatabase>,
    pub db: SqliteDatabase,
    pub catalog: Arc<MemoryCatalog>,
    pub provider: Arc<FakeProvider>,
    pub notifications: UnboundedReceiver<Order>,
}

impl TestEnv {
    /// Everything queued for merchant notification so far, in enqueue order.
    pub fn notifications(&mut self) -> Vec<Order> {
        let mut result = Vec::new();
        while let Ok(order) = self.notifications.try_recv() {
            result.push(order);
        }
        result
    }
}

pub async fn setup() -> TestEnv {
    setup_with(FakeProvider::default(), EventProducers::default(), EngineConfig::default()).await
}

pub async fn setup_with(provider: FakeProvider, producers: EventProducers, config: EngineConfig) -> TestEnv {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let catalog = Arc::new(MemoryCatalog::new(sample_catalog()));
    let provider = Arc::new(provider);
    let services = sample_services(catalog.clone(), provider.clone());
    let (notifier, notifications) = notification_channel();
    let api = OrderFlowApi::new(db.clone(), services, notifier, producers, config);
    TestEnv { api, db, catalog, provider, notifications }
}

pub fn expired_forms() -> EngineConfig {
    EngineConfig { order_form_lifetime: Duration::ZERO, ..EngineConfig::default() }
}

pub async fn tear_down(env: TestEnv) {
    env.db.pool().close().await;
    if let Err(e) = Sqlite::drop_database(env.db.url()).await {
        warn!("🚀️ Could not drop test database {}: {e}", env.db.url());
    }
}

/// A simple RUB order for `proj-game`, paid by bank card, from a Russian IP address.
pub fn card_order_request(project_order_id: &str, amount_major: i64) -> OrderCreateRequest {
    OrderCreateRequest {
        project_id: "proj-game".into(),
        project_order_id: Some(project_order_id.into()),
        order_type: OrderType::Simple,
        amount: Some(Amount::from_major(amount_major)),
        currency: Some("RUB".into()),
        payment_method: Some("BANKCARD".into()),
        user: OrderUserRequest { ip: Some(RU_IP.into()), email: Some("payer@example.com".into()), ..Default::default() },
        ..Default::default()
    }
}

pub fn card_payment(order_uuid: &OrderUuid) -> PaymentCreateRequest {
    let fields = [
        ("pan", "4111111111111111"),
        ("cvv", "123"),
        ("month", "12"),
        ("year", "30"),
        ("card_holder", "IVAN IVANOV"),
    ];
    PaymentCreateRequest {
        order_uuid: order_uuid.clone(),
        payment_method_id: "pm-card".into(),
        fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>(),
        billing_address: None,
    }
}

/// A signed provider callback body for `order`.
pub fn callback(order: &Order, outcome: &str) -> (Vec<u8>, String) {
    callback_for_amount(order, outcome, order.total_amount)
}

pub fn callback_for_amount(order: &Order, outcome: &str, amount: Amount) -> (Vec<u8>, String) {
    let body = json!({
        "outcome": outcome,
        "amount": amount,
        "currency": order.currency,
        "transaction_id": format!("tx-{}", order.uuid),
        "decline_code": if outcome == "declined" { Some("51") } else { None },
        "decline_reason": if outcome == "declined" { Some("Insufficient funds") } else { None },
        "requisites": { "pan": "4111111111111111", "expiry_month": "12", "expiry_year": "30" },
    });
    let body = serde_json::to_vec(&body).expect("callback body");
    let signature = calculate_hmac(&body, CARD_CALLBACK_SECRET).expect("callback signature");
    (body, signature)
}

/// Creates a card order and dispatches its payment, leaving it in `PaymentSystemCreate`.
pub async fn paid_order_in_progress(env: &TestEnv, project_order_id: &str) -> Order {
    let order = env.api.create_order(card_order_request(project_order_id, 150), None).await.expect("create order");
    env.api.process_payment(card_payment(&order.uuid)).await.expect("process payment");
    env.api.fetch_order(&order.uuid).await.expect("fetch order")
}
