use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest, web};
use mockall::mock;
use payment_engine::{
    catalog::MemoryCatalog,
    db_types::{AccountingEntry, NewOrder, Order, OrderUuid},
    events::EventProducers,
    notifications::notification_channel,
    test_utils::{
        fakes::FakeProvider,
        fixtures::{sample_catalog, sample_services},
    },
    traits::{OrderManagement, PaymentGatewayError, StatusChange},
    EngineConfig,
    OrderFlowApi,
};

use super::helpers::send;

mock! {
    pub OrderStore {}
    impl Clone for OrderStore {
        fn clone(&self) -> Self;
    }
    impl OrderManagement for OrderStore {
        fn url(&self) -> &str;
        async fn fetch_order_by_uuid(&self, uuid: &OrderUuid) -> Result<Option<Order>, PaymentGatewayError>;
        async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError>;
        async fn project_order_exists(&self, project_id: &str, project_order_id: &str) -> Result<bool, PaymentGatewayError>;
        async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;
        async fn apply_status_change(&self, change: StatusChange) -> Result<Order, PaymentGatewayError>;
        async fn recreate_order(&self, old: &Order, replacement: NewOrder) -> Result<Order, PaymentGatewayError>;
        async fn fetch_accounting_entries(&self, order_id: i64) -> Result<Vec<AccountingEntry>, PaymentGatewayError>;
    }
}

fn api_with(store: MockOrderStore) -> web::Data<OrderFlowApi<MockOrderStore>> {
    let catalog = Arc::new(MemoryCatalog::new(sample_catalog()));
    let services = sample_services(catalog, Arc::new(FakeProvider::default()));
    let (notifier, _rx) = notification_channel();
    web::Data::new(OrderFlowApi::new(store, services, notifier, EventProducers::default(), EngineConfig::default()))
}

#[actix_web::test]
async fn storage_failures_are_server_errors() {
    let _ = env_logger::try_init().ok();
    let mut store = MockOrderStore::new();
    store
        .expect_fetch_order_by_uuid()
        .returning(|_| Err(PaymentGatewayError::DatabaseError("disk I/O error".into())));
    let (status, body) = send(api_with(store), TestRequest::get().uri("/api/order/abc")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], 500);
    assert_eq!(body["message"]["code"], "system");
    // Internal detail is not leaked
    assert!(!body["message"]["message"].as_str().unwrap().contains("disk"));
}

#[actix_web::test]
async fn missing_orders_are_business_failures() {
    let _ = env_logger::try_init().ok();
    let mut store = MockOrderStore::new();
    store.expect_fetch_order_by_uuid().withf(|uuid| uuid.as_str() == "abc").returning(|_| Ok(None));
    let (status, body) = send(api_with(store), TestRequest::get().uri("/api/order/abc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 404);
}

#[actix_web::test]
async fn duplicates_lost_at_insert_are_reported_as_duplicates() {
    let _ = env_logger::try_init().ok();
    let mut store = MockOrderStore::new();
    store.expect_project_order_exists().returning(|_, _| Ok(false));
    store.expect_insert_order().times(1).returning(|_| Err(PaymentGatewayError::DuplicateOrder("race".into())));
    let body = serde_json::json!({
        "project_id": "proj-game",
        "project_order_id": "dup-1",
        "amount": 150.0,
        "currency": "RUB",
        "user": { "country": "RU" }
    });
    let (status, body) = send(api_with(store), TestRequest::post().uri("/api/order").set_json(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 400);
    assert_eq!(body["message"]["code"], "fm000014");
}
