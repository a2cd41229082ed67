use std::sync::Arc;

use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use log::*;
use payment_engine::{
    catalog::MemoryCatalog,
    db_types::Order,
    events::EventProducers,
    notifications::notification_channel,
    test_utils::{
        fakes::FakeProvider,
        fixtures::{sample_catalog, sample_services},
        prepare_env::{prepare_test_env, random_db_path},
    },
    traits::OrderManagement,
    EngineConfig,
    OrderFlowApi,
    SqliteDatabase,
};
use serde_json::Value;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    config::ServerOptions,
    routes::{
        health,
        ChargebackOrderRoute,
        ConfirmOrderRoute,
        CreateOrderFormRoute,
        CreateOrderRoute,
        CreatePaymentRoute,
        OrderByUuidRoute,
        PaymentCallbackRoute,
        RecreateOrderRoute,
        RefundOrderRoute,
        ReplaceItemRoute,
    },
    server::{form_config, json_config},
};

pub const RU_IP: &str = "95.173.136.70";

/// The engine backed by a fresh SQLite database and the sample catalog.
pub struct TestBackend {
    pub api: web::Data<OrderFlowApi<SqliteDatabase>>,
    pub db: SqliteDatabase,
    pub notifications: UnboundedReceiver<Order>,
}

impl TestBackend {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let catalog = Arc::new(MemoryCatalog::new(sample_catalog()));
        let services = sample_services(catalog, Arc::new(FakeProvider::default()));
        let (notifier, notifications) = notification_channel();
        let api = OrderFlowApi::new(db.clone(), services, notifier, EventProducers::default(), EngineConfig::default());
        Self { api: web::Data::new(api), db, notifications }
    }

    pub async fn tear_down(self) {
        self.db.pool().close().await;
        if let Err(e) = Sqlite::drop_database(self.db.url()).await {
            warn!("Could not drop test database {}: {e}", self.db.url());
        }
    }
}

pub fn configure<B: OrderManagement + 'static>(cfg: &mut ServiceConfig) {
    let api_scope = web::scope("/api")
        .service(CreateOrderRoute::<B>::new())
        .service(CreateOrderFormRoute::<B>::new())
        .service(RecreateOrderRoute::<B>::new())
        .service(ConfirmOrderRoute::<B>::new())
        .service(RefundOrderRoute::<B>::new())
        .service(ChargebackOrderRoute::<B>::new())
        .service(ReplaceItemRoute::<B>::new())
        .service(OrderByUuidRoute::<B>::new())
        .service(CreatePaymentRoute::<B>::new())
        .service(PaymentCallbackRoute::<B>::new());
    cfg.app_data(web::Data::new(ServerOptions::default()))
        .app_data(json_config())
        .app_data(form_config())
        .service(health)
        .service(api_scope);
}

/// Sends `req` to an app wired to `api` and returns the HTTP status with the parsed JSON body.
pub async fn send<B: OrderManagement + 'static>(
    api: web::Data<OrderFlowApi<B>>,
    req: TestRequest,
) -> (StatusCode, Value) {
    let app = test::init_service(App::new().app_data(api).configure(configure::<B>)).await;
    let (_, res) = test::call_service(&app, req.to_request()).await.into_parts();
    let status = res.status();
    let body = res.into_body().try_into_bytes().unwrap();
    debug!("Response: {status} {}", String::from_utf8_lossy(&body));
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
