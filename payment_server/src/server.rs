use std::{collections::BTreeSet, sync::Arc, time::Duration};

use actix_web::{
    dev::Server,
    error::InternalError,
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpResponse,
    HttpServer,
};
use futures::FutureExt;
use log::*;
use payment_engine::{
    catalog::{CachedCatalog, CatalogData, MemoryCache, MemoryCatalog},
    events::{EventHandlers, EventHooks, EventProducers},
    notifications::{notification_channel, start_notification_worker, NotificationDelivery, NotificationSender},
    traits::PushGateway,
    EngineServices,
    OrderError,
    OrderFlowApi,
    ProviderRegistry,
    SqliteDatabase,
};
use tokio::sync::watch;

use crate::{
    catalog_reload::{start_catalog_reload_worker, CatalogReloader},
    config::{ServerConfig, ServerOptions},
    data_objects::{ApiResponse, PaymentPush},
    errors::ServerError,
    integrations::{HttpPaymentProvider, HttpPushGateway, LogOnlyPush, RedisBus},
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
};

const EVENT_BUFFER_SIZE: usize = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let push = create_push_gateway(&config)?;
    let (services, reloader) = load_services(&config)?;

    let bus = RedisBus::connect(config.redis_url.reveal(), config.notifications.publish_timeout)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let delivery = Arc::new(NotificationDelivery::new(
        config.notifications.clone(),
        Arc::new(bus),
        push.clone(),
        Arc::new(db.clone()),
    ));
    let (notifier, rx) = notification_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reload_worker = if config.catalog_reload_interval.is_zero() {
        info!("🚀️ Catalog reloading is disabled");
        None
    } else {
        Some(start_catalog_reload_worker(reloader, config.catalog_reload_interval, shutdown_rx.clone()))
    };
    let worker = start_notification_worker(delivery, rx, shutdown_rx);

    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, create_event_hooks(push));
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let srv = create_server_instance(config, db, services, notifier, producers)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    info!("🚀️ Server stopped. Waiting for pending notifications to be saved.");
    if shutdown_tx.send(true).is_err() {
        warn!("🚀️ The notification worker had already stopped");
    }
    if let Err(e) = worker.await {
        error!("🚀️ The notification worker did not shut down cleanly. {e}");
    }
    if let Some(handle) = reload_worker {
        if let Err(e) = handle.await {
            error!("🚀️ The catalog reload worker did not shut down cleanly. {e}");
        }
    }
    result
}

/// Loads the catalog and wires it up as every read-only collaborator. Catalog lookups go through the cache; each
/// payment system handler in the catalog gets an HTTP provider. The returned reloader keeps the catalog and its cache
/// in step with the file.
pub fn load_services(config: &ServerConfig) -> Result<(EngineServices, CatalogReloader), ServerError> {
    let data = CatalogData::from_file(&config.catalog_path)
        .map_err(|e| ServerError::ConfigurationError(format!("Could not load {}. {e}", config.catalog_path)))?;
    let handlers = data.payment_systems.iter().map(|s| s.handler.clone()).collect::<BTreeSet<_>>();
    let provider = Arc::new(HttpPaymentProvider::new().map_err(|e| ServerError::InitializeError(e.to_string()))?);
    let mut providers = ProviderRegistry::default();
    for handler in handlers {
        debug!("🚀️ Registering the HTTP payment provider for {handler}");
        providers.register(handler, provider.clone());
    }
    let memory = Arc::new(MemoryCatalog::new(data));
    let cache = Arc::new(MemoryCache::new(1));
    let catalog = Arc::new(CachedCatalog::new(memory.clone(), cache, config.engine.cache_ttl));
    let reloader = CatalogReloader::new(&config.catalog_path, memory.clone(), catalog.clone());
    let services = EngineServices {
        catalog,
        geo: memory.clone(),
        rates: memory.clone(),
        tax: memory.clone(),
        costs: memory,
        providers,
    };
    Ok((services, reloader))
}

fn create_push_gateway(config: &ServerConfig) -> Result<Arc<dyn PushGateway>, ServerError> {
    if config.push.is_enabled() {
        let gateway = HttpPushGateway::new(&config.push).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Arc::new(gateway))
    } else {
        warn!("🚀️ No push gateway is configured. Payer pushes will only be logged.");
        Ok(Arc::new(LogOnlyPush))
    }
}

/// Tells the payer's browser, over the push gateway, as soon as their payment goes through.
pub fn create_event_hooks(push: Arc<dyn PushGateway>) -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |ev| {
        let push = push.clone();
        async move {
            let order = ev.order;
            let message = PaymentPush {
                order_uuid: order.uuid.to_string(),
                status: order.public_status().to_string(),
                paid_at: order.paid_at,
            };
            let channel = format!("order:{}", order.uuid);
            match serde_json::to_value(&message) {
                Ok(value) => {
                    if let Err(e) = push.publish(&channel, &value).await {
                        error!("📡️ Could not push the payment result for order {}. {e}", order.uuid);
                    }
                },
                Err(e) => error!("📡️ Could not serialize the payment push for order {}. {e}", order.uuid),
            }
        }
        .boxed()
    });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    services: EngineServices,
    notifier: NotificationSender,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let options = web::Data::new(ServerOptions::from_config(&config));
    let orders_api = web::Data::new(OrderFlowApi::new(db, services, notifier, producers, config.engine.clone()));
    let srv = HttpServer::new(move || {
        let api_scope = web::scope("/api")
            .service(CreateOrderRoute::<SqliteDatabase>::new())
            .service(CreateOrderFormRoute::<SqliteDatabase>::new())
            .service(RecreateOrderRoute::<SqliteDatabase>::new())
            .service(ConfirmOrderRoute::<SqliteDatabase>::new())
            .service(RefundOrderRoute::<SqliteDatabase>::new())
            .service(ChargebackOrderRoute::<SqliteDatabase>::new())
            .service(ReplaceItemRoute::<SqliteDatabase>::new())
            .service(OrderByUuidRoute::<SqliteDatabase>::new())
            .service(CreatePaymentRoute::<SqliteDatabase>::new())
            .service(PaymentCallbackRoute::<SqliteDatabase>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("pgs::access_log"))
            .app_data(orders_api.clone())
            .app_data(options.clone())
            .app_data(json_config())
            .app_data(form_config())
            .service(health)
            .service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Malformed bodies get the same envelope as any other invalid request.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = ApiResponse::<()>::from_order_error(&OrderError::InvalidRequest(err.to_string()));
        InternalError::from_response(err, HttpResponse::Ok().json(body)).into()
    })
}

pub fn form_config() -> web::FormConfig {
    web::FormConfig::default().error_handler(|err, _req| {
        let body = ApiResponse::<()>::from_order_error(&OrderError::InvalidRequest(err.to_string()));
        InternalError::from_response(err, HttpResponse::Ok().json(body)).into()
    })
}
