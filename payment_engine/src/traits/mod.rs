//! # Interface contracts
//!
//! This module defines the seams of the engine.
//!
//! * [`OrderManagement`] is implemented by database *backends*. It stores the order aggregate and its accounting
//!   entries, and is the authoritative guard against concurrent writers (see [`StatusChange`]).
//! * [`NotificationStore`] is the durable overflow store used by the notification delivery subsystem.
//! * [`Cache`] is a versioned read-through cache.
//! * The collaborator traits ([`Catalog`], [`GeoService`], [`ExchangeRates`], [`TaxService`], [`CostSchedules`],
//!   [`PaymentProvider`], [`MessageBus`] and [`PushGateway`]) describe external services that the engine consumes
//!   but does not implement.
mod cache;
mod collaborators;
mod notification_store;
mod order_management;

pub use cache::{Cache, CacheError};
pub use collaborators::{
    BusError,
    Catalog,
    CatalogError,
    CostSchedules,
    ExchangeRates,
    GeoError,
    GeoLocation,
    GeoService,
    Headers,
    MessageBus,
    PaymentProvider,
    ProviderError,
    ProviderPaymentRequest,
    ProviderPaymentResponse,
    PushError,
    PushGateway,
    RatesError,
    TaxError,
    TaxService,
};
pub use notification_store::{NotificationStore, StoredNotification};
pub use order_management::{OrderManagement, PaymentGatewayError, StatusChange};
