//! Contracts for the services the engine depends on but does not implement.
//!
//! All of these are object-safe (`Arc<dyn ...>`) so that the server can wire in concrete adapters at start-up and
//! tests can swap in fakes or mocks.
use std::collections::HashMap;

use async_trait::async_trait;
use pg_common::Amount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CostQuery, CostSchedule, CountryPolicy, Merchant, PaymentMethod, PaymentSystem, Product, Project};

//--------------------------------------        Errors        ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
#[error("Catalog lookup failed: {0}")]
pub struct CatalogError(pub String);

#[derive(Debug, Clone, Error)]
#[error("Geolocation failed: {0}")]
pub struct GeoError(pub String);

#[derive(Debug, Clone, Error)]
pub enum RatesError {
    #[error("No exchange rate from {0} to {1}")]
    RateNotFound(String, String),
    #[error("Exchange rate service failed: {0}")]
    ServiceError(String),
}

#[derive(Debug, Clone, Error)]
#[error("Tax calculation failed: {0}")]
pub struct TaxError(pub String);

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("No provider adapter is registered for handler '{0}'")]
    UnknownHandler(String),
    #[error("The payment system refused the payment: {0}")]
    Rejected(String),
    #[error("Could not reach the payment system: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("The message bus did not acknowledge the publish within the time limit")]
    Timeout,
    #[error("Could not publish to the message bus: {0}")]
    PublishFailed(String),
    #[error("Could not serialize the message: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Error)]
#[error("Push gateway error: {0}")]
pub struct PushError(pub String);

//--------------------------------------        Catalog       ---------------------------------------------------------
/// Read-only access to merchant configuration: projects, payment methods, products and platform rules.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_project(&self, project_id: &str) -> Result<Option<Project>, CatalogError>;

    async fn fetch_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>, CatalogError>;

    /// Returns the products matching `product_ids` that belong to `project_id`. Unknown ids and products owned by
    /// other projects are silently left out, so callers compare lengths to detect them.
    async fn fetch_products(&self, project_id: &str, product_ids: &[String]) -> Result<Vec<Product>, CatalogError>;

    async fn fetch_payment_method(&self, method_id: &str) -> Result<Option<PaymentMethod>, CatalogError>;

    /// Finds the payment method for a group alias that can settle in `currency`.
    async fn find_payment_method(&self, group: &str, currency: &str) -> Result<Option<PaymentMethod>, CatalogError>;

    async fn fetch_payment_system(&self, system_id: &str) -> Result<Option<PaymentSystem>, CatalogError>;

    async fn is_supported_currency(&self, currency: &str) -> Result<bool, CatalogError>;

    /// `None` means there are no restrictions configured for the country.
    async fn country_policy(&self, country: &str) -> Result<Option<CountryPolicy>, CatalogError>;

    /// The platform-wide minimum order amount for `currency`, if one is configured.
    async fn platform_minimum(&self, currency: &str) -> Result<Option<Amount>, CatalogError>;
}

//--------------------------------------     Geo service      ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub region: String,
    pub subdivision: Option<String>,
}

#[async_trait]
pub trait GeoService: Send + Sync {
    async fn resolve(&self, ip: &str) -> Result<GeoLocation, GeoError>;
}

//--------------------------------------    Exchange rates    ---------------------------------------------------------
#[async_trait]
pub trait ExchangeRates: Send + Sync {
    /// Converts `amount` from one currency to another. Converting a currency to itself always returns `amount`.
    async fn convert(&self, amount: Amount, from: &str, to: &str) -> Result<Amount, RatesError>;
}

//--------------------------------------          Tax         ---------------------------------------------------------
#[async_trait]
pub trait TaxService: Send + Sync {
    /// The tax payable on `amount` by a payer located in `country`/`subdivision`.
    async fn tax_for(
        &self,
        amount: Amount,
        currency: &str,
        country: &str,
        subdivision: Option<&str>,
    ) -> Result<Amount, TaxError>;
}

//--------------------------------------    Cost schedules    ---------------------------------------------------------
#[async_trait]
pub trait CostSchedules: Send + Sync {
    async fn find_schedule(&self, query: &CostQuery) -> Result<Option<CostSchedule>, CatalogError>;
}

//--------------------------------------   Payment provider   ---------------------------------------------------------
/// The payer-supplied instrument data, forwarded verbatim to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderPaymentRequest {
    pub order_uuid: String,
    pub amount: Amount,
    pub currency: String,
    pub payment_method_id: String,
    pub terminal_id: Option<String>,
    pub fields: HashMap<String, String>,
    pub url_success: Option<String>,
    pub url_fail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPaymentResponse {
    /// Where the payer must go to complete the payment (3-D Secure page, wallet confirmation etc.).
    pub redirect_url: String,
    pub transaction_id: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment(
        &self,
        system: &PaymentSystem,
        request: &ProviderPaymentRequest,
    ) -> Result<ProviderPaymentResponse, ProviderError>;
}

//--------------------------------------     Message bus      ---------------------------------------------------------
pub type Headers = HashMap<String, String>;

/// Durable outbound messaging. `publish` only returns `Ok` once the broker has acknowledged the message.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: &serde_json::Value, headers: &Headers) -> Result<(), BusError>;
}

//--------------------------------------     Push gateway     ---------------------------------------------------------
/// Best-effort real-time notifications for browsers and operators.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn publish(&self, channel: &str, message: &serde_json::Value) -> Result<(), PushError>;
}
