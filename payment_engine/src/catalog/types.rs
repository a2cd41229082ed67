use pg_common::{Amount, Secret};
use serde::{Deserialize, Serialize, Serializer};

use crate::db_types::{OrderPaymentMethod, OrderProject, PaymentMethodType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    TestCompleted,
    TestFailed,
    InProduction,
    Deleted,
}

/// Min/max order amounts for a project or a payment method, expressed in `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountLimits {
    pub min: Option<Amount>,
    pub max: Option<Amount>,
    pub currency: String,
}

/// Catalog entries are cached as JSON, so secrets have to survive a round trip through the cache.
fn reveal_secret<S: Serializer>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.reveal())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub merchant_id: String,
    pub name: String,
    pub status: ProjectStatus,
    #[serde(serialize_with = "reveal_secret")]
    pub secret_key: Secret<String>,
    pub default_currency: Option<String>,
    /// When set, checkout refuses to guess the currency from project defaults.
    #[serde(default)]
    pub currency_required: bool,
    pub limits: Option<AmountLimits>,
    pub url_success: Option<String>,
    pub url_fail: Option<String>,
    pub url_notify: Option<String>,
    #[serde(default)]
    pub allow_dynamic_redirect_urls: bool,
    #[serde(default)]
    pub allow_dynamic_notify_urls: bool,
    /// Requests for this project must carry an HMAC signature.
    #[serde(default)]
    pub signed_requests: bool,
}

impl Project {
    pub fn is_accepting_orders(&self) -> bool {
        self.status != ProjectStatus::Deleted
    }

    pub fn snapshot(&self) -> OrderProject {
        OrderProject {
            id: self.id.clone(),
            merchant_id: self.merchant_id.clone(),
            name: self.name.clone(),
            url_success: self.url_success.clone(),
            url_fail: self.url_fail.clone(),
            url_notify: self.url_notify.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    pub country: String,
    pub mcc: String,
    pub operating_company: String,
}

/// Payment rules for payers from one country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryPolicy {
    pub payments_allowed: bool,
    /// The payer may bypass a ban by supplying a billing address in another country.
    pub change_allowed: bool,
}

impl Default for CountryPolicy {
    fn default() -> Self {
        Self { payments_allowed: true, change_allowed: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
    /// The alias merchants use to ask for a method, e.g. `BANKCARD`.
    pub group: String,
    pub method_type: PaymentMethodType,
    pub payment_system_id: String,
    pub currencies: Vec<String>,
    pub limits: Option<AmountLimits>,
    pub active: bool,
    pub terminal_id: Option<String>,
    #[serde(serialize_with = "reveal_secret")]
    pub callback_secret: Secret<String>,
}

impl PaymentMethod {
    pub fn supports_currency(&self, currency: &str) -> bool {
        self.currencies.iter().any(|c| c == currency)
    }

    pub fn snapshot(&self, system: &PaymentSystem) -> OrderPaymentMethod {
        OrderPaymentMethod {
            id: self.id.clone(),
            name: self.name.clone(),
            group: self.group.clone(),
            method_type: self.method_type,
            payment_system_id: self.payment_system_id.clone(),
            handler: system.handler.clone(),
            terminal_id: self.terminal_id.clone(),
            callback_secret: self.callback_secret.reveal().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSystem {
    pub id: String,
    pub name: String,
    /// Name of the provider adapter responsible for this system.
    pub handler: String,
    pub active: bool,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPrice {
    pub amount: Amount,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub enabled: bool,
    pub prices: Vec<ProductPrice>,
}

impl Product {
    pub fn price_in(&self, currency: &str) -> Option<Amount> {
        self.prices.iter().find(|p| p.currency == currency).map(|p| p.amount)
    }
}

/// Fee charged by a payment system for one method/region/currency combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSchedule {
    pub payment_method_id: String,
    pub region: String,
    pub currency: String,
    pub mcc: Option<String>,
    pub operating_company: Option<String>,
    /// Percentage fee in parts per million of the charged amount.
    pub percent_ppm: i64,
    pub fixed_fee: Amount,
}

impl CostSchedule {
    pub fn fee_for(&self, amount: Amount) -> Amount {
        amount.scale_ppm(self.percent_ppm) + self.fixed_fee
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostQuery {
    pub payment_method_id: String,
    pub region: String,
    pub currency: String,
    pub mcc: String,
    pub operating_company: String,
}
