//! An in-process catalog, loaded from a JSON document.
//!
//! `MemoryCatalog` answers every read-only question the engine asks about merchant configuration and platform rules:
//! projects, payment methods, products, geolocation, exchange rates, tax rates and cost schedules. It is used by the
//! server for single-node deployments and by the test suite.
use std::{
    collections::HashMap,
    path::Path,
    sync::{RwLock, RwLockReadGuard},
};

use async_trait::async_trait;
use log::*;
use pg_common::Amount;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::{CostQuery, CostSchedule, CountryPolicy, Merchant, PaymentMethod, PaymentSystem, Product, Project},
    traits::{
        Catalog,
        CatalogError,
        CostSchedules,
        ExchangeRates,
        GeoError,
        GeoLocation,
        GeoService,
        RatesError,
        TaxError,
        TaxService,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: String,
    pub to: String,
    /// Units of `to` per unit of `from`, in parts per million.
    pub rate_ppm: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate {
    pub country: String,
    pub subdivision: Option<String>,
    pub rate_ppm: i64,
}

/// The on-disk catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogData {
    pub projects: Vec<Project>,
    pub merchants: Vec<Merchant>,
    pub payment_systems: Vec<PaymentSystem>,
    pub payment_methods: Vec<PaymentMethod>,
    pub products: Vec<Product>,
    pub currencies: Vec<String>,
    pub country_policies: HashMap<String, CountryPolicy>,
    pub platform_minimums: HashMap<String, Amount>,
    pub exchange_rates: Vec<ExchangeRate>,
    pub tax_rates: Vec<TaxRate>,
    pub cost_schedules: Vec<CostSchedule>,
    /// Static IP to location table.
    pub geo: HashMap<String, GeoLocation>,
}

impl CatalogData {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CatalogError(format!("Could not read catalog file {}: {e}", path.display())))?;
        let data: Self = serde_json::from_str(&contents)
            .map_err(|e| CatalogError(format!("Catalog file {} is not valid: {e}", path.display())))?;
        info!(
            "🗂️ Loaded catalog from {}: {} projects, {} payment methods, {} products",
            path.display(),
            data.projects.len(),
            data.payment_methods.len(),
            data.products.len()
        );
        Ok(data)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    data: RwLock<CatalogData>,
}

impl MemoryCatalog {
    pub fn new(data: CatalogData) -> Self {
        Self { data: RwLock::new(data) }
    }

    /// Swaps in a freshly loaded catalog.
    pub fn replace(&self, data: CatalogData) -> Result<(), CatalogError> {
        self.update(|current| *current = data)
    }

    /// Applies an in-place edit to the catalog. Orders that already exist are not affected, since they carry their
    /// own snapshots.
    pub fn update<F: FnOnce(&mut CatalogData)>(&self, f: F) -> Result<(), CatalogError> {
        let mut data = self.data.write().map_err(|e| CatalogError(format!("Catalog lock poisoned: {e}")))?;
        f(&mut data);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CatalogData>, CatalogError> {
        self.data.read().map_err(|e| CatalogError(format!("Catalog lock poisoned: {e}")))
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn fetch_project(&self, project_id: &str) -> Result<Option<Project>, CatalogError> {
        Ok(self.read()?.projects.iter().find(|p| p.id == project_id).cloned())
    }

    async fn fetch_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>, CatalogError> {
        Ok(self.read()?.merchants.iter().find(|m| m.id == merchant_id).cloned())
    }

    async fn fetch_products(&self, project_id: &str, product_ids: &[String]) -> Result<Vec<Product>, CatalogError> {
        let data = self.read()?;
        let products = product_ids
            .iter()
            .filter_map(|id| data.products.iter().find(|p| &p.id == id && p.project_id == project_id))
            .cloned()
            .collect();
        Ok(products)
    }

    async fn fetch_payment_method(&self, method_id: &str) -> Result<Option<PaymentMethod>, CatalogError> {
        Ok(self.read()?.payment_methods.iter().find(|m| m.id == method_id).cloned())
    }

    async fn find_payment_method(&self, group: &str, currency: &str) -> Result<Option<PaymentMethod>, CatalogError> {
        let data = self.read()?;
        let method = data.payment_methods.iter().find(|m| m.group == group && m.supports_currency(currency)).cloned();
        Ok(method)
    }

    async fn fetch_payment_system(&self, system_id: &str) -> Result<Option<PaymentSystem>, CatalogError> {
        Ok(self.read()?.payment_systems.iter().find(|s| s.id == system_id).cloned())
    }

    async fn is_supported_currency(&self, currency: &str) -> Result<bool, CatalogError> {
        Ok(self.read()?.currencies.iter().any(|c| c == currency))
    }

    async fn country_policy(&self, country: &str) -> Result<Option<CountryPolicy>, CatalogError> {
        Ok(self.read()?.country_policies.get(country).copied())
    }

    async fn platform_minimum(&self, currency: &str) -> Result<Option<Amount>, CatalogError> {
        Ok(self.read()?.platform_minimums.get(currency).copied())
    }
}

#[async_trait]
impl GeoService for MemoryCatalog {
    async fn resolve(&self, ip: &str) -> Result<GeoLocation, GeoError> {
        let data = self.data.read().map_err(|e| GeoError(e.to_string()))?;
        data.geo.get(ip).cloned().ok_or_else(|| GeoError(format!("No location is known for {ip}")))
    }
}

#[async_trait]
impl ExchangeRates for MemoryCatalog {
    async fn convert(&self, amount: Amount, from: &str, to: &str) -> Result<Amount, RatesError> {
        if from == to {
            return Ok(amount);
        }
        let data = self.data.read().map_err(|e| RatesError::ServiceError(e.to_string()))?;
        let rate = data
            .exchange_rates
            .iter()
            .find(|r| r.from == from && r.to == to)
            .ok_or_else(|| RatesError::RateNotFound(from.to_string(), to.to_string()))?;
        Ok(amount.scale_ppm(rate.rate_ppm))
    }
}

#[async_trait]
impl TaxService for MemoryCatalog {
    async fn tax_for(
        &self,
        amount: Amount,
        _currency: &str,
        country: &str,
        subdivision: Option<&str>,
    ) -> Result<Amount, TaxError> {
        let data = self.data.read().map_err(|e| TaxError(e.to_string()))?;
        let exact = data.tax_rates.iter().find(|t| t.country == country && t.subdivision.as_deref() == subdivision);
        let rate = exact.or_else(|| data.tax_rates.iter().find(|t| t.country == country && t.subdivision.is_none()));
        Ok(rate.map(|r| amount.scale_ppm(r.rate_ppm)).unwrap_or_default())
    }
}

#[async_trait]
impl CostSchedules for MemoryCatalog {
    async fn find_schedule(&self, query: &CostQuery) -> Result<Option<CostSchedule>, CatalogError> {
        let data = self.read()?;
        let schedule = data
            .cost_schedules
            .iter()
            .find(|s| {
                s.payment_method_id == query.payment_method_id &&
                    s.region == query.region &&
                    s.currency == query.currency &&
                    s.mcc.as_ref().map(|m| m == &query.mcc).unwrap_or(true) &&
                    s.operating_company.as_ref().map(|o| o == &query.operating_company).unwrap_or(true)
            })
            .cloned();
        Ok(schedule)
    }
}
