use std::{collections::HashMap, fmt::Debug, sync::Arc, time::Duration};

use log::*;

use crate::traits::{Catalog, CostSchedules, ExchangeRates, GeoService, PaymentProvider, ProviderError, TaxService};

/// Maps payment-system handler names to the adapters that talk to them.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn register<S: Into<String>>(&mut self, handler: S, provider: Arc<dyn PaymentProvider>) -> &mut Self {
        let handler = handler.into();
        debug!("💳️ Registered payment provider adapter for '{handler}'");
        self.providers.insert(handler, provider);
        self
    }

    pub fn get(&self, handler: &str) -> Result<Arc<dyn PaymentProvider>, ProviderError> {
        self.providers.get(handler).cloned().ok_or_else(|| ProviderError::UnknownHandler(handler.to_string()))
    }
}

impl Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers = self.providers.keys().collect::<Vec<_>>();
        handlers.sort();
        write!(f, "ProviderRegistry({handlers:?})")
    }
}

/// The external collaborators used by the order flow.
#[derive(Clone)]
pub struct EngineServices {
    pub catalog: Arc<dyn Catalog>,
    pub geo: Arc<dyn GeoService>,
    pub rates: Arc<dyn ExchangeRates>,
    pub tax: Arc<dyn TaxService>,
    pub costs: Arc<dyn CostSchedules>,
    pub providers: ProviderRegistry,
}

const DEFAULT_ORDER_FORM_LIFETIME_MINUTES: u64 = 30;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 600;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long the payer has to submit the payment form after the order is created.
    pub order_form_lifetime: Duration,
    pub cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_form_lifetime: Duration::from_secs(DEFAULT_ORDER_FORM_LIFETIME_MINUTES * 60),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_defaults() -> Self {
        let minutes = std::env::var("PG_ORDER_FORM_LIFETIME")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid PG_ORDER_FORM_LIFETIME ({s}): {e}. Using the default instead."))
                    .ok()
            })
            .unwrap_or(DEFAULT_ORDER_FORM_LIFETIME_MINUTES);
        let cache_ttl = std::env::var("PG_CACHE_TTL")
            .ok()
            .and_then(|s| {
                s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid PG_CACHE_TTL ({s}): {e}. Using the default instead.")).ok()
            })
            .unwrap_or(DEFAULT_CACHE_TTL_SECONDS);
        Self {
            order_form_lifetime: Duration::from_secs(minutes * 60),
            cache_ttl: Duration::from_secs(cache_ttl),
        }
    }
}
