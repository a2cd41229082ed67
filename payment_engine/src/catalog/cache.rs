//! Versioned read-through caching.
//!
//! [`MemoryCache`] namespaces every key as `v{version}:{key}`. Bumping the version instantly hides every old entry;
//! [`Cache::retire_version`] then sweeps them away. [`CachedCatalog`] puts any cache in front of any [`Catalog`].
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
        Mutex,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use log::*;
use pg_common::Amount;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    catalog::{CountryPolicy, Merchant, PaymentMethod, PaymentSystem, Product, Project},
    traits::{Cache, CacheError, Catalog, CatalogError},
};

#[derive(Debug, Default)]
pub struct MemoryCache {
    version: AtomicU32,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new(version: u32) -> Self {
        Self { version: AtomicU32::new(version), entries: Mutex::new(HashMap::new()) }
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    fn key(&self, key: &str) -> String {
        format!("v{}:{key}", self.version())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, CacheError> {
        self.entries.lock().map_err(|e| CacheError::Backend(e.to_string()))
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let key = self.key(key);
        let mut entries = self.lock()?;
        match entries.get(&key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.remove(&key);
                Ok(None)
            },
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let key = self.key(key);
        self.lock()?.insert(key, (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = self.key(key);
        self.lock()?.remove(&key);
        Ok(())
    }

    async fn bump_version(&self) -> Result<u32, CacheError> {
        Ok(self.version.fetch_add(1, Ordering::SeqCst))
    }

    async fn retire_version(&self, version: u32) -> Result<usize, CacheError> {
        let prefix = format!("v{version}:");
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&prefix));
        let removed = before - entries.len();
        debug!("🗂️ Retired cache version {version}. {removed} keys removed");
        Ok(removed)
    }
}

/// A [`Catalog`] that consults a [`Cache`] before hitting the underlying catalog.
///
/// Cache failures are logged and treated as misses; they never fail a lookup.
pub struct CachedCatalog {
    inner: Arc<dyn Catalog>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn Catalog>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    /// Drops everything cached so far by moving to a new cache version and retiring the old one. Call this after
    /// the underlying catalog has changed.
    pub async fn invalidate(&self) -> Result<usize, CacheError> {
        let old = self.cache.bump_version().await?;
        let removed = self.cache.retire_version(old).await?;
        info!("🗂️ Catalog cache invalidated. {removed} entries from version {old} dropped");
        Ok(removed)
    }

    async fn cached<T, F>(&self, key: String, fetch: F) -> Result<Option<T>, CatalogError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: std::future::Future<Output = Result<Option<T>, CatalogError>> + Send,
    {
        match self.cache.get(&key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => warn!("🗂️ Cached value for {key} is corrupt, ignoring it. {e}"),
            },
            Ok(None) => trace!("🗂️ Cache miss for {key}"),
            Err(e) => warn!("🗂️ Cache read for {key} failed. {e}"),
        }
        let value = fetch.await?;
        if let Some(v) = &value {
            match serde_json::to_string(v) {
                Ok(json) => {
                    if let Err(e) = self.cache.set(&key, json, self.ttl).await {
                        warn!("🗂️ Cache write for {key} failed. {e}");
                    }
                },
                Err(e) => warn!("🗂️ Could not serialize {key} for caching. {e}"),
            }
        }
        Ok(value)
    }
}

#[async_trait]
impl Catalog for CachedCatalog {
    async fn fetch_project(&self, project_id: &str) -> Result<Option<Project>, CatalogError> {
        self.cached(format!("project:{project_id}"), self.inner.fetch_project(project_id)).await
    }

    async fn fetch_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>, CatalogError> {
        self.cached(format!("merchant:{merchant_id}"), self.inner.fetch_merchant(merchant_id)).await
    }

    async fn fetch_products(&self, project_id: &str, product_ids: &[String]) -> Result<Vec<Product>, CatalogError> {
        self.inner.fetch_products(project_id, product_ids).await
    }

    async fn fetch_payment_method(&self, method_id: &str) -> Result<Option<PaymentMethod>, CatalogError> {
        self.cached(format!("payment_method:{method_id}"), self.inner.fetch_payment_method(method_id)).await
    }

    async fn find_payment_method(&self, group: &str, currency: &str) -> Result<Option<PaymentMethod>, CatalogError> {
        let key = format!("payment_method:{group}:{currency}");
        self.cached(key, self.inner.find_payment_method(group, currency)).await
    }

    async fn fetch_payment_system(&self, system_id: &str) -> Result<Option<PaymentSystem>, CatalogError> {
        self.cached(format!("payment_system:{system_id}"), self.inner.fetch_payment_system(system_id)).await
    }

    async fn is_supported_currency(&self, currency: &str) -> Result<bool, CatalogError> {
        self.inner.is_supported_currency(currency).await
    }

    async fn country_policy(&self, country: &str) -> Result<Option<CountryPolicy>, CatalogError> {
        self.cached(format!("country:{country}"), self.inner.country_policy(country)).await
    }

    async fn platform_minimum(&self, currency: &str) -> Result<Option<Amount>, CatalogError> {
        self.inner.platform_minimum(currency).await
    }
}
