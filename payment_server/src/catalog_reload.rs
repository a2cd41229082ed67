//! Keeps the in-memory catalog in step with the catalog file.
//!
//! The file is checked on a timer. When its modification time changes it is parsed again, swapped into the
//! [`MemoryCatalog`], and the catalog cache moves to a new version so that no stale project or payment method
//! survives the reload. A file that fails to parse is reported and the current catalog stays in place.
//!
//! Payment system handlers are bound to providers at start-up, so a new handler only takes effect after a restart.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use log::*;
use payment_engine::catalog::{CachedCatalog, CatalogData, MemoryCatalog};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::errors::ServerError;

pub struct CatalogReloader {
    path: PathBuf,
    catalog: Arc<MemoryCatalog>,
    cache: Arc<CachedCatalog>,
    loaded_at: Option<SystemTime>,
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl CatalogReloader {
    /// `catalog` is assumed to hold the current contents of `path`.
    pub fn new<P: Into<PathBuf>>(path: P, catalog: Arc<MemoryCatalog>, cache: Arc<CachedCatalog>) -> Self {
        let path = path.into();
        let loaded_at = modified_time(&path);
        Self { path, catalog, cache, loaded_at }
    }

    /// Reloads the catalog if the file has changed since it was last loaded. Returns whether a reload happened.
    pub async fn reload_if_changed(&mut self) -> Result<bool, ServerError> {
        let modified = modified_time(&self.path);
        if modified.is_some() && modified == self.loaded_at {
            return Ok(false);
        }
        self.reload().await?;
        self.loaded_at = modified;
        Ok(true)
    }

    pub async fn reload(&self) -> Result<(), ServerError> {
        let data = CatalogData::from_file(&self.path).map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
        self.catalog.replace(data).map_err(|e| ServerError::BackendError(e.to_string()))?;
        self.cache.invalidate().await.map_err(|e| ServerError::BackendError(e.to_string()))?;
        info!("🗂️ Catalog reloaded from {}", self.path.display());
        Ok(())
    }
}

/// Checks the catalog file every `interval` until `shutdown` flips to `true`.
pub fn start_catalog_reload_worker(
    mut reloader: CatalogReloader,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately, and the catalog has only just been loaded
        timer.tick().await;
        info!("🗂️ Watching {} for catalog changes every {}s", reloader.path.display(), interval.as_secs());
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = reloader.reload_if_changed().await {
                        error!("🗂️ Could not reload the catalog. The current one stays in use. {e}");
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("🗂️ Catalog reload worker is shutting down");
                        break;
                    }
                },
            }
        }
    })
}
