//! Merchant configuration as seen by the engine, plus in-memory implementations of the read-only collaborators.
mod cache;
mod memory;
mod types;

pub use cache::{CachedCatalog, MemoryCache};
pub use memory::{CatalogData, ExchangeRate, MemoryCatalog, TaxRate};
pub use types::*;
