use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),
    #[error("Cached value could not be decoded: {0}")]
    Decode(String),
}

/// A versioned key-value cache for read-through lookups.
///
/// Implementations namespace every key with the current version. Bumping the version makes all old entries
/// unreachable; [`Cache::retire_version`] then reclaims the space they use.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Starts a new keyspace. Returns the version that has just gone out of use.
    async fn bump_version(&self) -> Result<u32, CacheError>;

    /// Deletes every entry stored under `version`. Returns the number of keys removed.
    async fn retire_version(&self, version: u32) -> Result<usize, CacheError>;
}
