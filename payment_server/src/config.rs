use std::{env, time::Duration};

use log::*;
use payment_engine::{notifications::NotificationConfig, EngineConfig};
use pg_common::{parse_boolean_flag, Secret};

const DEFAULT_PG_HOST: &str = "127.0.0.1";
const DEFAULT_PG_PORT: u16 = 8370;
const DEFAULT_CATALOG_PATH: &str = "data/catalog.json";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_CATALOG_RELOAD_SECONDS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// A JSON file with the merchant catalog: projects, payment systems and methods, products, exchange rates,
    /// minimum amounts, cost schedules and the geo table.
    pub catalog_path: String,
    /// How often the catalog file is checked for changes. Zero turns reloading off.
    pub catalog_reload_interval: Duration,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    pub redis_url: Secret<String>,
    pub push: PushConfig,
    pub engine: EngineConfig,
    pub notifications: NotificationConfig,
}

#[derive(Clone, Debug, Default)]
pub struct PushConfig {
    /// The HTTP API endpoint of the real-time push gateway. Pushes are skipped (and logged) when this is empty.
    pub url: String,
    pub api_key: Secret<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PG_HOST.to_string(),
            port: DEFAULT_PG_PORT,
            database_url: String::default(),
            catalog_path: DEFAULT_CATALOG_PATH.to_string(),
            catalog_reload_interval: Duration::from_secs(DEFAULT_CATALOG_RELOAD_SECONDS),
            use_x_forwarded_for: false,
            use_forwarded: false,
            redis_url: Secret::new(DEFAULT_REDIS_URL.to_string()),
            push: PushConfig::default(),
            engine: EngineConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PG_HOST").ok().unwrap_or_else(|| DEFAULT_PG_HOST.into());
        let port = env::var("PG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid port for PG_PORT. {e} Using the default, {DEFAULT_PG_PORT}, instead.");
                    DEFAULT_PG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PG_PORT);
        let database_url = env::var("PG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PG_DATABASE_URL is not set. Please set it to the URL for the payment gateway database.");
            String::default()
        });
        let catalog_path = env::var("PG_CATALOG_PATH").ok().unwrap_or_else(|| {
            warn!("🪛️ PG_CATALOG_PATH is not set. Loading the catalog from {DEFAULT_CATALOG_PATH}.");
            DEFAULT_CATALOG_PATH.into()
        });
        let catalog_reload_interval = env::var("PG_CATALOG_RELOAD_INTERVAL")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| {
                        error!(
                            "🪛️ {s} is not a valid PG_CATALOG_RELOAD_INTERVAL. {e} Using the default, \
                             {DEFAULT_CATALOG_RELOAD_SECONDS}s, instead."
                        )
                    })
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_CATALOG_RELOAD_SECONDS));
        let use_x_forwarded_for = parse_boolean_flag(env::var("PG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("PG_USE_FORWARDED").ok(), false);
        let redis_url = env::var("PG_REDIS_URL").ok().unwrap_or_else(|| {
            info!("🪛️ PG_REDIS_URL is not set. Using the default, {DEFAULT_REDIS_URL}.");
            DEFAULT_REDIS_URL.into()
        });
        let push = PushConfig::from_env_or_defaults();
        Self {
            host,
            port,
            database_url,
            catalog_path,
            catalog_reload_interval,
            use_x_forwarded_for,
            use_forwarded,
            redis_url: Secret::new(redis_url),
            push,
            engine: EngineConfig::from_env_or_defaults(),
            notifications: NotificationConfig::from_env_or_defaults(),
        }
    }
}

impl PushConfig {
    pub fn from_env_or_defaults() -> Self {
        let url = env::var("PG_PUSH_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ PG_PUSH_URL is not set. Payer updates and operator alarms will only be logged.");
            String::default()
        });
        let api_key = env::var("PG_PUSH_API_KEY").ok().unwrap_or_else(|| {
            if !url.is_empty() {
                warn!("🪛️ PG_PUSH_API_KEY is not set. Requests to the push gateway will not be authenticated.");
            }
            String::default()
        });
        Self { url, api_key: Secret::new(api_key) }
    }

    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}
