//! Concrete adapters for the collaborators the engine only knows as traits.
mod http_provider;
mod http_push;
mod redis_bus;

pub use http_provider::HttpPaymentProvider;
pub use http_push::{HttpPushGateway, LogOnlyPush};
pub use redis_bus::RedisBus;
