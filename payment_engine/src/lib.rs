//! Payment Engine
//!
//! The payment engine drives an e-commerce order from creation to settlement. It is the core of a multi-tenant
//! payment gateway: merchants (projects) create orders, payers pick a payment method and submit their instrument
//! data, payment providers report outcomes through callbacks, and merchants are told about every outcome that
//! matters to them.
//!
//! The library is divided into these main sections:
//! 1. The order aggregate and its status machine ([`mod@db_types`], [`mod@order_status`]). Every legal status change
//!    is listed in one transition table.
//! 2. The payment gateway public API ([`OrderFlowApi`]). Order creation runs through the validation pipeline
//!    ([`mod@validation`]); payment dispatch and provider callbacks apply guarded, idempotent status changes.
//! 3. Storage and collaborator contracts ([`mod@traits`]). Backends (currently SQLite) implement the storage traits;
//!    catalog, geo, exchange rates, tax, cost schedules, payment providers, the message bus and the push gateway are
//!    consumed through traits and injected at start-up.
//! 4. Merchant notification delivery ([`mod@notifications`]): an ordered queue with periodic retry, operator alarms and
//!    a durable backlog that survives restarts.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted when certain actions
//! occur within the payment engine. For example, when a new order is created, an `OrderCreated` event is emitted.
//! A simple Actor framework is used so that you can easily hook into these events and perform custom actions.
pub mod catalog;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod notifications;
pub mod order_status;
pub mod traits;
pub mod validation;

mod pg_api;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use pg_api::{
    check_required_fields,
    errors::{OrderError, RequiredField},
    order_objects,
    services::{EngineConfig, EngineServices, ProviderRegistry},
    OrderFlowApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase};
