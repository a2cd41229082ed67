//! # Payment gateway server
//! This crate hosts the HTTP front end of the payment gateway. It is responsible for:
//! * Accepting order requests from merchants (projects), as JSON or as URL-encoded forms.
//! * Accepting payment form submissions from payers and dispatching them to the payment system.
//! * Accepting payment outcome callbacks from payment systems.
//! * Wiring the order lifecycle engine to its collaborators: the catalog, the Redis message bus used for merchant
//!   notifications and the push gateway used to reach payers' browsers.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `POST /api/order`, `POST /api/order/form`: Create an order.
//! * `GET /api/order/{uuid}`: The public view of an order.
//! * `POST /api/order/{uuid}/recreate`: Re-create an order whose payment did not go through.
//! * `POST /api/payment`: Submit the payment form for an order.
//! * `POST /api/callback/{uuid}`: Payment outcome callbacks from the payment system.
//! * `POST /api/order/{uuid}/confirm`, `/refund`, `/chargeback`, `/replace`: Merchant-side transitions. These must
//!   carry the project's HMAC of the request body in `X-Signature`.

pub mod catalog_reload;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
