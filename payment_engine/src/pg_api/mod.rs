//! # Payment gateway API
//!
//! The public face of the engine. [`OrderFlowApi`] ties the validation pipeline, the payment providers, the status
//! machine and the notification queue together, and is all a server needs to drive the order lifecycle.
//!
//! The API is generic over the storage backend (anything implementing [`crate::traits::OrderManagement`]) and takes
//! its external collaborators as trait objects in [`services::EngineServices`].
pub mod errors;
pub mod order_objects;
pub mod services;

mod callbacks;
mod order_flow_api;
mod payment_dispatch;

pub use order_flow_api::OrderFlowApi;
pub use payment_dispatch::check_required_fields;
