//! Types shared by the payment engine and the payment server.
mod amount;
mod helpers;

pub mod op;
mod secret;

pub use amount::{Amount, AmountConversionError, MINOR_UNITS};
pub use helpers::parse_boolean_flag;
pub use secret::Secret;
