mod masking;
mod signature;

pub use masking::{card_brand, mask_pan};
pub use signature::{calculate_hmac, canonical_form, verify_hmac, SignatureError, SIGNATURE_PARAM};
