//! # Request signatures
//!
//! Signed order requests and provider callbacks are authenticated with an HMAC-SHA-512 tag.
//!
//! The signed message is the payload with the shared secret appended, and the HMAC is keyed with the same secret:
//!
//! ```text
//!    signature = hex(HMAC-SHA-512(key = secret, message = payload || secret))
//! ```
//!
//! The payload is either the raw request body (JSON requests and callbacks) or the canonical form of the request
//! parameters, see [`canonical_form`].
//!
//! Verification uses a constant-time comparison and fails closed: a malformed signature is simply an invalid one.
use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha512;
use thiserror::Error;

type HmacSha512 = Hmac<Sha512>;

/// The name of the form parameter that carries the signature. It is never part of the signed message.
pub const SIGNATURE_PARAM: &str = "signature";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("No signature was provided")]
    Missing,
    #[error("The signature is not valid hex")]
    Malformed,
    #[error("The signature does not match")]
    Mismatch,
    #[error("The signing key cannot be used: {0}")]
    InvalidKey(String),
}

fn mac_for(payload: &[u8], secret: &str) -> Result<HmacSha512, SignatureError> {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(payload);
    mac.update(secret.as_bytes());
    Ok(mac)
}

/// Signs `payload` with `secret`, returning the lowercase hex-encoded tag.
pub fn calculate_hmac(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mac = mac_for(payload, secret)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks `signature` (hex, either case) against `payload` signed with `secret`.
pub fn verify_hmac(payload: &[u8], secret: &str, signature: &str) -> Result<(), SignatureError> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(SignatureError::Missing);
    }
    let tag = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;
    let mac = mac_for(payload, secret)?;
    mac.verify_slice(&tag).map_err(|_| SignatureError::Mismatch)
}

/// Builds the canonical form of a set of request parameters: keys sorted lexicographically, the signature parameter
/// left out, and `key=value` pairs joined with `&`. Values are used as received, without any escaping.
pub fn canonical_form(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != SIGNATURE_PARAM)
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &str = "very-secret";

    #[test]
    fn sign_and_verify() {
        let body = br#"{"project":"p1","amount":100}"#;
        let sig = calculate_hmac(body, SECRET).unwrap();
        assert_eq!(sig.len(), 128);
        assert!(verify_hmac(body, SECRET, &sig).is_ok());
        assert!(verify_hmac(body, SECRET, &sig.to_uppercase()).is_ok());
    }

    #[test]
    fn any_flipped_byte_is_rejected() {
        let body = br#"{"project":"p1","amount":100}"#.to_vec();
        let sig = calculate_hmac(&body, SECRET).unwrap();
        let mut sig_bytes = hex::decode(&sig).unwrap();
        for i in 0..sig_bytes.len() {
            sig_bytes[i] ^= 0x01;
            assert_eq!(verify_hmac(&body, SECRET, &hex::encode(&sig_bytes)), Err(SignatureError::Mismatch));
            sig_bytes[i] ^= 0x01;
        }
        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert_eq!(verify_hmac(&tampered, SECRET, &sig), Err(SignatureError::Mismatch));
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let sig = calculate_hmac(b"payload", SECRET).unwrap();
        assert_eq!(verify_hmac(b"payload", "other", &sig), Err(SignatureError::Mismatch));
    }

    #[test]
    fn malformed_signatures() {
        assert_eq!(verify_hmac(b"payload", SECRET, ""), Err(SignatureError::Missing));
        assert_eq!(verify_hmac(b"payload", SECRET, "not hex!"), Err(SignatureError::Malformed));
        assert_eq!(verify_hmac(b"payload", SECRET, "abcd"), Err(SignatureError::Mismatch));
    }

    #[test]
    fn canonical_form_is_sorted_and_excludes_the_signature() {
        let mut params = BTreeMap::new();
        params.insert("project".to_string(), "p1".to_string());
        params.insert("amount".to_string(), "100".to_string());
        params.insert("signature".to_string(), "deadbeef".to_string());
        params.insert("currency".to_string(), "RUB".to_string());
        assert_eq!(canonical_form(&params), "amount=100&currency=RUB&project=p1");
    }
}
