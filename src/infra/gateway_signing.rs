//! HMAC helpers shared by the gateway adapters and the callback verifier.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::app_error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, message: &str) -> AppResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid HMAC key".into()))?;
    mac.update(message.as_bytes());
    Ok(mac)
}

/// Lowercase hex HMAC-SHA256 (MoMo, PayOS)
pub fn hmac_sha256_hex(secret: &str, message: &str) -> AppResult<String> {
    Ok(hex::encode(mac(secret, message)?.finalize().into_bytes()))
}

/// Standard base64 HMAC-SHA256 (SeePay checkout forms)
pub fn hmac_sha256_base64(secret: &str, message: &str) -> AppResult<String> {
    let digest = mac(secret, message)?.finalize().into_bytes();
    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}

/// Join `key=value` pairs with `separator`, in the order given.
pub fn join_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>, separator: &str) -> String {
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(separator)
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
