//! Concrete [`ProviderAdapter`](crate::provider::ProviderAdapter)
//! implementations: `stripe`, `xendit`, `adyen`, `braintree`. Each
//! owns a `reqwest::Client` and speaks that provider's actual
//! webhook-signing and charge-API conventions rather than a generic
//! HTTP shim.

mod adyen;
mod braintree;
mod stripe;
mod xendit;

pub use adyen::AdyenAdapter;
pub use braintree::BraintreeAdapter;
pub use stripe::StripeAdapter;
pub use xendit::XenditAdapter;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes an HMAC-SHA256 digest, hex-encoded. Used by adapter tests to
/// construct a correctly-signed fixture; adapters themselves verify via
/// [`hmac_sha256_verify`], not by comparing this output directly.
#[cfg(test)]
pub(crate) fn hmac_sha256_hex(secret: &str, message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// HMAC-SHA256 verification shared by every adapter's signing scheme.
/// Uses `Mac::verify_slice`, which compares in constant time, so a
/// webhook forger cannot recover the expected digest byte-by-byte from
/// response timing.
pub(crate) fn hmac_sha256_verify(secret: &str, message: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex) else { return false };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}

/// Constant-time comparison for bearer-style tokens (no HMAC involved,
/// e.g. Xendit's callback token), so a timing side-channel can't be used
/// to recover the configured secret one byte at a time.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
