//! Shopify webhook signatures.
//!
//! Shopify signs every webhook with HMAC-SHA256 over the exact raw request body, keyed with the app's API secret, and
//! sends the base64-encoded digest in the `X-Shopify-Hmac-SHA256` header. The body must be verified before it is
//! parsed: re-serializing parsed JSON would not reproduce the signed bytes.
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;

pub const SHOPIFY_HMAC_HEADER: &str = "X-Shopify-Hmac-SHA256";

type HmacSha256 = Hmac<Sha256>;

/// The base64-encoded HMAC-SHA256 of `data` under `secret`.
pub fn calculate_hmac(secret: &[u8], data: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// Checks a webhook signature in constant time.
///
/// Fails closed: a missing body, a missing or undecodable header, or an empty secret are all verification failures.
pub fn verify_webhook_signature(raw_body: Option<&[u8]>, signature_header: Option<&str>, secret: &[u8]) -> bool {
    let Some(body) = raw_body else {
        warn!("🔐️ Webhook has no body to verify");
        return false;
    };
    let Some(header) = signature_header.map(str::trim).filter(|h| !h.is_empty()) else {
        warn!("🔐️ Webhook has no signature header");
        return false;
    };
    if secret.is_empty() {
        warn!("🔐️ No webhook secret is configured. Rejecting the webhook.");
        return false;
    }
    let Ok(signature) = base64::decode(header) else {
        warn!("🔐️ Webhook signature is not valid base64");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    let valid = mac.verify_slice(&signature).is_ok();
    if valid {
        trace!("🔐️ Webhook signature verified");
    } else {
        warn!("🔐️ Webhook signature does not match the body");
    }
    valid
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &[u8] = b"hush";
    const BODY: &[u8] = br#"{"id":123,"email":"a@x.com"}"#;

    #[test]
    fn accepts_own_signature() {
        let sig = calculate_hmac(SECRET, BODY);
        assert!(verify_webhook_signature(Some(BODY), Some(&sig), SECRET));
    }

    #[test]
    fn known_digest() {
        // echo -n 'hello' | openssl dgst -sha256 -hmac key -binary | base64
        assert_eq!(calculate_hmac(b"key", b"hello"), "kwezuRXvtRcf8U2MtV+8x5jGwO8UVtZt7RpqpyOli3s=");
    }

    #[test]
    fn any_single_byte_change_fails() {
        let sig = calculate_hmac(SECRET, BODY);
        for i in 0..BODY.len() {
            let mut tampered = BODY.to_vec();
            tampered[i] ^= 0x01;
            assert!(!verify_webhook_signature(Some(&tampered), Some(&sig), SECRET), "byte {i}");
        }
    }

    #[test]
    fn fails_closed() {
        let sig = calculate_hmac(SECRET, BODY);
        assert!(!verify_webhook_signature(None, Some(&sig), SECRET));
        assert!(!verify_webhook_signature(Some(BODY), None, SECRET));
        assert!(!verify_webhook_signature(Some(BODY), Some(""), SECRET));
        assert!(!verify_webhook_signature(Some(BODY), Some("not base64!!"), SECRET));
        assert!(!verify_webhook_signature(Some(BODY), Some(&sig), b""));
        assert!(!verify_webhook_signature(Some(BODY), Some(&sig), b"other secret"));
    }
}
