//! Venue signing primitives.
//!
//! BitMEX-style HMAC hex signatures and Bithumb-style HS256 JWTs are the
//! only authentication schemes the adapters need; both are small enough to
//! express directly over `hmac`/`sha2`.

use crate::error::SocketError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `payload` under `secret`.
pub fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Signature material for a BitMEX `authKeyExpires` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiringSignature {
    pub expires: i64,
    pub signature: String,
}

/// Sign a WebSocket auth request the BitMEX way: the signed payload is
/// `"GET/realtime" + expires`, with `expires = now + 60s` (unix seconds).
pub fn websocket_auth_signature(api_secret: &str, now_unix_sec: i64) -> ExpiringSignature {
    let expires = now_unix_sec + 60;
    let payload = format!("GET/realtime{expires}");
    ExpiringSignature {
        expires,
        signature: hmac_sha256_hex(api_secret.as_bytes(), payload.as_bytes()),
    }
}

/// Build an HS256 JWT the Bithumb way: base64url (no padding) header and
/// payload, HMAC-SHA256 signed, payload `{access_key, nonce, timestamp}`.
pub fn jwt_hs256(
    access_key: &str,
    secret: &[u8],
    timestamp_ms: u64,
) -> Result<String, SocketError> {
    let header = json!({ "alg": "HS256", "typ": "JWT" });
    let payload = json!({
        "access_key": access_key,
        "nonce": Uuid::new_v4().to_string(),
        "timestamp": timestamp_ms,
    });

    let encode = |value: &serde_json::Value| -> Result<String, SocketError> {
        let bytes =
            serde_json::to_vec(value).map_err(|error| SocketError::Serialize(error.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    };

    let signing_input = format!("{}.{}", encode(&header)?, encode(&payload)?);

    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}
