use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use linkmap_store::ProbeDevice;

use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

const COOKIE_NAME: &str = "lm_session";

/// Authenticated browser session. Issuance lives outside this service;
/// here the signed cookie is the whole contract.
pub struct UserSession {
    pub user_id: i64,
}

impl FromRequestParts<Arc<AppState>> for UserSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let cookie_header = parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if let Some(value) = cookie_value(cookie_header, COOKIE_NAME) {
            if let Some(user_id) = verify_session(value, &state.config.session_secret) {
                return Ok(UserSession { user_id });
            }
        }

        Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        )
            .into_response())
    }
}

/// Probe identity from the `lmp_` bearer token. A valid token also
/// bumps the device's last-seen timestamp.
pub struct ProbeIdentity {
    pub device: ProbeDevice,
}

impl FromRequestParts<Arc<AppState>> for ProbeIdentity {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "unauthorized"})),
            )
                .into_response()
        };

        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(unauthorized)?;

        let device = state
            .store
            .get_probe_device_by_token(token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "device lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": "store error"})),
                )
                    .into_response()
            })?
            .ok_or_else(unauthorized)?;

        if let Err(e) = state.store.touch_probe_device(device.id).await {
            tracing::warn!(error = %e, device_id = %device.id, "failed to touch device");
        }

        Ok(ProbeIdentity { device })
    }
}

/// Check a session cookie value of the form `user_id|expiry|signature`.
/// Yields the user id only when the signature matches and the expiry is
/// still in the future. Issuance happens outside this service; this
/// side of the contract is verification only.
fn verify_session(value: &str, secret: &str) -> Option<i64> {
    let mut parts = value.splitn(3, '|');
    let user_id = parts.next()?;
    let expiry_str = parts.next()?;
    let sig = parts.next()?;

    let expected = sign(&format!("{user_id}|{expiry_str}"), secret);
    if !eq_without_short_circuit(sig.as_bytes(), expected.as_bytes()) {
        return None;
    }

    let expiry: i64 = expiry_str.parse().ok()?;
    if chrono::Utc::now().timestamp() > expiry {
        return None;
    }

    user_id.parse().ok()
}

fn sign(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Byte-wise comparison that always walks the full length, so the
/// position of a mismatch cannot be timed.
fn eq_without_short_circuit(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// Value of one named cookie out of a `Cookie:` header.
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a cookie value the way the external issuer does, with a
    /// chosen remaining lifetime (negative = already expired).
    fn signed_session(user_id: i64, ttl_secs: i64, secret: &str) -> String {
        let expiry = chrono::Utc::now().timestamp() + ttl_secs;
        let payload = format!("{user_id}|{expiry}");
        let sig = sign(&payload, secret);
        format!("{payload}|{sig}")
    }

    #[test]
    fn valid_cookie_yields_the_user_id() {
        let value = signed_session(7, 3600, "k1");
        assert_eq!(verify_session(&value, "k1"), Some(7));
    }

    #[test]
    fn rewriting_the_user_id_breaks_the_signature() {
        // An attacker editing the id to browse someone else's links.
        let value = signed_session(7, 3600, "k1");
        let forged = value.replacen('7', "8", 1);
        assert_eq!(verify_session(&forged, "k1"), None);
    }

    #[test]
    fn a_signature_under_another_secret_is_rejected() {
        let value = signed_session(7, 3600, "k1");
        assert_eq!(verify_session(&value, "k2"), None);
    }

    #[test]
    fn a_stale_cookie_fails_even_with_a_good_signature() {
        // Someone returning to the device-verification page weeks after
        // their session lapsed must be sent through login again.
        let value = signed_session(7, -60, "k1");
        assert_eq!(verify_session(&value, "k1"), None);
    }

    #[test]
    fn malformed_cookie_values_are_rejected() {
        assert_eq!(verify_session("", "k1"), None);
        assert_eq!(verify_session("7", "k1"), None);
        assert_eq!(verify_session("7|123", "k1"), None);
        // Well-signed but the id is not numeric.
        let sig = sign("seven|99999999999", "k1");
        assert_eq!(verify_session(&format!("seven|99999999999|{sig}"), "k1"), None);
    }

    #[test]
    fn cookie_value_is_found_regardless_of_position() {
        let header = "theme=dark; lm_session=v1; csrf=x";
        assert_eq!(cookie_value(header, "lm_session"), Some("v1"));
        assert_eq!(cookie_value("lm_session=v1", "lm_session"), Some("v1"));
        assert_eq!(cookie_value("theme=dark", "lm_session"), None);
    }
}
