use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::info;

use linkmap_store::{LinkStore, StoreError};

/// Unambiguous user-code alphabet: no I, O, 0, or 1.
const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const DEVICE_AUTH_TTL_SECS: i64 = 900;
const POLL_INTERVAL_SECS: u64 = 5;

/// Bearer tokens minted for enrolled probes carry this prefix.
pub const PROBE_TOKEN_PREFIX: &str = "lmp_";

/// Response of an enrollment initiation.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceAuthStart {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

/// Outcome of a token poll.
#[derive(Debug)]
pub enum PollOutcome {
    AuthorizationPending,
    ExpiredToken,
    InvalidDeviceCode,
    Issued { access_token: String, user_id: i64 },
}

/// Outcome of a user submitting a code on the verification page.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    Authorized,
    InvalidCode,
    Expired,
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill(&mut buf[..]);
    hex::encode(buf)
}

/// 32 hex chars identifying one enrollment attempt.
pub fn generate_device_code() -> String {
    random_hex(16)
}

/// Human-readable `XXXX-XXXX` code over the unambiguous alphabet.
pub fn generate_user_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            code.push('-');
        }
        let idx = rng.random_range(0..USER_CODE_ALPHABET.len());
        code.push(USER_CODE_ALPHABET[idx] as char);
    }
    code
}

/// Fresh probe bearer token: `lmp_` + 32 hex chars.
pub fn generate_probe_token() -> String {
    format!("{PROBE_TOKEN_PREFIX}{}", random_hex(16))
}

/// Canonicalize user input: uppercase, strip everything outside the
/// alphabet, re-insert the dash.
pub fn normalize_user_code(input: &str) -> String {
    let cleaned: String = input
        .to_uppercase()
        .chars()
        .filter(|c| USER_CODE_ALPHABET.contains(&(*c as u8)))
        .collect();
    if cleaned.len() == 8 {
        format!("{}-{}", &cleaned[..4], &cleaned[4..])
    } else {
        cleaned
    }
}

/// Start an enrollment: unauthenticated; returns the codes the probe
/// displays and polls with.
pub async fn initiate(
    store: &LinkStore,
    web_base_url: &str,
) -> Result<DeviceAuthStart, StoreError> {
    let device_code = generate_device_code();
    let user_code = generate_user_code();
    let expires_at = Utc::now() + Duration::seconds(DEVICE_AUTH_TTL_SECS);

    store
        .create_device_auth(&device_code, &user_code, expires_at)
        .await?;

    info!(user_code = %user_code, "device enrollment initiated");
    Ok(DeviceAuthStart {
        device_code,
        user_code,
        verification_uri: format!("{}/auth/device", web_base_url.trim_end_matches('/')),
        expires_in: DEVICE_AUTH_TTL_SECS as u64,
        interval: POLL_INTERVAL_SECS,
    })
}

/// A logged-in user confirms a code on the verification page.
pub async fn authorize(
    store: &LinkStore,
    user_code: &str,
    user_id: i64,
) -> Result<AuthorizeOutcome, StoreError> {
    let code = normalize_user_code(user_code);
    let Some(request) = store.get_device_auth_by_user_code(&code).await? else {
        return Ok(AuthorizeOutcome::InvalidCode);
    };

    if request.is_expired(Utc::now()) {
        store.expire_device_auth(&request.device_code).await?;
        return Ok(AuthorizeOutcome::Expired);
    }

    if store
        .authorize_device_auth(&request.device_code, user_id)
        .await?
    {
        info!(user_id, "device enrollment authorized");
        Ok(AuthorizeOutcome::Authorized)
    } else {
        Ok(AuthorizeOutcome::InvalidCode)
    }
}

/// The probe polls with its device code until authorized or expired.
/// Issuing a token consumes the request, so a replayed poll cannot mint
/// a second device.
pub async fn poll(store: &LinkStore, device_code: &str) -> Result<PollOutcome, StoreError> {
    let Some(request) = store.get_device_auth(device_code).await? else {
        return Ok(PollOutcome::InvalidDeviceCode);
    };

    if request.status == "expired" {
        return Ok(PollOutcome::ExpiredToken);
    }

    if request.is_expired(Utc::now()) {
        store.expire_device_auth(device_code).await?;
        return Ok(PollOutcome::ExpiredToken);
    }

    match request.status.as_str() {
        "pending" => Ok(PollOutcome::AuthorizationPending),
        "authorized" => {
            let Some(user_id) = request.user_id else {
                return Ok(PollOutcome::InvalidDeviceCode);
            };
            let token = generate_probe_token();
            let device = store.create_probe_device(user_id, &token, "probe").await?;
            store.delete_device_auth(device_code).await?;
            info!(user_id, device_id = %device.id, "probe device enrolled");
            Ok(PollOutcome::Issued {
                access_token: token,
                user_id,
            })
        }
        _ => Ok(PollOutcome::InvalidDeviceCode),
    }
}
