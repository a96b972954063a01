//! Minimal HTML for the device-verification flow. The main web UI lives
//! elsewhere; these two pages only need to confirm a code.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Html,
    Form,
};
use serde::Deserialize;

use linkmap_bridge::device_flow::{self, AuthorizeOutcome};

use crate::auth::UserSession;
use crate::AppState;

#[derive(Deserialize)]
pub struct VerifyQuery {
    code: Option<String>,
}

#[derive(Deserialize)]
pub struct AuthorizeForm {
    user_code: String,
}

fn page(body: &str) -> Html<String> {
    Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Connect a probe</title>
<style>
  body {{ font-family: system-ui, sans-serif; max-width: 28rem; margin: 4rem auto; padding: 0 1rem; }}
  input[type=text] {{ font-size: 1.4rem; letter-spacing: 0.2em; text-transform: uppercase; width: 11ch; }}
  button {{ font-size: 1rem; padding: 0.4rem 1rem; }}
</style>
</head>
<body>
{body}
</body>
</html>"#
    ))
}

/// GET /auth/device?code=XXXX-XXXX
pub async fn verification_page(
    _session: UserSession,
    Query(query): Query<VerifyQuery>,
) -> Html<String> {
    let prefill = query
        .code
        .map(|c| device_flow::normalize_user_code(&c))
        .unwrap_or_default();
    page(&format!(
        r#"<h1>Connect a probe</h1>
<p>Enter the code shown by <code>lmp login</code> on your machine.</p>
<form method="post" action="/auth/device/authorize">
  <input type="text" name="user_code" value="{prefill}" autofocus>
  <button type="submit">Authorize</button>
</form>"#
    ))
}

/// POST /auth/device/authorize
pub async fn authorize_submit(
    State(state): State<Arc<AppState>>,
    session: UserSession,
    Form(form): Form<AuthorizeForm>,
) -> Html<String> {
    match device_flow::authorize(&state.store, &form.user_code, session.user_id).await {
        Ok(AuthorizeOutcome::Authorized) => page(
            "<h1>Probe connected</h1>\
             <p>You can close this page. The probe will finish enrolling on its own.</p>",
        ),
        Ok(AuthorizeOutcome::Expired) => page(
            "<h1>Code expired</h1>\
             <p>Run <code>lmp login</code> again to get a fresh code.</p>",
        ),
        Ok(AuthorizeOutcome::InvalidCode) => page(
            "<h1>Unknown code</h1>\
             <p>Check the code shown by the probe and try again.</p>",
        ),
        Err(e) => {
            tracing::error!(error = %e, "device authorize failed");
            page("<h1>Something went wrong</h1><p>Try again in a moment.</p>")
        }
    }
}
