//! Provider redirect target. This is the one place a login session turns
//! terminal: every failure path writes `Failed` onto the record before
//! answering the browser, so the waiting `/watch` stream observes the same
//! outcome. The HTML success page is cosmetic; the status write is the
//! canonical completion signal.

use axum::{
    Extension,
    extract::Query,
    http::StatusCode,
    response::Html,
};
use serde::Deserialize;
use session_store::OAuthSessionStatus;
use tracing::{error, info, warn};

use crate::{api::AppState, oidc::IdClaims};

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8">
  <title>Authentication Successful</title>
  <style>
    body { font-family: system-ui, sans-serif; background: #16213e; color: #e0e0e0;
           display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; }
    .card { text-align: center; padding: 40px; }
    h1 { color: #ffffff; }
  </style>
</head>
<body>
  <div class="card">
    <h1>Authentication Successful</h1>
    <p>You can close this window and return to your terminal.</p>
  </div>
</body>
</html>
"#;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

type CallbackResult = Result<Html<&'static str>, (StatusCode, String)>;

pub async fn callback(
    Extension(app): Extension<AppState>,
    Query(query): Query<CallbackQuery>,
) -> CallbackResult {
    let Some(login_state) = query.state.as_deref().filter(|value| !value.is_empty()) else {
        return Err((StatusCode::BAD_REQUEST, "Missing state".to_string()));
    };

    let record = match app.store.get(login_state).await {
        Ok(record) => record,
        Err(err) if err.is_not_found() => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Session not found or expired".to_string(),
            ));
        }
        Err(err) => {
            error!("failed to load session record: {err}");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get session".to_string(),
            ));
        }
    };
    let verifier = record.spec.verifier;

    if let Some(provider_error) = query.error.as_deref().filter(|value| !value.is_empty()) {
        let description = query.error_description.as_deref().unwrap_or_default();
        record_failure(&app, login_state, &format!("{provider_error}: {description}")).await;
        return Err((StatusCode::BAD_REQUEST, provider_error.to_string()));
    }

    let Some(code) = query.code.as_deref().filter(|value| !value.is_empty()) else {
        record_failure(&app, login_state, "no authorization code returned").await;
        return Err((StatusCode::BAD_REQUEST, "No code returned".to_string()));
    };

    let tokens = match app.provider.exchange_code(code, &verifier).await {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!(reason = "token_exchange_failed", "AUTH_FAILURE: {err}");
            record_failure(&app, login_state, &format!("token exchange failed: {err}")).await;
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Token exchange failed".to_string(),
            ));
        }
    };

    let Some(id_token) = tokens.id_token.as_deref() else {
        warn!(reason = "no_id_token", "AUTH_FAILURE");
        record_failure(&app, login_state, "no ID token returned").await;
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "No ID token".to_string()));
    };

    let claims = match app.provider.verify_id_token(id_token).await {
        Ok(claims) => claims,
        Err(err) => {
            warn!(reason = "id_token_verification_failed", "AUTH_FAILURE: {err}");
            record_failure(
                &app,
                login_state,
                &format!("ID token verification failed: {err}"),
            )
            .await;
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "ID token verification failed".to_string(),
            ));
        }
    };

    let Some(email) = claims.email.as_deref().filter(|value| !value.is_empty()) else {
        warn!(sub = %claims.sub, reason = "missing_email_claim", "AUTH_FAILURE");
        record_failure(&app, login_state, "failed to extract claims").await;
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to extract claims".to_string(),
        ));
    };

    if !authorized(&claims, &app.config.allowed_groups) {
        warn!(
            user = %email,
            groups = ?claims.groups,
            allowed_groups = ?app.config.allowed_groups,
            reason = "group_not_allowed",
            "AUTH_DENIED"
        );
        record_failure(&app, login_state, "not in allowed groups").await;
        return Err((
            StatusCode::FORBIDDEN,
            "Forbidden: user not in allowed groups".to_string(),
        ));
    }

    info!(
        user = %email,
        name = %claims.name,
        sub = %claims.sub,
        groups = ?claims.groups,
        cluster = %app.config.cluster_name,
        "AUTH_SUCCESS"
    );

    let refresh_envelope = match app.tokens.create_refresh_envelope(
        email,
        tokens.refresh_token.as_deref().unwrap_or_default(),
        0,
        app.config.refresh_token_ttl,
    ) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!("failed to mint refresh envelope: {err}");
            record_failure(&app, login_state, "failed to create refresh token").await;
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ));
        }
    };

    let kubeconfig = app.kubeconfig.render(email);

    if let Err(err) = app
        .store
        .update_status(
            login_state,
            OAuthSessionStatus::ready(email, kubeconfig, refresh_envelope),
        )
        .await
    {
        error!("failed to write session outcome: {err}");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error".to_string(),
        ));
    }

    Ok(Html(SUCCESS_PAGE))
}

async fn record_failure(app: &AppState, state: &str, message: &str) {
    if let Err(err) = app
        .store
        .update_status(state, OAuthSessionStatus::failed(message))
        .await
    {
        error!("failed to record login failure: {err}");
    }
}

// Group authorization: an empty allow-list permits any authenticated user.
fn authorized(claims: &IdClaims, allowed_groups: &[String]) -> bool {
    allowed_groups.is_empty()
        || claims
            .groups
            .iter()
            .any(|group| allowed_groups.contains(group))
}
