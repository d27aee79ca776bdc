//! Stateless refresh with rotation. The presented envelope carries the
//! upstream refresh token; the broker re-runs the upstream grant, verifies
//! the fresh identity token, pins its subject to the envelope's email, and
//! only then mints the successor envelope with an incremented rotation
//! counter. Nothing durable is written here; failures return directly.

use axum::{Extension, Json, extract::rejection::JsonRejection, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::api::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    /// Fresh provider-issued identity token for the API server.
    id_token: String,
    /// Rotated refresh envelope replacing the presented one.
    refresh_token: String,
    /// Identity token lifetime in seconds; 0 when unknown.
    expires_in: i64,
    token_type: String,
    kubeconfig: String,
}

type RefreshResult = Result<Json<RefreshResponse>, (StatusCode, String)>;

#[utoipa::path(
    post,
    path = "/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated refresh envelope and fresh identity token", body = RefreshResponse),
        (status = 400, description = "Malformed request body", body = String),
        (status = 401, description = "Envelope or upstream refresh rejected", body = String),
        (status = 500, description = "Provider response unusable", body = String),
    ),
    tag = "refresh",
)]
pub async fn refresh(
    Extension(app): Extension<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> RefreshResult {
    let Ok(Json(request)) = body else {
        return Err((StatusCode::BAD_REQUEST, "Invalid request body".to_string()));
    };
    if request.refresh_token.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Missing refresh_token".to_string()));
    }

    // Envelope failures are never echoed back in diagnostic detail.
    let envelope = match app.tokens.validate_refresh_envelope(&request.refresh_token) {
        Ok(envelope) => envelope,
        Err(envelope_token::Error::ExpiredToken) => {
            warn!(reason = "token_expired", "REFRESH_FAILURE");
            return Err((StatusCode::UNAUTHORIZED, "Refresh token expired".to_string()));
        }
        Err(envelope_token::Error::InvalidSignature) => {
            warn!(reason = "invalid_signature", "REFRESH_FAILURE");
            return Err((StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string()));
        }
        Err(err) => {
            warn!(reason = "invalid_token", "REFRESH_FAILURE: {err}");
            return Err((StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string()));
        }
    };

    info!(
        user = %envelope.user_email,
        rotation_counter = envelope.rotation_counter,
        "REFRESH_ATTEMPT"
    );

    let tokens = match app.provider.refresh(&envelope.provider_refresh_token).await {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!(user = %envelope.user_email, reason = "provider_refresh_failed", "REFRESH_FAILURE: {err}");
            return Err((
                StatusCode::UNAUTHORIZED,
                "Failed to refresh token".to_string(),
            ));
        }
    };

    let Some(id_token) = tokens.id_token.clone() else {
        warn!(user = %envelope.user_email, reason = "no_id_token", "REFRESH_FAILURE");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "No ID token in refresh response".to_string(),
        ));
    };

    let claims = match app.provider.verify_id_token(&id_token).await {
        Ok(claims) => claims,
        Err(err) => {
            warn!(user = %envelope.user_email, reason = "id_token_verification_failed", "REFRESH_FAILURE: {err}");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "ID token verification failed".to_string(),
            ));
        }
    };

    // Subject pinning: the identity behind the new token must be the one
    // this envelope was issued to, or nothing rotates.
    let email = claims.email.clone().unwrap_or_default();
    if email.is_empty() || email != envelope.user_email {
        warn!(
            user = %envelope.user_email,
            claimed_email = %email,
            reason = "user_mismatch",
            "REFRESH_FAILURE"
        );
        return Err((StatusCode::UNAUTHORIZED, "Token user mismatch".to_string()));
    }

    // Providers may omit the refresh token on rotation; the current one
    // stays valid then.
    let next_upstream_token = tokens
        .refresh_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .unwrap_or(&envelope.provider_refresh_token);
    let next_counter = envelope.rotation_counter + 1;

    let next_envelope = match app.tokens.create_refresh_envelope(
        &email,
        next_upstream_token,
        next_counter,
        app.config.refresh_token_ttl,
    ) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(user = %email, reason = "create_refresh_token_failed", "REFRESH_FAILURE: {err}");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create new refresh token".to_string(),
            ));
        }
    };

    let expires_in = tokens.expires_in_secs();
    info!(
        user = %email,
        name = %claims.name,
        sub = %claims.sub,
        groups = ?claims.groups,
        rotation_counter = next_counter,
        cluster = %app.config.cluster_name,
        expires_in,
        "REFRESH_SUCCESS"
    );

    Ok(Json(RefreshResponse {
        id_token,
        refresh_token: next_envelope,
        expires_in,
        token_type: "Bearer".to_string(),
        kubeconfig: app.kubeconfig.render(&email),
    }))
}
