use axum::{Extension, Json, http::StatusCode};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::{api::AppState, oidc::pkce};

#[derive(Debug, Serialize, ToSchema)]
pub struct StartLoginResponse {
    /// Encrypted session envelope the CLI later presents to `/watch`.
    session_token: String,
    /// Provider authorization URL to open in the user's browser.
    login_url: String,
}

#[utoipa::path(
    get,
    path = "/start-login",
    responses(
        (status = 200, description = "Login started", body = StartLoginResponse),
        (status = 500, description = "Session could not be created", body = String),
    ),
    tag = "login",
)]
pub async fn start_login(
    Extension(state): Extension<AppState>,
) -> Result<Json<StartLoginResponse>, (StatusCode, String)> {
    let login_state = pkce::generate_state();
    let verifier = pkce::generate_code_verifier();

    let session_token = state
        .tokens
        .create_session_envelope(&login_state, &verifier, state.config.session_ttl)
        .map_err(|err| {
            error!("failed to mint session envelope: {err}");
            internal_error()
        })?;

    // The envelope must not reach the client unless the record exists; a
    // watch against a missing record would 404 until cleanup anyway.
    if let Err(err) = state.store.create(&login_state, &verifier).await {
        error!("failed to create session record: {err}");
        return Err(internal_error());
    }

    let login_url = state.provider.authorization_url(&login_state, &verifier);

    Ok(Json(StartLoginResponse {
        session_token,
        login_url,
    }))
}

fn internal_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to create session".to_string(),
    )
}
