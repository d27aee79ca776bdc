use axum::{Extension, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::AppState;

/// Cluster and provider hints the workstation CLI bootstraps from.
#[derive(Debug, Serialize, ToSchema)]
pub struct InfoResponse {
    cluster_name: String,
    cluster_server: String,
    issuer_url: String,
    client_id: String,
    login_url: String,
    refresh_url: String,
}

#[utoipa::path(
    get,
    path = "/info",
    responses(
        (status = 200, description = "Cluster and provider configuration", body = InfoResponse),
    ),
    tag = "info",
)]
pub async fn info(Extension(state): Extension<AppState>) -> Json<InfoResponse> {
    let config = &state.config;
    Json(InfoResponse {
        cluster_name: config.cluster_name.clone(),
        cluster_server: config.cluster_server.clone(),
        issuer_url: config.issuer_url.clone(),
        client_id: config.client_id.clone(),
        login_url: config.login_url(),
        refresh_url: config.refresh_url(),
    })
}
