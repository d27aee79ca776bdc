//! SSE stream of a login session's outcome.
//!
//! The fast path reads the record: if it is already terminal the handler
//! emits one `data:` event and closes. Otherwise it parks a capacity-1
//! listener in the replica-local table and waits for the notifier to wake
//! it; heartbeat comments keep the connection alive meanwhile. The client
//! observes exactly one `data:` event per stream unless it disconnects
//! first.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Extension,
    extract::Query,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::{Deserialize, Serialize};
use session_store::OAuthSessionStatus;
use tracing::{debug, error};

use crate::api::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct StatusPayload {
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kubeconfig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&OAuthSessionStatus> for StatusPayload {
    fn from(status: &OAuthSessionStatus) -> Self {
        if status.ready {
            Self {
                ready: true,
                kubeconfig: Some(status.kubeconfig.clone()),
                refresh_token: Some(status.refresh_token.clone()),
                error: None,
            }
        } else {
            Self {
                ready: false,
                kubeconfig: None,
                refresh_token: None,
                error: Some(status.error.clone()),
            }
        }
    }
}

fn final_event(status: &OAuthSessionStatus) -> Event {
    let payload = StatusPayload::from(status);
    Event::default().data(serde_json::to_string(&payload).unwrap_or_default())
}

pub async fn watch(
    Extension(app): Extension<AppState>,
    Query(query): Query<WatchQuery>,
) -> Response {
    let Some(session_token) = query.session_token.as_deref().filter(|v| !v.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "No session_token specified").into_response();
    };

    // Expired and invalid envelopes answer distinguishably, but neither says
    // anything about why validation failed internally.
    let session = match app.tokens.validate_session_envelope(session_token) {
        Ok(session) => session,
        Err(envelope_token::Error::ExpiredToken) => {
            return (StatusCode::UNAUTHORIZED, "Session expired").into_response();
        }
        Err(err) => {
            debug!("rejected session envelope: {err}");
            return (StatusCode::UNAUTHORIZED, "Invalid session token").into_response();
        }
    };

    let record = match app.store.get(&session.state).await {
        Ok(record) => record,
        Err(err) if err.is_not_found() => {
            return (StatusCode::NOT_FOUND, "Session not found or expired").into_response();
        }
        Err(err) => {
            error!("failed to load session record: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to get session").into_response();
        }
    };

    let status = record.status.unwrap_or_default();
    if status.is_terminal() {
        let stream =
            futures::stream::once(async move { Ok::<_, Infallible>(final_event(&status)) });
        return Sse::new(stream).into_response();
    }

    let (registration, mut receiver) = app.listeners.register(&session.state);
    let stream = async_stream::stream! {
        // The registration lives inside the stream so the listener is
        // removed on every exit path, including client disconnect.
        let _registration = registration;
        if let Some(status) = receiver.recv().await {
            yield Ok::<_, Infallible>(final_event(&status));
        }
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(HEARTBEAT_INTERVAL)
                .text("keepalive"),
        )
        .into_response()
}
