//! Router-level tests against the in-memory session store: envelope
//! validation on `/watch`, SSE delivery, the security envelope, and the
//! non-provider error paths of `/callback`.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use kauth_broker::{api, notifier};
use session_store::{OAuthSessionStatus, SessionStore};
use tower::ServiceExt;

use common::{broker_config, offline_state, offline_state_with_config, token_manager};

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[tokio::test]
async fn health_answers_with_security_headers() {
    let (state, _store) = offline_state();
    let app = api::router(state);

    let response = app.oneshot(get("/health")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::X_FRAME_OPTIONS).unwrap(),
        "DENY"
    );
    assert_eq!(
        response
            .headers()
            .get(header::X_CONTENT_TYPE_OPTIONS)
            .unwrap(),
        "nosniff"
    );
    assert!(
        response
            .headers()
            .get(header::CONTENT_SECURITY_POLICY)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("frame-ancestors 'none'")
    );
    assert!(
        response.headers().get("permissions-policy").is_some(),
        "permissions policy missing"
    );
    // No TLS configured, so no HSTS.
    assert!(
        response
            .headers()
            .get(header::STRICT_TRANSPORT_SECURITY)
            .is_none()
    );

    let body = body_string(response).await;
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn info_reports_cluster_and_provider() {
    let (state, _store) = offline_state();
    let app = api::router(state);

    let response = app.oneshot(get("/info")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value =
        serde_json::from_str(&body_string(response).await).expect("json");
    assert_eq!(body["cluster_name"], "test-cluster");
    assert_eq!(body["cluster_server"], "https://kubernetes.example.com:6443");
    assert_eq!(body["client_id"], "kauth");
    assert_eq!(body["login_url"], "https://kauth.example.com/start-login");
    assert_eq!(body["refresh_url"], "https://kauth.example.com/refresh");
}

#[tokio::test]
async fn start_login_mints_envelope_and_record() {
    let (state, store) = offline_state();
    let app = api::router(state);

    let response = app.oneshot(get("/start-login")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value =
        serde_json::from_str(&body_string(response).await).expect("json");
    let session_token = body["session_token"].as_str().expect("session_token");
    let login_url = body["login_url"].as_str().expect("login_url");

    // The envelope decodes with the broker's keys and points at a record.
    let envelope = token_manager()
        .validate_session_envelope(session_token)
        .expect("valid envelope");
    let record = store.get(&envelope.state).await.expect("record");
    assert_eq!(record.spec.verifier, envelope.verifier);
    assert!(record.status.is_none());

    assert!(login_url.contains("response_type=code"));
    assert!(login_url.contains("code_challenge_method=S256"));
    assert!(login_url.contains(&format!("state={}", envelope.state)));
}

#[tokio::test]
async fn watch_requires_a_session_token() {
    let (state, _store) = offline_state();
    let app = api::router(state);

    let response = app.oneshot(get("/watch")).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn watch_distinguishes_invalid_from_expired() {
    let (state, _store) = offline_state();
    let app = api::router(state);

    let response = app
        .clone()
        .oneshot(get("/watch?session_token=garbage"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "Invalid session token");

    let expired = token_manager()
        .create_session_envelope("state-x", "verifier", chrono::Duration::seconds(-1))
        .expect("envelope");
    let response = app
        .oneshot(get(&format!("/watch?session_token={expired}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "Session expired");
}

#[tokio::test]
async fn watch_unknown_session_is_not_found() {
    let (state, _store) = offline_state();
    let app = api::router(state);

    let envelope = token_manager()
        .create_session_envelope("no-record", "verifier", chrono::Duration::minutes(5))
        .expect("envelope");
    let response = app
        .oneshot(get(&format!("/watch?session_token={envelope}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn watch_emits_immediately_for_terminal_record() {
    let (state, store) = offline_state();
    let app = api::router(state);

    store.create("state-1", "verifier").await.expect("create");
    store
        .update_status(
            "state-1",
            OAuthSessionStatus::ready("u@example.com", "the-kubeconfig", "the-envelope"),
        )
        .await
        .expect("update");

    let envelope = token_manager()
        .create_session_envelope("state-1", "verifier", chrono::Duration::minutes(5))
        .expect("envelope");
    let response = app
        .oneshot(get(&format!("/watch?session_token={envelope}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let body = body_string(response).await;
    assert!(body.contains(r#""ready":true"#), "body was: {body}");
    assert!(body.contains("the-kubeconfig"));
    assert!(body.contains("the-envelope"));
}

#[tokio::test]
async fn watch_is_woken_by_the_notifier() {
    let (state, store) = offline_state();
    let listeners = state.listeners.clone();
    let app = api::router(state);

    store.create("state-2", "verifier").await.expect("create");
    let task = notifier::spawn_notifier(store.clone(), listeners);
    // Let the notifier connect its watch before the flow continues.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let envelope = token_manager()
        .create_session_envelope("state-2", "verifier", chrono::Duration::minutes(5))
        .expect("envelope");
    let response = app
        .oneshot(get(&format!("/watch?session_token={envelope}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    store
        .update_status("state-2", OAuthSessionStatus::failed("not in allowed groups"))
        .await
        .expect("update");

    let body = tokio::time::timeout(Duration::from_secs(5), body_string(response))
        .await
        .expect("stream completes after delivery");
    assert!(body.contains(r#""ready":false"#), "body was: {body}");
    assert!(body.contains("not in allowed groups"));

    task.abort();
}

#[tokio::test]
async fn callback_without_state_is_rejected() {
    let (state, _store) = offline_state();
    let app = api::router(state);

    let response = app.oneshot(get("/callback")).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_provider_error_fails_the_session() {
    let (state, store) = offline_state();
    let app = api::router(state);

    store.create("state-3", "verifier").await.expect("create");
    let response = app
        .oneshot(get(
            "/callback?state=state-3&error=access_denied&error_description=user%20said%20no",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let record = store.get("state-3").await.expect("record");
    let status = record.status.expect("terminal status");
    assert!(!status.ready);
    assert_eq!(status.error, "access_denied: user said no");
    assert!(status.completed_at.is_some());
}

#[tokio::test]
async fn callback_unknown_state_is_a_client_error() {
    let (state, _store) = offline_state();
    let app = api::router(state);

    let response = app
        .oneshot(get("/callback?state=never-created&code=abc"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refresh_rejects_non_post() {
    let (state, _store) = offline_state();
    let app = api::router(state);

    let response = app.oneshot(get("/refresh")).await.expect("response");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn rate_limit_denies_after_burst() {
    let mut config = broker_config("https://issuer.invalid", vec![]);
    config.rate_limit_rps = 1.0;
    config.rate_limit_burst = 2;
    let (state, _store) = offline_state_with_config(config);
    let app = api::router(state);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-real-ip", "203.0.113.5")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-real-ip", "203.0.113.5")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(header::RETRY_AFTER).is_some());
    // The denial still carries the security headers.
    assert_eq!(
        response.headers().get(header::X_FRAME_OPTIONS).unwrap(),
        "DENY"
    );

    // A different source is unaffected.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-real-ip", "203.0.113.6")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cors_echoes_allowed_origin_and_answers_preflight() {
    let mut config = broker_config("https://issuer.invalid", vec![]);
    config.allowed_origins = vec!["https://app.example.com".to_string()];
    let (state, _store) = offline_state_with_config(config);
    let app = api::router(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://app.example.com")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "https://app.example.com"
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/refresh")
                .header(header::ORIGIN, "https://app.example.com")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_MAX_AGE)
            .unwrap(),
        "86400"
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .unwrap(),
        "GET, POST, OPTIONS"
    );

    // Unlisted origins get no CORS headers.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://evil.example.com")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}
