use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use envelope_token::TokenManager;
use session_store::SessionStore;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, debug_span, info};
use ulid::Ulid;
use utoipa::OpenApi;

use crate::{
    config::BrokerConfig,
    kubeconfig::KubeconfigRenderer,
    listeners::ListenerTable,
    notifier,
    oidc::Provider,
    rate_limit::{CLEANUP_INTERVAL, RateLimiter},
    tls,
};

pub mod handlers;
pub mod middleware;

/// Everything a request handler can reach. Cheap to clone; all heavy members
/// are shared.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BrokerConfig>,
    pub tokens: Arc<TokenManager>,
    pub provider: Arc<Provider>,
    pub store: Arc<dyn SessionStore>,
    pub kubeconfig: Arc<KubeconfigRenderer>,
    pub listeners: ListenerTable,
    pub limiter: RateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: BrokerConfig,
        tokens: TokenManager,
        provider: Provider,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let kubeconfig = KubeconfigRenderer::new(
            &config.cluster_name,
            &config.cluster_server,
            &config.cluster_ca,
        );
        let limiter = RateLimiter::new(config.rate_limit_rps, config.rate_limit_burst);

        Self {
            kubeconfig: Arc::new(kubeconfig),
            limiter,
            listeners: ListenerTable::new(),
            tokens: Arc::new(tokens),
            provider: Arc::new(provider),
            store,
            config: Arc::new(config),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::info::info,
        handlers::login::start_login,
        handlers::refresh::refresh,
    ),
    components(schemas(
        handlers::info::InfoResponse,
        handlers::login::StartLoginResponse,
        handlers::refresh::RefreshRequest,
        handlers::refresh::RefreshResponse,
    )),
    tags(
        (name = "kauth-broker", description = "Cluster login broker API"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the full route table with the security envelope wrapped around it.
///
/// Layer order matters: security headers are outermost so every response
/// carries them, including rate-limit denials and CORS preflights.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/info", get(handlers::info::info))
        .route("/start-login", get(handlers::login::start_login))
        .route("/callback", get(handlers::callback::callback))
        .route("/watch", get(handlers::watch::watch))
        .route("/refresh", post(handlers::refresh::refresh))
        .route("/health", get(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(
                    TraceLayer::new_for_http().make_span_with(make_span).on_response(
                        |response: &Response<_>, latency: Duration, _span: &Span| {
                            info!(
                                status = response.status().as_u16(),
                                duration_ms = latency.as_millis() as u64,
                                "request completed"
                            );
                        },
                    ),
                )
                .layer(from_fn_with_state(
                    state.clone(),
                    middleware::security_headers,
                ))
                .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
                .layer(from_fn_with_state(state.clone(), middleware::cors))
                .layer(Extension(state)),
        )
}

/// Start background tasks and serve until shutdown.
///
/// # Errors
/// Returns an error when binding or serving fails, or TLS assets cannot be
/// loaded.
pub async fn serve(state: AppState) -> Result<()> {
    let notifier_task = notifier::spawn_notifier(state.store.clone(), state.listeners.clone());
    let cleanup_task = notifier::spawn_cleanup(state.store.clone());
    let limiter_task = state.limiter.spawn_cleanup_task(CLEANUP_INTERVAL);

    let addr = state.config.listen_addr;
    let tls_settings = state.config.tls.clone();
    let app = router(state);

    let result = match tls_settings {
        Some(settings) => {
            let rustls_config = tls::load_rustls_config(&settings).await?;
            let handle = axum_server::Handle::new();

            tokio::spawn({
                let handle = handle.clone();
                async move {
                    shutdown_signal().await;
                    info!("gracefully shutting down");
                    handle.graceful_shutdown(Some(Duration::from_secs(30)));
                }
            });

            info!("listening on https://{addr}");
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .context("server error")
        }
        None => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;

            info!("listening on http://{addr}");
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                info!("gracefully shutting down");
            })
            .await
            .context("server error")
        }
    };

    // The SSE streams close with the listener table; the watch and cleanup
    // loops would otherwise reconnect forever.
    notifier_task.abort();
    cleanup_task.abort();
    limiter_task.abort();

    result
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none")
        .to_string();

    debug_span!("http-request", method, path, request_id)
}
