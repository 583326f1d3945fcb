//! HTTP surface of the relay: router, middleware stack, serve loop, and
//! graceful shutdown with a final replication flush.

use crate::{
    delivery::MessageDelivery,
    replicate::{self, BlobStorage, DirtyFlag},
    store::CredentialStore,
};
use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::mpsc,
    time::{Duration, timeout},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, debug_span, error, info, warn};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod error;
pub mod handlers;
pub mod rate_limit;

use handlers::RateLimit;
use rate_limit::FixedWindowLimiter;

/// Grace period for the final upload attempt at shutdown.
const SHUTDOWN_FLUSH_SECONDS: u64 = 10;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::public_keys::public_keys,
        handlers::get_secret::get_secret,
        handlers::add_key::add_key,
    ),
    components(schemas(
        handlers::Message,
        handlers::get_secret::SecretRequest,
        handlers::add_key::AddKeyRequest,
    )),
    tags((name = "relay", description = "Verification-code relay API"))
)]
struct ApiDoc;

async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(ApiDoc::openapi())
}

/// Build the application router with its middleware stack and shared state.
#[must_use]
pub fn router(
    store: Arc<CredentialStore>,
    delivery: Arc<dyn MessageDelivery>,
    dirty: DirtyFlag,
    limit: RateLimit,
) -> Router {
    let cors = CorsLayer::new()
        // allow `GET` and `POST` when accessing the resource
        .allow_methods([Method::GET, Method::POST])
        // allow requests from any origin
        .allow_origin(Any);

    Router::new()
        .route("/getPublicKeys", post(handlers::public_keys))
        .route("/getSecret", post(handlers::get_secret))
        .route("/addKey", post(handlers::add_key))
        .route("/health", get(handlers::health))
        .route("/openapi.json", get(openapi_json))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(store))
                .layer(Extension(delivery))
                .layer(Extension(dirty))
                .layer(Extension(limit)),
        )
}

/// Start the server and the replication task, then serve until a shutdown
/// signal arrives. One final best-effort upload runs before returning.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn new(
    port: u16,
    store: Arc<CredentialStore>,
    delivery: Arc<dyn MessageDelivery>,
    blob: Arc<dyn BlobStorage>,
    ip_header: String,
) -> Result<()> {
    let (dirty, dirty_rx) = DirtyFlag::new();
    let replicator = tokio::spawn(replicate::replicate(store.clone(), blob.clone(), dirty_rx));

    let limit = RateLimit {
        limiter: Arc::new(FixedWindowLimiter::new()),
        ip_header,
    };

    let app = router(store.clone(), delivery, dirty, limit);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_shutdown_listener(tx);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        rx.recv().await;
        info!("Gracefully shutdown");
    })
    .await?;

    // Mirror the last committed state before exit, bounded so a dead remote
    // cannot hang shutdown.
    if timeout(
        Duration::from_secs(SHUTDOWN_FLUSH_SECONDS),
        replicate::flush(&store, blob.as_ref()),
    )
    .await
    .is_err()
    {
        warn!("Final store upload timed out");
    }

    replicator.abort();

    Ok(())
}

fn spawn_shutdown_listener(tx: mpsc::UnboundedSender<()>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(err) => {
                        error!("Failed to install SIGTERM handler: {err}");
                        return;
                    }
                };

            tokio::select! {
                _ = ctrl_c => {},
                _ = sigterm.recv() => {},
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        info!("Shutdown signal received");
        let _ = tx.send(());
    });
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
