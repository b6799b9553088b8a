pub mod error;
pub mod routes;
pub mod scheduler;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/tenants/{tenant_id}/subscriptions/{subscription_id}/{action_type}",
            post(routes::dispatch::dispatch_operation),
        )
        // Same handler under the gateway-facing prefix
        .route(
            "/saas/tenants/{tenant_id}/subscriptions/{subscription_id}/{action_type}",
            post(routes::dispatch::dispatch_operation),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve the request API on a pre-bound listener until `shutdown` resolves.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port
/// before starting (useful when binding port 0).
pub async fn serve_on<F>(
    listener: tokio::net::TcpListener,
    app_state: state::AppState,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let app = build_router(app_state);

    tracing::info!("lifecycle request API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
