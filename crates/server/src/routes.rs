//! Route configuration.

use crate::auth::identity_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Job routes sit behind the identity middleware; every request must
    // carry the proxy-injected owner header.
    let job_routes = Router::new()
        .route(
            "/v1/jobs",
            post(handlers::create_job).get(handlers::list_jobs),
        )
        .route("/v1/jobs/{job_id}", get(handlers::get_job))
        .route("/v1/jobs/{job_id}/confirm", post(handlers::confirm_job))
        .route("/v1/jobs/{job_id}/download", get(handlers::get_download))
        .layer(middleware::from_fn(identity_middleware));

    let mut router = Router::new()
        .merge(job_routes)
        // Billing webhook authenticates with its own shared secret
        .route("/v1/billing/tier", post(handlers::update_tier))
        // Health check (intentionally unauthenticated for probes)
        .route("/v1/health", get(handlers::health_check));

    // SECURITY: When enabled, /metrics MUST be network-restricted to
    // authorized Prometheus scraper IPs. See the metrics module docs.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
