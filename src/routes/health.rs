// src/routes/health.rs
//! Health check endpoint.
//!
//! `GET /api/healthcheck` is used by container orchestrators and load
//! balancers to verify that the service answers HTTP. It never touches a
//! database or any other external service.

use axum::{routing::get, Json, Router};

use crate::models::HealthReport;

/// Handle `GET /api/healthcheck`.
async fn healthcheck() -> Json<HealthReport> {
    Json(HealthReport { health: "OK" })
}

/// Create a subrouter containing the `/api/healthcheck` route.
///
/// Generic over the application state so it merges cleanly with the gateway
/// router.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/api/healthcheck", get(healthcheck))
}
