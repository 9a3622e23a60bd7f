//! Database probes: `/api/sql`, `/api/sqlversion`, `/api/sqlsrcip`, `/api/mysql`.
//!
//! Each request opens one connection, runs one query and reports the first
//! value (or a diagnostic message) as `sql_output`.

use axum::{
    extract::{MatchedPath, Query, State},
    routing::get,
    Json, Router,
};
use tracing::info;

use crate::db::sqlserver::{CLIENT_ADDRESS_QUERY, VERSION_QUERY};
use crate::models::SqlReport;
use crate::service::SqlOverrides;
use crate::DiagnosticService;

// ---

pub fn router() -> Router<DiagnosticService> {
    // ---
    Router::new()
        .route("/api/sql", get(sql_version))
        .route("/api/sqlversion", get(sql_version))
        .route("/api/sqlsrcip", get(sql_source_ip))
        .route("/api/mysql", get(mysql_version))
}

/// `SELECT @@VERSION` against the configured SQL Server.
///
/// Served under both `/api/sql` and `/api/sqlversion`.
async fn sql_version(
    path: MatchedPath,
    Query(overrides): Query<SqlOverrides>,
    State(service): State<DiagnosticService>,
) -> Json<SqlReport> {
    // ---
    info!("GET {} - fqdn override: {:?}", path.as_str(), overrides.fqdn);
    let outcome = service.sql_server_query(&overrides, VERSION_QUERY).await;
    Json(SqlReport::from_outcome(outcome))
}

/// Source address the SQL Server sees this instance connecting from.
async fn sql_source_ip(
    Query(overrides): Query<SqlOverrides>,
    State(service): State<DiagnosticService>,
) -> Json<SqlReport> {
    // ---
    info!("GET /api/sqlsrcip - fqdn override: {:?}", overrides.fqdn);
    let outcome = service
        .sql_server_query(&overrides, CLIENT_ADDRESS_QUERY)
        .await;
    Json(SqlReport::from_outcome(outcome))
}

async fn mysql_version(
    Query(overrides): Query<SqlOverrides>,
    State(service): State<DiagnosticService>,
) -> Json<SqlReport> {
    // ---
    info!("GET /api/mysql - fqdn override: {:?}", overrides.fqdn);
    let outcome = service.mysql_version(&overrides).await;
    Json(SqlReport::from_outcome(outcome))
}
