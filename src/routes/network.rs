//! Network identity endpoints: `/api/dns` and `/api/ip`.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, Uri},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::Reply;
use crate::models::{DnsReport, IpReport, Resolution};
use crate::{netinfo, DiagnosticService};

// ---

pub fn router() -> Router<DiagnosticService> {
    // ---
    Router::new()
        .route("/api/dns", get(dns))
        .route("/api/ip", get(ip))
}

#[derive(Debug, Deserialize)]
struct DnsQuery {
    fqdn: Option<String>,
}

/// Resolve `fqdn` as seen from inside this instance.
async fn dns(Query(params): Query<DnsQuery>) -> Json<DnsReport> {
    // ---
    info!("GET /api/dns - fqdn: {:?}", params.fqdn);

    let ip = match params.fqdn.as_deref() {
        Some(fqdn) => netinfo::resolve_ipv4(fqdn).await,
        None => None,
    };

    Json(DnsReport {
        fqdn: params.fqdn,
        ip: Resolution(ip),
    })
}

/// Everything we know about where this instance sits on the network, and
/// about the caller.
async fn ip(
    State(service): State<DiagnosticService>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
) -> Reply<IpReport> {
    // ---
    info!("GET /api/ip - from {}", remote);

    let config = &service.config;
    let my_public_ip = netinfo::public_ip(&service.http, &config.ip_lookup_url).await?;

    let header_str = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
    let user_agent = header_str(header::USER_AGENT).unwrap_or_default();
    let host = header_str(header::HOST).unwrap_or_default();

    let x_forwarded_for = headers
        .get_all("x-forwarded-for")
        .iter()
        .next()
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let (sql_server_fqdn, sql_server_ip) = service.sql_server_target().await;

    Ok(Json(IpReport {
        my_private_ip: Resolution(netinfo::private_ip().await),
        my_public_ip,
        my_dns_servers: netinfo::dns_servers(&config.resolv_conf).await,
        my_default_gateway: netinfo::default_gateway(&config.route_table).await,
        your_address: remote.ip().to_string(),
        x_forwarded_for,
        path_accessed: format!("{}{}", host, uri.path()),
        your_platform: netinfo::platform_from_user_agent(user_agent),
        your_browser: netinfo::browser_from_user_agent(user_agent),
        sql_server_fqdn,
        sql_server_ip,
    }))
}
