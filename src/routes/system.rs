//! Process and outbound HTTP endpoints: `/api/printenv` and `/api/curl`.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::Reply;
use crate::models::CurlReport;
use crate::DiagnosticService;

// ---

pub fn router() -> Router<DiagnosticService> {
    // ---
    Router::new()
        .route("/api/printenv", get(printenv))
        .route("/api/curl", get(curl))
}

async fn printenv(State(service): State<DiagnosticService>) -> Json<BTreeMap<String, String>> {
    // ---
    info!("GET /api/printenv");
    Json(service.settings.environment())
}

#[derive(Debug, Deserialize)]
struct CurlQuery {
    url: Option<String>,
}

/// Plain GET to `url` from this instance, returning the raw body.
async fn curl(
    Query(params): Query<CurlQuery>,
    State(service): State<DiagnosticService>,
) -> Reply<CurlReport> {
    // ---
    let url = params
        .url
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| service.config.ip_lookup_url.clone());
    info!("GET /api/curl - url: {}", url);

    let answer = service.http.get(&url).send().await?.text().await?;

    Ok(Json(CurlReport {
        url,
        method: "GET",
        answer,
    }))
}

#[cfg(test)]
mod tests {
    // ---
    use super::super::test_support::{app, get_json, service, spawn_lookup_stub};
    use crate::config::Config;
    use serde_json::json;

    #[tokio::test]
    async fn test_printenv_returns_environment() {
        // ---
        let vars = [("SQL_SERVER_DB", "orders"), ("PORT", "8080")];
        let app = app(service(&vars, Config::default()));

        let body = get_json(app, "/api/printenv").await;

        assert_eq!(body, json!({"PORT": "8080", "SQL_SERVER_DB": "orders"}));
    }

    #[tokio::test]
    async fn test_curl_invalid_url_is_bare_string() {
        // ---
        let app = app(service(&[], Config::default()));

        let body = get_json(app, "/api/curl?url=not-a-url").await;

        assert!(body.is_string(), "expected a bare string, got {}", body);
    }

    #[tokio::test]
    async fn test_curl_defaults_to_lookup_url() {
        // ---
        let url = spawn_lookup_stub(r#"{"ip": "20.1.2.3"}"#).await;
        let config = Config {
            ip_lookup_url: url.clone(),
            ..Config::default()
        };
        let app = app(service(&[], config));

        let body = get_json(app, "/api/curl").await;

        assert_eq!(
            body,
            json!({"url": url, "method": "GET", "answer": r#"{"ip": "20.1.2.3"}"#})
        );
    }

    #[tokio::test]
    async fn test_curl_explicit_url() {
        // ---
        let url = spawn_lookup_stub("plain text answer").await;
        let app = app(service(&[], Config::default()));

        let body = get_json(app, &format!("/api/curl?url={}", url)).await;

        assert_eq!(body["url"], url.as_str());
        assert_eq!(body["answer"], "plain text answer");
    }
}
