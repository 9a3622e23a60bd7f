//! Route gateway: merges every endpoint subrouter and binds the service.
//!
//! All routes answer `200 OK`. A handler that fails outright returns a
//! [`Fault`], whose body is the bare JSON string of the error description.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::DiagnosticService;

mod health;
mod network;
mod sql;
mod system;

// ---

pub fn router(service: DiagnosticService) -> Router {
    // ---
    Router::new()
        .merge(health::router())
        .merge(sql::router())
        .merge(network::router())
        .merge(system::router())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Handler level failure, reported in the body rather than the status.
#[derive(Debug)]
pub struct Fault(anyhow::Error);

impl IntoResponse for Fault {
    fn into_response(self) -> Response {
        // ---
        tracing::error!("Handler failed: {:#}", self.0);
        (StatusCode::OK, Json(self.0.to_string())).into_response()
    }
}

impl<E> From<E> for Fault
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Fault(err.into())
    }
}

pub type Reply<T> = Result<Json<T>, Fault>;

#[cfg(test)]
pub(crate) mod test_support {
    // ---
    use std::{collections::HashMap, net::SocketAddr, sync::Arc};

    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode},
        Router,
    };
    use tower::ServiceExt; // for `oneshot`

    use crate::config::{Config, EnvSource, SettingsResolver};
    use crate::db::mysql::MySqlParams;
    use crate::db::{MySqlConnector, SqlServerDriver};
    use crate::DiagnosticService;

    pub struct NoMySql;

    #[async_trait::async_trait]
    impl MySqlConnector for NoMySql {
        async fn server_version(&self, _params: &MySqlParams) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("Can't connect to MySQL server"))
        }
    }

    /// Service with a fixed environment and no SQL Server drivers.
    pub fn service(vars: &[(&str, &str)], config: Config) -> DiagnosticService {
        // ---
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let settings = SettingsResolver::new(config.secrets_dir.clone(), EnvSource::Fixed(env));
        let drivers: Vec<Arc<dyn SqlServerDriver>> = Vec::new();

        // Loopback stubs must not be routed through a host proxy
        let http = reqwest::Client::builder().no_proxy().build().unwrap();

        DiagnosticService::new(config, settings, drivers, Arc::new(NoMySql), http)
    }

    /// Serve `body` on `GET /` from an ephemeral loopback port; returns its URL.
    pub async fn spawn_lookup_stub(body: &'static str) -> String {
        // ---
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stub = Router::new().route("/", axum::routing::get(move || async move { body }));

        tokio::spawn(async move {
            axum::serve(listener, stub).await.unwrap();
        });

        format!("http://{}/", addr)
    }

    pub fn app(service: DiagnosticService) -> Router {
        super::router(service).layer(MockConnectInfo(SocketAddr::from(([203, 0, 113, 9], 51000))))
    }

    /// Issue a GET and return the parsed JSON body, asserting `200 OK`.
    pub async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        get_json_with_headers(app, uri, &[]).await
    }

    /// Like [`get_json`], with extra request headers.
    pub async fn get_json_with_headers(
        app: Router,
        uri: &str,
        headers: &[(&str, &str)],
    ) -> serde_json::Value {
        // ---
        let mut builder = Request::builder()
            .uri(uri)
            .header("host", "diag.local:8080")
            .header("user-agent", "curl/8.5.0");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}
