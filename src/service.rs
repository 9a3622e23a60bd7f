//! The diagnostic service object.
//!
//! Holds every collaborator a handler may need, so tests can swap database
//! drivers and the environment for doubles. Nothing in here is mutated after
//! construction.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;

use crate::config::SettingsResolver;
use crate::db::{self, DbError, MySqlConnector, SqlServerDriver, SqlServerParams};
use crate::models::Resolution;
use crate::{netinfo, Config};

// ---

pub const SQL_SERVER_USERNAME: &str = "SQL_SERVER_USERNAME";
pub const SQL_SERVER_PASSWORD: &str = "SQL_SERVER_PASSWORD";
pub const SQL_SERVER_FQDN: &str = "SQL_SERVER_FQDN";
pub const SQL_SERVER_DB: &str = "SQL_SERVER_DB";

/// Query parameters that may override resolved database settings.
///
/// Which fields a route honours is decided by the route.
#[derive(Debug, Default, Deserialize)]
pub struct SqlOverrides {
    #[serde(rename = "SQL_SERVER_FQDN")]
    pub fqdn: Option<String>,
    #[serde(rename = "SQL_SERVER_DB")]
    pub database: Option<String>,
    #[serde(rename = "SQL_SERVER_USERNAME")]
    pub username: Option<String>,
    #[serde(rename = "SQL_SERVER_PASSWORD")]
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct DiagnosticService {
    pub config: Config,
    pub settings: SettingsResolver,
    pub sql_drivers: Arc<[Arc<dyn SqlServerDriver>]>,
    pub mysql: Arc<dyn MySqlConnector>,
    pub http: reqwest::Client,
}

impl DiagnosticService {
    pub fn new(
        config: Config,
        settings: SettingsResolver,
        sql_drivers: Vec<Arc<dyn SqlServerDriver>>,
        mysql: Arc<dyn MySqlConnector>,
        http: reqwest::Client,
    ) -> Self {
        DiagnosticService {
            config,
            settings,
            sql_drivers: sql_drivers.into(),
            mysql,
            http,
        }
    }

    /// Wire up the real drivers, the process environment and an HTTP client.
    pub fn from_config(config: Config) -> Result<Self> {
        // ---
        let settings = SettingsResolver::from_process_env(&config.secrets_dir);

        // One connection per outbound call, nothing kept between requests
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()?;

        // Ranked; the first available driver is used
        let sql_drivers: Vec<Arc<dyn SqlServerDriver>> = vec![Arc::new(db::TiberiusDriver)];

        Ok(Self::new(
            config,
            settings,
            sql_drivers,
            Arc::new(db::SqlxMySqlConnector),
            http,
        ))
    }

    /// Run `query` on the configured SQL Server.
    ///
    /// Server and database may be overridden per request; credentials come
    /// from the environment or the secrets directory only.
    pub async fn sql_server_query(
        &self,
        overrides: &SqlOverrides,
        query: &str,
    ) -> Result<Option<String>, DbError> {
        // ---
        let username = self.settings.resolve(SQL_SERVER_USERNAME);
        let password = self.settings.resolve(SQL_SERVER_PASSWORD);
        let fqdn = self
            .settings
            .resolve_with(SQL_SERVER_FQDN, overrides.fqdn.as_deref());
        let database = self
            .settings
            .resolve_with(SQL_SERVER_DB, overrides.database.as_deref());

        let (Some(username), Some(password), Some(fqdn)) = (username, password, fqdn) else {
            tracing::warn!(
                "Required environment variables not present (secrets dir: {})",
                self.settings.secrets_dir().display()
            );
            return Err(DbError::MissingSettings);
        };

        let params = SqlServerParams {
            fqdn,
            database,
            username,
            password,
        };
        db::sqlserver::execute_query(&self.sql_drivers, &params, query).await
    }

    /// Report the MySQL server version. Every setting may be overridden.
    pub async fn mysql_version(&self, overrides: &SqlOverrides) -> Result<Option<String>, DbError> {
        // ---
        let resolve = |name, value: &Option<String>| self.settings.resolve_with(name, value.as_deref());

        let username = resolve(SQL_SERVER_USERNAME, &overrides.username);
        let password = resolve(SQL_SERVER_PASSWORD, &overrides.password);
        let fqdn = resolve(SQL_SERVER_FQDN, &overrides.fqdn);
        let database = resolve(SQL_SERVER_DB, &overrides.database);

        let (Some(username), Some(password), Some(fqdn)) = (username, password, fqdn) else {
            tracing::warn!("Required environment variables not present for MySQL");
            return Err(DbError::MissingSettings);
        };

        db::mysql::execute_version_query(
            self.mysql.as_ref(),
            &fqdn,
            &username,
            &password,
            database.as_deref(),
        )
        .await
        .map(Some)
    }

    /// Configured SQL Server FQDN and what it resolves to, if one is set.
    pub async fn sql_server_target(&self) -> (Option<String>, Option<Resolution>) {
        // ---
        match self.settings.resolve(SQL_SERVER_FQDN) {
            Some(fqdn) => {
                let ip = Resolution(netinfo::resolve_ipv4(&fqdn).await);
                (Some(fqdn), Some(ip))
            }
            None => (None, None),
        }
    }
}
