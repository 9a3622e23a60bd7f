//! MySQL version probe.
//!
//! Azure Database for MySQL (single server) expects logins of the form
//! `<user>@<server-short-name>`, so the login identifier is derived from the
//! FQDN before connecting.

use anyhow::Result;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tracing::{info, warn};

use super::DbError;

// ---

pub const MYSQL_PORT: u16 = 3306;
pub const MYSQL_VERSION_QUERY: &str = "SELECT VERSION()";

/// Connection parameters, with the login already in `<user>@<server>` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlParams {
    pub fqdn: String,
    pub login: String,
    pub password: String,
    pub database: Option<String>,
}

/// Opens a connection and reports the server version.
#[async_trait::async_trait]
pub trait MySqlConnector: Send + Sync {
    async fn server_version(&self, params: &MySqlParams) -> Result<String>;
}

/// `<user>@<first label of fqdn>`, or `None` when the FQDN has no first label.
pub fn login_for(fqdn: &str, username: &str) -> Option<String> {
    // ---
    let server = fqdn.split('.').next().filter(|s| !s.is_empty())?;
    Some(format!("{}@{}", username, server))
}

/// Run `SELECT VERSION()` against the server at `fqdn`.
///
/// Any driver failure is reported as its message.
pub async fn execute_version_query(
    connector: &dyn MySqlConnector,
    fqdn: &str,
    username: &str,
    password: &str,
    database: Option<&str>,
) -> Result<String, DbError> {
    // ---
    let login = login_for(fqdn, username)
        .ok_or_else(|| DbError::ServerNameNotInFqdn(fqdn.to_string()))?;

    let params = MySqlParams {
        fqdn: fqdn.to_string(),
        login,
        password: password.to_string(),
        database: database.map(String::from),
    };

    info!(
        "Connecting to MySQL server {} as {} (database: {:?})...",
        params.fqdn, params.login, params.database
    );

    connector.server_version(&params).await.map_err(|e| {
        warn!("MySQL query against {} failed: {}", params.fqdn, e);
        DbError::MySql(e.to_string())
    })
}

// ---

/// Production connector using a single, unpooled `sqlx` connection.
#[derive(Debug, Default, Clone)]
pub struct SqlxMySqlConnector;

#[async_trait::async_trait]
impl MySqlConnector for SqlxMySqlConnector {
    async fn server_version(&self, params: &MySqlParams) -> Result<String> {
        // ---
        let mut options = MySqlConnectOptions::new()
            .host(&params.fqdn)
            .port(MYSQL_PORT)
            .username(&params.login)
            .password(&params.password);
        if let Some(db) = &params.database {
            options = options.database(db);
        }

        let mut conn = options.connect().await?;
        let version: String = sqlx::query_scalar(MYSQL_VERSION_QUERY)
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;

        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingConnector {
        seen: Mutex<Vec<MySqlParams>>,
        fail_with: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl MySqlConnector for RecordingConnector {
        async fn server_version(&self, params: &MySqlParams) -> Result<String> {
            self.seen.lock().unwrap().push(params.clone());
            match self.fail_with {
                Some(msg) => Err(anyhow::anyhow!(msg)),
                None => Ok("5.7.32-log".to_string()),
            }
        }
    }

    #[test]
    fn test_login_uses_server_short_name() {
        // ---
        assert_eq!(
            login_for("myserver.database.windows.net", "admin").as_deref(),
            Some("admin@myserver")
        );
        assert_eq!(login_for("standalone", "admin").as_deref(), Some("admin@standalone"));
        assert_eq!(login_for("", "admin"), None);
        assert_eq!(login_for(".database.windows.net", "admin"), None);
    }

    #[tokio::test]
    async fn test_connector_receives_transformed_login() {
        // ---
        let connector = RecordingConnector::default();

        let version = execute_version_query(
            &connector,
            "myserver.database.windows.net",
            "admin",
            "pw",
            Some("orders"),
        )
        .await
        .unwrap();

        assert_eq!(version, "5.7.32-log");
        let seen = connector.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].login, "admin@myserver");
        assert_eq!(seen[0].database.as_deref(), Some("orders"));
    }

    #[tokio::test]
    async fn test_unusable_fqdn_never_connects() {
        // ---
        let connector = RecordingConnector::default();

        let err = execute_version_query(&connector, "", "admin", "pw", None)
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::ServerNameNotInFqdn(_)));
        assert!(err.to_string().starts_with("Server name could not be retrieved out of FQDN"));
        assert!(connector.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_driver_error_is_reported_as_text() {
        // ---
        let connector = RecordingConnector {
            fail_with: Some("Access denied for user 'admin@myserver'"),
            ..Default::default()
        };

        let err = execute_version_query(&connector, "myserver.mysql.database.azure.com", "admin", "pw", None)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Access denied for user 'admin@myserver'");
    }
}
