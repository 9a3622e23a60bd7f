//! SQL Server query executor.
//!
//! Drivers are modelled as capabilities: the service holds a ranked list of
//! [`SqlServerDriver`]s and uses the first one that reports itself available.
//! The production driver speaks TDS through `tiberius`.

use std::{borrow::Cow, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use super::DbError;
use crate::netinfo::is_valid_ipv4;

// ---

pub const SQL_SERVER_PORT: u16 = 1433;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub const VERSION_QUERY: &str = "SELECT @@VERSION";
/// `CONNECTIONPROPERTY` returns `sql_variant`, which the TDS driver cannot
/// decode, so the server converts it to text first.
pub const CLIENT_ADDRESS_QUERY: &str =
    "SELECT CAST(CONNECTIONPROPERTY('client_net_address') AS NVARCHAR(48))";

/// Everything needed to open a SQL Server connection.
#[derive(Debug, Clone)]
pub struct SqlServerParams {
    pub fqdn: String,
    pub database: Option<String>,
    pub username: String,
    pub password: String,
}

impl SqlServerParams {
    /// ADO style connection string with the password masked, for logs.
    pub fn masked_connection_string(&self, driver: &str) -> String {
        // ---
        let mut cx = format!(
            "Driver={{{}}};Server=tcp:{},{};Uid={};Pwd=****;Encrypt=yes;TrustServerCertificate=yes;Connection Timeout={};",
            driver,
            self.fqdn,
            SQL_SERVER_PORT,
            self.username,
            CONNECT_TIMEOUT.as_secs()
        );
        if let Some(db) = &self.database {
            cx.push_str(&format!("Database={};", db));
        }
        cx
    }
}

/// A way of talking to SQL Server.
#[async_trait::async_trait]
pub trait SqlServerDriver: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    async fn connect(&self, params: &SqlServerParams) -> Result<Box<dyn SqlServerSession>>;
}

/// An open connection, used for a single query and then closed.
#[async_trait::async_trait]
pub trait SqlServerSession: Send {
    /// Run `query` and return the first column of the first row as text.
    async fn first_value(&mut self, query: &str) -> Result<Option<String>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// First driver in rank order that reports itself available.
pub fn select_driver(drivers: &[Arc<dyn SqlServerDriver>]) -> Option<&Arc<dyn SqlServerDriver>> {
    drivers.iter().find(|d| d.is_available())
}

/// Connect, run `query`, return its first value.
///
/// Connection failures are classified: a literal IP address target is
/// rejected with a hint to use the FQDN, anything else points at firewall
/// rules. Query failures after a successful connect yield `Ok(None)`.
pub async fn execute_query(
    drivers: &[Arc<dyn SqlServerDriver>],
    params: &SqlServerParams,
    query: &str,
) -> Result<Option<String>, DbError> {
    // ---
    let Some(driver) = select_driver(drivers) else {
        warn!("Oh oh, it looks like you have no SQL Server drivers installed");
        return Err(DbError::NoDriver);
    };

    info!(
        "Connecting to database server {} using {}...",
        params.fqdn,
        driver.name()
    );
    debug!("Connection string: {}", params.masked_connection_string(driver.name()));

    let mut session = match driver.connect(params).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Connection to {} failed: {}", params.fqdn, e);
            return Err(if is_valid_ipv4(&params.fqdn) {
                DbError::IpAddressNotAllowed(params.fqdn.clone())
            } else {
                DbError::ConnectionFailed
            });
        }
    };

    info!("Sending SQL query: {}", query);
    let output = match session.first_value(query).await {
        Ok(value) => value,
        Err(e) => {
            warn!("Error sending query to the database: {}", e);
            None
        }
    };

    if let Err(e) = session.close().await {
        debug!("Error closing connection to {}: {}", params.fqdn, e);
    }

    Ok(output)
}

// ---

type TdsClient = Client<Compat<TcpStream>>;

/// Native TDS driver backed by `tiberius`.
#[derive(Debug, Default, Clone)]
pub struct TiberiusDriver;

impl TiberiusDriver {
    fn config(params: &SqlServerParams) -> Config {
        // ---
        let mut config = Config::new();
        config.host(&params.fqdn);
        config.port(SQL_SERVER_PORT);
        config.authentication(AuthMethod::sql_server(&params.username, &params.password));
        config.encryption(EncryptionLevel::Required);
        config.trust_cert();
        if let Some(db) = &params.database {
            config.database(db);
        }
        config
    }
}

#[async_trait::async_trait]
impl SqlServerDriver for TiberiusDriver {
    fn name(&self) -> &str {
        "tiberius"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn connect(&self, params: &SqlServerParams) -> Result<Box<dyn SqlServerSession>> {
        // ---
        let client = tokio::time::timeout(CONNECT_TIMEOUT, connect_client(Self::config(params)))
            .await
            .map_err(|_| anyhow!("timed out after {}s", CONNECT_TIMEOUT.as_secs()))??;

        Ok(Box::new(TiberiusSession { client }))
    }
}

/// Open a TDS client, following one gateway redirect if the server sends it.
async fn connect_client(config: Config) -> Result<TdsClient> {
    // ---
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!("Redirected to {}:{}", host, port);
            let mut config = config;
            config.host(&host);
            config.port(port);

            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

struct TiberiusSession {
    client: TdsClient,
}

#[async_trait::async_trait]
impl SqlServerSession for TiberiusSession {
    async fn first_value(&mut self, query: &str) -> Result<Option<String>> {
        // ---
        let rows = self
            .client
            .simple_query(query)
            .await?
            .into_first_result()
            .await?;

        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .and_then(column_text))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

/// Render a column value as text.
///
/// Binary values (`VARBINARY`, or variant payloads a driver hands over as
/// bytes) are decoded as UTF-8. Bare `sql_variant` columns must be cast on
/// the server: tiberius does not decode that type.
fn column_text(data: ColumnData<'static>) -> Option<String> {
    // ---
    match data {
        ColumnData::String(v) => v.map(Cow::into_owned),
        ColumnData::Binary(v) => v.map(|b| String::from_utf8_lossy(&b).into_owned()),
        ColumnData::U8(v) => v.map(|n| n.to_string()),
        ColumnData::I16(v) => v.map(|n| n.to_string()),
        ColumnData::I32(v) => v.map(|n| n.to_string()),
        ColumnData::I64(v) => v.map(|n| n.to_string()),
        ColumnData::F32(v) => v.map(|n| n.to_string()),
        ColumnData::F64(v) => v.map(|n| n.to_string()),
        ColumnData::Bit(v) => v.map(|b| b.to_string()),
        ColumnData::Guid(v) => v.map(|g| g.to_string()),
        ColumnData::Numeric(v) => v.map(|n| n.to_string()),
        other => {
            debug!("No text rendering for column value {:?}", other);
            None
        }
    }
}
