//! Database round-trip helpers.
//!
//! Each helper opens one connection, runs one query and closes the
//! connection again. Nothing is pooled across requests.
//!
//! Failures to *reach* a database are reported verbosely through [`DbError`],
//! whose text ends up in the `sql_output` field. Failures of the query itself
//! on an established SQL Server connection are swallowed and surface as an
//! absent result.

use thiserror::Error;

pub mod mysql;
pub mod sqlserver;

pub use mysql::{MySqlConnector, SqlxMySqlConnector};
pub use sqlserver::{SqlServerDriver, SqlServerParams, TiberiusDriver};

/// Diagnostic failures reported in place of a query result.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Required environment variables not present")]
    MissingSettings,

    #[error("No SQL Server drivers installed")]
    NoDriver,

    #[error(
        "Connection to the database failed, please use the server FQDN instead of the IP address {0}"
    )]
    IpAddressNotAllowed(String),

    #[error("Connection to the database failed, you might have to update the firewall rules?")]
    ConnectionFailed,

    #[error("Server name could not be retrieved out of FQDN {0}")]
    ServerNameNotInFqdn(String),

    #[error("{0}")]
    MySql(String),
}
