//! Response bodies for the diagnostic endpoints.
//!
//! Every report is built fresh per request and serialized as-is.

use std::net::Ipv4Addr;

use serde::{Serialize, Serializer};

use crate::db::DbError;

// ---

/// Outcome of resolving a host name.
///
/// Serializes as the dotted-quad address, or as `false` when resolution
/// failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution(pub Option<Ipv4Addr>);

impl Serialize for Resolution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(ip) => serializer.collect_str(&ip),
            None => serializer.serialize_bool(false),
        }
    }
}

/// `GET /api/healthcheck`
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub health: &'static str,
}

/// `GET /api/sql*` and `GET /api/mysql`
#[derive(Debug, Serialize)]
pub struct SqlReport {
    pub sql_output: Option<String>,
}

impl SqlReport {
    /// Diagnostic failures are reported in place of the result.
    pub fn from_outcome(outcome: Result<Option<String>, DbError>) -> Self {
        // ---
        SqlReport {
            sql_output: match outcome {
                Ok(value) => value,
                Err(e) => Some(e.to_string()),
            },
        }
    }
}

/// `GET /api/dns`
#[derive(Debug, Serialize)]
pub struct DnsReport {
    pub fqdn: Option<String>,
    pub ip: Resolution,
}

/// `GET /api/ip`
#[derive(Debug, Serialize)]
pub struct IpReport {
    pub my_private_ip: Resolution,
    pub my_public_ip: String,
    pub my_dns_servers: Vec<String>,
    pub my_default_gateway: Option<Ipv4Addr>,
    pub your_address: String,
    #[serde(rename = "x-forwarded-for")]
    pub x_forwarded_for: Option<String>,
    pub path_accessed: String,
    pub your_platform: Option<&'static str>,
    pub your_browser: Option<&'static str>,
    pub sql_server_fqdn: Option<String>,
    pub sql_server_ip: Option<Resolution>,
}

/// `GET /api/curl`
#[derive(Debug, Serialize)]
pub struct CurlReport {
    pub url: String,
    pub method: &'static str,
    pub answer: String,
}
