//! Configuration loader for the `sqlapi` diagnostic service.
//!
//! Two kinds of configuration live here:
//! - [`Config`]: process-level settings (listen port, file locations, the
//!   public IP lookup service) loaded once at startup.
//! - [`SettingsResolver`]: per-request lookup of database settings, which may
//!   come from a query parameter, the environment, or a file in the secrets
//!   directory.
use std::{
    collections::{BTreeMap, HashMap},
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Result;

/// Read an optional string environment variable, falling back to a default.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SECRETS_DIR: &str = "/secrets";
pub const DEFAULT_IP_LOOKUP_URL: &str = "http://jsonip.com";
pub const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";
pub const DEFAULT_ROUTE_TABLE: &str = "/proc/net/route";

/// Strongly typed application configuration.
///
/// All fields are immutable after loading.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// TCP port the HTTP server listens on.
    pub port: u16,

    /// Directory holding one file per secret setting.
    pub secrets_dir: PathBuf,

    /// External service answering with `{"ip": "<public address>"}`.
    pub ip_lookup_url: String,

    /// Resolver configuration consulted for DNS servers.
    pub resolv_conf: PathBuf,

    /// Kernel routing table consulted for the default gateway.
    pub route_table: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            secrets_dir: PathBuf::from(DEFAULT_SECRETS_DIR),
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            resolv_conf: PathBuf::from(DEFAULT_RESOLV_CONF),
            route_table: PathBuf::from(DEFAULT_ROUTE_TABLE),
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `PORT` – listen port (default: 8080, also used when not numeric)
/// - `SECRETS_DIR` – secrets root (default: `/secrets`)
/// - `IP_LOOKUP_URL` – public IP service (default: `http://jsonip.com`)
/// - `RESOLV_CONF_PATH` – resolver config (default: `/etc/resolv.conf`)
/// - `ROUTE_TABLE_PATH` – routing table (default: `/proc/net/route`)
pub fn load_from_env() -> Result<Config> {
    // ---
    let port = parse_port(env::var("PORT").ok());
    let secrets_dir = PathBuf::from(env_or!("SECRETS_DIR", DEFAULT_SECRETS_DIR));
    let ip_lookup_url = env_or!("IP_LOOKUP_URL", DEFAULT_IP_LOOKUP_URL);
    let resolv_conf = PathBuf::from(env_or!("RESOLV_CONF_PATH", DEFAULT_RESOLV_CONF));
    let route_table = PathBuf::from(env_or!("ROUTE_TABLE_PATH", DEFAULT_ROUTE_TABLE));

    Ok(Config {
        port,
        secrets_dir,
        ip_lookup_url,
        resolv_conf,
        route_table,
    })
}

/// Parse the listen port.
///
/// Unlike most settings, an unparsable value is not fatal: it is logged and
/// the default port is used instead.
fn parse_port(raw: Option<String>) -> u16 {
    // ---
    match raw {
        Some(v) => v.trim().parse::<u16>().unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid PORT '{}': {}, using {}", v, e, DEFAULT_PORT);
            DEFAULT_PORT
        }),
        None => DEFAULT_PORT,
    }
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  PORT             : {}", self.port);
        tracing::info!("  SECRETS_DIR      : {}", self.secrets_dir.display());
        tracing::info!("  IP_LOOKUP_URL    : {}", self.ip_lookup_url);
        tracing::info!("  RESOLV_CONF_PATH : {}", self.resolv_conf.display());
        tracing::info!("  ROUTE_TABLE_PATH : {}", self.route_table.display());
    }
}

// ---

/// Where environment lookups are answered from.
#[derive(Debug, Clone)]
pub enum EnvSource {
    /// The real process environment.
    Process,
    /// A fixed set of variables, used to isolate tests from the host.
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    fn get(&self, name: &str) -> Option<String> {
        match self {
            EnvSource::Process => env::var(name).ok(),
            EnvSource::Fixed(vars) => vars.get(name).cloned(),
        }
    }

    fn all(&self) -> BTreeMap<String, String> {
        match self {
            EnvSource::Process => env::vars_os()
                .map(|(k, v)| {
                    (
                        k.to_string_lossy().into_owned(),
                        v.to_string_lossy().into_owned(),
                    )
                })
                .collect(),
            EnvSource::Fixed(vars) => vars.clone().into_iter().collect(),
        }
    }
}

/// Resolves named settings such as `SQL_SERVER_FQDN`.
///
/// Lookup order is: caller supplied override (a query parameter), the
/// environment variable of the same name, then the file
/// `<secrets_dir>/<name>` with its trailing line ending removed. Nothing is cached, so
/// secrets rotated on disk are picked up by the next request.
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    secrets_dir: PathBuf,
    env: EnvSource,
}

impl SettingsResolver {
    pub fn new(secrets_dir: impl Into<PathBuf>, env: EnvSource) -> Self {
        SettingsResolver {
            secrets_dir: secrets_dir.into(),
            env,
        }
    }

    pub fn from_process_env(secrets_dir: impl Into<PathBuf>) -> Self {
        Self::new(secrets_dir, EnvSource::Process)
    }

    pub fn secrets_dir(&self) -> &Path {
        &self.secrets_dir
    }

    /// Resolve a setting from the environment or the secrets directory.
    pub fn resolve(&self, name: &str) -> Option<String> {
        // ---
        if let Some(value) = self.env.get(name) {
            return Some(value);
        }

        let path = self.secrets_dir.join(name);
        if !path.is_file() {
            return None;
        }

        match fs::read_to_string(&path) {
            Ok(contents) => Some(contents.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                tracing::warn!("Could not read secret file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Resolve a setting, preferring a non-empty override when one is given.
    pub fn resolve_with(&self, name: &str, overridden: Option<&str>) -> Option<String> {
        // ---
        match overridden {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => self.resolve(name),
        }
    }

    /// Full environment, sorted by variable name.
    pub fn environment(&self) -> BTreeMap<String, String> {
        self.env.all()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn fixed(vars: &[(&str, &str)]) -> EnvSource {
        EnvSource::Fixed(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_env_takes_precedence_over_secret_file() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SQL_SERVER_DB"), "inventory\n").unwrap();

        let resolver = SettingsResolver::new(dir.path(), fixed(&[("SQL_SERVER_DB", "orders")]));

        assert_eq!(resolver.resolve("SQL_SERVER_DB").as_deref(), Some("orders"));
    }

    #[test]
    fn test_secret_file_used_when_env_missing() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SQL_SERVER_PASSWORD"), "s3cr3t\n").unwrap();

        let resolver = SettingsResolver::new(dir.path(), fixed(&[]));

        // Trailing newline is stripped
        assert_eq!(
            resolver.resolve("SQL_SERVER_PASSWORD").as_deref(),
            Some("s3cr3t")
        );
    }

    #[test]
    fn test_secret_file_crlf_line_ending_stripped() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SQL_SERVER_USERNAME"), "sqladmin\r\n").unwrap();

        let resolver = SettingsResolver::new(dir.path(), fixed(&[]));

        assert_eq!(
            resolver.resolve("SQL_SERVER_USERNAME").as_deref(),
            Some("sqladmin")
        );
    }

    #[test]
    fn test_missing_everywhere_is_none() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let resolver = SettingsResolver::new(dir.path(), fixed(&[]));

        assert_eq!(resolver.resolve("SQL_SERVER_USERNAME"), None);
    }

    #[test]
    fn test_override_wins_unless_empty() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let resolver = SettingsResolver::new(
            dir.path(),
            fixed(&[("SQL_SERVER_FQDN", "env.database.windows.net")]),
        );

        assert_eq!(
            resolver
                .resolve_with("SQL_SERVER_FQDN", Some("query.database.windows.net"))
                .as_deref(),
            Some("query.database.windows.net")
        );
        assert_eq!(
            resolver.resolve_with("SQL_SERVER_FQDN", Some("")).as_deref(),
            Some("env.database.windows.net")
        );
        assert_eq!(
            resolver.resolve_with("SQL_SERVER_FQDN", None).as_deref(),
            Some("env.database.windows.net")
        );
    }

    #[test]
    fn test_environment_is_sorted() {
        // ---
        let resolver = SettingsResolver::new("/nonexistent", fixed(&[("B", "2"), ("A", "1")]));
        let keys: Vec<_> = resolver.environment().into_keys().collect();

        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_port_parsing() {
        // ---
        assert_eq!(parse_port(None), 8080);
        assert_eq!(parse_port(Some("9090".into())), 9090);
        assert_eq!(parse_port(Some(" 3000\n".into())), 3000);

        // Non-numeric or out of range falls back to the default
        assert_eq!(parse_port(Some("http".into())), 8080);
        assert_eq!(parse_port(Some("70000".into())), 8080);
    }

    #[test]
    fn test_default_config() {
        // ---
        let cfg = Config::default();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.secrets_dir, PathBuf::from("/secrets"));
        assert_eq!(cfg.ip_lookup_url, "http://jsonip.com");
    }
}
