//! Environment configuration
//!
//! Every setting has a default except the ones the selected backend needs
//! (`IPXE_BACKEND_FILE` for `file`, `NETBOX_TOKEN` for `netbox`).

use crate::error::ConfigError;
use pxe_server::ServerConfig;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BINARY_DIR: &str = "/usr/share/ipxe";
pub const DEFAULT_NETBOX_URL: &str = "http://netbox.netbox:80";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Which admission backend to construct
#[derive(Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Static JSON hardware file
    File { path: PathBuf },
    /// NetBox inventory
    NetBox { url: String, token: String },
}

// Keeps the token out of the startup log
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendConfig::File { path } => f.debug_struct("File").field("path", path).finish(),
            BackendConfig::NetBox { url, .. } => f
                .debug_struct("NetBox")
                .field("url", url)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err("expected \"text\" or \"json\"".to_string()),
        }
    }
}

/// Everything the binary needs to start
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub binary_dir: PathBuf,
    pub backend: BackendConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`; unset and empty values use defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut server = ServerConfig::default();
        if let Some(addr) = parse::<SocketAddr>(&get, "IPXE_TFTP_ADDR")? {
            server.tftp.addr = addr;
        }
        if let Some(addr) = parse::<SocketAddr>(&get, "IPXE_HTTP_ADDR")? {
            server.http.addr = addr;
        }
        if let Some(timeout) = seconds(&get, "IPXE_TFTP_TIMEOUT_SECS")? {
            server.tftp.timeout = timeout;
        }
        if let Some(timeout) = seconds(&get, "IPXE_HTTP_TIMEOUT_SECS")? {
            server.http.timeout = timeout;
        }
        if let Some(timeout) = seconds(&get, "IPXE_SHUTDOWN_TIMEOUT_SECS")? {
            server.shutdown_timeout = timeout;
        }

        let backend = match get("IPXE_BACKEND").as_deref().map(str::to_ascii_lowercase) {
            None => backend_file(&get)?,
            Some(kind) if kind == "file" => backend_file(&get)?,
            Some(kind) if kind == "netbox" => BackendConfig::NetBox {
                url: get("NETBOX_URL").unwrap_or_else(|| DEFAULT_NETBOX_URL.to_string()),
                token: get("NETBOX_TOKEN").ok_or(ConfigError::Missing("NETBOX_TOKEN"))?,
            },
            Some(kind) => {
                return Err(ConfigError::InvalidValue {
                    name: "IPXE_BACKEND",
                    value: kind,
                    reason: "expected \"file\" or \"netbox\"".to_string(),
                });
            }
        };

        Ok(Self {
            server,
            binary_dir: get("IPXE_BINARY_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_BINARY_DIR), PathBuf::from),
            backend,
            log_level: get("IPXE_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: parse(&get, "IPXE_LOG_FORMAT")?.unwrap_or_default(),
        })
    }
}

fn backend_file(get: &impl Fn(&str) -> Option<String>) -> Result<BackendConfig, ConfigError> {
    let path = get("IPXE_BACKEND_FILE").ok_or(ConfigError::Missing("IPXE_BACKEND_FILE"))?;
    Ok(BackendConfig::File { path: path.into() })
}

fn parse<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    get(name)
        .map(|value| {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::InvalidValue {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn seconds(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match parse::<u64>(get, name)? {
        Some(0) => Err(ConfigError::InvalidValue {
            name,
            value: "0".to_string(),
            reason: "must be at least 1 second".to_string(),
        }),
        secs => Ok(secs.map(Duration::from_secs)),
    }
}
