//! Listener configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default TFTP listen address.
pub const DEFAULT_TFTP_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 69);
/// Default HTTP listen address.
pub const DEFAULT_HTTP_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TftpConfig {
    pub addr: SocketAddr,
    /// How long to wait for an acknowledgement before retransmitting
    pub timeout: Duration,
}

impl Default for TftpConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_TFTP_ADDR,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub addr: SocketAddr,
    /// Upper bound for handling one request
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_HTTP_ADDR,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub tftp: TftpConfig,
    pub http: HttpConfig,
    /// How long listeners get to drain in-flight work once asked to stop
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tftp: TftpConfig::default(),
            http: HttpConfig::default(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}
