//! Client identity extraction.
//!
//! Turns the raw pieces of an inbound request (remote address plus TFTP
//! filename or HTTP path) into a [`BootRequest`]: who is asking, for what,
//! and on behalf of which trace. Nothing here is fatal; malformed input
//! degrades to defaults and is recorded in [`BootRequest::parse_errors`].

use crate::error::ParseError;
use crate::mac::MacAddr;
use crate::traceparent::{TraceContext, split_traceparent};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{debug, warn};

/// Who is asking to boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Client IP; unspecified (`0.0.0.0`) when the remote address was malformed
    pub ip: IpAddr,
    /// Client MAC, when the request path carried a parseable one
    pub mac: Option<MacAddr>,
}

/// The boot artifact a client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedArtifact {
    /// Filename or path exactly as received
    pub raw_name: String,
    /// Basename after stripping the MAC directory and any traceparent suffix
    pub resolved_name: String,
}

/// Everything the admission pipeline needs to know about one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRequest {
    pub identity: ClientIdentity,
    pub artifact: RequestedArtifact,
    pub trace: Option<TraceContext>,
    /// Non-fatal problems found while extracting the fields above
    pub parse_errors: Vec<ParseError>,
}

impl BootRequest {
    /// Extracts a request from a TFTP read/write request.
    ///
    /// `filename` may be prefixed with a MAC directory
    /// (`0a:00:27:00:00:00/undionly.kpxe`) and suffixed with a traceparent.
    pub fn from_tftp(remote: &str, filename: &str) -> Self {
        let mut parse_errors = Vec::new();
        let ip = client_ip(remote, &mut parse_errors);
        let mac = client_mac(filename, &mut parse_errors);

        let requested = basename(filename);
        let (short, trace) = match split_traceparent(requested) {
            Ok(split) => split,
            Err(e) => {
                warn!(filename = %requested, error = %e, "ignoring malformed traceparent in filename");
                parse_errors.push(e);
                (requested, None)
            }
        };
        if short != requested {
            debug!(
                requested = %requested,
                filename = %short,
                "client requested filename with a traceparent attached, shortened"
            );
        }

        Self {
            identity: ClientIdentity { ip, mac },
            artifact: RequestedArtifact {
                raw_name: filename.to_string(),
                resolved_name: basename(short).to_string(),
            },
            trace,
            parse_errors,
        }
    }

    /// Extracts a request from an HTTP request path such as
    /// `/0a:00:27:00:00:00/undionly.kpxe`. The path is percent-decoded
    /// before the MAC and basename are taken from it. HTTP paths never carry
    /// a traceparent suffix.
    pub fn from_http(remote: &str, path: &str) -> Self {
        let mut parse_errors = Vec::new();
        let ip = client_ip(remote, &mut parse_errors);
        let decoded = urlencoding::decode_binary(path.as_bytes());
        let decoded = String::from_utf8_lossy(&decoded);
        let mac = client_mac(&decoded, &mut parse_errors);

        Self {
            identity: ClientIdentity { ip, mac },
            artifact: RequestedArtifact {
                raw_name: path.to_string(),
                resolved_name: basename(&decoded).to_string(),
            },
            trace: None,
            parse_errors,
        }
    }
}

/// Splits `host:port` (or `[v6]:port`) and returns the host IP. A bare IP
/// without a port is accepted as well.
pub fn parse_remote_ip(remote: &str) -> Result<IpAddr, ParseError> {
    remote
        .parse::<SocketAddr>()
        .map(|addr| addr.ip())
        .or_else(|_| remote.parse::<IpAddr>())
        .map_err(|_| ParseError::RemoteAddr(remote.to_string()))
}

/// Last component of a `/` (or `\`) separated path, ignoring trailing
/// separators. Never contains a separator; a path with no components
/// yields `"."`.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        return ".";
    }
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
}

/// Directory part of a path with leading separators removed; empty when the
/// path has no directory component.
fn parent_dir(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => trimmed[..idx].trim_start_matches(['/', '\\']),
        None => "",
    }
}

fn client_ip(remote: &str, parse_errors: &mut Vec<ParseError>) -> IpAddr {
    parse_remote_ip(remote).unwrap_or_else(|e| {
        warn!(remote = %remote, error = %e, "could not get client IP address");
        parse_errors.push(e);
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    })
}

fn client_mac(path: &str, parse_errors: &mut Vec<ParseError>) -> Option<MacAddr> {
    let dir = parent_dir(path);
    if dir.is_empty() {
        return None;
    }
    match dir.parse() {
        Ok(mac) => Some(mac),
        Err(e) => {
            debug!(path = %path, error = %e, "could not parse mac from request path");
            parse_errors.push(e);
            None
        }
    }
}
