//! PXE Boot Server
//!
//! Admission-gated iPXE boot artifact server built on `tokio` and `axum`.
//!
//! Every request is answered the same way on both protocols:
//! - the client identity (IP, MAC from the request path, trace context
//!   smuggled in a TFTP filename) is extracted from the raw request
//! - an [`AdmissionBackend`] decides whether that machine may PXE boot
//! - admitted clients get the requested iPXE binary from [`BootFiles`]
//!
//! # Protocols
//!
//! - **TFTP**: read requests only, lock-step transfers with `tsize` support
//! - **HTTP**: `GET /<mac>/<artifact>` or `GET /<artifact>`
//!
//! [`PxeServer`] runs both listeners and coordinates their shutdown.

pub mod backend;
pub mod boot_files;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod identity;
pub mod mac;
pub mod server;
pub mod shutdown;
pub mod tftp;
pub mod traceparent;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod gate_test;
#[cfg(test)]
mod tftp_test;

pub use backend::AdmissionBackend;
pub use boot_files::BootFiles;
pub use config::{HttpConfig, ServerConfig, TftpConfig};
pub use error::*;
pub use gate::{AdmissionDecision, AdmissionGate};
pub use identity::{BootRequest, ClientIdentity, RequestedArtifact};
pub use mac::MacAddr;
pub use server::PxeServer;
pub use shutdown::{CancelHandle, Cancellation, ShutdownCause};
pub use traceparent::TraceContext;

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockBackend;
