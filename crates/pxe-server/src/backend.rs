//! Admission backend contract.
//!
//! The server never decides on its own whether a machine may boot; it asks a
//! backend. Concrete backends (a static hardware file, a remote inventory)
//! live outside this crate and are injected as `Arc<dyn AdmissionBackend>`.

use crate::error::BackendError;
use crate::mac::MacAddr;
use async_trait::async_trait;
use std::net::IpAddr;

/// Resolves and authorizes hardware identities.
///
/// Both calls are cancelled by dropping the returned future; implementations
/// must not rely on running to completion. All async methods must be `Send`
/// to work with Tokio's work-stealing runtime, and one handle is shared by
/// every in-flight request.
#[async_trait]
pub trait AdmissionBackend: Send + Sync {
    /// Looks up the hardware address on record for this client.
    ///
    /// Used only to enrich logs; a failure here never denies a request.
    async fn resolve_identity(
        &self,
        ip: IpAddr,
        mac: Option<MacAddr>,
    ) -> Result<MacAddr, BackendError>;

    /// Decides whether this client may PXE boot.
    ///
    /// Authoritative: any error is treated as a denial by the caller.
    async fn is_allowed(&self, ip: IpAddr, mac: Option<MacAddr>) -> Result<bool, BackendError>;
}
