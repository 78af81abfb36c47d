//! Admission gate.
//!
//! Runs the per-request pipeline shared by both protocols:
//!
//! 1. `resolve_identity`: best effort, only enriches logs.
//! 2. `is_allowed`: authoritative, fail-closed.
//! 3. Boot file lookup, only once the client is admitted.
//!
//! One backend call per phase, no retries, no caching.

use crate::backend::AdmissionBackend;
use crate::boot_files::BootFiles;
use crate::error::{BackendError, Rejection};
use crate::identity::{BootRequest, ClientIdentity};
use crate::mac::MacAddr;
use crate::shutdown::Cancellation;
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{Span, debug, error, field, info, warn};

/// Outcome of the two backend phases for one client.
///
/// `allowed` is never true while `error` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    allowed: bool,
    resolved_mac: Option<MacAddr>,
    error: Option<BackendError>,
}

impl AdmissionDecision {
    fn allow(resolved_mac: Option<MacAddr>) -> Self {
        Self {
            allowed: true,
            resolved_mac,
            error: None,
        }
    }

    fn deny(resolved_mac: Option<MacAddr>) -> Self {
        Self {
            allowed: false,
            resolved_mac,
            error: None,
        }
    }

    fn failed(resolved_mac: Option<MacAddr>, error: BackendError) -> Self {
        Self {
            allowed: false,
            resolved_mac,
            error: Some(error),
        }
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    /// Hardware address on record, for log correlation only.
    pub fn resolved_mac(&self) -> Option<MacAddr> {
        self.resolved_mac
    }

    pub fn error(&self) -> Option<&BackendError> {
        self.error.as_ref()
    }

    /// The decision as a serve/reject result, before any file lookup.
    pub fn into_result(self) -> Result<(), Rejection> {
        match (self.allowed, self.error) {
            (_, Some(e)) => Err(Rejection::Backend(e)),
            (false, None) => Err(Rejection::PolicyDenied),
            (true, None) => Ok(()),
        }
    }
}

/// Combines a backend and the boot file registry into serve/deny decisions.
#[derive(Clone)]
pub struct AdmissionGate {
    backend: Arc<dyn AdmissionBackend>,
    files: Arc<BootFiles>,
    /// Budget for both backend phases of one request
    deadline: Option<Duration>,
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("files", &self.files.names())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl AdmissionGate {
    pub fn new(backend: Arc<dyn AdmissionBackend>, files: Arc<BootFiles>) -> Self {
        Self {
            backend,
            files,
            deadline: None,
        }
    }

    /// Bounds the backend phases of every request; a backend that has not
    /// answered in time counts as unavailable.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn files(&self) -> &BootFiles {
        &self.files
    }

    /// Runs both backend phases for `identity`.
    ///
    /// Backend calls are abandoned as soon as `cancel` fires, which yields a
    /// [`BackendError::Cancelled`] decision, or once the gate's deadline
    /// passes, which yields [`BackendError::Unavailable`].
    ///
    /// The resolved MAC is recorded as `hw_mac` on the current span when the
    /// span declares that field.
    pub async fn decide(
        &self,
        identity: &ClientIdentity,
        cancel: &Cancellation,
    ) -> AdmissionDecision {
        let ClientIdentity { ip, mac } = *identity;
        let deadline = self.deadline.map(|budget| (Instant::now() + budget, budget));

        let resolved_mac =
            match until_cancelled(cancel, deadline, self.backend.resolve_identity(ip, mac)).await {
                Ok(hw) => {
                    debug!(hw_mac = %hw, "resolved hardware address");
                    Span::current().record("hw_mac", field::display(hw));
                    Some(hw)
                }
                Err(e) => {
                    warn!(error = %e, "could not resolve hardware address, continuing");
                    None
                }
            };

        match until_cancelled(cancel, deadline, self.backend.is_allowed(ip, mac)).await {
            Ok(true) => AdmissionDecision::allow(resolved_mac),
            Ok(false) => {
                info!("the hardware data for this machine, or lack thereof, does not allow it to pxe");
                AdmissionDecision::deny(resolved_mac)
            }
            Err(e) => {
                error!(error = %e, "failed to determine if client is allowed to boot");
                AdmissionDecision::failed(resolved_mac, e)
            }
        }
    }

    /// Full pipeline: decision, then file lookup. Content is only looked up
    /// (and returned) for admitted clients.
    pub async fn admit(
        &self,
        request: &BootRequest,
        cancel: &Cancellation,
    ) -> Result<Bytes, Rejection> {
        self.decide(&request.identity, cancel).await.into_result()?;

        let name = &request.artifact.resolved_name;
        match self.files.get(name) {
            Some(content) => {
                debug!(file = %name, size = content.len(), "client admitted");
                Ok(content)
            }
            None => {
                warn!(file = %name, "unknown file");
                Err(Rejection::NotFound(name.clone()))
            }
        }
    }
}

async fn until_cancelled<T, F>(
    cancel: &Cancellation,
    deadline: Option<(Instant, Duration)>,
    call: F,
) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }
    let mut cancel = cancel.clone();
    let bounded = async {
        match deadline {
            Some((at, budget)) => timeout_at(at, call).await.unwrap_or_else(|_| {
                Err(BackendError::Unavailable(format!(
                    "no answer within {budget:?}"
                )))
            }),
            None => call.await,
        }
    };
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(BackendError::Cancelled),
        result = bounded => result,
    }
}
