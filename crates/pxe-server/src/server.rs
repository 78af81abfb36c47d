//! Main PXE server implementation.
//!
//! Runs the TFTP and HTTP listeners side by side and coordinates their
//! shutdown. Each listener has its own stop signal and its own completion
//! handle, so the supervisor always knows which one has already terminated
//! and never asks a finished listener to stop.

use crate::backend::AdmissionBackend;
use crate::boot_files::BootFiles;
use crate::config::ServerConfig;
use crate::error::{ListenerError, Protocol, PxeError};
use crate::gate::AdmissionGate;
use crate::http::HttpServer;
use crate::shutdown::{CancelHandle, Cancellation, ShutdownCause};
use crate::tftp::TftpServer;
use std::future::Future;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

type ListenerResult = Result<(), ListenerError>;

/// What ended the serve loop.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    Shutdown(ShutdownCause),
    Failed(Protocol),
}

/// One running listener and what the supervisor knows about it.
#[derive(Debug)]
struct Listener {
    protocol: Protocol,
    stop: CancelHandle,
    task: JoinHandle<ListenerResult>,
    /// Set once the task has been joined
    outcome: Option<ListenerResult>,
    stop_requested: bool,
    timed_out: bool,
}

impl Listener {
    fn spawn<F, Fut>(protocol: Protocol, run: F) -> Self
    where
        F: FnOnce(Cancellation) -> Fut,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        let (stop, cancel) = CancelHandle::channel();
        Self {
            protocol,
            stop,
            task: tokio::spawn(run(cancel)),
            outcome: None,
            stop_requested: false,
            timed_out: false,
        }
    }

    fn is_done(&self) -> bool {
        self.outcome.is_some() || self.timed_out
    }

    /// Asks the listener to stop, unless it already terminated or was asked.
    fn stop(&mut self) {
        if self.is_done() || self.stop_requested {
            return;
        }
        info!(protocol = %self.protocol, "stopping listener");
        self.stop_requested = true;
        self.stop.cancel();
    }

    /// Records the terminal state of a joined task.
    fn finish(&mut self, joined: Result<ListenerResult, JoinError>) {
        let outcome = match joined {
            Ok(Ok(())) if self.stop_requested => Ok(()),
            Ok(Ok(())) => Err(ListenerError::Stopped),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(ListenerError::Panicked(e.to_string())),
        };
        match &outcome {
            Ok(()) => info!(protocol = %self.protocol, "listener finished"),
            Err(e) => error!(protocol = %self.protocol, error = %e, "listener failed"),
        }
        self.outcome = Some(outcome);
    }

    /// Waits for the listener to finish, aborting it at `deadline`.
    async fn wait(&mut self, deadline: Instant) {
        if self.is_done() {
            return;
        }
        match timeout_at(deadline, &mut self.task).await {
            Ok(joined) => self.finish(joined),
            Err(_) => {
                warn!(protocol = %self.protocol, "listener did not stop in time, aborting");
                self.task.abort();
                self.timed_out = true;
            }
        }
    }

    fn take_error(&mut self) -> Option<PxeError> {
        match self.outcome.take() {
            Some(Err(source)) => Some(PxeError::Listener {
                protocol: self.protocol,
                source,
            }),
            other => {
                self.outcome = other;
                None
            }
        }
    }
}

/// Main PXE boot server.
///
/// Serves boot files over TFTP and HTTP to clients admitted by the backend.
pub struct PxeServer {
    gate: AdmissionGate,
    config: ServerConfig,
    tftp_socket: Option<UdpSocket>,
    http_listener: Option<TcpListener>,
}

impl std::fmt::Debug for PxeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PxeServer")
            .field("gate", &self.gate)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PxeServer {
    /// Creates a server; nothing is bound until [`PxeServer::serve`].
    pub fn new(
        backend: Arc<dyn AdmissionBackend>,
        files: Arc<BootFiles>,
        config: ServerConfig,
    ) -> Self {
        Self {
            gate: AdmissionGate::new(backend, files),
            config,
            tftp_socket: None,
            http_listener: None,
        }
    }

    /// Serves TFTP on an already bound socket instead of `config.tftp.addr`.
    pub fn with_tftp_socket(mut self, socket: UdpSocket) -> Self {
        self.tftp_socket = Some(socket);
        self
    }

    /// Serves HTTP on an already bound listener instead of `config.http.addr`.
    pub fn with_http_listener(mut self, listener: TcpListener) -> Self {
        self.http_listener = Some(listener);
        self
    }

    /// Runs both listeners until `shutdown` resolves or one of them fails.
    ///
    /// On shutdown both listeners stop accepting work and get
    /// `shutdown_timeout` to drain; the cause is returned once both have
    /// finished. If a listener fails, the other one is stopped and the
    /// failure is returned, annotated with its protocol.
    ///
    /// # Errors
    ///
    /// [`PxeError::Listener`] for the first listener failure,
    /// [`PxeError::ShutdownTimeout`] if a listener had to be aborted.
    pub async fn serve<S>(self, shutdown: S) -> Result<ShutdownCause, PxeError>
    where
        S: Future<Output = ShutdownCause>,
    {
        let Self {
            gate,
            config,
            tftp_socket,
            http_listener,
        } = self;

        let tftp = match tftp_socket {
            Some(socket) => TftpServer::with_socket(gate.clone(), config.tftp.clone(), socket),
            None => TftpServer::new(gate.clone(), config.tftp.clone()),
        };
        let http = match http_listener {
            Some(listener) => HttpServer::with_listener(gate, config.http.clone(), listener),
            None => HttpServer::new(gate, config.http.clone()),
        };

        info!(
            tftp = %config.tftp.addr,
            http = %config.http.addr,
            "Starting PXE boot server"
        );
        let mut tftp = Listener::spawn(Protocol::Tftp, move |cancel| tftp.run(cancel));
        let mut http = Listener::spawn(Protocol::Http, move |cancel| http.run(cancel));

        tokio::pin!(shutdown);
        let trigger = tokio::select! {
            cause = &mut shutdown => {
                info!(cause = %cause, "Shutting down PXE boot server");
                Trigger::Shutdown(cause)
            }
            joined = &mut tftp.task, if !tftp.is_done() => {
                tftp.finish(joined);
                Trigger::Failed(Protocol::Tftp)
            }
            joined = &mut http.task, if !http.is_done() => {
                http.finish(joined);
                Trigger::Failed(Protocol::Http)
            }
        };

        tftp.stop();
        http.stop();
        let deadline = Instant::now() + config.shutdown_timeout;
        tftp.wait(deadline).await;
        http.wait(deadline).await;

        let (first, second) = match trigger {
            Trigger::Failed(Protocol::Http) => (&mut http, &mut tftp),
            _ => (&mut tftp, &mut http),
        };
        if let Some(err) = first.take_error().or_else(|| second.take_error()) {
            return Err(err);
        }
        for listener in [&tftp, &http] {
            if listener.timed_out {
                return Err(PxeError::ShutdownTimeout {
                    protocol: listener.protocol,
                    timeout: config.shutdown_timeout,
                });
            }
        }

        match trigger {
            Trigger::Shutdown(cause) => {
                info!("PXE boot server stopped");
                Ok(cause)
            }
            // a listener that ends on its own is always recorded as failed
            Trigger::Failed(protocol) => Err(PxeError::Listener {
                protocol,
                source: ListenerError::Stopped,
            }),
        }
    }
}
