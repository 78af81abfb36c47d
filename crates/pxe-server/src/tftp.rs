//! TFTP protocol adapter.
//!
//! Serves read requests through the [`AdmissionGate`]; write requests are
//! always refused without consulting the backend. Every request is handled on
//! its own task with its own ephemeral socket.

pub mod packet;
mod transfer;

use crate::config::TftpConfig;
use crate::error::{ListenerError, Rejection};
use crate::gate::AdmissionGate;
use crate::identity::BootRequest;
use crate::shutdown::Cancellation;
use packet::{ErrorCode, Packet, RECV_BUFFER_SIZE, Request};
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, field, info, info_span, warn};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use transfer::Transfer;

pub use transfer::MAX_RETRIES;

/// Error code and message sent to a client whose read request was rejected.
pub fn rejection_error(rejection: &Rejection) -> (ErrorCode, &'static str) {
    match rejection {
        Rejection::Backend(_) => (ErrorCode::AccessViolation, "error talking with backend"),
        Rejection::PolicyDenied => (ErrorCode::AccessViolation, "not allowed"),
        Rejection::NotFound(_) => (ErrorCode::FileNotFound, "unknown file"),
    }
}

/// TFTP listener.
#[derive(Debug)]
pub struct TftpServer {
    gate: AdmissionGate,
    config: TftpConfig,
    socket: Option<UdpSocket>,
}

impl TftpServer {
    /// Creates a server that binds `config.addr` when run.
    pub fn new(gate: AdmissionGate, config: TftpConfig) -> Self {
        Self {
            gate,
            config,
            socket: None,
        }
    }

    /// Creates a server on an already bound socket; `config.addr` is ignored.
    pub fn with_socket(gate: AdmissionGate, config: TftpConfig, socket: UdpSocket) -> Self {
        Self {
            gate,
            config,
            socket: Some(socket),
        }
    }

    /// Serves requests until `shutdown` fires, then stops accepting requests
    /// and waits for in-flight transfers to finish.
    pub async fn run(self, mut shutdown: Cancellation) -> Result<(), ListenerError> {
        let socket = match self.socket {
            Some(socket) => socket,
            None => UdpSocket::bind(self.config.addr)
                .await
                .map_err(|source| ListenerError::Bind {
                    addr: self.config.addr,
                    source,
                })?,
        };
        let local_addr = socket.local_addr()?;
        info!(addr = %local_addr, "TFTP server listening");

        let mut transfers = JoinSet::new();
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                Some(joined) = transfers.join_next(), if !transfers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "TFTP transfer task failed");
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            // ICMP errors from earlier sends surface here
                            warn!(error = %e, "failed to receive TFTP packet");
                            continue;
                        }
                    };
                    transfers.spawn(handle_packet(
                        self.gate.clone(),
                        self.config.clone(),
                        local_addr.ip(),
                        buf[..len].to_vec(),
                        peer,
                        shutdown.clone(),
                    ));
                }
            }
        }

        drop(socket);
        info!(in_flight = transfers.len(), "TFTP server stopping");
        while let Some(joined) = transfers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "TFTP transfer task failed");
            }
        }
        info!("TFTP server stopped");
        Ok(())
    }
}

async fn handle_packet(
    gate: AdmissionGate,
    config: TftpConfig,
    local_ip: IpAddr,
    data: Vec<u8>,
    peer: SocketAddr,
    cancel: Cancellation,
) {
    let (code, message, filename) = match Packet::parse(&data) {
        Ok(Packet::Read(request)) => {
            return read_request(gate, config, local_ip, request, peer, cancel).await;
        }
        Ok(Packet::Write(request)) => {
            info!(client = %peer, filename = %request.filename, "refusing write request");
            (ErrorCode::AccessViolation, "access_violation", request.filename)
        }
        Ok(other) => {
            debug!(client = %peer, packet = ?other, "unexpected packet on listen port");
            (ErrorCode::IllegalOperation, "illegal operation", String::new())
        }
        Err(e) => {
            debug!(client = %peer, error = %e, "malformed packet on listen port");
            (ErrorCode::IllegalOperation, "illegal operation", String::new())
        }
    };

    match Transfer::open(local_ip, peer, config.timeout, filename).await {
        Ok(transfer) => {
            if let Err(e) = transfer.send_error(code, message).await {
                debug!(client = %peer, error = %e, "failed to send TFTP error");
            }
        }
        Err(e) => error!(client = %peer, error = %e, "failed to open TFTP transfer socket"),
    }
}

async fn read_request(
    gate: AdmissionGate,
    config: TftpConfig,
    local_ip: IpAddr,
    request: Request,
    peer: SocketAddr,
    cancel: Cancellation,
) {
    let boot = BootRequest::from_tftp(&peer.to_string(), &request.filename);

    let span = info_span!(
        "tftp_transfer",
        client = %boot.identity.ip,
        mac = field::Empty,
        hw_mac = field::Empty,
        filename = %boot.artifact.resolved_name,
        requested = %request.filename,
        trace_id = field::Empty,
        span_id = field::Empty,
    );
    if let Some(mac) = boot.identity.mac {
        span.record("mac", field::display(mac));
    }
    if let Some(trace) = &boot.trace {
        span.record("trace_id", field::display(trace.trace_id_hex()));
        span.record("span_id", field::display(trace.span_id_hex()));
        // no-op unless an OpenTelemetry layer is installed
        let _ = span.set_parent(trace.remote_context());
    }

    async move {
        let mut transfer = match Transfer::open(
            local_ip,
            peer,
            config.timeout,
            boot.artifact.resolved_name.clone(),
        )
        .await
        {
            Ok(transfer) => transfer,
            Err(e) => {
                error!(error = %e, "failed to open TFTP transfer socket");
                return;
            }
        };

        let content = match gate.admit(&boot, &cancel).await {
            Ok(content) => content,
            Err(rejection) => {
                info!(reason = %rejection, "read request rejected");
                let (code, message) = rejection_error(&rejection);
                if let Err(e) = transfer.send_error(code, message).await {
                    debug!(error = %e, "failed to send TFTP error");
                }
                return;
            }
        };

        match transfer.send(&content, request.wants_tsize()).await {
            Ok(()) => info!(
                bytes_sent = transfer.bytes_sent(),
                content_size = content.len(),
                "served"
            ),
            Err(e) => warn!(
                error = %e,
                bytes_sent = transfer.bytes_sent(),
                content_size = content.len(),
                "transfer failed"
            ),
        }
    }
    .instrument(span)
    .await;
}
