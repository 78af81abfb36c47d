//! HTTP protocol adapter.
//!
//! Every path is handled by one catch-all handler: the path's last segment is
//! the artifact name and its parent directory, if any, the client's MAC.

use crate::config::HttpConfig;
use crate::error::{ListenerError, Rejection};
use crate::gate::AdmissionGate;
use crate::identity::BootRequest;
use crate::shutdown::Cancellation;
use axum::Router;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Instrument, Level, field, info, info_span};

#[derive(Debug, Clone)]
struct HttpState {
    gate: AdmissionGate,
    cancel: Cancellation,
}

/// Status code and body sent to a client whose request was rejected.
pub fn rejection_status(rejection: &Rejection) -> (StatusCode, &'static str) {
    match rejection {
        Rejection::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "error talking with backend"),
        Rejection::PolicyDenied => (StatusCode::FORBIDDEN, "not allowed"),
        Rejection::NotFound(_) => (StatusCode::NOT_FOUND, "file not found"),
    }
}

/// Builds the boot file router.
///
/// Backend calls of in-flight requests are abandoned once `cancel` fires or
/// after `timeout`; both end in a 500.
pub fn router(gate: AdmissionGate, cancel: Cancellation, timeout: Duration) -> Router {
    let gate = gate.with_deadline(timeout);
    Router::new()
        .fallback(serve_boot_file)
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(HttpState { gate, cancel })
}

async fn serve_boot_file(
    State(state): State<HttpState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET")],
            "method not allowed",
        )
            .into_response();
    }

    let request = BootRequest::from_http(&remote.to_string(), uri.path());
    let span = info_span!(
        "http_request",
        client = %request.identity.ip,
        mac = field::Empty,
        hw_mac = field::Empty,
        filename = %request.artifact.resolved_name,
    );
    if let Some(mac) = request.identity.mac {
        span.record("mac", field::display(mac));
    }

    async move {
        match state.gate.admit(&request, &state.cancel).await {
            Ok(content) => {
                info!(content_size = content.len(), "served");
                (
                    [(header::CONTENT_TYPE, "application/octet-stream")],
                    content,
                )
                    .into_response()
            }
            Err(rejection) => {
                info!(reason = %rejection, "request rejected");
                rejection_status(&rejection).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

/// HTTP listener.
#[derive(Debug)]
pub struct HttpServer {
    gate: AdmissionGate,
    config: HttpConfig,
    listener: Option<TcpListener>,
}

impl HttpServer {
    /// Creates a server that binds `config.addr` when run.
    pub fn new(gate: AdmissionGate, config: HttpConfig) -> Self {
        Self {
            gate,
            config,
            listener: None,
        }
    }

    /// Creates a server on an already bound listener; `config.addr` is ignored.
    pub fn with_listener(gate: AdmissionGate, config: HttpConfig, listener: TcpListener) -> Self {
        Self {
            gate,
            config,
            listener: Some(listener),
        }
    }

    /// Serves requests until `shutdown` fires. New connections are refused
    /// from then on; requests already in progress run to completion.
    pub async fn run(self, shutdown: Cancellation) -> Result<(), ListenerError> {
        let listener = match self.listener {
            Some(listener) => listener,
            None => TcpListener::bind(self.config.addr)
                .await
                .map_err(|source| ListenerError::Bind {
                    addr: self.config.addr,
                    source,
                })?,
        };
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        let app = router(self.gate, shutdown.clone(), self.config.timeout);
        let mut signal = shutdown;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}
