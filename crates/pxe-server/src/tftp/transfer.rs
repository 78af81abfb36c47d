//! One outbound TFTP transfer.
//!
//! Each transfer gets its own ephemeral socket, which is its transfer ID.
//! Blocks are sent in lock-step: one DATA in flight, retransmitted on timeout,
//! never on a duplicate ACK.

use super::packet::{BLOCK_SIZE, ErrorCode, Packet, RECV_BUFFER_SIZE};
use crate::error::TftpError;
use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

/// Retransmissions of a single packet before the transfer is given up.
pub const MAX_RETRIES: u32 = 5;

pub(crate) struct Transfer {
    socket: UdpSocket,
    peer: SocketAddr,
    timeout: Duration,
    filename: String,
    bytes_sent: u64,
}

impl Transfer {
    /// Binds a fresh socket on `local_ip` for a transfer with `peer`.
    pub(crate) async fn open(
        local_ip: IpAddr,
        peer: SocketAddr,
        timeout: Duration,
        filename: impl Into<String>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(local_ip, 0)).await?;
        Ok(Self {
            socket,
            peer,
            timeout,
            filename: filename.into(),
            bytes_sent: 0,
        })
    }

    /// Payload bytes the client has acknowledged so far.
    pub(crate) fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Sends a terminal ERROR packet. Not acknowledged, so not retransmitted.
    pub(crate) async fn send_error(
        &self,
        code: ErrorCode,
        message: &str,
    ) -> Result<(), TftpError> {
        self.socket
            .send_to(&Packet::error(code, message).encode(), self.peer)
            .await?;
        Ok(())
    }

    /// Streams `content` to the peer.
    ///
    /// With `declare_size` the exact length is announced in an OACK first and
    /// the transfer only starts once the client acknowledged it (ACK 0).
    pub(crate) async fn send(
        &mut self,
        content: &Bytes,
        declare_size: bool,
    ) -> Result<(), TftpError> {
        if declare_size {
            let oack = Packet::Oack {
                options: vec![("tsize".to_string(), content.len().to_string())],
            };
            self.exchange(&oack.encode(), 0).await?;
        }

        let mut block: u16 = 1;
        let mut offset = 0;
        loop {
            let end = (offset + BLOCK_SIZE).min(content.len());
            let payload = content.slice(offset..end);
            let last = payload.len() < BLOCK_SIZE;

            let data = Packet::Data { block, payload };
            self.exchange(&data.encode(), block).await?;
            self.bytes_sent += (end - offset) as u64;

            if last {
                return Ok(());
            }
            offset = end;
            block = block.wrapping_add(1);
        }
    }

    /// Sends `packet` and waits for the ACK of `expected`, retransmitting on
    /// timeout.
    async fn exchange(&self, packet: &Bytes, expected: u16) -> Result<(), TftpError> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                debug!(block = expected, attempt, "no acknowledgement, retransmitting");
            }
            self.socket.send_to(packet, self.peer).await?;

            let deadline = Instant::now() + self.timeout;
            while let Ok(received) = timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                let (len, from) = received?;
                if from != self.peer {
                    warn!(from = %from, "packet from unknown transfer id");
                    let reply = Packet::error(ErrorCode::UnknownTransferId, "unknown transfer id");
                    let _ = self.socket.send_to(&reply.encode(), from).await;
                    continue;
                }

                match Packet::parse(&buf[..len]) {
                    Ok(Packet::Ack { block }) if block == expected => return Ok(()),
                    // duplicate or stale
                    Ok(Packet::Ack { .. }) => continue,
                    Ok(Packet::Error { code, message }) => {
                        return Err(TftpError::Aborted {
                            reason: format!("{code:?}: {message}"),
                        });
                    }
                    Ok(other) => {
                        self.send_error(ErrorCode::IllegalOperation, "expected ACK")
                            .await?;
                        return Err(TftpError::InvalidPacket(format!(
                            "expected ACK {expected}, got {other:?}"
                        )));
                    }
                    Err(e) => {
                        self.send_error(ErrorCode::IllegalOperation, "malformed packet")
                            .await?;
                        return Err(e);
                    }
                }
            }
        }

        Err(TftpError::Timeout {
            filename: self.filename.clone(),
            retries: MAX_RETRIES,
        })
    }
}
