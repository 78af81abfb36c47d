//! Test utilities shared by the adapter and supervisor tests
//!
//! Provides a fixed machine, boot files of awkward sizes, pre-loaded
//! backends and a minimal TFTP client.

#[cfg(test)]
use crate::boot_files::{BootFiles, IPXE_EFI, SNP_EFI, UNDIONLY_KPXE};
#[cfg(test)]
use crate::error::BackendError;
#[cfg(test)]
use crate::gate::AdmissionGate;
#[cfg(test)]
use crate::mac::MacAddr;
#[cfg(test)]
use crate::mock::MockBackend;
#[cfg(test)]
use crate::tftp::packet::{BLOCK_SIZE, ErrorCode, Packet, Request, TransferMode};
#[cfg(test)]
use bytes::Bytes;
#[cfg(test)]
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;
#[cfg(test)]
use tokio::net::UdpSocket;

/// Hardware address of the test machine
#[cfg(test)]
pub const TEST_MAC: MacAddr = MacAddr::new([0x0a, 0x00, 0x27, 0x00, 0x00, 0x00]);

/// Loopback address the test machine connects from
#[cfg(test)]
pub const TEST_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Deterministic content of `len` bytes that differs per offset
#[cfg(test)]
pub fn test_content(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

/// Boot files sized to hit the interesting TFTP cases: several blocks with
/// a short tail, an exact multiple of the block size, and a single block.
#[cfg(test)]
pub fn test_files() -> Arc<BootFiles> {
    Arc::new(BootFiles::from_entries([
        (UNDIONLY_KPXE, test_content(1300)),
        (IPXE_EFI, test_content(1024)),
        (SNP_EFI, test_content(100)),
    ]))
}

/// Backend that knows the test machine, with the given policy
#[cfg(test)]
pub fn create_test_backend(allow_pxe: bool) -> MockBackend {
    let backend = MockBackend::new();
    backend.add_client(TEST_IP, TEST_MAC, allow_pxe);
    backend
}

/// Backend whose every call fails
#[cfg(test)]
pub fn create_failing_backend() -> MockBackend {
    let backend = MockBackend::new();
    backend.fail_with(BackendError::Unavailable("connection refused".to_string()));
    backend
}

#[cfg(test)]
pub fn create_test_gate(backend: &MockBackend) -> AdmissionGate {
    AdmissionGate::new(Arc::new(backend.clone()), test_files())
}

/// Completed TFTP read as seen by the client
#[cfg(test)]
pub struct TftpDownload {
    pub content: Vec<u8>,
    /// Size the server declared in its OACK
    pub tsize: Option<u64>,
}

#[cfg(test)]
pub async fn tftp_client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

#[cfg(test)]
pub fn tftp_request(filename: &str, tsize: bool) -> Request {
    Request {
        filename: filename.to_string(),
        mode: TransferMode::Octet,
        options: if tsize {
            vec![("tsize".to_string(), "0".to_string())]
        } else {
            Vec::new()
        },
    }
}

#[cfg(test)]
pub async fn tftp_recv(socket: &UdpSocket) -> (Packet, SocketAddr) {
    let mut buf = [0u8; 2048];
    let (len, from) = tokio::time::timeout(Duration::from_secs(3), socket.recv_from(&mut buf))
        .await
        .expect("no packet from server")
        .unwrap();
    (Packet::parse(&buf[..len]).unwrap(), from)
}

#[cfg(test)]
pub async fn tftp_ack(socket: &UdpSocket, block: u16, to: SocketAddr) {
    socket
        .send_to(&Packet::Ack { block }.encode(), to)
        .await
        .unwrap();
}

/// Runs a complete read transfer against `server`; a TFTP error from the
/// server is returned as `Err((code, message))`.
#[cfg(test)]
pub async fn tftp_download(
    server: SocketAddr,
    filename: &str,
    tsize: bool,
) -> Result<TftpDownload, (ErrorCode, String)> {
    let socket = tftp_client().await;
    socket
        .send_to(&Packet::Read(tftp_request(filename, tsize)).encode(), server)
        .await
        .unwrap();

    let mut download = TftpDownload {
        content: Vec::new(),
        tsize: None,
    };
    let mut expected: u16 = 1;
    loop {
        match tftp_recv(&socket).await {
            (Packet::Oack { options }, from) => {
                assert_eq!(options.len(), 1, "only tsize is acknowledged");
                download.tsize = Some(options[0].1.parse().unwrap());
                tftp_ack(&socket, 0, from).await;
            }
            (Packet::Data { block, payload }, from) => {
                assert_eq!(block, expected);
                assert_ne!(from, server, "data must come from a new transfer id");
                download.content.extend_from_slice(&payload);
                tftp_ack(&socket, block, from).await;
                if payload.len() < BLOCK_SIZE {
                    return Ok(download);
                }
                expected = expected.wrapping_add(1);
            }
            (Packet::Error { code, message }, _) => return Err((code, message)),
            (other, _) => panic!("unexpected packet {other:?}"),
        }
    }
}
