//! Unit tests for the TFTP adapter, driven by a minimal client over loopback

#[cfg(test)]
mod tests {
    use crate::boot_files::{IPXE_EFI, SNP_EFI, UNDIONLY_KPXE};
    use crate::config::TftpConfig;
    use crate::error::ListenerError;
    use crate::mock::MockBackend;
    use crate::shutdown::CancelHandle;
    use crate::test_utils::*;
    use crate::tftp::TftpServer;
    use crate::tftp::packet::{ErrorCode, Packet};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    const TRACED_NAME: &str =
        "0a:00:27:00:00:00/undionly.kpxe-00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    struct TestServer {
        addr: SocketAddr,
        stop: CancelHandle,
        task: JoinHandle<Result<(), ListenerError>>,
    }

    async fn start_server(backend: &MockBackend) -> TestServer {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let config = TftpConfig {
            addr,
            timeout: Duration::from_millis(200),
        };
        let server = TftpServer::with_socket(create_test_gate(backend), config, socket);
        let (stop, cancel) = CancelHandle::channel();
        let task = tokio::spawn(server.run(cancel));
        TestServer { addr, stop, task }
    }

    #[tokio::test]
    async fn test_allowed_client_receives_exact_content() {
        let backend = create_test_backend(true);
        let server = start_server(&backend).await;

        let got = tftp_download(server.addr, UNDIONLY_KPXE, false).await.unwrap();
        assert_eq!(got.content, test_content(1300));
        assert_eq!(got.tsize, None);

        let got = tftp_download(server.addr, SNP_EFI, false).await.unwrap();
        assert_eq!(got.content, test_content(100));
    }

    #[tokio::test]
    async fn test_tsize_declares_exact_length() {
        let backend = create_test_backend(true);
        let server = start_server(&backend).await;

        let got = tftp_download(server.addr, UNDIONLY_KPXE, true).await.unwrap();
        assert_eq!(got.tsize, Some(1300));
        assert_eq!(got.content.len(), 1300);

        // exact multiple of the block size ends with an empty block
        let got = tftp_download(server.addr, IPXE_EFI, true).await.unwrap();
        assert_eq!(got.tsize, Some(1024));
        assert_eq!(got.content, test_content(1024));
    }

    #[tokio::test]
    async fn test_traceparent_and_mac_in_filename() {
        let backend = MockBackend::new();
        backend.add_client("10.1.1.1".parse().unwrap(), TEST_MAC, true);
        let server = start_server(&backend).await;

        let got = tftp_download(server.addr, TRACED_NAME, true).await.unwrap();
        assert_eq!(got.content, test_content(1300));
    }

    #[tokio::test]
    async fn test_denied_client_gets_access_violation_and_no_data() {
        let backend = create_test_backend(false);
        let server = start_server(&backend).await;

        let (code, message) = tftp_download(server.addr, UNDIONLY_KPXE, true).await.err().unwrap();
        assert_eq!(code, ErrorCode::AccessViolation);
        assert_eq!(message, "not allowed");
    }

    #[tokio::test]
    async fn test_backend_error_gets_access_violation() {
        let backend = create_failing_backend();
        let server = start_server(&backend).await;

        let (code, _) = tftp_download(server.addr, UNDIONLY_KPXE, false).await.err().unwrap();
        assert_eq!(code, ErrorCode::AccessViolation);

        // unknown machine: "not found" from the backend is a backend error
        let backend = MockBackend::new();
        let server = start_server(&backend).await;
        let (code, message) = tftp_download(server.addr, UNDIONLY_KPXE, false).await.err().unwrap();
        assert_eq!(code, ErrorCode::AccessViolation);
        assert_eq!(message, "error talking with backend");
    }

    #[tokio::test]
    async fn test_unknown_file_is_not_found() {
        let backend = create_test_backend(true);
        let server = start_server(&backend).await;

        let (code, _) = tftp_download(server.addr, "pxelinux.0", false).await.err().unwrap();
        assert_eq!(code, ErrorCode::FileNotFound);
    }

    #[tokio::test]
    async fn test_write_request_refused_without_backend_calls() {
        let backend = create_test_backend(true);
        let server = start_server(&backend).await;
        let socket = tftp_client().await;

        for filename in [UNDIONLY_KPXE, "0a:00:27:00:00:00/ipxe.efi", "../etc/passwd"] {
            socket
                .send_to(&Packet::Write(tftp_request(filename, false)).encode(), server.addr)
                .await
                .unwrap();
            let (packet, _) = tftp_recv(&socket).await;
            assert_eq!(
                packet,
                Packet::error(ErrorCode::AccessViolation, "access_violation")
            );
        }
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_non_request_on_listen_port_is_illegal() {
        let backend = create_test_backend(true);
        let server = start_server(&backend).await;
        let socket = tftp_client().await;

        tftp_ack(&socket, 1, server.addr).await;
        let (packet, _) = tftp_recv(&socket).await;
        assert!(matches!(
            packet,
            Packet::Error {
                code: ErrorCode::IllegalOperation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unacknowledged_block_is_retransmitted() {
        let backend = create_test_backend(true);
        let server = start_server(&backend).await;
        let socket = tftp_client().await;
        socket
            .send_to(&Packet::Read(tftp_request(SNP_EFI, false)).encode(), server.addr)
            .await
            .unwrap();

        let (first, from) = tftp_recv(&socket).await;
        // no ACK: the server must resend the same block after its timeout
        let (second, again) = tftp_recv(&socket).await;
        assert_eq!(first, second);
        assert_eq!(from, again);

        tftp_ack(&socket, 1, from).await;
    }

    #[tokio::test]
    async fn test_stranger_gets_unknown_transfer_id() {
        let backend = create_test_backend(true);
        let server = start_server(&backend).await;
        let socket = tftp_client().await;
        socket
            .send_to(&Packet::Read(tftp_request(UNDIONLY_KPXE, false)).encode(), server.addr)
            .await
            .unwrap();
        let (_, transfer) = tftp_recv(&socket).await;

        let stranger = tftp_client().await;
        tftp_ack(&stranger, 1, transfer).await;
        let (packet, _) = tftp_recv(&stranger).await;
        assert!(matches!(
            packet,
            Packet::Error {
                code: ErrorCode::UnknownTransferId,
                ..
            }
        ));

        // the real transfer carries on
        tftp_ack(&socket, 1, transfer).await;
        loop {
            match tftp_recv(&socket).await {
                // a retransmission that crossed our ACK
                (Packet::Data { block: 1, .. }, _) => continue,
                (packet, _) => {
                    assert!(matches!(packet, Packet::Data { block: 2, .. }));
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_transfer() {
        let backend = create_test_backend(true);
        let server = start_server(&backend).await;
        let socket = tftp_client().await;
        socket
            .send_to(&Packet::Read(tftp_request(UNDIONLY_KPXE, false)).encode(), server.addr)
            .await
            .unwrap();
        let (_, transfer) = tftp_recv(&socket).await;

        server.stop.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!server.task.is_finished(), "transfer still in flight");

        // new requests are no longer answered
        assert!(download_starts(server.addr).await.is_none());

        let mut block = 1;
        loop {
            tftp_ack(&socket, block, transfer).await;
            if block == 3 {
                break;
            }
            let (packet, _) = tftp_recv(&socket).await;
            assert!(matches!(packet, Packet::Data { .. }));
            block += 1;
        }

        timeout(Duration::from_secs(2), server.task)
            .await
            .expect("listener must finish once the transfer completed")
            .unwrap()
            .unwrap();
    }

    async fn download_starts(server: SocketAddr) -> Option<Packet> {
        let socket = tftp_client().await;
        socket
            .send_to(&Packet::Read(tftp_request(SNP_EFI, false)).encode(), server)
            .await
            .ok()?;
        let mut buf = [0u8; 2048];
        let (len, _) = timeout(Duration::from_millis(300), socket.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        Packet::parse(&buf[..len]).ok()
    }
}
