//! Unit tests for the admission gate

#[cfg(test)]
mod tests {
    use crate::boot_files::{IPXE_EFI, UNDIONLY_KPXE};
    use crate::error::{BackendError, Rejection};
    use crate::identity::BootRequest;
    use crate::mock::MockBackend;
    use crate::shutdown::CancelHandle;
    use crate::test_utils::*;
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing::field::{Field, Visit};
    use tracing::{Instrument, Subscriber, span};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Captures the last value recorded for `hw_mac` on any span
    #[derive(Clone, Default)]
    struct RecordedMac(Arc<Mutex<Option<String>>>);

    impl Visit for RecordedMac {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "hw_mac" {
                *self.0.lock().unwrap() = Some(format!("{value:?}"));
            }
        }
    }

    impl<S: Subscriber> Layer<S> for RecordedMac {
        fn on_record(&self, _id: &span::Id, values: &span::Record<'_>, _ctx: Context<'_, S>) {
            values.record(&mut self.clone());
        }
    }

    fn request(filename: &str) -> BootRequest {
        BootRequest::from_tftp("127.0.0.1:2070", filename)
    }

    #[tokio::test]
    async fn test_allowed_client_gets_exact_content() {
        let backend = create_test_backend(true);
        let gate = create_test_gate(&backend);
        let (_handle, cancel) = CancelHandle::channel();

        let content = gate.admit(&request(UNDIONLY_KPXE), &cancel).await.unwrap();

        assert_eq!(content, test_content(1300));
        assert_eq!(backend.resolve_calls(), 1);
        assert_eq!(backend.allow_calls(), 1);
    }

    #[tokio::test]
    async fn test_denied_client_is_policy_denied() {
        let backend = create_test_backend(false);
        let gate = create_test_gate(&backend);
        let (_handle, cancel) = CancelHandle::channel();

        let decision = gate.decide(&request(IPXE_EFI).identity, &cancel).await;
        assert!(!decision.allowed());
        assert!(decision.error().is_none());
        assert_eq!(decision.resolved_mac(), Some(TEST_MAC));

        let err = gate.admit(&request(IPXE_EFI), &cancel).await.unwrap_err();
        assert!(matches!(err, Rejection::PolicyDenied));
    }

    #[tokio::test]
    async fn test_backend_failure_is_distinct_from_denial() {
        let backend = create_failing_backend();
        let gate = create_test_gate(&backend);
        let (_handle, cancel) = CancelHandle::channel();

        let decision = gate.decide(&request(IPXE_EFI).identity, &cancel).await;
        assert!(!decision.allowed(), "an error must never allow");
        assert!(matches!(decision.error(), Some(BackendError::Unavailable(_))));
        assert_eq!(decision.resolved_mac(), None);

        let err = gate.admit(&request(IPXE_EFI), &cancel).await.unwrap_err();
        assert!(matches!(err, Rejection::Backend(BackendError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unknown_machine_fails_closed() {
        let backend = MockBackend::new();
        let gate = create_test_gate(&backend);
        let (_handle, cancel) = CancelHandle::channel();

        let err = gate.admit(&request(IPXE_EFI), &cancel).await.unwrap_err();
        assert!(matches!(err, Rejection::Backend(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_file_only_after_admission() {
        let backend = create_test_backend(true);
        let gate = create_test_gate(&backend);
        let (_handle, cancel) = CancelHandle::channel();

        let err = gate.admit(&request("pxelinux.0"), &cancel).await.unwrap_err();
        assert!(matches!(err, Rejection::NotFound(ref name) if name == "pxelinux.0"));
        assert_eq!(backend.allow_calls(), 1);

        // a denied client learns nothing about which files exist
        let backend = create_test_backend(false);
        let gate = create_test_gate(&backend);
        let err = gate.admit(&request("pxelinux.0"), &cancel).await.unwrap_err();
        assert!(matches!(err, Rejection::PolicyDenied));
    }

    #[tokio::test]
    async fn test_mac_from_path_is_passed_to_backend() {
        // the IP is unknown to the backend; only the MAC directory matches
        let backend = MockBackend::new();
        backend.add_client("10.9.9.9".parse().unwrap(), TEST_MAC, true);
        let gate = create_test_gate(&backend);
        let (_handle, cancel) = CancelHandle::channel();

        let req = request("0a:00:27:00:00:00/undionly.kpxe");
        assert!(gate.admit(&req, &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_abandons_hung_backend_call() {
        let backend = create_test_backend(true);
        backend.hang();
        let gate = create_test_gate(&backend);
        let (handle, cancel) = CancelHandle::channel();

        let req = request(UNDIONLY_KPXE);
        let pending = tokio::spawn(async move { gate.admit(&req, &cancel).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("admission must return promptly once cancelled")
            .unwrap();
        assert!(matches!(
            result,
            Err(Rejection::Backend(BackendError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_backend_calls() {
        let backend = create_test_backend(true);
        let gate = create_test_gate(&backend);
        let (handle, cancel) = CancelHandle::channel();
        handle.cancel();

        let err = gate.admit(&request(UNDIONLY_KPXE), &cancel).await.unwrap_err();
        assert!(matches!(err, Rejection::Backend(BackendError::Cancelled)));
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_deadline_fails_hung_backend_closed() {
        let backend = create_test_backend(true);
        backend.hang();
        let gate = create_test_gate(&backend).with_deadline(Duration::from_millis(100));
        let (_handle, cancel) = CancelHandle::channel();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            gate.admit(&request(UNDIONLY_KPXE), &cancel),
        )
        .await
        .expect("admission must give up once the deadline passes");
        assert!(matches!(
            result,
            Err(Rejection::Backend(BackendError::Unavailable(_)))
        ));
        assert_eq!(backend.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_deadline_does_not_affect_prompt_backend() {
        let backend = create_test_backend(true);
        let gate = create_test_gate(&backend).with_deadline(Duration::from_secs(5));
        let (_handle, cancel) = CancelHandle::channel();

        let content = gate.admit(&request(UNDIONLY_KPXE), &cancel).await.unwrap();
        assert_eq!(content, test_content(1300));
    }

    #[tokio::test]
    async fn test_resolved_mac_is_recorded_on_request_span() {
        let recorded = RecordedMac::default();
        let subscriber = tracing_subscriber::registry().with(recorded.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let backend = create_test_backend(true);
        let gate = create_test_gate(&backend);
        let (_handle, cancel) = CancelHandle::channel();

        let span = tracing::info_span!("boot_request", hw_mac = tracing::field::Empty);
        gate.admit(&request(UNDIONLY_KPXE), &cancel)
            .instrument(span)
            .await
            .unwrap();

        assert_eq!(
            recorded.0.lock().unwrap().as_deref(),
            Some("0a:00:27:00:00:00")
        );
    }
}
