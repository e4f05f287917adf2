use mock_transport::{MockTransport, Probe, UNIMPLEMENTED};
use refract_core::reflection::negotiator::VersionNegotiator;
use refract_core::{ProtocolRevision, ReflectionClient, ReflectionConfig, ReflectionResolveError};
use std::sync::Arc;
use std::time::Duration;
use tonic::Status;


fn negotiator(transport: &MockTransport, config: ReflectionConfig) -> VersionNegotiator<MockTransport> {
    VersionNegotiator::new(Arc::new(transport.clone()), &config)
}

#[tokio::test]
async fn test_preferred_revision_is_accepted_with_one_probe() {
    let transport = MockTransport::new();
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    assert_eq!(negotiator.negotiate().await.unwrap(), ProtocolRevision::V1);
    assert_eq!(transport.probes(), [ProtocolRevision::V1]);
    assert_eq!(negotiator.negotiated(), Some(ProtocolRevision::V1));
}

#[tokio::test]
async fn test_unimplemented_preferred_revision_falls_back() {
    let transport = MockTransport::new().with_probe(
        ProtocolRevision::V1,
        Probe::ErrorResponse(UNIMPLEMENTED, "unknown service"),
    );
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    assert_eq!(negotiator.negotiate().await.unwrap(), ProtocolRevision::V1Alpha);
    assert_eq!(
        transport.probes(),
        [ProtocolRevision::V1, ProtocolRevision::V1Alpha]
    );
}

#[tokio::test]
async fn test_unimplemented_status_falls_back() {
    let transport = MockTransport::new().with_probe(
        ProtocolRevision::V1Alpha,
        Probe::Status(Status::unimplemented("no such service")),
    );
    let config = ReflectionConfig::default().with_preferred_revision(ProtocolRevision::V1Alpha);
    let negotiator = negotiator(&transport, config);

    assert_eq!(negotiator.negotiate().await.unwrap(), ProtocolRevision::V1);
    assert_eq!(transport.probes().len(), 2);
}

#[tokio::test]
async fn test_other_server_error_fails_without_fallback() {
    let transport = MockTransport::new().with_probe(
        ProtocolRevision::V1,
        Probe::ErrorResponse(7, "permission denied"),
    );
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    let err = negotiator.negotiate().await.unwrap_err();

    assert!(matches!(
        err,
        ReflectionResolveError::NegotiationFailed { revision: ProtocolRevision::V1, ref cause }
            if matches!(**cause, ReflectionResolveError::ServerError { code: 7, .. })
    ));
    assert_eq!(transport.probes(), [ProtocolRevision::V1]);
}

#[tokio::test]
async fn test_transport_error_fails_without_fallback() {
    let transport = MockTransport::new().with_probe(
        ProtocolRevision::V1,
        Probe::Status(Status::unavailable("connection refused")),
    );
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    let err = negotiator.negotiate().await.unwrap_err();

    assert_eq!(err.code(), Some(tonic::Code::Unavailable as i32));
    assert_eq!(transport.probes().len(), 1);
}

#[tokio::test]
async fn test_stream_ending_without_data_is_a_protocol_violation() {
    let transport = MockTransport::new().with_probe(ProtocolRevision::V1, Probe::EndWithoutData);
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    let err = negotiator.negotiate().await.unwrap_err();

    assert!(matches!(
        err,
        ReflectionResolveError::NegotiationFailed { ref cause, .. }
            if matches!(**cause, ReflectionResolveError::ProtocolViolation(_))
    ));
    assert_eq!(transport.probes().len(), 1);
}

#[tokio::test]
async fn test_both_revisions_unimplemented() {
    let transport = MockTransport::new()
        .with_probe(
            ProtocolRevision::V1,
            Probe::ErrorResponse(UNIMPLEMENTED, "nope"),
        )
        .with_probe(
            ProtocolRevision::V1Alpha,
            Probe::ErrorResponse(UNIMPLEMENTED, "nope"),
        );
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    let err = negotiator.negotiate().await.unwrap_err();

    assert!(matches!(
        err,
        ReflectionResolveError::NegotiationFailed { revision: ProtocolRevision::V1Alpha, ref cause }
            if matches!(**cause, ReflectionResolveError::VersionUnsupported(ProtocolRevision::V1Alpha))
    ));
    assert_eq!(transport.probes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_silent_probe_times_out_and_cancels_its_stream() {
    let transport = MockTransport::new().with_probe(ProtocolRevision::V1, Probe::Silent);
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    let err = negotiator.negotiate().await.unwrap_err();

    assert!(matches!(
        err,
        ReflectionResolveError::ConnectivityTimeout { revision: ProtocolRevision::V1, timeout }
            if timeout == Duration::from_secs(5)
    ));
    assert_eq!(transport.opens(), 1);
    assert_eq!(transport.cancels(), 1);
}

#[tokio::test]
async fn test_negotiated_revision_is_cached() {
    let transport = MockTransport::new();
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    for _ in 0..3 {
        negotiator.negotiate().await.unwrap();
    }

    assert_eq!(transport.probes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_probe() {
    // A silent probe keeps the negotiation in flight while every caller joins it.
    let transport = MockTransport::new().with_probe(ProtocolRevision::V1, Probe::Silent);
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    let (a, b, c) = tokio::join!(
        negotiator.negotiate(),
        negotiator.negotiate(),
        negotiator.negotiate()
    );

    assert_eq!(transport.opens(), 1);
    for outcome in [a, b, c] {
        assert!(matches!(
            outcome,
            Err(ReflectionResolveError::ConnectivityTimeout { .. })
        ));
    }
}

#[tokio::test]
async fn test_failed_negotiation_is_retried_by_later_calls() {
    let transport = MockTransport::new().with_probe(
        ProtocolRevision::V1,
        Probe::Status(Status::unavailable("warming up")),
    );
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    assert!(negotiator.negotiate().await.is_err());

    let transport = transport.with_probe(ProtocolRevision::V1, Probe::Accept);

    assert_eq!(negotiator.negotiate().await.unwrap(), ProtocolRevision::V1);
    assert_eq!(transport.probes().len(), 2);
}

#[tokio::test]
async fn test_client_requests_use_the_negotiated_revision() {
    let transport = MockTransport::new()
        .with_probe(
            ProtocolRevision::V1,
            Probe::ErrorResponse(UNIMPLEMENTED, "unknown service"),
        )
        .with_file("a.proto", &[], &["pkg.A"]);
    let client = ReflectionClient::new(transport.clone(), ReflectionConfig::default());

    client.resolve_symbol("pkg.A").await.unwrap();

    assert_eq!(client.revision(), Some(ProtocolRevision::V1Alpha));
    let revisions: Vec<_> = transport.requests().into_iter().map(|(r, _)| r).collect();
    assert_eq!(
        revisions,
        [
            ProtocolRevision::V1,
            ProtocolRevision::V1Alpha,
            ProtocolRevision::V1Alpha
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_negotiation_still_times_out_and_is_retried() {
    let transport = MockTransport::new().with_probe(ProtocolRevision::V1, Probe::Silent);
    let negotiator = negotiator(&transport, ReflectionConfig::default());

    // The only caller gives up long before the probe timeout.
    let abandoned = tokio::time::timeout(Duration::from_secs(1), negotiator.negotiate()).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(transport.opens(), 1);
    assert_eq!(transport.cancels(), 1);
    assert_eq!(negotiator.negotiated(), None);

    let transport = transport.with_probe(ProtocolRevision::V1, Probe::Accept);

    assert_eq!(negotiator.negotiate().await.unwrap(), ProtocolRevision::V1);
    assert_eq!(transport.opens(), 2);
}
