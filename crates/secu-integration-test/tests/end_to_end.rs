//! End-to-end tests over a real loopback gRPC broker

use pretty_assertions::assert_eq;
use secu_broker::NrSecurityEngine;
use secu_client::{
    BlockingSecurity, ClientConfig, ContextProxy, FailurePolicy, NrCiphering, NrIntegrity,
    RetryPolicy, SecurityContainer,
};
use secu_common::{AlgorithmId, ContextKind, Direction, SecuError, StreamFrame};
use secu_integration_test::{
    dead_endpoint, BrokerTestEnv, StubEngine, STUB_DIGEST, UNSUPPORTED_ALGORITHM,
};
use secu_proto::{EncryptRequest, SecuServiceClient, StreamCipher};
use std::collections::HashSet;
use std::sync::Arc;

const KEY: [u8; 16] = [0x2b; 16];

fn frame(message: &[u8], bit_length: u32) -> StreamFrame<'_> {
    StreamFrame {
        count: 5,
        bearer: 3,
        direction: Direction::Uplink,
        message,
        bit_length,
    }
}

/// Scenario:
/// 1. IntegrityInit yields id 1
/// 2. ComputeIntegrity returns the first four digest bytes, twice
/// 3. Free, then Compute reports the context as unknown
#[tokio::test]
async fn test_integrity_lifecycle() {
    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let proxy = env.proxy(FailurePolicy::FailClosed);

    let ctx = proxy.integrity_init(AlgorithmId::NIA2, &KEY).await.unwrap();
    assert_eq!(ctx.id().as_u64(), 1);

    for _ in 0..2 {
        let mac = proxy
            .compute_integrity(&ctx, &frame(b"hello", 40))
            .await
            .unwrap();
        assert_eq!(mac, [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(mac[..], STUB_DIGEST[..4]);
    }

    // Keep a second handle to the same id to observe the freed state.
    let stale = proxy
        .integrity_init(AlgorithmId::NIA2, &KEY)
        .await
        .unwrap();
    let stale_id = stale.id();
    proxy.integrity_free(stale).await;

    let mut raw = SecuServiceClient::connect(env.endpoint()).await.unwrap();
    let status = raw
        .stream_compute_integrity(secu_proto::IntegrityRequest {
            algorithm: 2,
            sc: Some(StreamCipher {
                ctx_id: stale_id.as_u64(),
                count: 5,
                bearer: 3,
                direction: 0,
                message: b"hello".to_vec(),
                blength: 40,
            }),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::NotFound);

    proxy.integrity_free(ctx).await;
    assert_eq!(env.broker().engine().releases(), 2);
    assert_eq!(env.broker().stats().integrity_live, 0);

    drop(raw);
    drop(proxy);
    env.shutdown().await;
}

#[tokio::test]
async fn test_free_then_compute_through_proxy() {
    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let closed = env.proxy(FailurePolicy::FailClosed);
    let open = env.proxy(FailurePolicy::FailOpen);

    let ctx = closed.integrity_init(AlgorithmId::NIA2, &KEY).await.unwrap();
    let id = ctx.id();

    // Free through the raw client so the typed handle stays usable.
    let mut raw = SecuServiceClient::connect(env.endpoint()).await.unwrap();
    raw.stream_integrity_free(secu_proto::StreamFreeRequest { ctx_id: id.as_u64() })
        .await
        .unwrap();
    // Idempotent.
    raw.stream_integrity_free(secu_proto::StreamFreeRequest { ctx_id: id.as_u64() })
        .await
        .unwrap();

    assert_eq!(
        closed
            .compute_integrity(&ctx, &frame(b"hello", 40))
            .await
            .unwrap_err(),
        SecuError::UnknownContext {
            kind: ContextKind::Integrity,
            id: id.as_u64()
        }
    );
    assert_eq!(
        open.compute_integrity(&ctx, &frame(b"hello", 40))
            .await
            .unwrap(),
        [0u8; 4]
    );
    assert_eq!(env.broker().engine().releases(), 1);

    drop(raw);
    drop((closed, open));
    env.shutdown().await;
}

#[tokio::test]
async fn test_cipher_twice_restores_plaintext() {
    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let proxy = env.proxy(FailurePolicy::FailClosed);

    let ctx = proxy.ciphering_init(AlgorithmId::NEA2, &KEY).await.unwrap();
    let plaintext = b"link layer payload".to_vec();
    let bits = (plaintext.len() * 8) as u32;

    let ciphertext = proxy
        .compute_encrypt(&ctx, &frame(&plaintext, bits))
        .await
        .unwrap();
    assert_ne!(ciphertext, plaintext);
    let restored = proxy
        .compute_encrypt(&ctx, &frame(&ciphertext, bits))
        .await
        .unwrap();
    assert_eq!(restored, plaintext);

    proxy.ciphering_free(ctx).await;
    drop(proxy);
    env.shutdown().await;
}

#[tokio::test]
async fn test_ciphertext_length_tracks_bit_length() {
    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let proxy = env.proxy(FailurePolicy::FailClosed);
    let ctx = proxy.ciphering_init(AlgorithmId::NEA2, &KEY).await.unwrap();

    let message = [0x5au8; 16];
    for bit_length in [1u32, 8, 9, 64, 127, 128] {
        let out = proxy
            .compute_encrypt(&ctx, &frame(&message, bit_length))
            .await
            .unwrap();
        assert_eq!(out.len(), bit_length.div_ceil(8) as usize);
    }

    proxy.ciphering_free(ctx).await;
    drop(proxy);
    env.shutdown().await;
}

#[tokio::test]
async fn test_kind_isolation_over_the_wire() {
    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let proxy = env.proxy(FailurePolicy::FailClosed);
    let integrity = proxy.integrity_init(AlgorithmId::NIA2, &KEY).await.unwrap();

    let mut raw = SecuServiceClient::connect(env.endpoint()).await.unwrap();
    let status = raw
        .stream_compute_encrypt(EncryptRequest {
            algorithm: 2,
            sc: Some(StreamCipher {
                ctx_id: integrity.id().as_u64(),
                count: 0,
                bearer: 0,
                direction: 0,
                message: vec![0; 4],
                blength: 32,
            }),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::NotFound);

    proxy.integrity_free(integrity).await;
    drop(raw);
    drop(proxy);
    env.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_algorithm_yields_no_context() {
    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let proxy = env.proxy(FailurePolicy::FailOpen);

    assert!(proxy
        .integrity_init(UNSUPPORTED_ALGORITHM, &KEY)
        .await
        .is_none());
    assert_eq!(env.broker().stats().init_failures, 1);

    drop(proxy);
    env.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_first_callers_share_one_connection() {
    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let proxy = Arc::new(env.proxy(FailurePolicy::FailClosed));
    assert!(!proxy.transport().is_connected());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move {
                proxy
                    .integrity_init(AlgorithmId::NIA2, &KEY)
                    .await
                    .map(|ctx| ctx.id())
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for task in tasks {
        assert!(ids.insert(task.await.unwrap().unwrap()));
    }
    assert_eq!(ids.len(), 16);
    assert_eq!(proxy.transport().connect_attempts(), 1);
    assert!(proxy.transport().is_connected());

    drop(proxy);
    env.shutdown().await;
}

/// Scenario: transport failure during ComputeIntegrity
/// - fail-open: all-zero MAC
/// - fail-closed: transport error
#[tokio::test]
async fn test_transport_failure_policies() {
    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let live = env.proxy(FailurePolicy::FailClosed);
    let ctx = live.integrity_init(AlgorithmId::NIA2, &KEY).await.unwrap();

    let dead = dead_endpoint().await.unwrap();
    let unreachable = |policy| {
        let mut config = ClientConfig::with_endpoint(dead.clone());
        config.connect_timeout_ms = 500;
        config.failure_policy = policy;
        ContextProxy::from_config(&config)
    };

    let open = unreachable(FailurePolicy::FailOpen);
    let mac = open
        .compute_integrity(&ctx, &frame(b"hello", 40))
        .await
        .unwrap();
    assert_eq!(mac, [0x00, 0x00, 0x00, 0x00]);

    let closed = unreachable(FailurePolicy::FailClosed);
    let err = closed
        .compute_integrity(&ctx, &frame(b"hello", 40))
        .await
        .unwrap_err();
    assert!(matches!(err, SecuError::Transport { retryable: true, .. }));

    // Ciphering under fail-open passes the plaintext through.
    let cipher_ctx = live.ciphering_init(AlgorithmId::NEA2, &KEY).await.unwrap();
    assert_eq!(
        open.compute_encrypt(&cipher_ctx, &frame(b"hello", 40))
            .await
            .unwrap(),
        b"hello".to_vec()
    );

    live.integrity_free(ctx).await;
    live.ciphering_free(cipher_ctx).await;
    drop(live);
    env.shutdown().await;
}

/// Against an unreachable broker, init dials once while compute and free
/// dial once per configured attempt.
#[tokio::test]
async fn test_retry_is_bounded_on_dead_endpoint() {
    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let live = env.proxy(FailurePolicy::FailClosed);
    let ctx = live.integrity_init(AlgorithmId::NIA2, &KEY).await.unwrap();

    let dead = dead_endpoint().await.unwrap();
    let mut config = ClientConfig::with_endpoint(dead);
    config.connect_timeout_ms = 500;
    config.retry = RetryPolicy {
        max_attempts: 3,
        backoff_ms: 1,
    };
    let proxy = ContextProxy::from_config(&config);

    assert!(proxy.connect().await.is_err());
    assert_eq!(proxy.transport().connect_attempts(), 1);
    assert!(proxy.integrity_init(AlgorithmId::NIA2, &KEY).await.is_none());
    assert_eq!(proxy.transport().connect_attempts(), 2);

    let err = proxy
        .compute_integrity(&ctx, &frame(b"hello", 40))
        .await
        .unwrap_err();
    assert!(matches!(err, SecuError::Transport { retryable: true, .. }));
    assert_eq!(proxy.transport().connect_attempts(), 2 + 3);

    proxy.integrity_free(ctx).await;
    assert_eq!(proxy.transport().connect_attempts(), 2 + 3 + 3);

    // The free went to the dead endpoint, so the broker still holds it.
    assert_eq!(env.broker().stats().integrity_live, 1);

    drop(live);
    env.shutdown().await;
}

#[tokio::test]
async fn test_health_service_reports_serving() {
    use tonic_health::pb::health_check_response::ServingStatus;
    use tonic_health::pb::health_client::HealthClient;
    use tonic_health::pb::HealthCheckRequest;

    let env = BrokerTestEnv::start(StubEngine::new()).await.unwrap();
    let channel = tonic::transport::Endpoint::new(env.endpoint())
        .unwrap()
        .connect()
        .await
        .unwrap();
    let mut health = HealthClient::new(channel);
    let response = health
        .check(HealthCheckRequest {
            service: "secu.v1.SecuService".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status, ServingStatus::Serving as i32);

    drop(health);
    env.shutdown().await;
}

/// Full stack with the reference engine: caller adapter, blocking runtime,
/// gRPC, broker, NIA2/NEA2.
#[test]
fn test_blocking_adapter_with_reference_engine() {
    let server_rt = tokio::runtime::Runtime::new().unwrap();
    let env = server_rt
        .block_on(BrokerTestEnv::start(NrSecurityEngine::new()))
        .unwrap();

    let security = Arc::new(
        BlockingSecurity::from_config(&env.client_config(FailurePolicy::FailClosed)).unwrap(),
    );
    security.connect().unwrap();

    let nia = NrIntegrity::nia2(Arc::clone(&security));
    let nea = NrCiphering::nea2(Arc::clone(&security));

    let integrity = nia.init(&KEY).unwrap();
    let ciphering = nea.init(&KEY).unwrap();

    let pdu = b"a PDCP PDU carried over the radio".to_vec();
    let mut mac_a = [0u8; 4];
    let mut mac_b = [0u8; 4];
    nia.integrity(&integrity, &mut mac_a, &pdu, pdu.len(), 1, 42, 0)
        .unwrap();
    nia.integrity(&integrity, &mut mac_b, &pdu, pdu.len(), 1, 42, 0)
        .unwrap();
    assert_eq!(mac_a, mac_b);
    nia.integrity(&integrity, &mut mac_b, &pdu, pdu.len(), 2, 42, 0)
        .unwrap();
    assert_ne!(mac_a, mac_b);

    let mut buffer = pdu.clone();
    nea.cipher(&ciphering, &mut buffer, pdu.len(), 1, 42, 1)
        .unwrap();
    assert_ne!(buffer, pdu);
    nea.cipher(&ciphering, &mut buffer, pdu.len(), 1, 42, 1)
        .unwrap();
    assert_eq!(buffer, pdu);

    assert!(nia
        .integrity(&integrity, &mut mac_a, &pdu, pdu.len(), 33, 42, 0)
        .is_err());

    nia.free(integrity);
    nea.free(ciphering);
    assert_eq!(env.broker().stats().integrity_live, 0);
    assert_eq!(env.broker().stats().ciphering_live, 0);

    let container = SecurityContainer::init(
        &security,
        AlgorithmId::NEA2,
        AlgorithmId::NIA2,
        &KEY,
        &KEY,
    );
    assert!(container.integrity().is_some());
    assert!(container.ciphering().is_some());
    container.delete(&security);
    assert_eq!(env.broker().stats().frees, 4);

    drop(nia);
    drop(nea);
    drop(security);
    server_rt.block_on(env.shutdown());
}
