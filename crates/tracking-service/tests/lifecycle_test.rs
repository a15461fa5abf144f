use deploy_framework::{BootstrapError, TrustRegistry, TrustSettings};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracking_service::components::{HttpFrontEnd, ServiceContext};
use tracking_service::config::ServiceConfig;
use tracking_service::lifecycle::{http_addrs, TrackingSystem};

// =============================================================================
// Fake peers
// =============================================================================

/// A backing store that answers every first message with `reply`.
async fn fake_store(reply: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 64];
                if socket.read(&mut buf).await.is_ok() {
                    let _ = socket.write_all(reply).await;
                }
                // Hold the connection until the client goes away.
                let _ = socket.read(&mut buf).await;
            });
        }
    });
    addr
}

/// A stream endpoint that sends `records` to every subscriber.
async fn fake_stream(records: Vec<&'static str>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let records = records.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(socket);
                let mut subscribe = String::new();
                if reader.read_line(&mut subscribe).await.is_err()
                    || !subscribe.starts_with("SUBSCRIBE ")
                {
                    return;
                }
                for record in records {
                    let _ = reader.get_mut().write_all(record.as_bytes()).await;
                    let _ = reader.get_mut().write_all(b"\n").await;
                }
                let mut rest = String::new();
                let _ = reader.read_line(&mut rest).await;
            });
        }
    });
    addr
}

/// An address nothing listens on.
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn test_config(redis: SocketAddr, stream: SocketAddr) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.redis.addr = redis.to_string();
    config.redis.connect_timeout_ms = 500;
    config.stream.addr = stream.to_string();
    config.stream.connect_timeout_ms = 500;
    config.http.host = "127.0.0.1".to_string();
    config.http.port = 0;
    config.cache.capacity = 100;
    config
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

async fn get(addr: SocketAddr, path: &str) -> reqwest::Response {
    client()
        .get(format!("http://{addr}{path}"))
        .send()
        .await
        .expect("request should be answered")
}

/// A local port nothing is bound to right now.
async fn free_port() -> u16 {
    closed_port().await.port()
}

/// Whether a plain listener (no port sharing) can take `port`.
async fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).await.is_ok()
}

/// A backing store that accepts connections but never answers.
async fn silent_store() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = socket.read_to_end(&mut buf).await;
            });
        }
    });
    addr
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_service_starts_and_serves_tracking_records() {
    let redis = fake_store(b"+PONG\r\n").await;
    let stream = fake_stream(vec![
        r#"{"key": "parcel-1", "payload": {"status": "in transit"}}"#,
        "not json at all",
        r#"{"key": "parcel-2", "payload": {"status": "delivered"}}"#,
    ])
    .await;

    let system = TrackingSystem::start_with_registry(
        test_config(redis, stream),
        Arc::new(TrustRegistry::new()),
    )
    .await
    .expect("service should start");

    assert!(system.gate().is_open());
    let addrs = http_addrs(&system);
    assert_eq!(addrs.len(), 5);

    let health = get(addrs[0], "/health").await;
    assert_eq!(health.status(), StatusCode::OK);
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // Ingestion starts once the gate is open; wait for both valid records.
    let cache = system.context().cache.clone();
    tokio::time::timeout(Duration::from_secs(2), async {
        while cache.len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("records should be ingested");
    assert_eq!(cache.len(), 2);

    let record = get(addrs[4], "/tracking/parcel-2").await;
    assert_eq!(record.status(), StatusCode::OK);
    let payload: Value = record.json().await.unwrap();
    assert_eq!(payload, json!({"status": "delivered"}));

    let missing = get(addrs[1], "/tracking/unknown").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_backing_store_fails_startup() {
    let redis = closed_port().await;
    let stream = fake_stream(vec![]).await;

    let err = TrackingSystem::start_with_registry(
        test_config(redis, stream),
        Arc::new(TrustRegistry::new()),
    )
    .await
    .err()
    .expect("startup should fail");

    match &err {
        BootstrapError::DeploymentFailed {
            failures,
            succeeded,
        } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].component(), "redis");
            assert_eq!(succeeded, &vec!["cache", "http", "stream"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unexpected_handshake_reply_fails_startup() {
    let redis = fake_store(b"-ERR unknown command\r\n").await;
    let stream = fake_stream(vec![]).await;

    let err = TrackingSystem::start_with_registry(
        test_config(redis, stream),
        Arc::new(TrustRegistry::new()),
    )
    .await
    .err()
    .unwrap();

    assert_eq!(err.failed_components(), vec!["redis"]);
    assert!(err.to_string().contains("Unexpected handshake reply"));
}

#[tokio::test]
async fn test_zero_cache_capacity_fails_startup() {
    let redis = fake_store(b"+PONG\r\n").await;
    let stream = fake_stream(vec![]).await;
    let mut config = test_config(redis, stream);
    config.cache.capacity = 0;

    let err = TrackingSystem::start_with_registry(config, Arc::new(TrustRegistry::new()))
        .await
        .err()
        .unwrap();

    assert_eq!(err.failed_components(), vec!["cache"]);
}

#[tokio::test]
async fn test_unreachable_stream_fails_every_stream_instance() {
    let redis = fake_store(b"+PONG\r\n").await;
    let stream = closed_port().await;

    let err = TrackingSystem::start_with_registry(
        test_config(redis, stream),
        Arc::new(TrustRegistry::new()),
    )
    .await
    .err()
    .unwrap();

    assert_eq!(err.failed_components(), vec!["stream"]);
}

#[tokio::test]
async fn test_trust_settings_reach_registry_and_components() {
    let redis = fake_store(b"+PONG\r\n").await;
    let stream = fake_stream(vec![]).await;
    let mut config = test_config(redis, stream);
    config.trust = TrustSettings::from_lookup(|key| {
        (key == "TRUST_ANCHORS").then(|| "/etc/pki/anchors".to_string())
    });
    let registry = Arc::new(TrustRegistry::new());

    let system = TrackingSystem::start_with_registry(config, Arc::clone(&registry))
        .await
        .unwrap();

    let expected = Some(PathBuf::from("/etc/pki/anchors"));
    assert_eq!(registry.current().trust_anchors, expected);
    assert_eq!(system.context().trust.trust_anchors, expected);
    assert_eq!(system.context().trust.trust_store, None);

    system.shutdown().await.unwrap();
}

// =============================================================================
// Traffic gate
// =============================================================================

#[tokio::test]
async fn test_http_front_end_waits_for_gate() {
    let mut config = ServiceConfig::default();
    config.http.host = "127.0.0.1".to_string();
    config.http.port = 0;
    let ctx = ServiceContext::new(config, TrustSettings::default(), Default::default());

    let mut front_end = HttpFrontEnd::new();
    front_end.start(&ctx).await.unwrap();
    let addr = front_end.local_addr().unwrap();

    // Bound but closed: the request is not answered.
    let early = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap()
        .get(format!("http://{addr}/health"))
        .send()
        .await;
    assert!(early.unwrap_err().is_timeout());

    ctx.gate.open();
    let health = get(addr, "/health").await;
    assert_eq!(health.status(), StatusCode::OK);

    front_end.stop(&ctx).await.unwrap();
}

// =============================================================================
// Failed startup leaves nothing running
// =============================================================================

#[tokio::test]
async fn test_failed_startup_releases_http_port() {
    let redis = closed_port().await;
    let stream = fake_stream(vec![]).await;
    let mut config = test_config(redis, stream);
    config.http.port = free_port().await;
    let port = config.http.port;

    let err = TrackingSystem::start_with_registry(config, Arc::new(TrustRegistry::new()))
        .await
        .err()
        .unwrap();

    assert_eq!(err.failed_components(), vec!["redis"]);
    assert!(port_is_free(port).await, "HTTP instances still hold port {port}");
}

#[tokio::test]
async fn test_startup_timeout_releases_http_port() {
    let redis = silent_store().await;
    let stream = fake_stream(vec![]).await;
    let mut config = test_config(redis, stream);
    config.redis.connect_timeout_ms = 30_000;
    config.startup_timeout_secs = Some(1);
    config.http.port = free_port().await;
    let port = config.http.port;

    let err = TrackingSystem::start_with_registry(config, Arc::new(TrustRegistry::new()))
        .await
        .err()
        .unwrap();

    match err {
        BootstrapError::StartupTimedOut { pending, .. } => assert_eq!(pending, vec!["redis"]),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(port_is_free(port).await, "HTTP instances still hold port {port}");
}
