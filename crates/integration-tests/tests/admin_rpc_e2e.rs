//! Admin JSON-RPC end to end: real server on an ephemeral port, real HTTP client

use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::server::ServerHandle;
use proctor_api_rpc::error::code;
use proctor_api_rpc::server::method;
use proctor_api_rpc::types::{SettingsResponse, StatsResponse};
use proctor_api_rpc::{RpcServer, RpcServerConfig};
use proctor_core::application::{QueueRegistry, SettingsCell};
use proctor_core::domain::{QueueKind, QueueSettings};
use proctor_core::port::time_provider::SystemTimeProvider;
use std::sync::Arc;
use std::time::Duration;

struct TestServer {
    registry: Arc<QueueRegistry>,
    client: HttpClient,
    handle: ServerHandle,
}

async fn start_server() -> TestServer {
    let registry = Arc::new(QueueRegistry::local(SettingsCell::new(
        QueueSettings::default(),
    )));
    let config = RpcServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let (handle, addr) = RpcServer::new(config, Arc::clone(&registry), Arc::new(SystemTimeProvider))
        .start()
        .await
        .unwrap();
    let client = HttpClientBuilder::default()
        .build(format!("http://{}", addr))
        .unwrap();

    TestServer {
        registry,
        client,
        handle,
    }
}

#[tokio::test]
async fn test_settings_round_trip_over_rpc() {
    let server = start_server().await;

    let settings: SettingsResponse = server
        .client
        .request(method::SETTINGS_GET, rpc_params![])
        .await
        .unwrap();
    assert_eq!(settings, SettingsResponse::from(QueueSettings::default()));

    let mut params = ObjectParams::new();
    params.insert("answer_concurrency", 16).unwrap();
    params.insert("max_queue", 3).unwrap();
    let updated: SettingsResponse = server
        .client
        .request(method::SETTINGS_UPDATE, params)
        .await
        .unwrap();

    assert_eq!(updated.answer_concurrency, 16);
    assert_eq!(updated.max_queue, 10);
    assert_eq!(updated.submit_concurrency, settings.submit_concurrency);
    assert_eq!(server.registry.answer().concurrency(), 16);

    server.handle.stop().unwrap();
}

#[tokio::test]
async fn test_empty_update_is_a_validation_error() {
    let server = start_server().await;

    let result: Result<SettingsResponse, _> = server
        .client
        .request(method::SETTINGS_UPDATE, ObjectParams::new())
        .await;
    match result {
        Err(ClientError::Call(err)) => assert_eq!(err.code(), code::VALIDATION_ERROR),
        other => panic!("expected a validation error, got {:?}", other),
    }

    server.handle.stop().unwrap();
}

#[tokio::test]
async fn test_stats_reflect_running_work() {
    let server = start_server().await;
    let gate = Arc::new(tokio::sync::Semaphore::new(0));

    // Occupy two submit slots and leave one waiting
    let mut handles = Vec::new();
    for _ in 0..3 {
        let gate = Arc::clone(&gate);
        handles.push(
            server
                .registry
                .submit()
                .submit(
                    move || async move {
                        gate.acquire().await.unwrap().forget();
                        Ok(())
                    },
                    50,
                )
                .await
                .unwrap(),
        );
    }
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.registry.submit().active() != 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let stats: StatsResponse = server
        .client
        .request(method::QUEUE_STATS, rpc_params![])
        .await
        .unwrap();
    assert!(stats.uptime_seconds >= 0);

    let submit = stats
        .queues
        .iter()
        .find(|q| q.name == QueueKind::Submit.as_str())
        .unwrap();
    assert_eq!(submit.active, 2);
    assert_eq!(submit.pending, 1);
    assert_eq!(submit.concurrency, 2);
    assert!(submit.distributed.is_none());

    gate.add_permits(3);
    for handle in handles {
        handle.join().await.unwrap();
    }
    server.handle.stop().unwrap();
}
