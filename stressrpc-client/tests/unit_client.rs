use std::time::Duration;
use stressrpc_client::{CallOptions, Channel, ClientConfig, TestServiceClient, TlsConfig};
use stressrpc_common::{RpcError, SimpleRequest, StatusCode, StreamingInputCallRequest, Payload};

// Helper: build a stub aimed at the given mockito server URL (strips the http:// prefix).
async fn client_for(server_url: &str) -> TestServiceClient {
    let target = server_url.trim_start_matches("http://").to_string();
    let channel = Channel::connect(ClientConfig::insecure(target)).await.unwrap();
    TestServiceClient::new(channel)
}

// Helper: a stub pointed at localhost:8080 for tests that never actually connect.
async fn localhost_client() -> TestServiceClient {
    let channel = Channel::connect(ClientConfig::insecure("127.0.0.1:8080")).await.unwrap();
    TestServiceClient::new(channel)
}

#[test]
fn test_client_config_insecure() {
    let config = ClientConfig::insecure("localhost:9000");
    assert_eq!(config.target, "localhost:9000");
    assert!(config.tls.is_none());
}

#[tokio::test]
async fn test_build_method_url() {
    let client = localhost_client().await;
    assert_eq!(
        client.build_method_url("/testing.TestService/UnaryCall"),
        "http://127.0.0.1:8080/testing.TestService/UnaryCall"
    );
}

#[tokio::test]
async fn test_tls_channel_uses_https() {
    let config = ClientConfig { target: "127.0.0.1:8443".to_string(), tls: Some(TlsConfig::default()) };
    let channel = Channel::connect(config).await.unwrap();
    assert_eq!(channel.base_url(), "https://127.0.0.1:8443");
}

#[tokio::test]
async fn test_tls_host_override_replaces_authority() {
    let config = ClientConfig {
        target: "127.0.0.1:8443".to_string(),
        tls: Some(TlsConfig { root_ca_pem: None, server_host_override: Some("foo.test.google.fr".to_string()) }),
    };
    let channel = Channel::connect(config).await.unwrap();
    assert_eq!(channel.base_url(), "https://foo.test.google.fr:8443");
}

#[tokio::test]
async fn test_invalid_root_certificate_is_rejected() {
    let config = ClientConfig {
        target: "127.0.0.1:8443".to_string(),
        tls: Some(TlsConfig { root_ca_pem: Some(b"not a certificate".to_vec()), server_host_override: None }),
    };
    assert!(matches!(Channel::connect(config).await, Err(RpcError::Network(_))));
}

#[tokio::test]
async fn test_unary_call_decodes_response() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/testing.TestService/UnaryCall")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"payload":{"body":[0,0,0]}}"#)
        .create_async()
        .await;

    let client = client_for(&server.url()).await;
    let request = SimpleRequest { response_size: 3, ..Default::default() };
    let reply = client.unary_call(&request, &CallOptions::default()).await.unwrap();
    assert_eq!(reply.message.payload.unwrap().body, vec![0, 0, 0]);
}

#[tokio::test]
async fn test_error_envelope_becomes_status() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/testing.TestService/UnaryCall")
        .with_status(500)
        .with_body(r#"{"code":"UNKNOWN","message":"test status message"}"#)
        .create_async()
        .await;

    let client = client_for(&server.url()).await;
    let result = client.unary_call(&SimpleRequest::default(), &CallOptions::default()).await;
    assert_eq!(result.unwrap_err(), RpcError::status(StatusCode::Unknown, "test status message"));
}

#[tokio::test]
async fn test_cancelled_envelope_is_cancelled_status() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/testing.TestService/EmptyCall")
        .with_status(499)
        .with_body(r#"{"code":"CANCELLED","message":"server shutting down"}"#)
        .create_async()
        .await;

    let client = client_for(&server.url()).await;
    let err = client.empty_call(&CallOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), StatusCode::Cancelled);
}

#[tokio::test]
async fn test_error_without_envelope_is_unknown() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/testing.TestService/EmptyCall")
        .with_status(502)
        .with_body("Bad Gateway")
        .create_async()
        .await;

    let client = client_for(&server.url()).await;
    let err = client.empty_call(&CallOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), StatusCode::Unknown);
    assert!(err.message().contains("502"), "{err}");
}

#[tokio::test]
async fn test_malformed_success_body_is_decode_error() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/testing.TestService/EmptyCall")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let client = client_for(&server.url()).await;
    let result = client.empty_call(&CallOptions::default()).await;
    assert!(matches!(result, Err(RpcError::Decode(_))));
}

#[tokio::test]
async fn test_metadata_is_sent_and_returned() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/testing.TestService/EmptyCall")
        .match_header("x-grpc-test-echo-initial", "test_initial_metadata_value")
        .with_status(200)
        .with_header("x-grpc-test-echo-initial", "test_initial_metadata_value")
        .with_body("{}")
        .create_async()
        .await;

    let client = client_for(&server.url()).await;
    let options = CallOptions {
        timeout: None,
        metadata: vec![("x-grpc-test-echo-initial".to_string(), "test_initial_metadata_value".to_string())],
    };
    let reply = client.empty_call(&options).await.unwrap();
    assert_eq!(reply.metadata["x-grpc-test-echo-initial"], "test_initial_metadata_value");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_streaming_input_call_posts_request_sequence() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/testing.TestService/StreamingInputCall")
        .match_body(mockito::Matcher::Json(serde_json::json!([
            {"payload": {"body": [0, 0]}},
            {"payload": {"body": [0]}}
        ])))
        .with_status(200)
        .with_body(r#"{"aggregated_payload_size":3}"#)
        .create_async()
        .await;

    let client = client_for(&server.url()).await;
    let requests = vec![
        StreamingInputCallRequest { payload: Some(Payload::zeros(2)) },
        StreamingInputCallRequest { payload: Some(Payload::zeros(1)) },
    ];
    let reply = client.streaming_input_call(&requests, &CallOptions::default()).await.unwrap();
    assert_eq!(reply.message.aggregated_payload_size, 3);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Bind then drop a listener to find a port nothing is listening on.
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let channel = Channel::connect(ClientConfig::insecure(format!("127.0.0.1:{port}"))).await.unwrap();
    let client = TestServiceClient::new(channel);

    let err = client.empty_call(&CallOptions::default()).await.unwrap_err();
    assert!(matches!(err, RpcError::Network(_)), "{err:?}");
    assert_eq!(err.code(), StatusCode::Unavailable);
}

#[tokio::test]
async fn test_wait_for_ready_times_out_without_listener() {
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let channel = Channel::connect(ClientConfig::insecure(format!("127.0.0.1:{port}"))).await.unwrap();

    let result = channel.wait_for_ready(Duration::from_millis(300)).await;
    assert!(matches!(result, Err(RpcError::Timeout(_))));
}

#[tokio::test]
async fn test_wait_for_ready_succeeds_with_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap().to_string();
    let channel = Channel::connect(ClientConfig::insecure(target)).await.unwrap();

    channel.wait_for_ready(Duration::from_secs(5)).await.unwrap();
}
