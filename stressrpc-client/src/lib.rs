use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use stressrpc_common::{
    Empty, ErrorResponse, Result, RpcError, SimpleRequest, SimpleResponse, StatusCode,
    StreamingInputCallRequest, StreamingInputCallResponse, StreamingOutputCallRequest,
    StreamingOutputCallResponse, SERVICE_PATH,
};

/// TLS settings for a channel
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// PEM-encoded root certificate to trust in addition to the system roots.
    pub root_ca_pem: Option<Vec<u8>>,
    /// Server name to claim (SNI and certificate verification) instead of the target host.
    pub server_host_override: Option<String>,
}

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the test server.
    pub target: String,
    /// `None` for plaintext.
    pub tls: Option<TlsConfig>,
}

impl ClientConfig {
    pub fn insecure(target: impl Into<String>) -> Self {
        Self { target: target.into(), tls: None }
    }
}

/// A connection pool to one target. Cloning is cheap and clones share the pool, so every
/// stub created from the same channel multiplexes over the same connections.
#[derive(Debug, Clone)]
pub struct Channel {
    pub config: ClientConfig,
    base_url: String,
    http_client: reqwest::Client,
}

impl Channel {
    /// Build a channel for `config`. Resolves the target only when a TLS server-name
    /// override is set; otherwise connections are established lazily.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        let mut authority = config.target.clone();

        if let Some(tls) = &config.tls {
            if let Some(pem) = &tls.root_ca_pem {
                let cert = reqwest::Certificate::from_pem(pem)
                    .map_err(|e| RpcError::Network(format!("invalid root certificate: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            if let Some(name) = &tls.server_host_override {
                let addr = resolve(&config.target).await?;
                builder = builder.resolve(name, addr);
                authority = format!("{}:{}", name, addr.port());
            }
        }

        let scheme = if config.tls.is_some() { "https" } else { "http" };
        let http_client = builder
            .build()
            .map_err(|e| RpcError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: format!("{scheme}://{authority}"),
            config,
            http_client,
        })
    }

    /// Base URL every call on this channel is issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wait until the target accepts TCP connections or `timeout` elapses.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RpcError::Timeout(format!(
                    "{} not ready within {:?}",
                    self.config.target, timeout
                )));
            }
            let probe = Duration::min(remaining, Duration::from_millis(200));
            let attempt = tokio::time::timeout(probe, tokio::net::TcpStream::connect(&self.config.target)).await;
            if let Ok(Ok(_)) = attempt {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

async fn resolve(target: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(target)
        .await
        .map_err(|e| RpcError::Network(format!("cannot resolve {target}: {e}")))?
        .next()
        .ok_or_else(|| RpcError::Network(format!("{target} resolved to no addresses")))
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Client-side deadline; exceeding it fails the call with `DEADLINE_EXCEEDED`.
    pub timeout: Option<Duration>,
    /// Extra request headers sent as call metadata.
    pub metadata: Vec<(String, String)>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout), ..Default::default() }
    }
}

/// A successful reply plus the response metadata.
#[derive(Debug, Clone)]
pub struct Reply<T> {
    pub message: T,
    pub metadata: HeaderMap,
}

/// Test-service stub
#[derive(Debug, Clone)]
pub struct TestServiceClient {
    channel: Channel,
}

impl TestServiceClient {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Build the URL for a method path such as `/testing.TestService/UnaryCall`.
    pub fn build_method_url(&self, path: &str) -> String {
        format!("{}{}", self.channel.base_url, path)
    }

    pub async fn empty_call(&self, options: &CallOptions) -> Result<Reply<Empty>> {
        self.invoke(&service_method("EmptyCall"), &Empty {}, options).await
    }

    pub async fn unary_call(&self, request: &SimpleRequest, options: &CallOptions) -> Result<Reply<SimpleResponse>> {
        self.invoke(&service_method("UnaryCall"), request, options).await
    }

    pub async fn streaming_output_call(
        &self,
        request: &StreamingOutputCallRequest,
        options: &CallOptions,
    ) -> Result<Reply<Vec<StreamingOutputCallResponse>>> {
        self.invoke(&service_method("StreamingOutputCall"), request, options).await
    }

    pub async fn streaming_input_call(
        &self,
        requests: &[StreamingInputCallRequest],
        options: &CallOptions,
    ) -> Result<Reply<StreamingInputCallResponse>> {
        self.invoke(&service_method("StreamingInputCall"), requests, options).await
    }

    pub async fn full_duplex_call(
        &self,
        requests: &[StreamingOutputCallRequest],
        options: &CallOptions,
    ) -> Result<Reply<Vec<StreamingOutputCallResponse>>> {
        self.invoke(&service_method("FullDuplexCall"), requests, options).await
    }

    /// Call a method the test service does not define.
    pub async fn unimplemented_call(&self, options: &CallOptions) -> Result<Reply<Empty>> {
        self.invoke(&service_method("UnimplementedCall"), &Empty {}, options).await
    }

    /// Issue one call: POST `request` as JSON to `path` and decode the reply.
    pub async fn invoke<Req, Resp>(&self, path: &str, request: &Req, options: &CallOptions) -> Result<Reply<Resp>>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.build_method_url(path);

        let mut builder = self.channel.http_client.post(&url).json(request);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        for (key, value) in &options.metadata {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        let metadata = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(parse_error_response(status, &body));
        }

        let message = serde_json::from_slice(&body).map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok(Reply { message, metadata })
    }
}

fn service_method(method: &str) -> String {
    format!("{SERVICE_PATH}/{method}")
}

fn transport_error(e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout(e.to_string())
    } else {
        RpcError::Network(e.to_string())
    }
}

fn parse_error_response(status: reqwest::StatusCode, body: &[u8]) -> RpcError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(envelope) => envelope.into(),
        Err(_) => {
            tracing::debug!(%status, "error reply without a status envelope");
            RpcError::status(StatusCode::Unknown, format!("Server returned status: {}", status))
        }
    }
}
