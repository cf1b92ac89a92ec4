use axum::{
    body::Bytes,
    extract::DefaultBodyLimit,
    http::{HeaderMap, HeaderName, StatusCode as HttpStatus},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use stressrpc_common::{
    EchoStatus, Empty, ErrorResponse, Payload, SimpleRequest, SimpleResponse, StatusCode,
    StreamingInputCallRequest, StreamingInputCallResponse, StreamingOutputCallRequest,
    StreamingOutputCallResponse, ECHO_INITIAL_METADATA_KEY, ECHO_TRAILING_METADATA_KEY,
    MAX_PAYLOAD_SIZE, SERVICE_PATH,
};

pub mod config;
use config::{MAX_REQUEST_BODY, MAX_RESPONSE_INTERVAL};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

/// Test-service server: the load target driven by the stress harness.
pub struct Server {
    config: ServerConfig,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Get the server's configured address
    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    /// Create the application router
    pub fn create_router() -> Router {
        Router::new()
            .route(&method_path("EmptyCall"), post(handle_empty_call))
            .route(&method_path("UnaryCall"), post(handle_unary_call))
            .route(&method_path("StreamingOutputCall"), post(handle_streaming_output_call))
            .route(&method_path("StreamingInputCall"), post(handle_streaming_input_call))
            .route(&method_path("FullDuplexCall"), post(handle_full_duplex_call))
            .fallback(handle_unimplemented)
            .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
    }

    /// Run the server, signalling `ready_tx` with the bound address once accepting connections
    pub async fn run(self, ready_tx: tokio::sync::oneshot::Sender<SocketAddr>) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(ready_tx, std::future::pending()).await
    }

    /// Like [`Server::run`], but stops accepting and drains in-flight calls once `shutdown`
    /// resolves.
    pub async fn run_until(
        self,
        ready_tx: tokio::sync::oneshot::Sender<SocketAddr>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let app = Self::create_router();
        let listener = tokio::net::TcpListener::bind(self.config.address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "test service listening");
        ready_tx.send(local_addr).ok();
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }
}

fn method_path(method: &str) -> String {
    format!("{SERVICE_PATH}/{method}")
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    let status = HttpStatus::from_u16(code.http_status()).unwrap_or(HttpStatus::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse { code, message: message.into() })).into_response()
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|e| error_response(StatusCode::InvalidArgument, format!("Malformed request: {e}")))
}

/// Copy the echo-metadata request headers onto `response`.
fn echo_metadata(headers: &HeaderMap, mut response: Response) -> Response {
    for key in [ECHO_INITIAL_METADATA_KEY, ECHO_TRAILING_METADATA_KEY] {
        if let Some(value) = headers.get(key) {
            response.headers_mut().insert(HeaderName::from_static(key), value.clone());
        }
    }
    response
}

/// Returns the error response for a non-OK echo status, or `None` if the call should succeed.
fn echoed_status(status: Option<&EchoStatus>) -> Option<Response> {
    let status = status?;
    let code = StatusCode::from_i32(status.code);
    if code == StatusCode::Ok {
        return None;
    }
    Some(error_response(code, status.message.clone()))
}

fn checked_payload(size: usize) -> Result<Payload, Response> {
    if size > MAX_PAYLOAD_SIZE {
        return Err(error_response(
            StatusCode::InvalidArgument,
            format!("Response size exceeds maximum of {} bytes", MAX_PAYLOAD_SIZE),
        ));
    }
    Ok(Payload::zeros(size))
}

fn checked_interval(interval_us: u64) -> Result<Duration, Response> {
    let interval = Duration::from_micros(interval_us);
    if interval > MAX_RESPONSE_INTERVAL {
        return Err(error_response(
            StatusCode::InvalidArgument,
            format!("Response interval exceeds maximum of {:?}", MAX_RESPONSE_INTERVAL),
        ));
    }
    Ok(interval)
}

/// Produce the responses described by one streaming request, sleeping before each.
async fn stream_responses(
    request: &StreamingOutputCallRequest,
    out: &mut Vec<StreamingOutputCallResponse>,
) -> Result<(), Response> {
    for params in &request.response_parameters {
        let interval = checked_interval(params.interval_us)?;
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        out.push(StreamingOutputCallResponse { payload: Some(checked_payload(params.size)?) });
    }
    Ok(())
}

/// Handler for EmptyCall: always answers with an empty message.
pub async fn handle_empty_call(headers: HeaderMap, body: Bytes) -> Response {
    if let Err(r) = decode::<Empty>(&body) {
        return r;
    }
    echo_metadata(&headers, Json(Empty {}).into_response())
}

/// Handler for UnaryCall: answers with `response_size` zero bytes, or the echo status.
pub async fn handle_unary_call(headers: HeaderMap, body: Bytes) -> Response {
    let request: SimpleRequest = match decode(&body) {
        Ok(r) => r,
        Err(r) => return r,
    };

    if let Some(r) = echoed_status(request.response_status.as_ref()) {
        return echo_metadata(&headers, r);
    }

    let payload = match checked_payload(request.response_size) {
        Ok(p) => p,
        Err(r) => return r,
    };
    echo_metadata(&headers, Json(SimpleResponse { payload: Some(payload) }).into_response())
}

/// Handler for StreamingOutputCall: one response per `response_parameters` entry.
pub async fn handle_streaming_output_call(headers: HeaderMap, body: Bytes) -> Response {
    let request: StreamingOutputCallRequest = match decode(&body) {
        Ok(r) => r,
        Err(r) => return r,
    };

    let mut responses = Vec::with_capacity(request.response_parameters.len());
    if let Err(r) = stream_responses(&request, &mut responses).await {
        return r;
    }
    if let Some(r) = echoed_status(request.response_status.as_ref()) {
        return echo_metadata(&headers, r);
    }
    echo_metadata(&headers, Json(responses).into_response())
}

/// Handler for StreamingInputCall: reports the total payload size of the request sequence.
pub async fn handle_streaming_input_call(body: Bytes) -> Response {
    let requests: Vec<StreamingInputCallRequest> = match decode(&body) {
        Ok(r) => r,
        Err(r) => return r,
    };

    let aggregated_payload_size = requests
        .iter()
        .filter_map(|r| r.payload.as_ref())
        .map(|p| p.body.len())
        .sum();
    Json(StreamingInputCallResponse { aggregated_payload_size }).into_response()
}

/// Handler for FullDuplexCall: answers each request in order; the first request carrying a
/// non-OK echo status ends the call with that status.
pub async fn handle_full_duplex_call(headers: HeaderMap, body: Bytes) -> Response {
    let requests: Vec<StreamingOutputCallRequest> = match decode(&body) {
        Ok(r) => r,
        Err(r) => return r,
    };

    let mut responses = Vec::new();
    for request in &requests {
        if let Some(r) = echoed_status(request.response_status.as_ref()) {
            return echo_metadata(&headers, r);
        }
        if let Err(r) = stream_responses(request, &mut responses).await {
            return r;
        }
    }
    echo_metadata(&headers, Json(responses).into_response())
}

/// Fallback for any path the test service does not implement.
pub async fn handle_unimplemented(uri: axum::http::Uri) -> Response {
    tracing::debug!(path = %uri.path(), "unimplemented method requested");
    error_response(StatusCode::Unimplemented, format!("Method not found: {}", uri.path()))
}
