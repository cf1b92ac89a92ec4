use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Path prefix shared by every test-service method.
pub const SERVICE_PATH: &str = "/testing.TestService";

/// Largest payload the test service will produce or accept (bytes).
pub const MAX_PAYLOAD_SIZE: usize = 4_194_304;

/// Request header whose value the server echoes back as a response header.
pub const ECHO_INITIAL_METADATA_KEY: &str = "x-grpc-test-echo-initial";

/// Request header whose value the server echoes back as a (pseudo-)trailer header.
pub const ECHO_TRAILING_METADATA_KEY: &str = "x-grpc-test-echo-trailing-bin";

/// Status codes carried by failed calls. Numbering follows the usual RPC status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    const ALL: [StatusCode; 17] = [
        StatusCode::Ok,
        StatusCode::Cancelled,
        StatusCode::Unknown,
        StatusCode::InvalidArgument,
        StatusCode::DeadlineExceeded,
        StatusCode::NotFound,
        StatusCode::AlreadyExists,
        StatusCode::PermissionDenied,
        StatusCode::ResourceExhausted,
        StatusCode::FailedPrecondition,
        StatusCode::Aborted,
        StatusCode::OutOfRange,
        StatusCode::Unimplemented,
        StatusCode::Internal,
        StatusCode::Unavailable,
        StatusCode::DataLoss,
        StatusCode::Unauthenticated,
    ];

    /// Numeric value of the code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Code for a numeric value; unknown numbers map to `Unknown`.
    pub fn from_i32(code: i32) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .unwrap_or(StatusCode::Unknown)
    }

    /// HTTP status the server uses when answering with this code.
    pub fn http_status(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Cancelled => 499,
            StatusCode::InvalidArgument | StatusCode::FailedPrecondition | StatusCode::OutOfRange => 400,
            StatusCode::Unauthenticated => 401,
            StatusCode::PermissionDenied => 403,
            StatusCode::NotFound => 404,
            StatusCode::AlreadyExists | StatusCode::Aborted => 409,
            StatusCode::ResourceExhausted => 429,
            StatusCode::Unimplemented => 501,
            StatusCode::Unavailable => 503,
            StatusCode::DeadlineExceeded => 504,
            StatusCode::Unknown | StatusCode::Internal | StatusCode::DataLoss => 500,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        };
        f.write_str(name)
    }
}

/// Error types for calls against the test service
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcError {
    #[error("{code}: {message}")]
    Status { code: StatusCode, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        RpcError::Status { code, message: message.into() }
    }

    /// Status code this error surfaces as. Transport failures surface as `UNAVAILABLE`,
    /// client-side deadlines as `DEADLINE_EXCEEDED`, undecodable replies as `INTERNAL`.
    pub fn code(&self) -> StatusCode {
        match self {
            RpcError::Status { code, .. } => *code,
            RpcError::Network(_) => StatusCode::Unavailable,
            RpcError::Timeout(_) => StatusCode::DeadlineExceeded,
            RpcError::Decode(_) => StatusCode::Internal,
        }
    }

    pub fn message(&self) -> String {
        match self {
            RpcError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// JSON error envelope returned by the server for every failed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: StatusCode,
    pub message: String,
}

impl From<ErrorResponse> for RpcError {
    fn from(r: ErrorResponse) -> Self {
        RpcError::Status { code: r.code, message: r.message }
    }
}

/// Opaque payload; only its size matters to the test cases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Payload {
    /// A payload of `size` zero bytes.
    pub fn zeros(size: usize) -> Self {
        Self { body: vec![0; size] }
    }
}

/// Status the server is asked to answer with instead of a normal reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoStatus {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleRequest {
    #[serde(default)]
    pub response_size: usize,
    #[serde(default)]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub response_status: Option<EchoStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleResponse {
    #[serde(default)]
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingInputCallRequest {
    #[serde(default)]
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingInputCallResponse {
    pub aggregated_payload_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseParameters {
    pub size: usize,
    /// Delay before this response is produced (microseconds).
    #[serde(default)]
    pub interval_us: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingOutputCallRequest {
    #[serde(default)]
    pub response_parameters: Vec<ResponseParameters>,
    #[serde(default)]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub response_status: Option<EchoStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingOutputCallResponse {
    #[serde(default)]
    pub payload: Option<Payload>,
}

/// One named gauge exposed by the stress harness' metrics endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeResponse {
    pub name: String,
    pub long_value: i64,
}

/// Result type for test-service calls
pub type Result<T> = std::result::Result<T, RpcError>;
