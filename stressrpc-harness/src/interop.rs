use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use stressrpc_client::{CallOptions, TestServiceClient};
use stressrpc_common::{
    EchoStatus, Payload, ResponseParameters, RpcError, SimpleRequest, StatusCode,
    StreamingInputCallRequest, StreamingOutputCallRequest, StreamingOutputCallResponse,
    ECHO_INITIAL_METADATA_KEY, ECHO_TRAILING_METADATA_KEY,
};

use crate::error::CallError;

/// The predefined exercises a runner can issue, named as in the interop test catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TestCase {
    EmptyUnary,
    LargeUnary,
    ClientStreaming,
    ServerStreaming,
    PingPong,
    EmptyStream,
    StatusCodeAndMessage,
    SpecialStatusMessage,
    CustomMetadata,
    UnimplementedMethod,
    UnimplementedService,
    TimeoutOnSleepingServer,
}

impl TestCase {
    pub const ALL: [TestCase; 12] = [
        TestCase::EmptyUnary,
        TestCase::LargeUnary,
        TestCase::ClientStreaming,
        TestCase::ServerStreaming,
        TestCase::PingPong,
        TestCase::EmptyStream,
        TestCase::StatusCodeAndMessage,
        TestCase::SpecialStatusMessage,
        TestCase::CustomMetadata,
        TestCase::UnimplementedMethod,
        TestCase::UnimplementedService,
        TestCase::TimeoutOnSleepingServer,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_name() == name)
    }

    pub fn as_name(&self) -> &'static str {
        match self {
            TestCase::EmptyUnary => "empty_unary",
            TestCase::LargeUnary => "large_unary",
            TestCase::ClientStreaming => "client_streaming",
            TestCase::ServerStreaming => "server_streaming",
            TestCase::PingPong => "ping_pong",
            TestCase::EmptyStream => "empty_stream",
            TestCase::StatusCodeAndMessage => "status_code_and_message",
            TestCase::SpecialStatusMessage => "special_status_message",
            TestCase::CustomMetadata => "custom_metadata",
            TestCase::UnimplementedMethod => "unimplemented_method",
            TestCase::UnimplementedService => "unimplemented_service",
            TestCase::TimeoutOnSleepingServer => "timeout_on_sleeping_server",
        }
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_name())
    }
}

impl FromStr for TestCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("No test case {s}!"))
    }
}

/// Something a runner can execute test cases against. Implemented by the real stub; tests
/// substitute in-memory executors.
pub trait CaseExecutor: Send + Sync + 'static {
    fn execute(&self, case: TestCase) -> impl Future<Output = Result<(), CallError>> + Send;
}

impl CaseExecutor for TestServiceClient {
    fn execute(&self, case: TestCase) -> impl Future<Output = Result<(), CallError>> + Send {
        run_case(self, case)
    }
}

const LARGE_REQUEST_SIZE: usize = 271_828;
const LARGE_RESPONSE_SIZE: usize = 314_159;
const REQUEST_SIZES: [usize; 4] = [27_182, 8, 1_828, 45_904];
const RESPONSE_SIZES: [usize; 4] = [31_415, 9, 2_653, 58_979];
const STATUS_MESSAGE: &str = "test status message";
const SPECIAL_STATUS_MESSAGE: &str = "\t\ntest with whitespace\r\nand Unicode BMP ☺ and non-BMP 😈\t\n";
const INITIAL_METADATA_VALUE: &str = "test_initial_metadata_value";
const TRAILING_METADATA_VALUE: &str = "ababab";
const SLEEPING_SERVER_DEADLINE: Duration = Duration::from_millis(1);

/// Execute one test case against `client`, validating every reply.
pub async fn run_case(client: &TestServiceClient, case: TestCase) -> Result<(), CallError> {
    let none = CallOptions::default();
    match case {
        TestCase::EmptyUnary => {
            client.empty_call(&none).await?;
        }
        TestCase::LargeUnary => {
            let request = SimpleRequest {
                response_size: LARGE_RESPONSE_SIZE,
                payload: Some(Payload::zeros(LARGE_REQUEST_SIZE)),
                response_status: None,
            };
            let reply = client.unary_call(&request, &none).await?;
            let got = reply.message.payload.map(|p| p.body.len()).unwrap_or(0);
            check_eq("response payload size", LARGE_RESPONSE_SIZE, got)?;
        }
        TestCase::ClientStreaming => {
            let requests: Vec<_> = REQUEST_SIZES
                .iter()
                .map(|&size| StreamingInputCallRequest { payload: Some(Payload::zeros(size)) })
                .collect();
            let reply = client.streaming_input_call(&requests, &none).await?;
            check_eq(
                "aggregated payload size",
                REQUEST_SIZES.iter().sum::<usize>(),
                reply.message.aggregated_payload_size,
            )?;
        }
        TestCase::ServerStreaming => {
            let request = StreamingOutputCallRequest {
                response_parameters: RESPONSE_SIZES
                    .iter()
                    .map(|&size| ResponseParameters { size, interval_us: 0 })
                    .collect(),
                ..Default::default()
            };
            let reply = client.streaming_output_call(&request, &none).await?;
            check_eq("response sizes", RESPONSE_SIZES.to_vec(), payload_sizes(&reply.message))?;
        }
        TestCase::PingPong => {
            // Each round trip carries one request and expects exactly its one response.
            for (&request_size, &response_size) in REQUEST_SIZES.iter().zip(&RESPONSE_SIZES) {
                let request = StreamingOutputCallRequest {
                    response_parameters: vec![ResponseParameters { size: response_size, interval_us: 0 }],
                    payload: Some(Payload::zeros(request_size)),
                    response_status: None,
                };
                let reply = client.full_duplex_call(std::slice::from_ref(&request), &none).await?;
                check_eq("response sizes", vec![response_size], payload_sizes(&reply.message))?;
            }
        }
        TestCase::EmptyStream => {
            let reply = client.full_duplex_call(&[], &none).await?;
            check_eq("response count", 0, reply.message.len())?;
        }
        TestCase::StatusCodeAndMessage => {
            expect_echoed_status(client, STATUS_MESSAGE).await?;
        }
        TestCase::SpecialStatusMessage => {
            expect_echoed_status(client, SPECIAL_STATUS_MESSAGE).await?;
        }
        TestCase::CustomMetadata => {
            let options = CallOptions {
                timeout: None,
                metadata: vec![
                    (ECHO_INITIAL_METADATA_KEY.to_string(), INITIAL_METADATA_VALUE.to_string()),
                    (ECHO_TRAILING_METADATA_KEY.to_string(), TRAILING_METADATA_VALUE.to_string()),
                ],
            };
            let request = SimpleRequest {
                response_size: LARGE_RESPONSE_SIZE,
                payload: Some(Payload::zeros(LARGE_REQUEST_SIZE)),
                response_status: None,
            };
            let reply = client.unary_call(&request, &options).await?;
            let header = |key: &str| {
                reply.metadata.get(key).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string()
            };
            check_eq("initial metadata", INITIAL_METADATA_VALUE.to_string(), header(ECHO_INITIAL_METADATA_KEY))?;
            check_eq("trailing metadata", TRAILING_METADATA_VALUE.to_string(), header(ECHO_TRAILING_METADATA_KEY))?;
        }
        TestCase::UnimplementedMethod => {
            expect_code(client.unimplemented_call(&none).await.map(|_| ()), StatusCode::Unimplemented)?;
        }
        TestCase::UnimplementedService => {
            let result = client
                .invoke::<_, stressrpc_common::Empty>(
                    "/testing.UnimplementedService/UnimplementedCall",
                    &stressrpc_common::Empty {},
                    &none,
                )
                .await;
            expect_code(result.map(|_| ()), StatusCode::Unimplemented)?;
        }
        TestCase::TimeoutOnSleepingServer => {
            let request = StreamingOutputCallRequest {
                response_parameters: vec![ResponseParameters { size: 1, interval_us: 1_000_000 }],
                payload: Some(Payload::zeros(REQUEST_SIZES[0])),
                response_status: None,
            };
            let result = client
                .streaming_output_call(&request, &CallOptions::with_timeout(SLEEPING_SERVER_DEADLINE))
                .await;
            expect_code(result.map(|_| ()), StatusCode::DeadlineExceeded)?;
        }
    }
    Ok(())
}

async fn expect_echoed_status(client: &TestServiceClient, message: &str) -> Result<(), CallError> {
    let echo = Some(EchoStatus { code: StatusCode::Unknown.as_i32(), message: message.to_string() });

    let unary = SimpleRequest { response_size: 1, payload: None, response_status: echo.clone() };
    let result = client.unary_call(&unary, &CallOptions::default()).await;
    expect_status(result.map(|_| ()), StatusCode::Unknown, message)?;

    let duplex = StreamingOutputCallRequest { response_status: echo, ..Default::default() };
    let result = client.full_duplex_call(std::slice::from_ref(&duplex), &CallOptions::default()).await;
    expect_status(result.map(|_| ()), StatusCode::Unknown, message)
}

fn payload_sizes(responses: &[StreamingOutputCallResponse]) -> Vec<usize> {
    responses
        .iter()
        .map(|r| r.payload.as_ref().map(|p| p.body.len()).unwrap_or(0))
        .collect()
}

fn check_eq<T: PartialEq + fmt::Debug>(what: &str, expected: T, actual: T) -> Result<(), CallError> {
    if expected == actual {
        Ok(())
    } else {
        Err(CallError::Assertion(format!("{what}: expected {expected:?}, got {actual:?}")))
    }
}

/// The call must fail with `code`. A cancelled call is passed through untouched so the runner
/// can classify it.
fn expect_code(result: Result<(), RpcError>, code: StatusCode) -> Result<(), CallError> {
    match result {
        Ok(()) => Err(CallError::Assertion(format!("expected status {code}, call succeeded"))),
        Err(e) if e.code() == code => Ok(()),
        Err(e) if e.code() == StatusCode::Cancelled => Err(e.into()),
        Err(e) => Err(CallError::Assertion(format!("expected status {code}, got {e}"))),
    }
}

fn expect_status(result: Result<(), RpcError>, code: StatusCode, message: &str) -> Result<(), CallError> {
    if let Err(e) = &result {
        if e.code() == code && e.message() != message {
            return Err(CallError::Assertion(format!(
                "expected message {message:?}, got {:?}",
                e.message()
            )));
        }
    }
    expect_code(result, code)
}
