use stressrpc_common::{RpcError, StatusCode};
use thiserror::Error;

use crate::interop::TestCase;

/// Why a single test-case execution failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The call completed but the response did not satisfy the test case's checks.
    #[error("assertion failed: {0}")]
    Assertion(String),
}

impl CallError {
    /// `true` for outcomes caused by shutdown racing an in-flight call.
    ///
    /// Only a status of exactly `CANCELLED` qualifies; every other failure near shutdown is
    /// still fatal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CallError::Rpc(e) if e.code() == StatusCode::Cancelled)
    }
}

/// Errors surfaced by the stress harness
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StressError {
    /// Invalid startup parameters; raised before any runner is spawned.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A runner's call failed; aborts the whole run.
    #[error("An exception occurred during test {test_case}: {source}")]
    Call {
        test_case: TestCase,
        #[source]
        source: CallError,
    },

    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: RpcError,
    },

    #[error("Metrics endpoint error: {0}")]
    MetricsServer(String),

    #[error("Runner panicked: {0}")]
    RunnerPanicked(String),
}

impl StressError {
    pub fn config(message: impl Into<String>) -> Self {
        StressError::Configuration(message.into())
    }
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, StressError>;
