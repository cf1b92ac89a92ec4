//! Multi-runner stress harness for the test service.
//!
//! A [`coordinator::Coordinator`] spawns one [`runner::Runner`] per stub. Runners draw test
//! cases from a [`selector::WeightedTestCases`], record call latency into a shared
//! [`histogram::Histogram`], and report the first failure through an
//! [`exception::ExceptionChannel`]. The coordinator stops everyone through a
//! [`stop::StopSignal`] once the time budget elapses or a failure arrives.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod exception;
pub mod histogram;
pub mod interop;
pub mod metrics;
pub mod metrics_client;
pub mod metrics_server;
pub mod runner;
pub mod selector;
pub mod stop;

pub use coordinator::{run, Coordinator, ExitOutcome};
pub use error::{CallError, Result, StressError};
