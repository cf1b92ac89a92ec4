use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;

use crate::error::StressError;
use crate::exception::ExceptionChannel;
use crate::histogram::Histogram;
use crate::interop::CaseExecutor;
use crate::selector::WeightedTestCases;
use crate::stop::StopSignal;

/// How a runner's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Observed the stop signal, or a call was cancelled by shutdown.
    Stopped,
    /// A call failed; the error went to the exception channel (unless one was already there).
    Failed,
}

/// What a runner returns when its loop ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerExit {
    pub state: RunnerState,
    /// Calls that succeeded and were recorded into the histogram.
    pub completed_calls: u64,
}

/// Everything runners share with each other and with the coordinator.
#[derive(Clone)]
pub struct Shared {
    pub histogram: Arc<Histogram>,
    pub exceptions: ExceptionChannel,
    pub stop: StopSignal,
    pub test_cases: Arc<WeightedTestCases>,
}

/// One concurrently scheduled unit issuing calls through its own stub.
pub struct Runner<E> {
    id: usize,
    executor: E,
    shared: Shared,
    rng: StdRng,
}

impl<E: CaseExecutor> Runner<E> {
    pub fn new(id: usize, executor: E, shared: Shared) -> Self {
        Self { id, executor, shared, rng: StdRng::from_entropy() }
    }

    /// Use a fixed seed for test-case selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Loop until the stop signal is observed or a call fails.
    pub async fn run(mut self) -> RunnerExit {
        let mut completed_calls: u64 = 0;
        tracing::debug!(runner = self.id, "runner started");

        while !self.shared.stop.is_set() {
            // Yields once the task's budget is spent, even if calls complete without suspending.
            tokio::task::consume_budget().await;

            let case = self.shared.test_cases.pick(&mut self.rng);

            let call_start = Instant::now();
            let result = self.executor.execute(case).await;
            let elapsed = call_start.elapsed();

            match result {
                Ok(()) => {
                    self.shared.histogram.record(elapsed.as_nanos() as f64);
                    completed_calls += 1;
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(runner = self.id, test_case = %case, "call cancelled, stopping");
                    return RunnerExit { state: RunnerState::Stopped, completed_calls };
                }
                Err(e) => {
                    tracing::error!(runner = self.id, test_case = %case, error = %e, "test case failed");
                    let accepted = self.shared.exceptions.report(StressError::Call { test_case: case, source: e });
                    if !accepted {
                        tracing::debug!(runner = self.id, "an earlier failure is already reported; dropping this one");
                    }
                    return RunnerExit { state: RunnerState::Failed, completed_calls };
                }
            }
        }

        tracing::debug!(runner = self.id, completed_calls, "runner stopped");
        RunnerExit { state: RunnerState::Stopped, completed_calls }
    }
}
