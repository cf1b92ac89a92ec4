use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stressrpc_client::{Channel, ClientConfig, TestServiceClient, TlsConfig};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinSet};

use crate::config::{
    StressConfig, TlsOptions, CHANNEL_READY_TIMEOUT, HISTOGRAM_MAX_POSSIBLE, HISTOGRAM_RESOLUTION,
    JOIN_GRACE,
};
use crate::error::{Result, StressError};
use crate::exception::ExceptionChannel;
use crate::histogram::Histogram;
use crate::interop::CaseExecutor;
use crate::metrics::RunSummary;
use crate::metrics_server::MetricsServer;
use crate::runner::{Runner, RunnerExit, Shared};
use crate::stop::StopSignal;

/// How long the metrics endpoint gets to drain after the run.
const METRICS_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Result of a run that got as far as spawning runners.
#[derive(Debug)]
pub enum ExitOutcome {
    Success(RunSummary),
    /// The first fatal error any runner reported.
    Failure { error: StressError, summary: RunSummary },
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success(_))
    }

    pub fn summary(&self) -> &RunSummary {
        match self {
            ExitOutcome::Success(summary) | ExitOutcome::Failure { summary, .. } => summary,
        }
    }

    pub fn error(&self) -> Option<&StressError> {
        match self {
            ExitOutcome::Success(_) => None,
            ExitOutcome::Failure { error, .. } => Some(error),
        }
    }

    /// Process exit code: 0 on success, 1 on a runner failure.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Why the coordinator stopped waiting.
#[derive(Debug)]
enum Wake {
    Elapsed,
    Failed,
    Interrupted,
    AllRunnersExited,
}

/// Spawns one runner per executor, waits for the time budget or the first failure, then stops
/// and joins every runner.
pub struct Coordinator<E> {
    executors: Vec<E>,
    duration: Option<Duration>,
    metrics_port: u16,
    join_grace: Duration,
    handle_interrupt: bool,
    shared: Shared,
}

impl Coordinator<TestServiceClient> {
    /// Validate `config`, open `channels_per_server` channels to every target, wait for each
    /// to become ready, and create `stubs_per_channel` stubs on each.
    pub async fn connect(config: &StressConfig) -> Result<Self> {
        Self::connect_with_ready_timeout(config, CHANNEL_READY_TIMEOUT).await
    }

    /// Like [`Coordinator::connect`], failing with [`StressError::Connect`] if a channel's
    /// target does not accept connections within `ready_timeout`.
    pub async fn connect_with_ready_timeout(config: &StressConfig, ready_timeout: Duration) -> Result<Self> {
        config.validate()?;
        let tls = config.tls.as_ref().map(load_tls).transpose()?;

        let mut stubs = Vec::with_capacity(config.runner_count());
        for target in &config.targets {
            for _ in 0..config.channels_per_server {
                let client_config = ClientConfig { target: target.clone(), tls: tls.clone() };
                let connect_error = |source| StressError::Connect { target: target.clone(), source };

                let channel = Channel::connect(client_config).await.map_err(connect_error)?;
                channel.wait_for_ready(ready_timeout).await.map_err(connect_error)?;
                tracing::debug!(%target, "channel ready");

                for _ in 0..config.stubs_per_channel {
                    stubs.push(TestServiceClient::new(channel.clone()));
                }
            }
        }
        Self::new(config, stubs)
    }
}

impl<E: CaseExecutor> Coordinator<E> {
    /// Build a coordinator that drives `executors`, one runner each.
    pub fn new(config: &StressConfig, executors: Vec<E>) -> Result<Self> {
        config.validate()?;
        if executors.is_empty() {
            return Err(StressError::config("no runners to start"));
        }
        let shared = Shared {
            histogram: Arc::new(Histogram::new(HISTOGRAM_RESOLUTION, HISTOGRAM_MAX_POSSIBLE)),
            exceptions: ExceptionChannel::new(),
            stop: StopSignal::new(),
            test_cases: Arc::new(config.test_cases.clone()),
        };
        Ok(Self {
            executors,
            duration: config.duration,
            metrics_port: config.metrics_port,
            join_grace: JOIN_GRACE,
            handle_interrupt: false,
            shared,
        })
    }

    /// Override how long runners get to finish after the stop signal.
    pub fn with_join_grace(mut self, grace: Duration) -> Self {
        self.join_grace = grace;
        self
    }

    /// Also stop (successfully) on Ctrl-C.
    pub fn with_interrupt_handling(mut self) -> Self {
        self.handle_interrupt = true;
        self
    }

    pub fn histogram(&self) -> Arc<Histogram> {
        self.shared.histogram.clone()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.shared.stop.clone()
    }

    pub fn exceptions(&self) -> ExceptionChannel {
        self.shared.exceptions.clone()
    }

    pub fn runner_count(&self) -> usize {
        self.executors.len()
    }

    /// Drive the run to completion. `metrics_ready`, if given, receives the metrics
    /// endpoint's bound address before any runner starts.
    pub async fn run(self, metrics_ready: Option<oneshot::Sender<SocketAddr>>) -> Result<ExitOutcome> {
        let metrics = MetricsServer::bind(self.metrics_port, self.shared.histogram.clone()).await?;
        let metrics_addr = metrics.local_addr()?;
        let metrics_stop = StopSignal::new();
        let mut metrics_task = {
            let stop = metrics_stop.clone();
            tokio::spawn(metrics.serve(async move { stop.wait().await }))
        };
        tracing::info!(%metrics_addr, "metrics endpoint listening");
        if let Some(tx) = metrics_ready {
            tx.send(metrics_addr).ok();
        }

        let started = Instant::now();
        let runner_count = self.executors.len();
        let mut runners = JoinSet::new();
        for (id, executor) in self.executors.into_iter().enumerate() {
            runners.spawn(Runner::new(id, executor, self.shared.clone()).run());
        }
        tracing::info!(runners = runner_count, duration = ?self.duration, "stress run started");

        let mut exits = Vec::with_capacity(runner_count);
        let wake = {
            let exceptions = &self.shared.exceptions;
            let duration = self.duration;
            let handle_interrupt = self.handle_interrupt;
            tokio::select! {
                biased;
                _ = exceptions.wait() => Wake::Failed,
                _ = drain(&mut runners, &mut exits, exceptions) => Wake::AllRunnersExited,
                _ = sleep_for(duration) => Wake::Elapsed,
                _ = interrupted(handle_interrupt) => Wake::Interrupted,
            }
        };
        tracing::info!(reason = ?wake, elapsed = ?started.elapsed(), "stopping runners");
        self.shared.stop.set();

        let joined = tokio::time::timeout(
            self.join_grace,
            drain(&mut runners, &mut exits, &self.shared.exceptions),
        )
        .await;
        if joined.is_err() {
            tracing::warn!(
                remaining = runners.len(),
                grace = ?self.join_grace,
                "runners still busy after the grace period; aborting them"
            );
            runners.abort_all();
            drain(&mut runners, &mut exits, &self.shared.exceptions).await;
        }
        let elapsed = started.elapsed();

        metrics_stop.set();
        match tokio::time::timeout(METRICS_SHUTDOWN_GRACE, &mut metrics_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "metrics endpoint failed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "metrics endpoint task failed"),
            Err(_) => {
                tracing::warn!("metrics endpoint did not shut down in time");
                metrics_task.abort();
            }
        }

        let summary = RunSummary {
            runners: runner_count,
            completed_calls: exits.iter().map(|e| e.completed_calls).sum(),
            elapsed,
            latency: self.shared.histogram.snapshot(),
        };

        Ok(match self.shared.exceptions.get() {
            Some(error) => ExitOutcome::Failure { error: error.clone(), summary },
            None => ExitOutcome::Success(summary),
        })
    }
}

/// Validate `config`, connect, and run to completion.
pub async fn run(config: &StressConfig) -> Result<ExitOutcome> {
    Coordinator::connect(config).await?.run(None).await
}

/// Join runners until the set is empty. Cancel-safe: results already joined stay in `exits`.
/// A panicked runner counts as a fatal error.
async fn drain(runners: &mut JoinSet<RunnerExit>, exits: &mut Vec<RunnerExit>, exceptions: &ExceptionChannel) {
    while let Some(joined) = runners.join_next().await {
        match joined {
            Ok(exit) => exits.push(exit),
            Err(e) if e.is_panic() => {
                let message = panic_message(e);
                tracing::error!(%message, "runner panicked");
                exceptions.report(StressError::RunnerPanicked(message));
            }
            Err(_) => {}
        }
    }
}

fn panic_message(e: JoinError) -> String {
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

async fn interrupted(enabled: bool) {
    if enabled && tokio::signal::ctrl_c().await.is_ok() {
        return;
    }
    std::future::pending().await
}

fn load_tls(options: &TlsOptions) -> Result<TlsConfig> {
    let root_ca_pem = if options.use_test_ca {
        let pem = std::fs::read(&options.ca_file).map_err(|e| {
            StressError::config(format!("cannot read test CA {}: {e}", options.ca_file.display()))
        })?;
        Some(pem)
    } else {
        None
    };
    Ok(TlsConfig { root_ca_pem, server_host_override: options.server_host_override.clone() })
}
