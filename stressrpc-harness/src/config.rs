use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StressError};
use crate::selector::WeightedTestCases;

/// Latency histogram resolution: each bucket is 1% wider than the previous one.
pub const HISTOGRAM_RESOLUTION: f64 = 0.01;

/// Largest latency the histogram distinguishes (60 s, in nanoseconds).
pub const HISTOGRAM_MAX_POSSIBLE: f64 = 60e9;

/// How long runners get to finish their current call after the stop signal is set.
pub const JOIN_GRACE: Duration = Duration::from_secs(30);

/// How long each channel may take before its target accepts connections.
pub const CHANNEL_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Port the metrics endpoint listens on when none is given.
pub const DEFAULT_METRICS_PORT: u16 = 8081;

/// TLS settings shared by every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// Trust the test CA at `ca_file` instead of only the system roots.
    pub use_test_ca: bool,
    pub ca_file: PathBuf,
    /// Server name to claim during the handshake.
    pub server_host_override: Option<String>,
}

/// Everything the coordinator needs to drive one stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// `host:port` of every server under test.
    pub targets: Vec<String>,
    pub test_cases: WeightedTestCases,
    /// `None` runs until a runner fails or the process is interrupted.
    pub duration: Option<Duration>,
    pub channels_per_server: usize,
    pub stubs_per_channel: usize,
    /// 0 binds an ephemeral port.
    pub metrics_port: u16,
    /// `None` for plaintext channels.
    pub tls: Option<TlsOptions>,
}

impl StressConfig {
    /// Number of runners this config spawns.
    pub fn runner_count(&self) -> usize {
        self.targets.len() * self.channels_per_server * self.stubs_per_channel
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(StressError::config("at least one server address is required"));
        }
        if let Some(bad) = self.targets.iter().find(|t| !is_host_port(t)) {
            return Err(StressError::config(format!("server address {bad:?} is not host:port")));
        }
        if self.channels_per_server == 0 {
            return Err(StressError::config("num_channels_per_server must be positive"));
        }
        if self.stubs_per_channel == 0 {
            return Err(StressError::config("num_stubs_per_channel must be positive"));
        }
        Ok(())
    }
}

/// Split a comma-separated `host:port` list, dropping surrounding whitespace and empty items.
pub fn parse_targets(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Negative seconds mean "run until stopped".
pub fn duration_from_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs).ok().map(Duration::from_secs)
}

/// Convert a signed count flag, rejecting zero and negatives.
pub fn positive_count(name: &str, value: i64) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| StressError::config(format!("{name} must be positive, got {value}")))
}

fn is_host_port(target: &str) -> bool {
    match target.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
