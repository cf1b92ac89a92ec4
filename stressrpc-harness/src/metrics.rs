use std::time::Duration;

use crate::histogram::HistogramSnapshot;

/// End-of-run numbers for the report.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub runners: usize,
    /// Successful calls across all runners.
    pub completed_calls: u64,
    pub elapsed: Duration,
    /// Histogram contents at the end of the run. Covers only the samples recorded since the
    /// metrics endpoint last reset it.
    pub latency: HistogramSnapshot,
}

impl RunSummary {
    pub fn p50_ns(&self) -> f64 {
        self.latency.percentile(50.0)
    }

    pub fn p99_ns(&self) -> f64 {
        self.latency.percentile(99.0)
    }

    pub fn mean_ns(&self) -> f64 {
        self.latency.mean()
    }

    pub fn throughput_qps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.completed_calls as f64 / secs
    }
}
