use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe latency recorder with logarithmic buckets.
///
/// Bucket `i` covers `[(1 + resolution)^i, (1 + resolution)^(i + 1))`; samples are clamped to
/// `[0, max_possible]`, and everything below 1 lands in bucket 0. All state lives behind one
/// mutex so a snapshot never observes half of a `record`.
pub struct Histogram {
    resolution: f64,
    max_possible: f64,
    multiplier_ln: f64,
    inner: Mutex<Counters>,
}

#[derive(Clone)]
struct Counters {
    count: u64,
    sum: f64,
    sum_of_squares: f64,
    min: f64,
    max: f64,
    buckets: Vec<u64>,
}

impl Counters {
    fn empty(bucket_count: usize, max_possible: f64) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_of_squares: 0.0,
            min: max_possible,
            max: 0.0,
            buckets: vec![0; bucket_count],
        }
    }
}

/// Point-in-time view of a [`Histogram`].
///
/// `min` and `max` are only meaningful when `count > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub sum_of_squares: f64,
    pub resolution: f64,
    pub max_possible: f64,
    pub buckets: Vec<u64>,
}

impl Histogram {
    /// # Panics
    ///
    /// If `resolution` or `max_possible` is not strictly positive.
    pub fn new(resolution: f64, max_possible: f64) -> Self {
        assert!(resolution > 0.0, "histogram resolution must be positive");
        assert!(max_possible > 0.0, "histogram max_possible must be positive");
        let multiplier_ln = (1.0 + resolution).ln();
        let bucket_count = bucket_index(max_possible, max_possible, multiplier_ln) + 1;
        Self {
            resolution,
            max_possible,
            multiplier_ln,
            inner: Mutex::new(Counters::empty(bucket_count, max_possible)),
        }
    }

    /// Record one sample. Negative and NaN values are recorded as 0.
    pub fn record(&self, value: f64) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, self.max_possible) };
        let bucket = bucket_index(value, self.max_possible, self.multiplier_ln);

        let mut c = self.lock();
        c.count += 1;
        c.sum += value;
        c.sum_of_squares += value * value;
        c.min = c.min.min(value);
        c.max = c.max.max(value);
        c.buckets[bucket] += 1;
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let c = self.lock();
        self.to_snapshot(&c)
    }

    /// Clear every counter.
    pub fn reset(&self) {
        let mut c = self.lock();
        *c = Counters::empty(c.buckets.len(), self.max_possible);
    }

    /// Take a snapshot and clear the counters in one critical section, so no sample recorded
    /// in between is lost.
    pub fn snapshot_and_reset(&self) -> HistogramSnapshot {
        let mut c = self.lock();
        let snapshot = self.to_snapshot(&c);
        *c = Counters::empty(c.buckets.len(), self.max_possible);
        snapshot
    }

    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }

    fn to_snapshot(&self, c: &Counters) -> HistogramSnapshot {
        HistogramSnapshot {
            count: c.count,
            min: c.min,
            max: c.max,
            sum: c.sum,
            sum_of_squares: c.sum_of_squares,
            resolution: self.resolution,
            max_possible: self.max_possible,
            buckets: c.buckets.clone(),
        }
    }

    // A panic while holding the lock cannot leave the counters inconsistent: every update is a
    // handful of arithmetic assignments.
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn bucket_index(value: f64, max_possible: f64, multiplier_ln: f64) -> usize {
    let value = value.min(max_possible);
    if value <= 1.0 {
        return 0;
    }
    (value.ln() / multiplier_ln) as usize
}

impl HistogramSnapshot {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let variance = (self.sum_of_squares * n - self.sum * self.sum) / (n * n);
        variance.max(0.0).sqrt()
    }

    /// Approximate `p`-th percentile (`p` in `0..=100`), interpolated inside the bucket that
    /// holds it and clamped to the observed `[min, max]`. Returns 0 when empty.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let multiplier = 1.0 + self.resolution;
        let target = self.count as f64 * p.clamp(0.0, 100.0) / 100.0;
        let mut cumulative = 0.0;
        for (i, &n) in self.buckets.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let next = cumulative + n as f64;
            if next >= target {
                let lower = if i == 0 { 0.0 } else { multiplier.powi(i as i32) };
                let upper = multiplier.powi(i as i32 + 1);
                let fraction = (target - cumulative) / n as f64;
                let value = lower + (upper - lower) * fraction;
                return value.clamp(self.min, self.max);
            }
            cumulative = next;
        }
        self.max
    }

    /// Fold `other` into `self`. Returns `false` (leaving `self` untouched) if the two were
    /// recorded with different bucket parameters.
    pub fn merge(&mut self, other: &HistogramSnapshot) -> bool {
        if self.resolution != other.resolution
            || self.max_possible != other.max_possible
            || self.buckets.len() != other.buckets.len()
        {
            return false;
        }
        if other.count == 0 {
            return true;
        }
        if self.count == 0 {
            self.min = other.min;
            self.max = other.max;
        } else {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
        self.count += other.count;
        self.sum += other.sum;
        self.sum_of_squares += other.sum_of_squares;
        for (mine, theirs) in self.buckets.iter_mut().zip(&other.buckets) {
            *mine += theirs;
        }
        true
    }
}
