use rand::Rng;

use crate::error::{Result, StressError};
use crate::interop::TestCase;

/// Test cases with integer weights, drawn with replacement in proportion to weight.
///
/// For `"empty_unary:1,large_unary:3"` a quarter of draws are `empty_unary` and three quarters
/// `large_unary`. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedTestCases {
    /// In configuration order, each paired with the running total of weights up to and
    /// including it.
    entries: Vec<(TestCase, u64)>,
    total: u64,
}

impl WeightedTestCases {
    /// Build from `(case, weight)` pairs. Fails if the set is empty, any weight is not
    /// positive, or a case appears twice.
    pub fn new(weighted: impl IntoIterator<Item = (TestCase, i64)>) -> Result<Self> {
        let mut entries: Vec<(TestCase, u64)> = Vec::new();
        let mut total: u64 = 0;
        for (case, weight) in weighted {
            if weight <= 0 {
                return Err(StressError::config(format!(
                    "test case {case} has non-positive weight {weight}"
                )));
            }
            if entries.iter().any(|(c, _)| *c == case) {
                return Err(StressError::config(format!("test case {case} listed more than once")));
            }
            total = total
                .checked_add(weight as u64)
                .ok_or_else(|| StressError::config("sum of test case weights overflows"))?;
            entries.push((case, total));
        }
        if entries.is_empty() {
            return Err(StressError::config("at least one test case is required"));
        }
        Ok(Self { entries, total })
    }

    /// Parse a comma-separated `name:weight` list, e.g. `"empty_unary:20,large_unary:80"`.
    ///
    /// Every weight is checked before any name is resolved, so a list with both a bad weight
    /// and an unknown name reports the weight.
    pub fn parse(list: &str) -> Result<Self> {
        let mut named = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, weight) = item
                .split_once(':')
                .ok_or_else(|| StressError::config(format!("test case {item:?} is not name:weight")))?;
            let name = name.trim();
            let weight: i64 = weight
                .trim()
                .parse()
                .map_err(|_| StressError::config(format!("weight {weight:?} of {name} is not an integer")))?;
            if weight <= 0 {
                return Err(StressError::config(format!(
                    "test case {name} has non-positive weight {weight}"
                )));
            }
            named.push((name, weight));
        }

        let mut weighted = Vec::with_capacity(named.len());
        for (name, weight) in named {
            let case = TestCase::from_name(name).ok_or_else(|| StressError::config(format!("No test case {name}!")))?;
            weighted.push((case, weight));
        }
        Self::new(weighted)
    }

    /// Draw a test case using `rng`.
    pub fn pick(&self, rng: &mut impl Rng) -> TestCase {
        let roll = rng.gen_range(0..self.total);
        self.case_for_roll(roll)
    }

    /// Map a roll in `0..total_weight()` to a test case. Rolls at or beyond the total map to
    /// the last case. Exposed for deterministic testing.
    pub fn case_for_roll(&self, roll: u64) -> TestCase {
        let idx = self.entries.partition_point(|&(_, upper)| upper <= roll);
        self.entries[idx.min(self.entries.len() - 1)].0
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    /// `(case, weight)` pairs in configuration order.
    pub fn weights(&self) -> Vec<(TestCase, u64)> {
        let mut previous = 0;
        self.entries
            .iter()
            .map(|&(case, upper)| {
                let weight = upper - previous;
                previous = upper;
                (case, weight)
            })
            .collect()
    }
}
