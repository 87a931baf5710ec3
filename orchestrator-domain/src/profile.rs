// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-job-class resource profile: rolling statistics over five dimensions,
//! owned exclusively by the Forecaster.

use serde::{Deserialize, Serialize};

/// Rolling statistics for one dimension. Updated incrementally as new
/// observations arrive; never recomputed from raw history.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DimensionStats {
    pub min: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

impl DimensionStats {
    /// Folds one new observation into the running aggregates. Percentiles
    /// are approximated with an exponential nudge toward the new value
    /// rather than recomputed from a retained sample set, matching the
    /// append-only, O(1)-per-sample contract a Profile must honor.
    pub fn observe(&mut self, value: f64, sample_count: u64) {
        if sample_count == 0 {
            self.min = value;
            self.mean = value;
            self.p50 = value;
            self.p95 = value;
            self.p99 = value;
            self.max = value;
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let n = sample_count as f64;
        self.mean += (value - self.mean) / (n + 1.0);
        // Percentile trackers nudge toward the new value at a rate
        // proportional to how far out in the tail they sit, so p99 moves
        // slower than p50 and converges from above for a steady-state
        // distribution.
        self.p50 += (value - self.p50) * 0.5_f64.min(1.0 / (n + 1.0));
        self.p95 += (value - self.p95) * 0.1_f64.min(1.0 / (n + 1.0));
        self.p99 += (value - self.p99) * 0.02_f64.min(1.0 / (n + 1.0));
    }
}

/// Resource statistics accumulated for one job class across the five
/// tracked dimensions, plus a monotonically non-decreasing sample count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub cpu_cores: DimensionStats,
    pub memory_bytes: DimensionStats,
    pub disk_bytes: DimensionStats,
    pub network_mbps: DimensionStats,
    pub duration_ms: DimensionStats,
    sample_count: u64,
}

impl ResourceProfile {
    pub const DEFAULT_MIN_SAMPLES: u64 = 10;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Folds one completed job's actuals into the profile. `sample_count`
    /// only ever grows.
    pub fn record(&mut self, cpu_cores: f64, memory_bytes: f64, disk_bytes: f64, network_mbps: f64, duration_ms: f64) {
        self.cpu_cores.observe(cpu_cores, self.sample_count);
        self.memory_bytes.observe(memory_bytes, self.sample_count);
        self.disk_bytes.observe(disk_bytes, self.sample_count);
        self.network_mbps.observe(network_mbps, self.sample_count);
        self.duration_ms.observe(duration_ms, self.sample_count);
        self.sample_count += 1;
    }

    /// A profile is trusted only once it has accumulated at least
    /// `min_samples` observations; below that, callers should fall back to
    /// a cluster profile or configured defaults.
    pub fn is_trusted(&self, min_samples: u64) -> bool {
        self.sample_count >= min_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_minus_one_is_not_trusted_but_exact_is() {
        let mut profile = ResourceProfile::new();
        for _ in 0..(ResourceProfile::DEFAULT_MIN_SAMPLES - 1) {
            profile.record(1.0, 1024.0, 1024.0, 1.0, 1000.0);
        }
        assert!(!profile.is_trusted(ResourceProfile::DEFAULT_MIN_SAMPLES));

        profile.record(1.0, 1024.0, 1024.0, 1.0, 1000.0);
        assert!(profile.is_trusted(ResourceProfile::DEFAULT_MIN_SAMPLES));
    }

    #[test]
    fn sample_count_never_decreases() {
        let mut profile = ResourceProfile::new();
        let mut last = 0;
        for _ in 0..20 {
            profile.record(1.0, 1.0, 1.0, 1.0, 1.0);
            assert!(profile.sample_count() >= last);
            last = profile.sample_count();
        }
    }

    #[test]
    fn mean_converges_toward_constant_input() {
        let mut profile = ResourceProfile::new();
        for _ in 0..50 {
            profile.record(2.0, 0.0, 0.0, 0.0, 0.0);
        }
        assert!((profile.cpu_cores.mean - 2.0).abs() < 0.01);
    }
}
