// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Profiler output: one point-in-time observation of host or container
//! resource usage. Missing metric sources are nulled, never fabricated.

use crate::ids::{ContainerId, HostId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub t: chrono::DateTime<chrono::Utc>,
    pub host_id: HostId,
    pub container_id: Option<ContainerId>,
    pub cpu_pct: Option<f64>,
    pub mem_used: Option<u64>,
    pub mem_cache: Option<u64>,
    pub blk_read: Option<u64>,
    pub blk_write: Option<u64>,
    pub net_in: Option<u64>,
    pub net_out: Option<u64>,
    pub pids: Option<u64>,
    /// Set when a container's CPU percentage could not be computed because
    /// the runtime returned no prior snapshot; `cpu_pct` is `Some(0.0)` in
    /// that case rather than a bogus ratio.
    pub first_sample: bool,
}

impl Sample {
    pub fn host(host_id: HostId, t: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            t,
            host_id,
            container_id: None,
            cpu_pct: None,
            mem_used: None,
            mem_cache: None,
            blk_read: None,
            blk_write: None,
            net_in: None,
            net_out: None,
            pids: None,
            first_sample: false,
        }
    }

    pub fn container(host_id: HostId, container_id: ContainerId, t: chrono::DateTime<chrono::Utc>) -> Self {
        Self { container_id: Some(container_id), ..Self::host(host_id, t) }
    }

    /// Memory actually in use, excluding reclaimable page cache:
    /// `usage - cache`.
    pub fn mem_working_set(&self) -> Option<u64> {
        match (self.mem_used, self.mem_cache) {
            (Some(used), Some(cache)) => Some(used.saturating_sub(cache)),
            (Some(used), None) => Some(used),
            _ => None,
        }
    }

    /// Validates the per-sample invariants: `0 <= cpuPct <= 100 *
    /// onlineCpus`, `0 <= memUsed <= memLimit`.
    pub fn validate(&self, online_cpus: u32, mem_limit: Option<u64>) -> bool {
        if let Some(cpu) = self.cpu_pct {
            if !(0.0..=100.0 * online_cpus as f64).contains(&cpu) {
                return false;
            }
        }
        if let (Some(used), Some(limit)) = (self.mem_used, mem_limit) {
            if used > limit {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_has_zero_cpu_not_fabricated_ratio() {
        let mut s = Sample::container(HostId::new(), ContainerId::new(), chrono::Utc::now());
        s.cpu_pct = Some(0.0);
        s.first_sample = true;
        assert_eq!(s.cpu_pct, Some(0.0));
        assert!(s.first_sample);
    }

    #[test]
    fn working_set_subtracts_cache_from_usage() {
        let mut s = Sample::host(HostId::new(), chrono::Utc::now());
        s.mem_used = Some(2048);
        s.mem_cache = Some(512);
        assert_eq!(s.mem_working_set(), Some(1536));
    }

    #[test]
    fn rejects_cpu_pct_above_online_cpus_times_100() {
        let mut s = Sample::host(HostId::new(), chrono::Utc::now());
        s.cpu_pct = Some(250.0);
        assert!(!s.validate(2, None));
        assert!(s.validate(4, None));
    }
}
