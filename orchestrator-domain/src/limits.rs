// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The Resource Limit Record: the Enforcer's one-per-container record of
//! the bounds applied across CPU, memory, storage, and network.

use crate::error::OrchestratorError;
use crate::value_objects::{MemorySize, NetworkSize, StorageSize};
use serde::{Deserialize, Serialize};

/// `swap = -1` is read as "2x limit" per the resolved Open Question (see
/// the design ledger): the source's own config comments disagreed with its
/// code, and this crate picks the interpretation its code actually acted
/// on.
pub const SWAP_UNLIMITED_SENTINEL: i64 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CpuLimits {
    pub shares: u32,
    pub quota_micros: u64,
    pub period_micros: u64,
    pub pin_set: Option<u64>,
}

impl CpuLimits {
    /// CPU cores implied by `quota / period`.
    pub fn cores(&self) -> f64 {
        if self.period_micros == 0 {
            0.0
        } else {
            self.quota_micros as f64 / self.period_micros as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryLimits {
    pub limit: MemorySize,
    pub reservation: MemorySize,
    /// Encodes the swap ceiling in bytes, or `SWAP_UNLIMITED_SENTINEL`
    /// meaning 2x `limit`.
    pub swap_bytes: i64,
    pub oom_kill_disable: bool,
}

impl MemoryLimits {
    pub fn effective_swap_bytes(&self) -> u64 {
        if self.swap_bytes == SWAP_UNLIMITED_SENTINEL {
            self.limit.bytes().saturating_mul(2)
        } else {
            self.swap_bytes.max(0) as u64
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StorageLimits {
    pub disk: StorageSize,
    pub inodes: u64,
    pub workspace_quota: StorageSize,
    pub temp_quota: StorageSize,
    pub cache_quota: StorageSize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NetworkLimits {
    pub ingress: NetworkSize,
    pub egress: NetworkSize,
    pub burst_bytes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimitRecord {
    pub cpu: CpuLimits,
    pub memory: MemoryLimits,
    pub storage: StorageLimits,
    pub network: NetworkLimits,
    pub pids_limit: u32,
    pub io_weight: u16,
}

impl ResourceLimitRecord {
    /// Validates the cross-field invariants a record must satisfy before
    /// the Enforcer will accept it: `reservation <= limit`,
    /// `quota <= period * max_cpus`, and the swap sentinel/range rule.
    pub fn validate(&self, max_cpus: f64) -> Result<(), OrchestratorError> {
        if self.memory.reservation.bytes() > self.memory.limit.bytes() {
            return Err(OrchestratorError::invalid_limits("memory reservation exceeds limit"));
        }
        let max_quota = (self.cpu.period_micros as f64 * max_cpus) as u64;
        if self.cpu.quota_micros > max_quota {
            return Err(OrchestratorError::invalid_limits(format!(
                "cpu quota {} exceeds period*maxCpus {}",
                self.cpu.quota_micros, max_quota
            )));
        }
        if self.memory.swap_bytes != SWAP_UNLIMITED_SENTINEL {
            let swap = self.memory.swap_bytes.max(0) as u64;
            if swap < self.memory.limit.bytes() || swap > 2 * self.memory.limit.bytes() {
                return Err(OrchestratorError::invalid_limits(
                    "memory swap must be -1 or within [limit, 2*limit]",
                ));
            }
        }
        Ok(())
    }
}

/// Most recently observed usage per dimension for a container, as returned
/// by `Enforcer::current_usage`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub cpu_cores: f64,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub ingress_bps: u64,
    pub egress_bps: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(quota_micros: u64, period_micros: u64, limit_mb: u64, reservation_mb: u64, swap_bytes: i64) -> ResourceLimitRecord {
        ResourceLimitRecord {
            cpu: CpuLimits { shares: 1024, quota_micros, period_micros, pin_set: None },
            memory: MemoryLimits {
                limit: MemorySize::from_mb(limit_mb).unwrap(),
                reservation: MemorySize::from_mb(reservation_mb).unwrap(),
                swap_bytes,
                oom_kill_disable: false,
            },
            storage: StorageLimits {
                disk: StorageSize::from_gb(10).unwrap(),
                inodes: 1_000_000,
                workspace_quota: StorageSize::from_gb(5).unwrap(),
                temp_quota: StorageSize::from_gb(2).unwrap(),
                cache_quota: StorageSize::from_gb(2).unwrap(),
            },
            network: NetworkLimits {
                ingress: NetworkSize::from_mb(100).unwrap(),
                egress: NetworkSize::from_mb(100).unwrap(),
                burst_bytes: 1024 * 1024,
            },
            pids_limit: 512,
            io_weight: 500,
        }
    }

    #[test]
    fn reservation_over_limit_is_rejected() {
        let r = record(100_000, 100_000, 1024, 2048, SWAP_UNLIMITED_SENTINEL);
        assert!(r.validate(8.0).is_err());
    }

    #[test]
    fn quota_over_period_times_max_cpus_is_rejected() {
        let r = record(900_000, 100_000, 1024, 512, SWAP_UNLIMITED_SENTINEL);
        assert!(r.validate(8.0).is_err());
    }

    #[test]
    fn swap_sentinel_means_double_the_limit() {
        let r = record(100_000, 100_000, 1024, 512, SWAP_UNLIMITED_SENTINEL);
        assert_eq!(r.memory.effective_swap_bytes(), r.memory.limit.bytes() * 2);
        assert!(r.validate(8.0).is_ok());
    }

    #[test]
    fn swap_outside_limit_to_double_limit_range_is_rejected() {
        let r = record(100_000, 100_000, 1024, 512, 1);
        assert!(r.validate(8.0).is_err());
    }
}
