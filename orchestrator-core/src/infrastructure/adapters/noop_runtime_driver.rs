// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A `RuntimeDriver` that never talks to a real container engine. Used in
//! tests and as the degraded-mode driver the Orchestrator falls back to
//! when the configured driver is unreachable: slots are tracked in memory,
//! `stats` returns a zeroed first-sample, and traffic shaping is reported
//! unsupported so the Enforcer's bandwidth fallback engages.

use async_trait::async_trait;
use parking_lot::RwLock;
use runner_orchestrator_domain::ids::{ContainerId, HostId};
use runner_orchestrator_domain::limits::ResourceLimitRecord;
use runner_orchestrator_domain::ports::{RuntimeDriver, RuntimeError, SlotSpec};
use runner_orchestrator_domain::sample::Sample;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
struct TrackedSlot {
    host_id: HostId,
}

#[derive(Default)]
pub struct NoopRuntimeDriver {
    slots: RwLock<HashMap<ContainerId, TrackedSlot>>,
}

impl NoopRuntimeDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuntimeDriver for NoopRuntimeDriver {
    async fn create_slot(&self, spec: &SlotSpec, _deadline: Duration) -> Result<ContainerId, RuntimeError> {
        let id = ContainerId::new();
        self.slots.write().insert(id, TrackedSlot { host_id: spec.host_id });
        Ok(id)
    }

    async fn apply_limits(
        &self,
        slot_id: ContainerId,
        _limits: &ResourceLimitRecord,
        _deadline: Duration,
    ) -> Result<(), RuntimeError> {
        if self.slots.read().contains_key(&slot_id) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound)
        }
    }

    async fn stats(&self, slot_id: ContainerId, _deadline: Duration) -> Result<Sample, RuntimeError> {
        let host_id = self.slots.read().get(&slot_id).map(|s| s.host_id).ok_or(RuntimeError::NotFound)?;
        let mut sample = Sample::container(host_id, slot_id, chrono::Utc::now());
        sample.first_sample = true;
        sample.cpu_pct = Some(0.0);
        Ok(sample)
    }

    async fn exec(&self, slot_id: ContainerId, _cmd: &[String], _deadline: Duration) -> Result<(), RuntimeError> {
        if self.slots.read().contains_key(&slot_id) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound)
        }
    }

    async fn stop(&self, slot_id: ContainerId, _force: bool, _deadline: Duration) -> Result<(), RuntimeError> {
        if self.slots.read().contains_key(&slot_id) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound)
        }
    }

    async fn destroy(&self, slot_id: ContainerId, _deadline: Duration) -> Result<(), RuntimeError> {
        self.slots.write().remove(&slot_id);
        Ok(())
    }

    fn supports_traffic_shaping(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_stats_round_trips_host() {
        let driver = NoopRuntimeDriver::new();
        let spec = SlotSpec { host_id: HostId::new(), image: "runner:latest".into(), labels: vec![] };
        let slot_id = driver.create_slot(&spec, Duration::from_secs(1)).await.unwrap();

        let sample = driver.stats(slot_id, Duration::from_secs(1)).await.unwrap();
        assert!(sample.first_sample);
    }

    #[tokio::test]
    async fn destroy_then_stats_is_not_found() {
        let driver = NoopRuntimeDriver::new();
        let spec = SlotSpec { host_id: HostId::new(), image: "runner:latest".into(), labels: vec![] };
        let slot_id = driver.create_slot(&spec, Duration::from_secs(1)).await.unwrap();
        driver.destroy(slot_id, Duration::from_secs(1)).await.unwrap();

        let result = driver.stats(slot_id, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(RuntimeError::NotFound)));
    }
}
