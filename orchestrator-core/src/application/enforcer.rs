// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Quota Enforcer: translates a Resource Limit Record into runtime-level
//! controls and keeps containers inside them via a per-(container, dimension)
//! violation state machine.
//!
//! Storage and network quotas have no dedicated runtime port: storage falls
//! back to this Enforcer's own periodic-monitoring enforcement whenever the
//! configured [`StorageBackend`] isn't a native filesystem quota (the usual
//! case, since no filesystem-capability port exists to apply one), and
//! bandwidth follows [`RuntimeDriver::supports_traffic_shaping`] to decide
//! between a native traffic-shaping hook and a CPU-quota-throttle degraded
//! mode.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use runner_orchestrator_domain::error::OrchestratorError;
use runner_orchestrator_domain::ids::ContainerId;
use runner_orchestrator_domain::job::Priority;
use runner_orchestrator_domain::limits::{ResourceLimitRecord, Usage};
use runner_orchestrator_domain::ports::RuntimeDriver;
use runner_orchestrator_domain::sample::Sample;
use runner_orchestrator_domain::violation::{Dimension, ViolationRecord, ViolationState};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::infrastructure::adapters::retry_transient;
use crate::infrastructure::config::{EnforcerConfig, StorageBackend};
use crate::infrastructure::metrics::MetricsService;

/// Total CPU cores and memory bytes available on the host this Enforcer
/// governs. A real deployment feeds this from the `RuntimeDriver`'s host
/// inventory; tests construct it directly.
#[derive(Debug, Clone, Copy)]
pub struct HostCapacity {
    pub cpu_cores: f64,
    pub memory_bytes: u64,
}

/// Floor applied to CPU quota throttling: never reduce below 10% of the
/// originally-applied quota.
const THROTTLE_FLOOR_FRACTION: f64 = 0.10;
const THROTTLE_STEP_FRACTION: f64 = 0.75;
const EVENT_CAPACITY: usize = 256;

pub struct QuotaEnforcer {
    runtime: std::sync::Arc<dyn RuntimeDriver>,
    metrics: std::sync::Arc<MetricsService>,
    config: EnforcerConfig,
    capacity: HostCapacity,

    records: RwLock<HashMap<ContainerId, ResourceLimitRecord>>,
    current_cpu_quota: RwLock<HashMap<ContainerId, u64>>,
    allocated: RwLock<Usage>,
    usage: RwLock<HashMap<ContainerId, Usage>>,
    violations: RwLock<HashMap<(ContainerId, Dimension), ViolationRecord>>,
    events: broadcast::Sender<ViolationRecord>,
}

impl QuotaEnforcer {
    pub fn new(runtime: std::sync::Arc<dyn RuntimeDriver>, metrics: std::sync::Arc<MetricsService>, config: EnforcerConfig, capacity: HostCapacity) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            runtime,
            metrics,
            config,
            capacity,
            records: RwLock::new(HashMap::new()),
            current_cpu_quota: RwLock::new(HashMap::new()),
            allocated: RwLock::new(Usage::default()),
            usage: RwLock::new(HashMap::new()),
            violations: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn on_violation(&self) -> broadcast::Receiver<ViolationRecord> {
        self.events.subscribe()
    }

    /// Idempotent: applying the same container twice releases the prior
    /// allocation before re-admitting, so allocated totals are never
    /// double-counted.
    pub async fn apply(&self, container_id: ContainerId, record: ResourceLimitRecord, deadline: Duration) -> Result<(), OrchestratorError> {
        record.validate(self.capacity.cpu_cores).map_err(|e| OrchestratorError::invalid_limits(e.to_string()))?;

        let required_cpu = record.cpu.cores();
        let required_memory = record.memory.limit.bytes();

        {
            let mut allocated = self.allocated.write();
            if let Some(existing) = self.records.read().get(&container_id) {
                allocated.cpu_cores -= existing.cpu.cores();
                allocated.memory_bytes -= existing.memory.limit.bytes();
            }
            let available_cpu = self.capacity.cpu_cores - allocated.cpu_cores;
            let available_memory = self.capacity.memory_bytes.saturating_sub(allocated.memory_bytes);
            if required_cpu > available_cpu {
                return Err(OrchestratorError::insufficient_capacity(format!(
                    "container {container_id} requires {required_cpu} cpu cores, {available_cpu} available"
                )));
            }
            if required_memory > available_memory {
                return Err(OrchestratorError::insufficient_capacity(format!(
                    "container {container_id} requires {required_memory} memory bytes, {available_memory} available"
                )));
            }
            allocated.cpu_cores += required_cpu;
            allocated.memory_bytes += required_memory;
        }

        retry_transient("enforcer.apply_limits", || self.runtime.apply_limits(container_id, &record, deadline))
            .await
            .map_err(|e| OrchestratorError::component_unhealthy(format!("runtime driver refused apply_limits: {e}")))?;

        self.current_cpu_quota.write().insert(container_id, record.cpu.quota_micros);
        self.records.write().insert(container_id, record);
        self.metrics.increment_quota_applications();
        info!(%container_id, storage_backend = ?self.config.storage_backend, "quota applied");
        Ok(())
    }

    /// Releases all tracked state and decrements allocated totals. Idempotent.
    pub fn remove(&self, container_id: ContainerId) {
        if let Some(record) = self.records.write().remove(&container_id) {
            let mut allocated = self.allocated.write();
            allocated.cpu_cores -= record.cpu.cores();
            allocated.memory_bytes -= record.memory.limit.bytes();
        }
        self.current_cpu_quota.write().remove(&container_id);
        self.usage.write().remove(&container_id);
        self.violations.write().retain(|(c, _), _| *c != container_id);
    }

    /// Re-applies a container's current record with its CPU quota recomputed
    /// from `new_cpu_cores`, for the Optimization Engine's `ScaleUp`/`ScaleDown`
    /// actions. Fails if the container has no active record.
    pub async fn resize_cpu(&self, container_id: ContainerId, new_cpu_cores: f64, deadline: Duration) -> Result<(), OrchestratorError> {
        let Some(mut record) = self.records.read().get(&container_id).copied() else {
            return Err(OrchestratorError::validation(format!("no active quota record for container {container_id}")));
        };
        record.cpu.quota_micros = (new_cpu_cores * record.cpu.period_micros as f64).max(1.0) as u64;
        self.apply(container_id, record, deadline).await
    }

    /// Stops the container through the runtime driver and releases tracked
    /// state regardless of the driver's outcome, so a container that failed
    /// to stop does not linger in this Enforcer's bookkeeping.
    pub async fn stop(&self, container_id: ContainerId, force: bool, deadline: Duration) -> Result<(), OrchestratorError> {
        let result = self
            .runtime
            .stop(container_id, force, deadline)
            .await
            .map_err(|e| OrchestratorError::component_unhealthy(format!("runtime driver refused stop: {e}")));
        self.remove(container_id);
        result
    }

    pub fn current_usage(&self, container_id: ContainerId) -> Usage {
        self.usage.read().get(&container_id).copied().unwrap_or_default()
    }

    /// Applies one new observation for every dimension the sample carries
    /// values for, advancing each (container, dimension) state machine and
    /// emitting a notification per transition (never per observation).
    pub async fn observe(&self, container_id: ContainerId, sample: &Sample) -> Result<(), OrchestratorError> {
        let Some(record) = self.records.read().get(&container_id).copied() else {
            return Ok(());
        };

        let disk_bytes = match (sample.blk_read, sample.blk_write) {
            (None, None) => None,
            (r, w) => Some(r.unwrap_or(0) + w.unwrap_or(0)),
        };
        let network_bytes = match (sample.net_in, sample.net_out) {
            (None, None) => None,
            (i, o) => Some(i.unwrap_or(0) + o.unwrap_or(0)),
        };

        let mut usage = self.usage.write();
        let entry = usage.entry(container_id).or_default();
        if let Some(cpu_pct) = sample.cpu_pct {
            entry.cpu_cores = cpu_pct / 100.0;
        }
        if let Some(working_set) = sample.mem_working_set() {
            entry.memory_bytes = working_set;
        }
        if let Some(disk_bytes) = disk_bytes {
            entry.disk_bytes = disk_bytes;
        }
        if let Some(network_bytes) = network_bytes {
            entry.ingress_bps = sample.net_in.unwrap_or(0);
            entry.egress_bps = sample.net_out.unwrap_or(0);
            let _ = network_bytes;
        }
        drop(usage);

        let observations: [(Dimension, f64, f64); 4] = [
            (Dimension::Cpu, sample.cpu_pct.unwrap_or(0.0) / 100.0, record.cpu.cores()),
            (Dimension::Memory, sample.mem_working_set().unwrap_or(0) as f64, record.memory.limit.bytes() as f64),
            (Dimension::Storage, disk_bytes.unwrap_or(0) as f64, record.storage.disk.bytes() as f64),
            (
                Dimension::Network,
                network_bytes.unwrap_or(0) as f64,
                (record.network.ingress.bytes() + record.network.egress.bytes()) as f64,
            ),
        ];

        for (dimension, observed, limit) in observations {
            self.observe_dimension(container_id, dimension, observed, limit).await?;
        }
        Ok(())
    }

    async fn observe_dimension(&self, container_id: ContainerId, dimension: Dimension, observed: f64, limit: f64) -> Result<(), OrchestratorError> {
        let now = Utc::now();
        let transitioned = {
            let mut violations = self.violations.write();
            let record = violations
                .entry((container_id, dimension))
                .or_insert_with(|| ViolationRecord::new(container_id, dimension, observed, limit, now));
            let transitioned = record.observe(
                observed,
                now,
                self.config.violation_threshold,
                self.config.grace_period_ms as i64 / 1000,
                self.config.kill_on_violation,
            );
            transitioned.then(|| record.clone())
        };

        if let Some(violation) = transitioned {
            self.metrics.record_violation(dimension_label(dimension));
            let _ = self.events.send(violation.clone());
            match violation.state {
                ViolationState::Throttled if dimension == Dimension::Cpu => {
                    self.throttle_cpu(container_id).await?;
                }
                ViolationState::Throttled if dimension == Dimension::Network => {
                    if self.runtime.supports_traffic_shaping() {
                        warn!(%container_id, "network violation throttled via runtime traffic shaping");
                    } else {
                        warn!(%container_id, "runtime has no traffic shaping, falling back to cpu quota throttle");
                        self.throttle_cpu(container_id).await?;
                    }
                }
                ViolationState::Killed => {
                    let _ = self.stop(container_id, true, Duration::from_secs(30)).await;
                }
                ViolationState::Compliant => {
                    self.violations.write().get_mut(&(container_id, dimension)).map(ViolationRecord::reset_on_remediation);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reduces `cpu.quota` by 25% per step, floored at 10% of the originally
    /// applied quota.
    async fn throttle_cpu(&self, container_id: ContainerId) -> Result<(), OrchestratorError> {
        let Some(mut record) = self.records.read().get(&container_id).copied() else {
            return Ok(());
        };
        let original_quota = record.cpu.quota_micros;
        let floor = (original_quota as f64 * THROTTLE_FLOOR_FRACTION) as u64;
        let current = self.current_cpu_quota.read().get(&container_id).copied().unwrap_or(original_quota);
        let stepped = ((current as f64 * THROTTLE_STEP_FRACTION) as u64).max(floor);

        record.cpu.quota_micros = stepped;
        retry_transient("enforcer.throttle", || self.runtime.apply_limits(container_id, &record, Duration::from_secs(5)))
            .await
            .map_err(|e| OrchestratorError::component_unhealthy(format!("throttle apply failed: {e}")))?;
        self.current_cpu_quota.write().insert(container_id, stepped);
        warn!(%container_id, original_quota, stepped, "throttled cpu quota");
        Ok(())
    }

    /// Tie-break among containers on one host that simultaneously exceed
    /// their CPU limit: the lowest-priority offender is throttled first;
    /// among equal priority, the one with the larger `observed/limit` ratio.
    pub fn break_tie(candidates: &[(ContainerId, Priority, f64)]) -> Option<ContainerId> {
        candidates
            .iter()
            .min_by(|a, b| a.1.cmp(&b.1).then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal)))
            .map(|(id, _, _)| *id)
    }
}

fn dimension_label(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Cpu => "cpu",
        Dimension::Memory => "memory",
        Dimension::Storage => "storage",
        Dimension::Network => "network",
    }
}
