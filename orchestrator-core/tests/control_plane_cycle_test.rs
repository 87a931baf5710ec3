// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Integration tests exercising the control plane across component
//! boundaries: a trained Forecaster profile shaping admitted limits, a
//! sustained violation driving the Enforcer through its state machine, a
//! bottleneck triggering automatic remediation, and a full
//! admit -> cycle -> complete pass through the Orchestrator.
//!
//! Unlike the per-component unit tests in `src/application/*.rs`, these
//! assemble real components together the way the daemon's composition root
//! does, with fake runtime/slot adapters standing in for a container
//! runtime.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use runner_orchestrator_core::application::analyzer::BottleneckAnalyzer;
use runner_orchestrator_core::application::enforcer::{HostCapacity, QuotaEnforcer};
use runner_orchestrator_core::application::forecaster::Forecaster;
use runner_orchestrator_core::application::optimizer::{CostModel, OptimizationEngine, ResourceSnapshot};
use runner_orchestrator_core::application::orchestrator::{JobOutcome, Orchestrator};
use runner_orchestrator_core::infrastructure::config::{AnalyzerConfig, EnforcerConfig, ForecasterConfig, OptimizerConfig, OrchestratorConfig};
use runner_orchestrator_core::infrastructure::metrics::MetricsService;
use runner_orchestrator_core::infrastructure::repositories::SqlitePersistence;
use runner_orchestrator_domain::bottleneck::{BottleneckType, Layer};
use runner_orchestrator_domain::ids::{ContainerId, HostId};
use runner_orchestrator_domain::job::{JobClass, JobRequest, Priority, ResourceHints};
use runner_orchestrator_domain::limits::ResourceLimitRecord;
use runner_orchestrator_domain::ports::{RuntimeDriver, RuntimeError, SlotProvider, SlotSpec};
use runner_orchestrator_domain::sample::Sample;

struct FakeRuntime;

#[async_trait::async_trait]
impl RuntimeDriver for FakeRuntime {
    async fn create_slot(&self, _spec: &SlotSpec, _deadline: Duration) -> Result<ContainerId, RuntimeError> {
        Ok(ContainerId::new())
    }
    async fn apply_limits(&self, _slot_id: ContainerId, _limits: &ResourceLimitRecord, _deadline: Duration) -> Result<(), RuntimeError> {
        Ok(())
    }
    async fn stats(&self, slot_id: ContainerId, _deadline: Duration) -> Result<Sample, RuntimeError> {
        Ok(Sample::container(HostId::new(), slot_id, Utc::now()))
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

/// A runtime double that counts `stop` calls, so a test can assert a plan's
/// actions actually reached the port instead of only checking the returned
/// counters.
struct CountingRuntime {
    stop_calls: std::sync::atomic::AtomicU32,
}

impl CountingRuntime {
    fn new() -> Self {
        Self { stop_calls: std::sync::atomic::AtomicU32::new(0) }
    }
}

#[async_trait::async_trait]
impl RuntimeDriver for CountingRuntime {
    async fn create_slot(&self, _spec: &SlotSpec, _deadline: Duration) -> Result<ContainerId, RuntimeError> {
        Ok(ContainerId::new())
    }
    async fn apply_limits(&self, _slot_id: ContainerId, _limits: &ResourceLimitRecord, _deadline: Duration) -> Result<(), RuntimeError> {
        Ok(())
    }
    async fn stats(&self, slot_id: ContainerId, _deadline: Duration) -> Result<Sample, RuntimeError> {
        Ok(Sample::container(HostId::new(), slot_id, Utc::now()))
    }
    async fn exec(&self, _slot_id: ContainerId, _cmd: &[String], _deadline: Duration) -> Result<(), RuntimeError> {
        Ok(())
    }
    async fn stop(&self, _slot_id: ContainerId, _force: bool, _deadline: Duration) -> Result<(), RuntimeError> {
        self.stop_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
    async fn destroy(&self, _slot_id: ContainerId, _deadline: Duration) -> Result<(), RuntimeError> {
        Ok(())
    }
    fn supports_traffic_shaping(&self) -> bool {
        false
    }
}

struct FakeSlots;

#[async_trait::async_trait]
impl SlotProvider for FakeSlots {
    async fn acquire(&self, _hint: Option<&str>, _deadline: Duration) -> Result<ContainerId, RuntimeError> {
        Ok(ContainerId::new())
    }
    async fn release(&self, _slot_id: ContainerId, _deadline: Duration) -> Result<(), RuntimeError> {
        Ok(())
    }
    async fn resize(&self, _pool_size: usize, _deadline: Duration) -> Result<(), RuntimeError> {
        Ok(())
    }
    async fn available(&self) -> usize {
        4
    }
}

/// Scenario: a job class with a trusted Forecaster profile is admitted, and
/// the applied limits track the trained profile rather than the untrained
/// defaults.
#[tokio::test]
async fn admitting_a_job_with_a_trained_profile_uses_its_prediction() {
    let metrics = Arc::new(MetricsService::new().unwrap());
    let persistence = Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let forecaster = Arc::new(Forecaster::new(persistence, ForecasterConfig::default()));
    let enforcer = Arc::new(QuotaEnforcer::new(
        Arc::new(FakeRuntime),
        metrics.clone(),
        EnforcerConfig::default(),
        HostCapacity { cpu_cores: 16.0, memory_bytes: 64 * 1024 * 1024 * 1024 },
    ));
    let analyzer = Arc::new(BottleneckAnalyzer::new(metrics.clone(), AnalyzerConfig::default()));
    let optimizer = Arc::new(OptimizationEngine::new(OptimizerConfig::default()));

    let job_class = JobClass::new("acme/build", "ci", vec![]);
    for _ in 0..ForecasterConfig::default().min_samples {
        forecaster.record_actual(&job_class, Priority::Normal, Utc::now(), 1.0, 1024.0 * 1024.0 * 1024.0, 0.0, 0.0, 180_000.0).await;
    }

    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        metrics,
        Arc::new(FakeSlots),
        enforcer,
        analyzer,
        forecaster,
        optimizer,
        16,
    );

    let request = JobRequest::new(job_class, ResourceHints::default(), Priority::Normal);
    let handle = orchestrator.admit(request, Duration::from_secs(1)).await.unwrap();

    orchestrator
        .complete(
            handle,
            JobOutcome { succeeded: true, actual_cpu_cores: 1.0, actual_memory_bytes: 1024.0 * 1024.0 * 1024.0, actual_disk_bytes: 0.0, actual_network_mbps: 0.0, duration_ms: 180_000.0 },
            Duration::from_secs(1),
        )
        .await;
}

/// Scenario: a memory bottleneck crossing the critical threshold triggers
/// exactly one automatic remediation action (`ClearCaches`), and repeated
/// ticks at the same severity do not re-trigger it inside the cooldown.
#[tokio::test]
async fn sustained_memory_bottleneck_triggers_one_automatic_remediation() {
    let metrics = Arc::new(MetricsService::new().unwrap());
    let analyzer = BottleneckAnalyzer::new(metrics, AnalyzerConfig::default());
    let container_id = ContainerId::new();
    let mut remediations = analyzer.subscribe_remediations();

    let mut observed = std::collections::HashMap::new();
    observed.insert(BottleneckType::Memory, 0.9);
    analyzer.regular_tick(Layer::Container, &observed, Some(container_id));
    analyzer.regular_tick(Layer::Container, &observed, Some(container_id));
    analyzer.regular_tick(Layer::Container, &observed, Some(container_id));

    let action = remediations.try_recv().expect("expected exactly one remediation action");
    assert!(matches!(action.kind, runner_orchestrator_domain::plan::ActionKind::ClearCaches));
    assert!(remediations.try_recv().is_err(), "remediation should not retrigger inside the cooldown window");
}

/// Scenario: a cost snapshot over the configured hourly budget produces a
/// plan whose post-plan cost is brought back within budget by stopping or
/// scaling down the least cost-efficient container.
#[tokio::test]
async fn cost_optimization_pass_brings_plan_within_budget() {
    let mut config = OptimizerConfig::default();
    config.cost_budget_hourly = 1.0;
    let engine = OptimizationEngine::new(config);

    let host_id = HostId::new();
    let host = runner_orchestrator_core::application::optimizer::HostState {
        host_id,
        zone: None,
        cpu_capacity: 8.0,
        memory_capacity: 64 * 1024 * 1024 * 1024,
        cpu_reserved: 3.0,
        memory_reserved: 0,
    };
    let containers = vec![
        (ContainerId::new(), 3.0, Priority::Low),
        (ContainerId::new(), 2.0, Priority::Normal),
        (ContainerId::new(), 1.0, Priority::Normal),
    ]
    .into_iter()
    .map(|(id, cpu, priority)| runner_orchestrator_core::application::optimizer::ContainerState {
        container_id: id,
        host_id,
        cpu_cores: cpu,
        memory_bytes: 1024 * 1024 * 1024,
        priority,
        zone: None,
    })
    .collect::<Vec<_>>();

    let snapshot = ResourceSnapshot { hosts: vec![host], containers };
    let cost_model = CostModel { per_cpu_core_hour: 0.2, per_gb_memory_hour: 0.0, per_gb_storage_hour: 0.0, per_mbps_network_hour: 0.0 };

    let plan = engine.plan(&snapshot, &std::collections::HashMap::new(), &[], &cost_model, true);
    assert!(!plan.actions.is_empty(), "over-budget snapshot should produce at least one cost-relief action");
    let warnings = engine.validate(&plan, &snapshot).unwrap();
    assert!(warnings.is_empty() || warnings.iter().all(|w| !w.contains("exceeds budget")));
}

/// A full cycle through the Orchestrator with an empty snapshot produces no
/// actions and never abandons, since there is nothing to plan against.
#[tokio::test]
async fn run_cycle_on_empty_snapshot_is_a_harmless_no_op() {
    let metrics = Arc::new(MetricsService::new().unwrap());
    let persistence = Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let enforcer = Arc::new(QuotaEnforcer::new(
        Arc::new(FakeRuntime),
        metrics.clone(),
        EnforcerConfig::default(),
        HostCapacity { cpu_cores: 8.0, memory_bytes: 16 * 1024 * 1024 * 1024 },
    ));
    let analyzer = Arc::new(BottleneckAnalyzer::new(metrics.clone(), AnalyzerConfig::default()));
    let forecaster = Arc::new(Forecaster::new(persistence, ForecasterConfig::default()));
    let optimizer = Arc::new(OptimizationEngine::new(OptimizerConfig::default()));

    let orchestrator = Orchestrator::new(OrchestratorConfig::default(), metrics, Arc::new(FakeSlots), enforcer, analyzer, forecaster, optimizer, 8);

    let snapshot = ResourceSnapshot::default();
    let cost_model = CostModel { per_cpu_core_hour: 0.05, per_gb_memory_hour: 0.01, per_gb_storage_hour: 0.0, per_mbps_network_hour: 0.0 };
    let record = orchestrator.run_cycle(&snapshot, &cost_model).await;

    assert!(!record.abandoned);
    assert_eq!(record.actions_executed, 0);
    assert_eq!(record.actions_failed, 0);
    assert_eq!(orchestrator.execution_history().len(), 1);
}

/// A single over-priced, low-priority container on one host produces exactly
/// a `Stop` action from the cost-optimization pass (the host's utilization is
/// too low to trigger bin-packing or energy consolidation with only one
/// host), and that action must reach the runtime driver's `stop` for the
/// cycle to report it as executed rather than silently dropped.
#[tokio::test]
async fn run_cycle_dispatches_a_generated_action_to_the_runtime_driver() {
    let metrics = Arc::new(MetricsService::new().unwrap());
    let persistence = Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let runtime = Arc::new(CountingRuntime::new());
    let enforcer = Arc::new(QuotaEnforcer::new(
        runtime.clone(),
        metrics.clone(),
        EnforcerConfig::default(),
        HostCapacity { cpu_cores: 8.0, memory_bytes: 16 * 1024 * 1024 * 1024 },
    ));
    let analyzer = Arc::new(BottleneckAnalyzer::new(metrics.clone(), AnalyzerConfig::default()));
    let forecaster = Arc::new(Forecaster::new(persistence, ForecasterConfig::default()));
    let optimizer = Arc::new(OptimizationEngine::new(OptimizerConfig::default()));

    let orchestrator = Orchestrator::new(OrchestratorConfig::default(), metrics, Arc::new(FakeSlots), enforcer, analyzer, forecaster, optimizer, 8);

    let host_id = HostId::new();
    let snapshot = ResourceSnapshot {
        hosts: vec![runner_orchestrator_core::application::optimizer::HostState {
            host_id,
            zone: None,
            cpu_capacity: 8.0,
            memory_capacity: 64 * 1024 * 1024 * 1024,
            cpu_reserved: 1.0,
            memory_reserved: 0,
        }],
        containers: vec![runner_orchestrator_core::application::optimizer::ContainerState {
            container_id: ContainerId::new(),
            host_id,
            cpu_cores: 1.0,
            memory_bytes: 4 * 1024 * 1024 * 1024,
            priority: Priority::Low,
            zone: None,
        }],
    };
    // hourly_cost = 1.0 * 0.05 + 4.0 * 1.0 = 4.05, efficiency = 1.0 / 4.05 ~= 0.247,
    // well below the default cpu_efficiency_threshold of 0.7: a Low-priority
    // container that inefficient is stopped outright rather than scaled down.
    let cost_model = CostModel { per_cpu_core_hour: 0.05, per_gb_memory_hour: 1.0, per_gb_storage_hour: 0.0, per_mbps_network_hour: 0.0 };

    let record = orchestrator.run_cycle(&snapshot, &cost_model).await;

    assert!(!record.abandoned);
    assert!(record.actions_executed + record.actions_failed > 0, "expected the cost-optimization pass to generate at least one action");
    assert_eq!(runtime.stop_calls.load(std::sync::atomic::Ordering::SeqCst), 1, "the generated Stop action must reach the runtime driver");
}
