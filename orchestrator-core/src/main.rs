// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runner Orchestrator Daemon
//!
//! Composition root for the control plane: wires configuration, metrics,
//! persistence, and the runtime/slot adapters into the six application
//! components, then drives the observe -> analyze -> predict -> plan ->
//! enforce -> observe loop until a shutdown signal arrives.
//!
//! CLI parsing, argument validation, signal handling, and exit code mapping
//! all live in `runner_orchestrator_bootstrap`; this binary's job is
//! assembling the pieces `runner_orchestrator_bootstrap` hands it into a
//! running daemon.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use runner_orchestrator_bootstrap::exit_code::{result_to_exit_code, ExitCode};
use runner_orchestrator_bootstrap::shutdown::ShutdownCoordinator;
use runner_orchestrator_bootstrap::signals::create_signal_handler;
use runner_orchestrator_bootstrap::{ValidatedCli, ValidatedCommand};

use runner_orchestrator_core::application::analyzer::BottleneckAnalyzer;
use runner_orchestrator_core::application::enforcer::{HostCapacity, QuotaEnforcer};
use runner_orchestrator_core::application::forecaster::Forecaster;
use runner_orchestrator_core::application::optimizer::{CostModel, OptimizationEngine, ResourceSnapshot};
use runner_orchestrator_core::application::orchestrator::{ComponentId, Orchestrator};
use runner_orchestrator_core::application::profiler::Profiler;
use runner_orchestrator_core::infrastructure::adapters::{InMemorySlotProvider, NoopRuntimeDriver};
use runner_orchestrator_core::infrastructure::config::{ConfigService, OrchestratorConfig};
use runner_orchestrator_core::infrastructure::logging::ObservabilityService;
use runner_orchestrator_core::infrastructure::metrics::{MetricsEndpoint, MetricsService};
use runner_orchestrator_core::infrastructure::repositories::SqlitePersistence;
use runner_orchestrator_core::OrchestratorError;
use runner_orchestrator_domain::bottleneck::{BottleneckType, Layer};
use runner_orchestrator_domain::ids::HostId;
use tracing::{debug, error, info, warn};

const MAX_HISTORY: usize = 256;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let validated_cli = match runner_orchestrator_bootstrap::bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("argument error: {e}");
            return std::process::ExitCode::from(ExitCode::from_error(&e).as_i32() as u8);
        }
    };

    init_tracing(validated_cli.verbose);

    result_to_exit_code(run(validated_cli).await)
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already set, continuing with the existing one");
    }
}

async fn run(cli: ValidatedCli) -> Result<(), OrchestratorError> {
    match cli.command.clone() {
        ValidatedCommand::ValidateConfig { config } => {
            ConfigService::load(Some(&config))?;
            println!("{} is valid", config.display());
            Ok(())
        }
        ValidatedCommand::PrintConfig => {
            let config = ConfigService::load(cli.config.as_deref())?;
            let json = serde_json::to_string_pretty(&config)
                .map_err(|e| OrchestratorError::internal(format!("failed to serialize configuration: {e}")))?;
            println!("{json}");
            Ok(())
        }
        ValidatedCommand::Run { dry_run } => run_daemon(cli, dry_run).await,
    }
}

async fn run_daemon(cli: ValidatedCli, dry_run: bool) -> Result<(), OrchestratorError> {
    let config = ConfigService::load(cli.config.as_deref())?;
    info!(dry_run, "starting runner-orchestrator daemon");

    let metrics = Arc::new(MetricsService::new()?);
    let observability = Arc::new(ObservabilityService::new(metrics.clone()));

    let metrics_port = cli.metrics_port.unwrap_or(config.metrics.port);
    let mut endpoint_config = config.clone();
    endpoint_config.metrics.port = metrics_port;
    let metrics_endpoint = MetricsEndpoint::new(metrics.clone(), &endpoint_config);
    let metrics_handle = tokio::spawn(async move {
        if let Err(e) = metrics_endpoint.start().await {
            error!("metrics endpoint exited: {e}");
        }
    });

    let persistence = match &cli.state_dir {
        Some(dir) => {
            let db_path = dir.join("orchestrator.db");
            info!(path = %db_path.display(), "opening SQLite state store");
            Arc::new(SqlitePersistence::from_file(&format!("sqlite://{}?mode=rwc", db_path.display())).await?)
        }
        None => {
            warn!("no --state-dir given, running with an in-memory state store; forecasts and history will not survive a restart");
            Arc::new(SqlitePersistence::in_memory().await?)
        }
    };

    let runtime = Arc::new(NoopRuntimeDriver::new());
    let slots = Arc::new(InMemorySlotProvider::new());

    let platform = runner_orchestrator_bootstrap::platform::create_platform();
    let cpu_threads = cli.cpu_threads.unwrap_or_else(|| platform.cpu_count());
    let total_memory = platform.total_memory().unwrap_or(0);
    let capacity = HostCapacity { cpu_cores: cpu_threads as f64, memory_bytes: total_memory };
    let host_id = HostId::new();

    let profiler = Arc::new(Profiler::new(runtime.clone(), metrics.clone(), config.profiler.clone(), host_id));
    let enforcer = Arc::new(QuotaEnforcer::new(runtime.clone(), metrics.clone(), config.enforcer.clone(), capacity));
    let analyzer = Arc::new(BottleneckAnalyzer::new(metrics.clone(), config.analyzer.clone()));
    let forecaster = Arc::new(Forecaster::new(persistence.clone(), config.forecaster.clone()));
    let optimizer = Arc::new(OptimizationEngine::new(config.optimizer.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        metrics.clone(),
        slots.clone(),
        enforcer,
        analyzer.clone(),
        forecaster,
        optimizer,
        MAX_HISTORY,
    ));

    let shutdown = ShutdownCoordinator::new(Duration::from_secs(10));
    let signal_handler = create_signal_handler();
    let shutdown_for_signal = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        signal_handler
            .wait_for_signal(Box::new(move || shutdown_for_signal.initiate_shutdown()))
            .await;
    });

    let sampling_handle = profiler.spawn_system_sampling_loop();
    let analyzer_handle = spawn_analyzer_loop(profiler.clone(), analyzer.clone(), &config, shutdown.token());
    let cycle_handle = spawn_cycle_loop(orchestrator.clone(), observability.clone(), &config, dry_run, shutdown.token());
    let health_handle = spawn_health_loop(orchestrator.clone(), shutdown.token());

    shutdown.token().cancelled().await;
    info!("shutdown signal received, draining background tasks");

    sampling_handle.abort();
    analyzer_handle.abort();
    cycle_handle.abort();
    health_handle.abort();
    metrics_handle.abort();
    signal_task.abort();

    shutdown.complete_shutdown();
    debug!("shutdown complete");
    Ok(())
}

/// Periodically rolls the Profiler's recent host samples into a
/// per-[`BottleneckType`] utilization map and feeds it to the Analyzer's
/// regular tick. Container-layer ticks are left to a real runtime
/// integration, since the no-op driver never reports containers.
fn spawn_analyzer_loop(
    profiler: Arc<Profiler>,
    analyzer: Arc<BottleneckAnalyzer>,
    config: &OrchestratorConfig,
    cancel: runner_orchestrator_bootstrap::shutdown::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let interval_ms = config.analyzer.analysis_interval_ms.max(1_000);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let observed = observed_from_samples(&profiler.rolling_window(Duration::from_millis(interval_ms)));
                    analyzer.regular_tick(Layer::System, &observed, None);
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}

/// Averages CPU and memory utilization across a window of host samples.
/// Disk and network bottlenecks need rate-of-change between consecutive
/// samples, which the Analyzer's deep tick computes from raw counters; the
/// regular tick only looks at point-in-time CPU/memory pressure.
fn observed_from_samples(samples: &[runner_orchestrator_domain::sample::Sample]) -> HashMap<BottleneckType, f64> {
    let mut observed = HashMap::new();
    let cpu_samples: Vec<f64> = samples.iter().filter_map(|s| s.cpu_pct).collect();
    if !cpu_samples.is_empty() {
        observed.insert(BottleneckType::Cpu, cpu_samples.iter().sum::<f64>() / cpu_samples.len() as f64);
    }
    observed
}

/// Runs the Orchestrator's optimization cycle on an interval. In
/// `dry_run`, the cycle still runs (it is the only way to validate a
/// config's effect on planning) but its result is not treated as executed.
fn spawn_cycle_loop(
    orchestrator: Arc<Orchestrator>,
    observability: Arc<ObservabilityService>,
    config: &OrchestratorConfig,
    dry_run: bool,
    cancel: runner_orchestrator_bootstrap::shutdown::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let interval_ms = config.optimizer.cycle_ms.max(1_000);
    let cost_model = CostModel {
        per_cpu_core_hour: config.optimizer.cost_budget_hourly / 24.0,
        per_gb_memory_hour: 0.0,
        per_gb_storage_hour: 0.0,
        per_mbps_network_hour: 0.0,
    };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tracker = observability.start_operation("optimizer_cycle");
                    let snapshot = ResourceSnapshot::default();
                    let record = orchestrator.run_cycle(&snapshot, &cost_model).await;
                    let failed = record.abandoned || record.actions_failed > 0;
                    if failed { tracker.fail().await } else { tracker.complete().await }
                    if dry_run {
                        debug!(?record, "dry run: optimization cycle computed but not applied");
                    } else {
                        debug!(?record, "optimization cycle complete");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}

/// Reports all five components healthy on a fixed cadence. A production
/// deployment would derive `healthy` from each component's own error rate;
/// the no-op runtime driver never fails, so there is nothing to detect yet.
fn spawn_health_loop(
    orchestrator: Arc<Orchestrator>,
    cancel: runner_orchestrator_bootstrap::shutdown::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for component in
                        [ComponentId::Profiler, ComponentId::Enforcer, ComponentId::Analyzer, ComponentId::Forecaster, ComponentId::Optimizer]
                    {
                        orchestrator.check_component_health(component, true).await;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}
