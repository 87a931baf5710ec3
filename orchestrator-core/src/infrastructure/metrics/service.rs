// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service Implementation
//!
//! Prometheus-based metrics collection and export for the control plane.
//! Tracks sampling throughput and errors (Profiler), violations and quota
//! applications (Enforcer), active bottlenecks (Analyzer), forecast
//! confidence (Forecaster), generated/executed plan actions (Optimizer), and
//! per-component health and tick duration. Thread-safe with low overhead.

use prometheus::{Gauge, GaugeVec, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::debug;

use runner_orchestrator_domain::error::OrchestratorError;

/// Prometheus metrics service for control-plane observability.
///
/// # Metric Categories
///
/// - **Profiler**: samples collected / sampling errors / active jobs
/// - **Enforcer**: quota applications / violations by dimension
/// - **Analyzer**: active bottleneck severity by (type, layer)
/// - **Forecaster**: forecast confidence by horizon
/// - **Optimizer**: plan actions generated / executed / failed by kind
/// - **Component health**: per-component health score and tick duration
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    samples_total: IntCounter,
    sampling_errors_total: IntCounter,
    active_jobs: IntGauge,

    quota_applications_total: IntCounter,
    violations_total: IntCounterVec,

    bottleneck_severity: GaugeVec,

    forecast_confidence: GaugeVec,

    plan_actions_generated_total: IntCounterVec,
    plan_actions_failed_total: IntCounter,

    component_health_score: GaugeVec,
    tick_duration_seconds: HistogramVec,

    cost_budget_hourly: Gauge,
}

impl MetricsService {
    /// Create a new MetricsService with a fresh Prometheus registry.
    pub fn new() -> Result<Self, OrchestratorError> {
        let registry = Registry::new();

        let samples_total = IntCounter::with_opts(
            Opts::new("samples_total", "Total resource samples collected").namespace("runner_orchestrator"),
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create samples_total metric: {e}")))?;

        let sampling_errors_total = IntCounter::with_opts(
            Opts::new("sampling_errors_total", "Total sampling tick failures").namespace("runner_orchestrator"),
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create sampling_errors_total metric: {e}")))?;

        let active_jobs = IntGauge::with_opts(
            Opts::new("active_jobs", "Number of currently admitted jobs").namespace("runner_orchestrator"),
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create active_jobs metric: {e}")))?;

        let quota_applications_total = IntCounter::with_opts(
            Opts::new("quota_applications_total", "Total resource limit applications").namespace("runner_orchestrator"),
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create quota_applications_total metric: {e}")))?;

        let violations_total = IntCounterVec::new(
            Opts::new("violations_total", "Total quota violations observed by dimension").namespace("runner_orchestrator"),
            &["dimension"],
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create violations_total metric: {e}")))?;

        let bottleneck_severity = GaugeVec::new(
            Opts::new("bottleneck_severity", "Active bottleneck severity (0 absent, 1-3 warning/critical/severe)")
                .namespace("runner_orchestrator"),
            &["bottleneck_type", "layer"],
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create bottleneck_severity metric: {e}")))?;

        let forecast_confidence = GaugeVec::new(
            Opts::new("forecast_confidence", "Most recent forecast confidence by horizon").namespace("runner_orchestrator"),
            &["horizon"],
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create forecast_confidence metric: {e}")))?;

        let plan_actions_generated_total = IntCounterVec::new(
            Opts::new("plan_actions_generated_total", "Total optimization plan actions generated by kind")
                .namespace("runner_orchestrator"),
            &["kind"],
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create plan_actions_generated_total metric: {e}")))?;

        let plan_actions_failed_total = IntCounter::with_opts(
            Opts::new("plan_actions_failed_total", "Total optimization plan actions that failed to apply")
                .namespace("runner_orchestrator"),
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create plan_actions_failed_total metric: {e}")))?;

        let component_health_score = GaugeVec::new(
            Opts::new("component_health_score", "Per-component health score, 0-100").namespace("runner_orchestrator"),
            &["component"],
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create component_health_score metric: {e}")))?;

        let tick_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("tick_duration_seconds", "Per-component tick duration")
                .namespace("runner_orchestrator")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["component"],
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create tick_duration_seconds metric: {e}")))?;

        let cost_budget_hourly = Gauge::with_opts(
            Opts::new("cost_budget_hourly", "Configured hourly cost budget").namespace("runner_orchestrator"),
        )
        .map_err(|e| OrchestratorError::internal(format!("failed to create cost_budget_hourly metric: {e}")))?;

        macro_rules! register {
            ($($m:expr),+ $(,)?) => {
                $(
                    registry
                        .register(Box::new($m.clone()))
                        .map_err(|e| OrchestratorError::internal(format!("failed to register metric: {e}")))?;
                )+
            };
        }

        register!(
            samples_total,
            sampling_errors_total,
            active_jobs,
            quota_applications_total,
            violations_total,
            bottleneck_severity,
            forecast_confidence,
            plan_actions_generated_total,
            plan_actions_failed_total,
            component_health_score,
            tick_duration_seconds,
            cost_budget_hourly,
        );

        debug!("MetricsService initialized with Prometheus registry");

        Ok(Self {
            registry: Arc::new(registry),
            samples_total,
            sampling_errors_total,
            active_jobs,
            quota_applications_total,
            violations_total,
            bottleneck_severity,
            forecast_confidence,
            plan_actions_generated_total,
            plan_actions_failed_total,
            component_health_score,
            tick_duration_seconds,
            cost_budget_hourly,
        })
    }

    pub fn increment_samples(&self) {
        self.samples_total.inc();
    }

    pub fn increment_sampling_errors(&self) {
        self.sampling_errors_total.inc();
    }

    pub fn set_active_jobs(&self, count: i64) {
        self.active_jobs.set(count);
    }

    pub fn increment_quota_applications(&self) {
        self.quota_applications_total.inc();
    }

    pub fn record_violation(&self, dimension: &str) {
        self.violations_total.with_label_values(&[dimension]).inc();
    }

    /// Sets the active bottleneck severity gauge. Pass `0.0` to clear a
    /// resolved bottleneck (mirrors the Active Bottleneck Map's key removal).
    pub fn set_bottleneck_severity(&self, bottleneck_type: &str, layer: &str, severity: f64) {
        self.bottleneck_severity.with_label_values(&[bottleneck_type, layer]).set(severity);
    }

    pub fn set_forecast_confidence(&self, horizon: &str, confidence: f64) {
        self.forecast_confidence.with_label_values(&[horizon]).set(confidence);
    }

    pub fn increment_plan_actions_generated(&self, kind: &str) {
        self.plan_actions_generated_total.with_label_values(&[kind]).inc();
    }

    pub fn increment_plan_actions_failed(&self) {
        self.plan_actions_failed_total.inc();
    }

    pub fn set_component_health(&self, component: &str, score: f64) {
        self.component_health_score.with_label_values(&[component]).set(score);
    }

    pub fn record_tick_duration(&self, component: &str, duration: std::time::Duration) {
        self.tick_duration_seconds.with_label_values(&[component]).observe(duration.as_secs_f64());
    }

    pub fn set_cost_budget_hourly(&self, budget: f64) {
        self.cost_budget_hourly.set(budget);
    }

    /// Get Prometheus metrics in text format for scraping.
    pub fn get_metrics(&self) -> Result<String, OrchestratorError> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        encoder
            .encode_to_string(&metric_families)
            .map_err(|e| OrchestratorError::internal(format!("failed to encode metrics: {e}")))
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

impl Default for MetricsService {
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        Self::new().expect("failed to create default MetricsService")
    }
}
