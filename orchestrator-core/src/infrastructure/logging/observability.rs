// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Observability Service Implementation
//!
//! Combines metrics collection and per-component health tracking for the
//! five control-plane components (Profiler, Enforcer, Analyzer, Forecaster,
//! Optimizer). Each component wraps its tick/cycle in an [`OperationTracker`],
//! which records duration and success/failure into [`MetricsService`] and
//! feeds a rolling error rate used to compute that component's health score.
//!
//! There is no single system-wide throughput figure here, only five
//! independently-observed components, each with its own tick/cycle
//! tracking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::infrastructure::metrics::service::MetricsService;

/// Alert thresholds applied uniformly across components. Sourced from
/// [`crate::infrastructure::config::OrchestratorConfig`] at construction;
/// defaults here only back [`ObservabilityService::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub max_error_rate_percent: f64,
    pub max_tick_duration_seconds: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self { max_error_rate_percent: 5.0, max_tick_duration_seconds: 5.0 }
    }
}

/// Rolling counters for one component's tick/cycle history.
#[derive(Debug, Clone, Default)]
struct ComponentStats {
    total_ticks: u64,
    failed_ticks: u64,
    last_duration_seconds: f64,
    last_tick_at: Option<Instant>,
}

impl ComponentStats {
    fn error_rate_percent(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            (self.failed_ticks as f64 / self.total_ticks as f64) * 100.0
        }
    }

    fn health_score(&self, thresholds: &AlertThresholds) -> f64 {
        let mut score: f64 = 100.0;
        let error_rate = self.error_rate_percent();
        if error_rate > thresholds.max_error_rate_percent {
            score -= 30.0;
        } else if error_rate > thresholds.max_error_rate_percent / 2.0 {
            score -= 10.0;
        }
        if self.last_duration_seconds > thresholds.max_tick_duration_seconds {
            score -= 20.0;
        }
        score.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    pub score: f64,
    pub error_rate_percent: f64,
    pub total_ticks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub component: String,
    pub message: String,
    pub current_value: f64,
    pub threshold: f64,
}

/// Observability facade combining the metrics service and per-component
/// health tracking. One instance is constructed at startup and shared
/// (via `Arc`) across all five components.
pub struct ObservabilityService {
    metrics_service: Arc<MetricsService>,
    component_stats: RwLock<HashMap<String, ComponentStats>>,
    alert_thresholds: AlertThresholds,
}

impl ObservabilityService {
    pub fn new(metrics_service: Arc<MetricsService>) -> Self {
        Self::new_with_thresholds(metrics_service, AlertThresholds::default())
    }

    pub fn new_with_thresholds(metrics_service: Arc<MetricsService>, alert_thresholds: AlertThresholds) -> Self {
        Self { metrics_service, component_stats: RwLock::new(HashMap::new()), alert_thresholds }
    }

    /// Starts tracking one tick/cycle for `component` (e.g. `"profiler"`,
    /// `"enforcer"`, `"analyzer"`, `"forecaster"`, `"optimizer"`). The
    /// returned tracker records on `complete`/`fail`, or on drop as a
    /// failure if neither was called.
    pub fn start_operation(self: &Arc<Self>, component: &str) -> OperationTracker {
        OperationTracker::new(self.clone(), component.to_string())
    }

    async fn record_tick(&self, component: &str, duration: std::time::Duration, succeeded: bool) {
        self.metrics_service.record_tick_duration(component, duration);

        let mut stats = self.component_stats.write().await;
        let entry = stats.entry(component.to_string()).or_default();
        entry.total_ticks += 1;
        if !succeeded {
            entry.failed_ticks += 1;
        }
        entry.last_duration_seconds = duration.as_secs_f64();
        entry.last_tick_at = Some(Instant::now());

        let score = entry.health_score(&self.alert_thresholds);
        self.metrics_service.set_component_health(component, score);

        debug!(component, succeeded, duration_s = %duration.as_secs_f64(), score, "recorded component tick");
    }

    /// Health snapshot for one component. Returns `Unknown` if no tick has
    /// ever been recorded for it.
    pub async fn component_health(&self, component: &str) -> ComponentHealth {
        let stats = self.component_stats.read().await;
        match stats.get(component) {
            None => ComponentHealth {
                component: component.to_string(),
                status: HealthStatus::Unknown,
                score: 0.0,
                error_rate_percent: 0.0,
                total_ticks: 0,
            },
            Some(s) => {
                let score = s.health_score(&self.alert_thresholds);
                let status = if score >= 90.0 {
                    HealthStatus::Healthy
                } else if score >= 70.0 {
                    HealthStatus::Warning
                } else {
                    HealthStatus::Critical
                };
                ComponentHealth {
                    component: component.to_string(),
                    status,
                    score,
                    error_rate_percent: s.error_rate_percent(),
                    total_ticks: s.total_ticks,
                }
            }
        }
    }

    /// Health snapshot across every component seen so far.
    pub async fn all_component_health(&self) -> Vec<ComponentHealth> {
        let stats = self.component_stats.read().await;
        let mut out: Vec<ComponentHealth> = Vec::with_capacity(stats.len());
        for name in stats.keys() {
            out.push(self.component_health(name).await);
        }
        out
    }

    /// Alerts for any component currently breaching the configured
    /// thresholds. Used by the Orchestrator's health loop to decide on
    /// degraded-mode transitions.
    pub async fn check_alerts(&self) -> Vec<Alert> {
        let stats = self.component_stats.read().await;
        let mut alerts = Vec::new();
        for (component, s) in stats.iter() {
            let error_rate = s.error_rate_percent();
            if error_rate > self.alert_thresholds.max_error_rate_percent {
                alerts.push(Alert {
                    severity: AlertSeverity::Critical,
                    component: component.clone(),
                    message: format!("{component} error rate {error_rate:.1}% exceeds threshold"),
                    current_value: error_rate,
                    threshold: self.alert_thresholds.max_error_rate_percent,
                });
            }
            if s.last_duration_seconds > self.alert_thresholds.max_tick_duration_seconds {
                alerts.push(Alert {
                    severity: AlertSeverity::Warning,
                    component: component.clone(),
                    message: format!("{component} tick took {:.2}s, exceeding threshold", s.last_duration_seconds),
                    current_value: s.last_duration_seconds,
                    threshold: self.alert_thresholds.max_tick_duration_seconds,
                });
            }
        }
        if !alerts.is_empty() {
            warn!(count = alerts.len(), "observability alerts active");
        }
        alerts
    }

    pub fn metrics_service(&self) -> &Arc<MetricsService> {
        &self.metrics_service
    }
}

/// RAII tracker for one component tick. Call [`OperationTracker::complete`]
/// or [`OperationTracker::fail`] explicitly; if dropped without either, the
/// tick is recorded as a failure, so a panicking tick still shows up in the
/// error rate.
pub struct OperationTracker {
    observability: Arc<ObservabilityService>,
    component: String,
    started_at: Instant,
    finished: bool,
}

impl OperationTracker {
    fn new(observability: Arc<ObservabilityService>, component: String) -> Self {
        Self { observability, component, started_at: Instant::now(), finished: false }
    }

    pub async fn complete(mut self) {
        self.finished = true;
        let duration = self.started_at.elapsed();
        self.observability.record_tick(&self.component, duration, true).await;
    }

    pub async fn fail(mut self) {
        self.finished = true;
        let duration = self.started_at.elapsed();
        self.observability.record_tick(&self.component, duration, false).await;
    }
}

impl Drop for OperationTracker {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let observability = self.observability.clone();
        let component = self.component.clone();
        let duration = self.started_at.elapsed();
        tokio::spawn(async move {
            observability.record_tick(&component, duration, false).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Arc<ObservabilityService> {
        Arc::new(ObservabilityService::new(Arc::new(MetricsService::new().unwrap())))
    }

    #[tokio::test]
    async fn unknown_component_reports_unknown_status() {
        let obs = service();
        let health = obs.component_health("profiler").await;
        assert_eq!(health.status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn successful_tick_reports_healthy() {
        let obs = service();
        obs.start_operation("profiler").complete().await;
        let health = obs.component_health("profiler").await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.total_ticks, 1);
    }

    #[tokio::test]
    async fn repeated_failures_degrade_health_and_raise_alerts() {
        let obs = service();
        for _ in 0..5 {
            obs.start_operation("enforcer").fail().await;
        }
        let health = obs.component_health("enforcer").await;
        assert_eq!(health.status, HealthStatus::Critical);

        let alerts = obs.check_alerts().await;
        assert!(alerts.iter().any(|a| a.component == "enforcer"));
    }

    #[tokio::test]
    async fn dropped_tracker_without_complete_counts_as_failure() {
        let obs = service();
        {
            let _tracker = obs.start_operation("analyzer");
        }
        // Drop spawns a task to record the failure; yield so it runs.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let health = obs.component_health("analyzer").await;
        assert_eq!(health.total_ticks, 1);
        assert_eq!(health.error_rate_percent, 100.0);
    }
}
