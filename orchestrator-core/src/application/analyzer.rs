// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Bottleneck Analyzer: rolls Profiler output into discrete
//! severity-labelled events and computes system-health scores, on two
//! cadences (regular threshold checks, deep pattern/correlation/anomaly
//! detection).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use runner_orchestrator_domain::bottleneck::{BottleneckEvent, BottleneckKey, BottleneckType, Layer};
use runner_orchestrator_domain::ids::ContainerId;
use runner_orchestrator_domain::plan::{Action, ActionKind, ActionPriority, ActionTarget};
use runner_orchestrator_domain::value_objects::{Confidence, Severity};
use tokio::sync::broadcast;
use tracing::info;

use crate::infrastructure::config::{AnalyzerConfig, DimensionThresholds};
use crate::infrastructure::metrics::MetricsService;

/// A remediation attempt is only retried for the same bottleneck key once
/// this much time has passed since the last one.
const REMEDIATION_COOLDOWN_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthBand {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthBand {
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 80 => Self::Excellent,
            s if s >= 60 => Self::Good,
            s if s >= 40 => Self::Fair,
            s if s >= 20 => Self::Poor,
            _ => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BottleneckLifecycle {
    Active,
    Resolved,
}

pub struct BottleneckAnalyzer {
    metrics: std::sync::Arc<MetricsService>,
    config: AnalyzerConfig,
    active: RwLock<HashMap<BottleneckKey, BottleneckEvent>>,
    last_remediation: RwLock<HashMap<BottleneckKey, DateTime<Utc>>>,
    events: broadcast::Sender<(BottleneckEvent, BottleneckLifecycle)>,
    remediation_actions: broadcast::Sender<Action>,
}

impl BottleneckAnalyzer {
    pub fn new(metrics: std::sync::Arc<MetricsService>, config: AnalyzerConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let (remediation_actions, _) = broadcast::channel(64);
        Self { metrics, config, active: RwLock::new(HashMap::new()), last_remediation: RwLock::new(HashMap::new()), events, remediation_actions }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<(BottleneckEvent, BottleneckLifecycle)> {
        self.events.subscribe()
    }

    pub fn subscribe_remediations(&self) -> broadcast::Receiver<Action> {
        self.remediation_actions.subscribe()
    }

    /// Single-shot per-dimension threshold check against `{warning, critical,
    /// severe}`. `observed` supplies one current aggregate value per
    /// dimension this tick has data for; dimensions absent from the map are
    /// treated as resolved if previously active.
    pub fn regular_tick(&self, layer: Layer, observed: &HashMap<BottleneckType, f64>, related_container: Option<ContainerId>) {
        let now = Utc::now();
        let mut active = self.active.write();
        let mut seen = Vec::new();

        for (&bottleneck_type, &value) in observed {
            let thresholds = self.thresholds_for(bottleneck_type);
            let key = BottleneckKey { bottleneck_type, layer };
            match severity_for(value, &thresholds) {
                Some(severity) => {
                    seen.push(key);
                    let is_new = !active.contains_key(&key);
                    let event = BottleneckEvent { t: now, bottleneck_type, layer, severity, current_value: value, threshold: thresholds.warning, related_container };
                    active.insert(key, event.clone());
                    self.metrics.set_bottleneck_severity(type_label(bottleneck_type), layer_label(layer), severity_score(severity));
                    let _ = self.events.send((event.clone(), BottleneckLifecycle::Active));
                    if is_new {
                        drop_and_remediate(self, key, event);
                    }
                }
                None => {
                    if let Some(resolved) = active.remove(&key) {
                        self.metrics.set_bottleneck_severity(type_label(bottleneck_type), layer_label(layer), 0.0);
                        let _ = self.events.send((resolved, BottleneckLifecycle::Resolved));
                    }
                }
            }
        }

        // Keys with no observation this tick that are still tracked at this
        // layer are implicitly resolved.
        let stale: Vec<BottleneckKey> = active.keys().filter(|k| k.layer == layer && !seen.contains(k)).copied().collect();
        for key in stale {
            if let Some(resolved) = active.remove(&key) {
                self.metrics.set_bottleneck_severity(type_label(key.bottleneck_type), layer_label(layer), 0.0);
                let _ = self.events.send((resolved, BottleneckLifecycle::Resolved));
            }
        }
    }

    fn thresholds_for(&self, bottleneck_type: BottleneckType) -> DimensionThresholds {
        match bottleneck_type {
            BottleneckType::Cpu => self.config.cpu_thresholds.clone(),
            BottleneckType::Memory => self.config.memory_thresholds.clone(),
            BottleneckType::Disk => self.config.disk_thresholds.clone(),
            BottleneckType::Network => self.config.network_thresholds.clone(),
            // The remaining bottleneck types don't carry a dedicated
            // threshold row in the configuration surface; they reuse the CPU
            // triplet as a conservative default.
            _ => self.config.cpu_thresholds.clone(),
        }
    }

    /// System-health score: start at 100, subtract per active bottleneck by
    /// severity, clamp at 0.
    pub fn health_score(&self) -> i32 {
        let active = self.active.read();
        let penalty: i32 = active.values().map(|e| e.severity.health_penalty()).sum();
        (100 - penalty).max(0)
    }

    pub fn health_band(&self) -> HealthBand {
        HealthBand::from_score(self.health_score())
    }

    pub fn active_bottlenecks(&self) -> Vec<BottleneckEvent> {
        self.active.read().values().cloned().collect()
    }

    /// Deep-tick pattern detection: a bottleneck type is "recurring" if it
    /// appeared in more than half of the last `history.len()` analyses.
    pub fn recurring_patterns(history: &[Vec<BottleneckType>]) -> Vec<BottleneckType> {
        if history.is_empty() {
            return Vec::new();
        }
        let mut counts: HashMap<BottleneckType, usize> = HashMap::new();
        for analysis in history {
            for &t in analysis {
                *counts.entry(t).or_insert(0) += 1;
            }
        }
        let threshold = history.len() / 2;
        counts.into_iter().filter(|(_, count)| *count > threshold).map(|(t, _)| t).collect()
    }

    /// Pearson correlation coefficient between two equal-length series.
    pub fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
        if xs.len() != ys.len() || xs.len() < 2 {
            return None;
        }
        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;
        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for i in 0..xs.len() {
            let dx = xs[i] - mean_x;
            let dy = ys[i] - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }
        if var_x == 0.0 || var_y == 0.0 {
            return None;
        }
        Some(cov / (var_x.sqrt() * var_y.sqrt()))
    }

    /// Is this correlation strong enough to report, per configured threshold?
    pub fn is_correlated(&self, r: f64) -> bool {
        r.abs() > self.config.correlation_threshold
    }

    /// `|sample - mean| > sigma * stddev` over a baseline.
    pub fn is_anomaly(&self, sample: f64, baseline_mean: f64, baseline_stddev: f64) -> bool {
        if baseline_stddev <= 0.0 {
            return false;
        }
        (sample - baseline_mean).abs() > self.config.anomaly_sigma * baseline_stddev
    }

    /// Ordinary-least-squares slope/intercept for a simple linear trend
    /// forecast over `(x, y)` points (x typically a sample index or minute
    /// offset).
    pub fn linear_trend(points: &[(f64, f64)]) -> Option<(f64, f64)> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let sum_x: f64 = points.iter().map(|p| p.0).sum();
        let sum_y: f64 = points.iter().map(|p| p.1).sum();
        let sum_xy: f64 = points.iter().map(|p| p.0 * p.1).sum();
        let sum_xx: f64 = points.iter().map(|p| p.0 * p.0).sum();
        let denom = n * sum_xx - sum_x * sum_x;
        if denom == 0.0 {
            return None;
        }
        let slope = (n * sum_xy - sum_x * sum_y) / denom;
        let intercept = (sum_y - slope * sum_x) / n;
        Some((slope, intercept))
    }
}

fn drop_and_remediate(analyzer: &BottleneckAnalyzer, key: BottleneckKey, event: BottleneckEvent) {
    let now = Utc::now();
    let eligible = {
        let last = analyzer.last_remediation.read();
        match last.get(&key) {
            Some(last_attempt) => (now - *last_attempt).num_seconds() >= REMEDIATION_COOLDOWN_SECS,
            None => true,
        }
    };
    if !eligible {
        return;
    }

    let Some(kind) = remediation_for(key.bottleneck_type) else { return };
    let target = event.related_container.map(ActionTarget::Container);
    let Some(target) = target else { return };

    let action = Action {
        target,
        kind,
        reason: format!("automatic remediation for {:?} bottleneck at {:?}", key.bottleneck_type, key.layer),
        priority: priority_for(event.severity),
        confidence: Confidence::clamped(0.8),
        generated_at: now,
        sequence: 0,
    };
    analyzer.last_remediation.write().insert(key, now);
    info!(?key.bottleneck_type, "enqueuing automatic remediation action");
    let _ = analyzer.remediation_actions.send(action);
}

fn remediation_for(bottleneck_type: BottleneckType) -> Option<ActionKind> {
    match bottleneck_type {
        BottleneckType::CacheEfficiency => Some(ActionKind::ResizeCache { factor: 1.5 }),
        BottleneckType::ContainerStartup => Some(ActionKind::ReserveCapacity { cpu_cores: 0.0, memory_bytes: 0 }),
        BottleneckType::Memory => Some(ActionKind::ClearCaches),
        BottleneckType::Cpu => Some(ActionKind::ReduceConcurrency),
        BottleneckType::Disk | BottleneckType::Network | BottleneckType::Concurrency => None,
    }
}

fn priority_for(severity: Severity) -> ActionPriority {
    match severity {
        Severity::Severe | Severity::Critical => ActionPriority::High,
        Severity::Warning => ActionPriority::Medium,
        Severity::Normal => ActionPriority::Low,
    }
}

fn severity_for(value: f64, thresholds: &DimensionThresholds) -> Option<Severity> {
    if value >= thresholds.severe {
        Some(Severity::Severe)
    } else if value >= thresholds.critical {
        Some(Severity::Critical)
    } else if value >= thresholds.warning {
        Some(Severity::Warning)
    } else {
        None
    }
}

fn severity_score(severity: Severity) -> f64 {
    match severity {
        Severity::Normal => 0.0,
        Severity::Warning => 1.0,
        Severity::Critical => 2.0,
        Severity::Severe => 3.0,
    }
}

fn type_label(t: BottleneckType) -> &'static str {
    match t {
        BottleneckType::Cpu => "cpu",
        BottleneckType::Memory => "memory",
        BottleneckType::Disk => "disk",
        BottleneckType::Network => "network",
        BottleneckType::ContainerStartup => "container_startup",
        BottleneckType::CacheEfficiency => "cache_efficiency",
        BottleneckType::Concurrency => "concurrency",
    }
}

fn layer_label(layer: Layer) -> &'static str {
    match layer {
        Layer::System => "system",
        Layer::Application => "application",
        Layer::Container => "container",
        Layer::Network => "network",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> BottleneckAnalyzer {
        BottleneckAnalyzer::new(std::sync::Arc::new(MetricsService::new().unwrap()), AnalyzerConfig::default())
    }

    #[test]
    fn regular_tick_activates_and_resolves_a_bottleneck() {
        let a = analyzer();
        let mut observed = HashMap::new();
        observed.insert(BottleneckType::Cpu, 0.9);
        a.regular_tick(Layer::System, &observed, None);
        assert_eq!(a.active_bottlenecks().len(), 1);
        assert_eq!(a.health_score(), 80);

        let mut rx = a.subscribe_events();
        let _ = rx; // subscribed after send in first tick is fine for second
        observed.insert(BottleneckType::Cpu, 0.1);
        a.regular_tick(Layer::System, &observed, None);
        assert!(a.active_bottlenecks().is_empty());
        assert_eq!(a.health_score(), 100);
    }

    #[test]
    fn health_band_matches_score_ranges() {
        assert_eq!(HealthBand::from_score(85), HealthBand::Excellent);
        assert_eq!(HealthBand::from_score(65), HealthBand::Good);
        assert_eq!(HealthBand::from_score(45), HealthBand::Fair);
        assert_eq!(HealthBand::from_score(25), HealthBand::Poor);
        assert_eq!(HealthBand::from_score(5), HealthBand::Critical);
    }

    #[test]
    fn recurring_patterns_requires_majority_presence() {
        let history = vec![vec![BottleneckType::Cpu], vec![BottleneckType::Cpu], vec![BottleneckType::Memory]];
        let recurring = BottleneckAnalyzer::recurring_patterns(&history);
        assert!(recurring.contains(&BottleneckType::Cpu));
        assert!(!recurring.contains(&BottleneckType::Memory));
    }

    #[test]
    fn correlation_detects_perfect_linear_relationship() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![2.0, 4.0, 6.0, 8.0];
        let r = BottleneckAnalyzer::correlation(&xs, &ys).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn anomaly_detection_respects_configured_sigma() {
        let a = analyzer();
        assert!(a.is_anomaly(100.0, 50.0, 10.0));
        assert!(!a.is_anomaly(55.0, 50.0, 10.0));
    }

    #[test]
    fn linear_trend_recovers_slope_and_intercept() {
        let points = vec![(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)];
        let (slope, intercept) = BottleneckAnalyzer::linear_trend(&points).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
    }
}
