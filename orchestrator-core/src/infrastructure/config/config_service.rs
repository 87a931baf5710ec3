// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Configuration surface for the control plane: a single [`OrchestratorConfig`]
//! with one nested section per component, loaded defaults-first then
//! overlaid by an optional file and environment variables (prefix
//! `ORCHESTRATOR_`). Unrecognized top-level fields are reserved for future
//! additive use, so the root does not reject unknown keys; event payload
//! schemas (see `orchestrator_domain::events`) are the only place
//! `deny_unknown_fields` applies.

use config::{Config, Environment, File};
use runner_orchestrator_domain::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfilerConfig {
    pub system_interval_ms: u64,
    pub container_interval_ms: u64,
    pub snapshot_interval_ms: u64,
    pub retention_ms: u64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self { system_interval_ms: 5_000, container_interval_ms: 10_000, snapshot_interval_ms: 30_000, retention_ms: 3_600_000 }
    }
}

/// Storage-quota enforcement backend, tried in descending preference: native
/// filesystem quotas are enforced by the kernel without polling, so they are
/// preferred over the Enforcer's own periodic-monitoring fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    XfsProjectQuota,
    Ext4ProjectQuota,
    BtrfsSubvolumeQuota,
    ZfsDatasetQuota,
    #[default]
    MonitoringFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnforcerConfig {
    pub default_profile: String,
    pub violation_threshold: u32,
    pub grace_period_ms: u64,
    pub kill_on_violation: bool,
    pub enforcement_check_ms: u64,
    /// No filesystem-capability port exists yet to probe a host's quota
    /// support, so this is operator-configured; unset deployments fall back
    /// to monitoring-based enforcement, which the Enforcer always supports.
    pub storage_backend: StorageBackend,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            default_profile: "medium".to_string(),
            violation_threshold: 3,
            grace_period_ms: 60_000,
            kill_on_violation: true,
            enforcement_check_ms: 30_000,
            storage_backend: StorageBackend::MonitoringFallback,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DimensionThresholds {
    pub warning: f64,
    pub critical: f64,
    pub severe: f64,
}

impl Default for DimensionThresholds {
    fn default() -> Self {
        Self { warning: 0.7, critical: 0.85, severe: 0.95 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub cpu_thresholds: DimensionThresholds,
    pub memory_thresholds: DimensionThresholds,
    pub disk_thresholds: DimensionThresholds,
    pub network_thresholds: DimensionThresholds,
    pub analysis_interval_ms: u64,
    pub deep_interval_ms: u64,
    pub correlation_threshold: f64,
    pub anomaly_sigma: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cpu_thresholds: DimensionThresholds::default(),
            memory_thresholds: DimensionThresholds::default(),
            disk_thresholds: DimensionThresholds::default(),
            network_thresholds: DimensionThresholds::default(),
            analysis_interval_ms: 60_000,
            deep_interval_ms: 300_000,
            correlation_threshold: 0.6,
            anomaly_sigma: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForecasterConfig {
    pub lookback_hours: u32,
    pub horizon_hours: u32,
    pub min_samples: u32,
    pub model_update_ms: u64,
    pub min_confidence: f64,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self { lookback_hours: 168, horizon_hours: 24, min_samples: 10, model_update_ms: 3_600_000, min_confidence: 0.85 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub cycle_ms: u64,
    pub cpu_efficiency_threshold: f64,
    pub memory_efficiency_threshold: f64,
    pub cost_budget_hourly: f64,
    pub placement: String,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { cycle_ms: 300_000, cpu_efficiency_threshold: 0.7, memory_efficiency_threshold: 0.75, cost_budget_hourly: 10.0, placement: "balanced".to_string() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    Soft,
    Hard,
    #[default]
    Adaptive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub enforcement_mode: EnforcementMode,
    pub auto_recovery: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { enforcement_mode: EnforcementMode::Adaptive, auto_recovery: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub port: u16,
    pub enable_custom_metrics: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090, enable_custom_metrics: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// Root configuration object for the control plane. Deliberately not
/// `#[serde(deny_unknown_fields)]`: unrecognized keys are reserved for
/// additive future use, not rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub profiler: ProfilerConfig,
    pub enforcer: EnforcerConfig,
    pub analyzer: AnalyzerConfig,
    pub forecaster: ForecasterConfig,
    pub optimizer: OptimizerConfig,
    pub policy: PolicyConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl OrchestratorConfig {
    /// Validates cross-field invariants that a plain `Default`/deserialize
    /// cannot express (threshold ordering, bounded ranges).
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        for (name, t) in [
            ("cpu", &self.analyzer.cpu_thresholds),
            ("memory", &self.analyzer.memory_thresholds),
            ("disk", &self.analyzer.disk_thresholds),
            ("network", &self.analyzer.network_thresholds),
        ] {
            if !(t.warning < t.critical && t.critical < t.severe) {
                return Err(OrchestratorError::invalid_config(format!(
                    "{name} thresholds must satisfy warning < critical < severe, got {:?}",
                    t
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.forecaster.min_confidence) {
            return Err(OrchestratorError::invalid_config("forecaster.min_confidence must be in [0, 1]"));
        }
        if self.enforcer.violation_threshold == 0 {
            return Err(OrchestratorError::invalid_config("enforcer.violation_threshold must be >= 1"));
        }
        Ok(())
    }
}

/// Loads [`OrchestratorConfig`] from the layered defaults -> file -> env
/// chain. Environment variables use the `ORCHESTRATOR` prefix with `__` as
/// the nesting separator, e.g. `ORCHESTRATOR__ENFORCER__KILL_ON_VIOLATION`.
pub struct ConfigService;

impl ConfigService {
    pub fn load_default() -> Result<OrchestratorConfig, OrchestratorError> {
        Self::load(None::<&Path>)
    }

    pub fn load<P: AsRef<Path>>(config_path: Option<P>) -> Result<OrchestratorConfig, OrchestratorError> {
        let defaults = OrchestratorConfig::default();
        let defaults_value = config::Config::try_from(&defaults)
            .map_err(|e| OrchestratorError::invalid_config(format!("failed to seed defaults: {e}")))?;

        let mut builder = Config::builder().add_source(defaults_value);

        if let Some(path) = config_path {
            let path = path.as_ref();
            if path.exists() {
                builder = builder.add_source(File::from(path));
            } else {
                tracing::warn!(path = %path.display(), "config file not found, using defaults + environment");
            }
        }

        builder = builder.add_source(Environment::with_prefix("orchestrator").separator("__"));

        let built = builder
            .build()
            .map_err(|e| OrchestratorError::invalid_config(format!("failed to build configuration: {e}")))?;

        let config: OrchestratorConfig = built
            .try_deserialize()
            .map_err(|e| OrchestratorError::invalid_config(format!("failed to deserialize configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.profiler.system_interval_ms, 5_000);
        assert_eq!(cfg.enforcer.grace_period_ms, 60_000);
        assert_eq!(cfg.forecaster.min_samples, 10);
        assert_eq!(cfg.optimizer.placement, "balanced");
        assert_eq!(cfg.policy.enforcement_mode, EnforcementMode::Adaptive);
    }

    #[test]
    fn validate_rejects_out_of_order_thresholds() {
        let mut cfg = OrchestratorConfig::default();
        cfg.analyzer.cpu_thresholds.critical = 0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_violation_threshold() {
        let mut cfg = OrchestratorConfig::default();
        cfg.enforcer.violation_threshold = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_default_without_file_succeeds() {
        let cfg = ConfigService::load_default().unwrap();
        assert_eq!(cfg, OrchestratorConfig::default());
    }
}
