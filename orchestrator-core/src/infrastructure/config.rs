// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Configuration for the control plane: [`config_service::OrchestratorConfig`]
//! is the single root object, with one nested section per component
//! (Profiler, Enforcer, Analyzer, Forecaster, Optimizer, Policy) plus the
//! ambient metrics/logging sections. Loaded defaults-first, then overlaid by
//! an optional file and `ORCHESTRATOR__`-prefixed environment variables.
//!
//! Rayon pool sizing lives alongside this as [`rayon_config`] since it is
//! also process-wide configuration, sized once at startup.

pub mod config_service;
pub mod rayon_config;

pub use config_service::{
    AnalyzerConfig, ConfigService, DimensionThresholds, EnforcerConfig, ForecasterConfig, LoggingConfig, MetricsConfig, OptimizerConfig,
    OrchestratorConfig, PolicyConfig, ProfilerConfig, StorageBackend,
};
