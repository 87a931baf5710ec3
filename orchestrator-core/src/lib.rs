// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Runner Orchestrator
//!
//! The adaptive resource-management control plane for a self-hosted CI
//! runner fleet: a closed loop of six components that observe resource
//! usage, enforce limits, detect bottlenecks, forecast demand, plan
//! corrective actions, and apply them back to the runtime.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  Profiler, Quota Enforcer, Bottleneck Analyzer,             │
//! │  Forecaster, Optimization Engine, Orchestrator              │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! │  (runner-orchestrator-domain: samples, limits, violations,  │
//! │   bottlenecks, forecasts, plans, events, ports)              │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (config, metrics, logging, SQLite persistence, adapters)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Control loop
//!
//! The Profiler samples host and container resource usage. The Quota
//! Enforcer applies Resource Limit Records and watches for violations. The
//! Bottleneck Analyzer rolls samples into severity-labelled events and a
//! system health score. The Forecaster predicts near-term demand and
//! per-job resource needs. The Optimization Engine turns predictions and
//! active bottlenecks into a validated, ordered plan. The Orchestrator
//! admits jobs, runs the optimization cycle, and supervises the health of
//! the other five components.
//!
//! Domain types never depend on infrastructure; every side effect (the
//! container runtime, the pre-warmed slot pool, persistence) is reached
//! through a capability port in `runner_orchestrator_domain::ports`, with
//! infrastructure supplying the concrete adapter.
//!
//! ## Testing
//!
//! ```bash
//! cargo test
//! ```

pub mod application;
pub mod infrastructure;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in tests/ directory

pub use runner_orchestrator_domain::error::OrchestratorError;
