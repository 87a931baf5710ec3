// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain-wide error type for the orchestrator control plane.
//!
//! One variant per error kind recognised by the control plane (profiler,
//! enforcer, analyzer, forecaster, optimizer, orchestrator). Infrastructure
//! errors (sqlx, prometheus, the runtime driver) convert into this type at
//! the boundary; nothing infrastructure-specific leaks into the domain.

use thiserror::Error;

/// Errors the control plane recognises, one variant per row of the error
/// table: `InvalidLimits`, `InsufficientCapacity`, `BudgetExceeded`,
/// `Transient`, `SamplingUnavailable`, `ComponentUnhealthy`, `Fatal`, plus the
/// ambient categories (serialization, persistence, configuration) a real
/// crate needs around that core.
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    /// Reservation > limit, negative bytes, or any other bound violation.
    /// Reject the caller; never retry.
    #[error("invalid limits: {0}")]
    InvalidLimits(String),

    /// Required resources exceed what is currently available on the host.
    /// Reject the caller; the orchestrator may requeue.
    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    /// Estimated cost exceeds the configured hourly budget.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The runtime driver (or another collaborator) temporarily refused the
    /// call. Retried with exponential backoff by the caller.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A metric source is missing. The affected Sample field is nulled, not
    /// fabricated.
    #[error("sampling unavailable: {0}")]
    SamplingUnavailable(String),

    /// A component's health check failed.
    #[error("component unhealthy: {0}")]
    ComponentUnhealthy(String),

    /// Persistent corruption; the component is quarantined and the system
    /// continues without it.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("io error: {0}")]
    IoError(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("metrics error: {0}")]
    MetricsError(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl OrchestratorError {
    pub fn invalid_limits(msg: impl Into<String>) -> Self {
        Self::InvalidLimits(msg.into())
    }

    pub fn insufficient_capacity(msg: impl Into<String>) -> Self {
        Self::InsufficientCapacity(msg.into())
    }

    pub fn budget_exceeded(msg: impl Into<String>) -> Self {
        Self::BudgetExceeded(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn sampling_unavailable(msg: impl Into<String>) -> Self {
        Self::SamplingUnavailable(msg.into())
    }

    pub fn component_unhealthy(msg: impl Into<String>) -> Self {
        Self::ComponentUnhealthy(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceError(msg.into())
    }

    /// Whether the caller should retry this error with backoff.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::IoError(_) | Self::ComponentUnhealthy(_))
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidLimits(_) => "invalid_limits",
            Self::InsufficientCapacity(_) => "insufficient_capacity",
            Self::BudgetExceeded(_) => "budget_exceeded",
            Self::Transient(_) => "transient",
            Self::SamplingUnavailable(_) => "sampling_unavailable",
            Self::ComponentUnhealthy(_) => "component_unhealthy",
            Self::Fatal(_) => "fatal",
            Self::InvalidConfiguration(_) => "configuration",
            Self::ValidationError(_) => "validation",
            Self::SerializationError(_) => "serialization",
            Self::PersistenceError(_) => "persistence",
            Self::IoError(_) => "io",
            Self::InternalError(_) => "internal",
            Self::MetricsError(_) => "metrics",
            Self::Cancelled(_) => "cancellation",
        }
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        OrchestratorError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::SerializationError(err.to_string())
    }
}
