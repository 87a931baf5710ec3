// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Capability ports the control plane consumes but never implements
//! itself: the container runtime, the pre-warmed slot pool, and the
//! key-value persistence store. Domain logic depends only on these traits;
//! infrastructure supplies the adapters.

use crate::ids::{ContainerId, HostId};
use crate::limits::ResourceLimitRecord;
use crate::sample::Sample;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors normalized at the `RuntimeDriver` boundary, per the external
/// interfaces contract.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum RuntimeError {
    #[error("not found")]
    NotFound,
    #[error("busy")]
    Busy,
    #[error("refused: {0}")]
    Refused(String),
    #[error("transient: {0}")]
    Transient(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSpec {
    pub host_id: HostId,
    pub image: String,
    pub labels: Vec<String>,
}

/// Consumed capability for the container runtime. The core never talks to
/// a specific engine's API directly; it only ever calls through this
/// trait.
#[async_trait]
pub trait RuntimeDriver: Send + Sync {
    async fn create_slot(&self, spec: &SlotSpec, deadline: Duration) -> Result<ContainerId, RuntimeError>;
    async fn apply_limits(&self, slot_id: ContainerId, limits: &ResourceLimitRecord, deadline: Duration) -> Result<(), RuntimeError>;
    async fn stats(&self, slot_id: ContainerId, deadline: Duration) -> Result<Sample, RuntimeError>;
    async fn exec(&self, slot_id: ContainerId, cmd: &[String], deadline: Duration) -> Result<(), RuntimeError>;
    async fn stop(&self, slot_id: ContainerId, force: bool, deadline: Duration) -> Result<(), RuntimeError>;
    async fn destroy(&self, slot_id: ContainerId, deadline: Duration) -> Result<(), RuntimeError>;
    /// Whether this driver supports runtime traffic-shaping hooks; when
    /// `false`, the Enforcer falls back to the documented degraded mode
    /// (periodic observation + CPU-quota throttling) for bandwidth.
    fn supports_traffic_shaping(&self) -> bool;
}

/// Consumed capability for the pre-warmed startup pool.
#[async_trait]
pub trait SlotProvider: Send + Sync {
    async fn acquire(&self, hint: Option<&str>, deadline: Duration) -> Result<ContainerId, RuntimeError>;
    async fn release(&self, slot_id: ContainerId, deadline: Duration) -> Result<(), RuntimeError>;
    async fn resize(&self, pool_size: usize, deadline: Duration) -> Result<(), RuntimeError>;
    async fn available(&self) -> usize;
}

/// Consumed capability: a key-value store for Profiles, execution history,
/// and baseline stats. Writes are fire-and-forget; startup restores
/// best-effort, so callers should not treat a `put` failure as fatal.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), crate::error::OrchestratorError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, crate::error::OrchestratorError>;
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, crate::error::OrchestratorError>;
    async fn delete(&self, key: &str) -> Result<(), crate::error::OrchestratorError>;
}
