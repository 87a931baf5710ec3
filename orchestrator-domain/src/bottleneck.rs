// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Bottleneck classification emitted by the Analyzer.

use crate::ids::ContainerId;
use crate::value_objects::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckType {
    Cpu,
    Memory,
    Disk,
    Network,
    ContainerStartup,
    CacheEfficiency,
    Concurrency,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    System,
    Application,
    Container,
    Network,
}

/// Key identifying one slot in the Analyzer's Active Bottleneck Map.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BottleneckKey {
    pub bottleneck_type: BottleneckType,
    pub layer: Layer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckEvent {
    pub t: chrono::DateTime<chrono::Utc>,
    pub bottleneck_type: BottleneckType,
    pub layer: Layer,
    pub severity: Severity,
    pub current_value: f64,
    pub threshold: f64,
    pub related_container: Option<ContainerId>,
}

impl BottleneckEvent {
    pub fn key(&self) -> BottleneckKey {
        BottleneckKey { bottleneck_type: self.bottleneck_type, layer: self.layer }
    }
}
