// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Optimization Engine output: an ordered, deduplicated list of Actions.

use crate::ids::{ContainerId, HostId};
use crate::limits::ResourceLimitRecord;
use crate::value_objects::Confidence;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ActionTarget {
    Container(ContainerId),
    Host(HostId),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionKind {
    ScaleUp { new_cpu_cores: f64 },
    ScaleDown { new_cpu_cores: f64 },
    Resize { new_limits: Box<ResourceLimitRecord> },
    Migrate { destination_host: HostId },
    Stop,
    ReserveCapacity { cpu_cores: f64, memory_bytes: u64 },
    PowerDownHost,
    /// Emergency-bypass-only action: lowers the host concurrency ceiling.
    ReduceConcurrency,
    /// Emergency-bypass-only action: clears caches to relieve memory
    /// pressure.
    ClearCaches,
    /// Automatic-remediation action emitted by the Analyzer for a
    /// cache-efficiency bottleneck.
    ResizeCache { factor: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub target: ActionTarget,
    pub kind: ActionKind,
    pub reason: String,
    pub priority: ActionPriority,
    pub confidence: Confidence,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    /// Sequence number assigned at generation time, used to break priority
    /// ties in favor of the earlier-generated action.
    pub sequence: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationPlan {
    pub actions: Vec<Action>,
    /// Overall plan confidence; a warning (not rejection) is emitted when
    /// this falls below 0.5.
    pub confidence: f64,
    /// Estimated hourly cost of the post-plan allocation.
    pub estimated_cost_hourly: f64,
}

impl OptimizationPlan {
    /// Execution order: priority high -> medium -> low, ties broken by
    /// earlier-generated-first (lower `sequence`).
    pub fn sorted_for_execution(mut self) -> Self {
        self.actions.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));
        self
    }

    /// Collapses actions addressing the same target: keeps the latest
    /// action with the highest priority for each target.
    pub fn deduplicated(mut self) -> Self {
        use std::collections::HashMap;
        let mut best: HashMap<ActionTarget, Action> = HashMap::new();
        for action in self.actions.drain(..) {
            match best.get(&action.target) {
                Some(existing)
                    if existing.priority > action.priority
                        || (existing.priority == action.priority && existing.sequence > action.sequence) => {}
                _ => {
                    best.insert(action.target, action);
                }
            }
        }
        self.actions = best.into_values().collect();
        self
    }
}
