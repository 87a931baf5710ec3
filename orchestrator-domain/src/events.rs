// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Externally-observable events. A closed, versioned enum: unrecognized
//! event types fail closed, and each payload carries its own `v` field so
//! it can grow additively without breaking older readers.

use crate::bottleneck::BottleneckEvent;
use crate::ids::{ContainerId, HostId, JobId};
use crate::plan::OptimizationPlan;
use crate::violation::ViolationRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAdmittedPayload {
    pub v: u32,
    pub job_id: JobId,
    pub container_id: ContainerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompletedPayload {
    pub v: u32,
    pub job_id: JobId,
    pub container_id: ContainerId,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaAppliedPayload {
    pub v: u32,
    pub container_id: ContainerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationDetectedPayload {
    pub v: u32,
    pub violation: ViolationRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckActivePayload {
    pub v: u32,
    pub event: BottleneckEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckResolvedPayload {
    pub v: u32,
    pub event: BottleneckEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanGeneratedPayload {
    pub v: u32,
    pub plan: OptimizationPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecutedPayload {
    pub v: u32,
    pub succeeded_actions: u32,
    pub failed_actions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFailedPayload {
    pub v: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentUnhealthyPayload {
    pub v: u32,
    pub component: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    JobAdmitted { t: chrono::DateTime<chrono::Utc>, payload: JobAdmittedPayload },
    JobCompleted { t: chrono::DateTime<chrono::Utc>, payload: JobCompletedPayload },
    QuotaApplied { t: chrono::DateTime<chrono::Utc>, payload: QuotaAppliedPayload },
    ViolationDetected { t: chrono::DateTime<chrono::Utc>, payload: ViolationDetectedPayload },
    BottleneckActive { t: chrono::DateTime<chrono::Utc>, payload: BottleneckActivePayload },
    BottleneckResolved { t: chrono::DateTime<chrono::Utc>, payload: BottleneckResolvedPayload },
    PlanGenerated { t: chrono::DateTime<chrono::Utc>, payload: PlanGeneratedPayload },
    PlanExecuted { t: chrono::DateTime<chrono::Utc>, payload: PlanExecutedPayload },
    ActionFailed { t: chrono::DateTime<chrono::Utc>, payload: ActionFailedPayload },
    ComponentUnhealthy { t: chrono::DateTime<chrono::Utc>, payload: ComponentUnhealthyPayload },
}

impl OrchestratorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JobAdmitted { .. } => "job_admitted",
            Self::JobCompleted { .. } => "job_completed",
            Self::QuotaApplied { .. } => "quota_applied",
            Self::ViolationDetected { .. } => "violation_detected",
            Self::BottleneckActive { .. } => "bottleneck_active",
            Self::BottleneckResolved { .. } => "bottleneck_resolved",
            Self::PlanGenerated { .. } => "plan_generated",
            Self::PlanExecuted { .. } => "plan_executed",
            Self::ActionFailed { .. } => "action_failed",
            Self::ComponentUnhealthy { .. } => "component_unhealthy",
        }
    }

    pub fn t(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            Self::JobAdmitted { t, .. }
            | Self::JobCompleted { t, .. }
            | Self::QuotaApplied { t, .. }
            | Self::ViolationDetected { t, .. }
            | Self::BottleneckActive { t, .. }
            | Self::BottleneckResolved { t, .. }
            | Self::PlanGenerated { t, .. }
            | Self::PlanExecuted { t, .. }
            | Self::ActionFailed { t, .. }
            | Self::ComponentUnhealthy { t, .. } => *t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_name_matches_external_event_vocabulary() {
        let ev = OrchestratorEvent::JobAdmitted {
            t: chrono::Utc::now(),
            payload: JobAdmittedPayload { v: 1, job_id: JobId::new(), container_id: ContainerId::new() },
        };
        assert_eq!(ev.name(), "job_admitted");
    }

    #[test]
    fn round_trips_through_json() {
        let ev = OrchestratorEvent::ComponentUnhealthy {
            t: chrono::Utc::now(),
            payload: ComponentUnhealthyPayload { v: 1, component: "forecaster".into(), reason: "timeout".into() },
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: OrchestratorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name(), "component_unhealthy");
    }
}
