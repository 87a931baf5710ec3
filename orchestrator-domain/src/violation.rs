// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-(container, dimension) violation tracking and the Enforcer's
//! violation state machine.

use crate::ids::ContainerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Cpu,
    Memory,
    Storage,
    Network,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationState {
    Compliant,
    Violating,
    Grace,
    Throttled,
    Killed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub container_id: ContainerId,
    pub t: chrono::DateTime<chrono::Utc>,
    pub dimension: Dimension,
    pub observed: f64,
    pub limit: f64,
    /// Accumulates with each subsequent violation; resets on remediation.
    pub count: u32,
    pub state: ViolationState,
    pub grace_start: Option<chrono::DateTime<chrono::Utc>>,
}

impl ViolationRecord {
    pub const TOLERANCE: f64 = 0.1;
    pub const DEFAULT_VIOLATION_THRESHOLD: u32 = 3;
    pub const DEFAULT_GRACE_PERIOD_SECS: i64 = 60;

    pub fn new(container_id: ContainerId, dimension: Dimension, observed: f64, limit: f64, t: chrono::DateTime<chrono::Utc>) -> Self {
        Self { container_id, t, dimension, observed, limit, count: 0, state: ViolationState::Compliant, grace_start: None }
    }

    fn exceeds(&self, observed: f64) -> bool {
        observed > self.limit * (1.0 + Self::TOLERANCE)
    }

    /// Applies one new observation to the state machine's
    /// `compliant -> violating -> grace -> throttled -> killed` chain.
    /// Returns `true` if this call produced a state transition (callers
    /// emit one notification per transition, never per observation).
    pub fn observe(
        &mut self,
        observed: f64,
        t: chrono::DateTime<chrono::Utc>,
        violation_threshold: u32,
        grace_period_secs: i64,
        kill_on_violation: bool,
    ) -> bool {
        self.observed = observed;
        self.t = t;
        let violating_now = self.exceeds(observed);

        match self.state {
            ViolationState::Compliant => {
                if violating_now {
                    self.state = ViolationState::Violating;
                    return true;
                }
                false
            }
            ViolationState::Violating => {
                if !violating_now {
                    self.state = ViolationState::Compliant;
                    return true;
                }
                self.state = ViolationState::Grace;
                self.grace_start = Some(t);
                self.count += 1;
                true
            }
            ViolationState::Grace => {
                if !violating_now {
                    self.state = ViolationState::Compliant;
                    self.count = 0;
                    self.grace_start = None;
                    return true;
                }
                self.count += 1;
                let grace_elapsed = self.grace_start.map(|start| (t - start).num_seconds()).unwrap_or(0);
                if self.count >= violation_threshold && grace_elapsed >= grace_period_secs {
                    self.state = ViolationState::Throttled;
                    return true;
                }
                false
            }
            ViolationState::Throttled => {
                if !violating_now {
                    self.state = ViolationState::Compliant;
                    self.count = 0;
                    self.grace_start = None;
                    return true;
                }
                if kill_on_violation {
                    self.state = ViolationState::Killed;
                    return true;
                }
                false
            }
            ViolationState::Killed => false,
        }
    }

    pub fn reset_on_remediation(&mut self) {
        self.state = ViolationState::Compliant;
        self.count = 0;
        self.grace_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn compliant_to_violating_to_grace_to_throttled() {
        let start = Utc::now();
        let mut v = ViolationRecord::new(ContainerId::new(), Dimension::Cpu, 1.0, 1.0, start);

        assert!(v.observe(2.2, start, 3, 60, true));
        assert_eq!(v.state, ViolationState::Violating);

        assert!(v.observe(2.2, start + Duration::seconds(10), 3, 60, true));
        assert_eq!(v.state, ViolationState::Grace);

        // Two more violations within grace, threshold not yet reached.
        assert!(!v.observe(2.2, start + Duration::seconds(20), 3, 60, true));
        assert_eq!(v.state, ViolationState::Grace);

        // Threshold reached but grace period (60s) not yet elapsed.
        assert!(!v.observe(2.2, start + Duration::seconds(30), 3, 60, true));
        assert_eq!(v.state, ViolationState::Grace);

        // Grace period elapsed and threshold already met: throttle.
        assert!(v.observe(2.2, start + Duration::seconds(60), 3, 60, true));
        assert_eq!(v.state, ViolationState::Throttled);
    }

    #[test]
    fn throttled_to_killed_only_when_policy_enabled() {
        let start = Utc::now();
        let mut v = ViolationRecord::new(ContainerId::new(), Dimension::Cpu, 1.0, 1.0, start);
        v.state = ViolationState::Throttled;
        assert!(v.observe(2.2, start, 3, 60, true));
        assert_eq!(v.state, ViolationState::Killed);

        let mut v2 = ViolationRecord::new(ContainerId::new(), Dimension::Cpu, 1.0, 1.0, start);
        v2.state = ViolationState::Throttled;
        assert!(!v2.observe(2.2, start, 3, 60, false));
        assert_eq!(v2.state, ViolationState::Throttled);
    }

    #[test]
    fn compliant_observation_is_not_a_transition() {
        let start = Utc::now();
        let mut v = ViolationRecord::new(ContainerId::new(), Dimension::Cpu, 1.0, 1.0, start);
        assert!(!v.observe(0.5, start, 3, 60, true));
        assert_eq!(v.state, ViolationState::Compliant);
    }
}
