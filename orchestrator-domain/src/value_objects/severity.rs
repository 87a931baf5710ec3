// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Bottleneck / health severity, ordered by remediation urgency.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
    Severe,
}

impl Severity {
    /// System-health score penalty contributed by one active bottleneck of
    /// this severity.
    pub fn health_penalty(&self) -> i32 {
        match self {
            Severity::Normal => 0,
            Severity::Warning => 10,
            Severity::Critical => 20,
            Severity::Severe => 30,
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Severe => "severe",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_urgency() {
        assert!(Severity::Normal < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert!(Severity::Critical < Severity::Severe);
    }

    #[test]
    fn penalties_match_health_score_rule() {
        assert_eq!(Severity::Warning.health_penalty(), 10);
        assert_eq!(Severity::Critical.health_penalty(), 20);
        assert_eq!(Severity::Severe.health_penalty(), 30);
    }
}
