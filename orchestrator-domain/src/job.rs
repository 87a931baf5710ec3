// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Job requests and the job-class equivalence key resource profiles
//! accumulate under.

use crate::ids::JobId;
use crate::value_objects::{MemorySize, NetworkSize, StorageSize};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Equivalence class of jobs keyed by `{repository, workflow, labels}`.
/// Resource profiles accumulate per class, so the class key must be
/// stable and order-independent in its label set.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobClass {
    repository: String,
    workflow: String,
    labels: Vec<String>,
}

impl JobClass {
    pub fn new(repository: impl Into<String>, workflow: impl Into<String>, mut labels: Vec<String>) -> Self {
        labels.sort();
        labels.dedup();
        Self { repository: repository.into(), workflow: workflow.into(), labels }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Stable string key usable as a persistence path segment
    /// (`/profiles/<jobClass>`).
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.repository, self.workflow, self.labels.join(","))
    }
}

impl Display for JobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Explicit resource hints a caller may attach to a Job Request, overriding
/// the Forecaster's prediction for fields that are set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceHints {
    pub cpu_cores: Option<f64>,
    pub memory: Option<MemorySize>,
    pub disk: Option<StorageSize>,
    pub network: Option<NetworkSize>,
}

/// Immutable job request as it enters the Orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    job_id: JobId,
    job_class: JobClass,
    hints: ResourceHints,
    priority: Priority,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl JobRequest {
    pub fn new(job_class: JobClass, hints: ResourceHints, priority: Priority) -> Self {
        Self { job_id: JobId::new(), job_class, hints, priority, created_at: chrono::Utc::now() }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn job_class(&self) -> &JobClass {
        &self.job_class
    }

    pub fn hints(&self) -> &ResourceHints {
        &self.hints
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_class_key_is_label_order_independent() {
        let a = JobClass::new("acme/build", "ci", vec!["gpu".into(), "arm64".into()]);
        let b = JobClass::new("acme/build", "ci", vec!["arm64".into(), "gpu".into()]);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn default_priority_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }
}
