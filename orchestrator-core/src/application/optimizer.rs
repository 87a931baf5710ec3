// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Optimization Engine: turns a resource snapshot, Forecaster predictions,
//! and active Bottleneck Events into an ordered, deduplicated
//! [`OptimizationPlan`]. Four independent passes contribute candidate
//! actions; they are merged, sorted, and deduplicated once at the end.

use std::collections::HashMap;

use runner_orchestrator_domain::bottleneck::BottleneckEvent;
use runner_orchestrator_domain::ids::{ContainerId, HostId};
use runner_orchestrator_domain::job::Priority;
use runner_orchestrator_domain::plan::{Action, ActionKind, ActionPriority, ActionTarget, OptimizationPlan};
use runner_orchestrator_domain::value_objects::Confidence;

use crate::application::forecaster::ResourcePrediction;
use crate::infrastructure::config::OptimizerConfig;

/// Minimum confidence a prediction needs before the predictive-scaling pass
/// acts on it.
const MIN_SCALING_CONFIDENCE: f64 = 0.85;
const MIN_PLAN_CONFIDENCE_WARNING: f64 = 0.5;
const SCALE_UP_HEADROOM: f64 = 1.2;
const SCALE_DOWN_HEADROOM: f64 = 1.5;
const SCALE_DOWN_UTILIZATION_FLOOR: f64 = 0.1;
const MEDIUM_TERM_GROWTH_RESERVE_TRIGGER: f64 = 0.2;
const ENERGY_CONSOLIDATION_UTILIZATION_CEILING: f64 = 0.2;
const EMERGENCY_DEADLINE_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ContainerState {
    pub container_id: ContainerId,
    pub host_id: HostId,
    pub cpu_cores: f64,
    pub memory_bytes: u64,
    pub priority: Priority,
    pub zone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HostState {
    pub host_id: HostId,
    pub zone: Option<String>,
    pub cpu_capacity: f64,
    pub memory_capacity: u64,
    pub cpu_reserved: f64,
    pub memory_reserved: u64,
}

impl HostState {
    pub fn cpu_utilization(&self) -> f64 {
        if self.cpu_capacity <= 0.0 {
            0.0
        } else {
            self.cpu_reserved / self.cpu_capacity
        }
    }

    pub fn available_cpu(&self) -> f64 {
        (self.cpu_capacity - self.cpu_reserved).max(0.0)
    }

    pub fn available_memory(&self) -> u64 {
        self.memory_capacity.saturating_sub(self.memory_reserved)
    }

    pub fn can_place(&self, container: &ContainerState, same_host_permitted: bool, current_host: HostId) -> bool {
        if !same_host_permitted && self.host_id == current_host {
            return false;
        }
        if let (Some(host_zone), Some(container_zone)) = (&self.zone, &container.zone) {
            if host_zone != container_zone {
                return false;
            }
        }
        self.available_cpu() >= container.cpu_cores && self.available_memory() >= container.memory_bytes
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    pub hosts: Vec<HostState>,
    pub containers: Vec<ContainerState>,
}

/// Hourly cost per unit, used by the cost-optimization pass.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    pub per_cpu_core_hour: f64,
    pub per_gb_memory_hour: f64,
    pub per_gb_storage_hour: f64,
    pub per_mbps_network_hour: f64,
}

impl CostModel {
    pub fn hourly_cost(&self, container: &ContainerState) -> f64 {
        let memory_gb = container.memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        container.cpu_cores * self.per_cpu_core_hour + memory_gb * self.per_gb_memory_hour
    }
}

/// Per-container demand predictions the optimizer consults for the
/// predictive-scaling pass.
#[derive(Debug, Clone, Copy)]
pub struct ContainerForecast {
    pub short_term: ResourcePrediction,
    pub medium_term: ResourcePrediction,
}

pub struct OptimizationEngine {
    config: OptimizerConfig,
    sequence: std::sync::atomic::AtomicU64,
}

impl OptimizationEngine {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config, sequence: std::sync::atomic::AtomicU64::new(0) }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Runs all four passes, merges their candidate actions, and returns the
    /// sorted, deduplicated plan together with its estimated hourly cost.
    pub fn plan(
        &self,
        snapshot: &ResourceSnapshot,
        forecasts: &HashMap<ContainerId, ContainerForecast>,
        bottlenecks: &[BottleneckEvent],
        cost_model: &CostModel,
        same_host_permitted: bool,
    ) -> OptimizationPlan {
        let _ = bottlenecks;
        let mut actions = Vec::new();
        actions.extend(self.bin_packing_pass(snapshot, same_host_permitted));
        actions.extend(self.predictive_scaling_pass(snapshot, forecasts));
        actions.extend(self.cost_optimization_pass(snapshot, cost_model));
        actions.extend(self.energy_consolidation_pass(snapshot));

        let estimated_cost_hourly: f64 = snapshot.containers.iter().map(|c| cost_model.hourly_cost(c)).sum();
        let confidence = if actions.is_empty() {
            1.0
        } else {
            actions.iter().map(|a| a.confidence.get()).sum::<f64>() / actions.len() as f64
        };

        OptimizationPlan { actions, confidence, estimated_cost_hourly }.deduplicated().sorted_for_execution()
    }

    /// Pass 1: first-fit-decreasing bin packing. A host whose utilization
    /// exceeds the configured efficiency threshold is relieved by migrating
    /// its largest container to the densest feasible host that still fits
    /// it.
    fn bin_packing_pass(&self, snapshot: &ResourceSnapshot, same_host_permitted: bool) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut overloaded: Vec<&HostState> = snapshot.hosts.iter().filter(|h| h.cpu_utilization() > self.config.cpu_efficiency_threshold).collect();
        overloaded.sort_by(|a, b| b.cpu_utilization().partial_cmp(&a.cpu_utilization()).unwrap_or(std::cmp::Ordering::Equal));

        for host in overloaded {
            let mut candidates: Vec<&ContainerState> = snapshot.containers.iter().filter(|c| c.host_id == host.host_id).collect();
            candidates.sort_by(|a, b| b.cpu_cores.partial_cmp(&a.cpu_cores).unwrap_or(std::cmp::Ordering::Equal));
            let Some(container) = candidates.first() else { continue };

            let mut feasible: Vec<&HostState> = snapshot.hosts.iter().filter(|h| h.can_place(container, same_host_permitted, host.host_id)).collect();
            feasible.sort_by(|a, b| b.cpu_utilization().partial_cmp(&a.cpu_utilization()).unwrap_or(std::cmp::Ordering::Equal));

            if let Some(destination) = feasible.first() {
                actions.push(Action {
                    target: ActionTarget::Container(container.container_id),
                    kind: ActionKind::Migrate { destination_host: destination.host_id },
                    reason: format!("bin packing: host {} over efficiency threshold", host.host_id),
                    priority: ActionPriority::Medium,
                    confidence: Confidence::clamped(0.75),
                    generated_at: chrono::Utc::now(),
                    sequence: self.next_sequence(),
                });
            }
        }
        actions
    }

    /// Pass 2: scale containers toward their predicted demand, only when the
    /// Forecaster's confidence clears `MIN_SCALING_CONFIDENCE`.
    fn predictive_scaling_pass(&self, snapshot: &ResourceSnapshot, forecasts: &HashMap<ContainerId, ContainerForecast>) -> Vec<Action> {
        let mut actions = Vec::new();
        for container in &snapshot.containers {
            let Some(forecast) = forecasts.get(&container.container_id) else { continue };
            if forecast.short_term.confidence.get() >= MIN_SCALING_CONFIDENCE {
                let predicted = forecast.short_term.cpu_cores;
                let current = container.cpu_cores;
                if predicted > current * 0.9 {
                    actions.push(self.scale_action(container, predicted * SCALE_UP_HEADROOM, true));
                } else if predicted < current * 0.3 {
                    let floor = current * SCALE_DOWN_UTILIZATION_FLOOR;
                    actions.push(self.scale_action(container, (predicted * SCALE_DOWN_HEADROOM).max(floor), false));
                }
            }
            if forecast.medium_term.confidence.get() >= MIN_SCALING_CONFIDENCE {
                let growth = (forecast.medium_term.cpu_cores - container.cpu_cores) / container.cpu_cores.max(f64::EPSILON);
                if growth > MEDIUM_TERM_GROWTH_RESERVE_TRIGGER {
                    actions.push(Action {
                        target: ActionTarget::Container(container.container_id),
                        kind: ActionKind::ReserveCapacity {
                            cpu_cores: forecast.medium_term.cpu_cores,
                            memory_bytes: forecast.medium_term.memory_bytes as u64,
                        },
                        reason: format!("medium-term trend up {:.0}%", growth * 100.0),
                        priority: ActionPriority::Low,
                        confidence: forecast.medium_term.confidence,
                        generated_at: chrono::Utc::now(),
                        sequence: self.next_sequence(),
                    });
                }
            }
        }
        actions
    }

    fn scale_action(&self, container: &ContainerState, new_cpu_cores: f64, up: bool) -> Action {
        Action {
            target: ActionTarget::Container(container.container_id),
            kind: if up { ActionKind::ScaleUp { new_cpu_cores } } else { ActionKind::ScaleDown { new_cpu_cores } },
            reason: if up { "predicted demand exceeds current allocation".into() } else { "predicted demand well under current allocation".into() },
            priority: ActionPriority::Medium,
            confidence: Confidence::clamped(MIN_SCALING_CONFIDENCE),
            generated_at: chrono::Utc::now(),
            sequence: self.next_sequence(),
        }
    }

    /// Pass 3: sorts containers by cost efficiency (cores per dollar) and
    /// flags the least efficient ones under budget pressure for downsizing
    /// or shutdown.
    fn cost_optimization_pass(&self, snapshot: &ResourceSnapshot, cost_model: &CostModel) -> Vec<Action> {
        let total_cost: f64 = snapshot.containers.iter().map(|c| cost_model.hourly_cost(c)).sum();
        if total_cost <= self.config.cost_budget_hourly {
            return Vec::new();
        }

        let mut ranked: Vec<&ContainerState> = snapshot.containers.iter().collect();
        ranked.sort_by(|a, b| {
            let eff_a = a.cpu_cores / cost_model.hourly_cost(a).max(f64::EPSILON);
            let eff_b = b.cpu_cores / cost_model.hourly_cost(b).max(f64::EPSILON);
            eff_a.partial_cmp(&eff_b).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut actions = Vec::new();
        let mut remaining_over_budget = total_cost - self.config.cost_budget_hourly;
        for container in ranked {
            if remaining_over_budget <= 0.0 {
                break;
            }
            let efficiency = container.cpu_cores / cost_model.hourly_cost(container).max(f64::EPSILON);
            let kind = if efficiency < self.config.cpu_efficiency_threshold && container.priority == Priority::Low {
                ActionKind::Stop
            } else {
                ActionKind::ScaleDown { new_cpu_cores: (container.cpu_cores * 0.75).max(0.1) }
            };
            remaining_over_budget -= cost_model.hourly_cost(container);
            actions.push(Action {
                target: ActionTarget::Container(container.container_id),
                kind,
                reason: "cost over configured hourly budget".into(),
                priority: ActionPriority::Low,
                confidence: Confidence::clamped(0.7),
                generated_at: chrono::Utc::now(),
                sequence: self.next_sequence(),
            });
        }
        actions
    }

    /// Pass 4: hosts under the consolidation ceiling have every container
    /// migrated off them; if the plan places all of them, the host itself is
    /// powered down.
    fn energy_consolidation_pass(&self, snapshot: &ResourceSnapshot) -> Vec<Action> {
        let mut actions = Vec::new();
        for host in snapshot.hosts.iter().filter(|h| h.cpu_utilization() < ENERGY_CONSOLIDATION_UTILIZATION_CEILING && h.cpu_utilization() > 0.0) {
            let residents: Vec<&ContainerState> = snapshot.containers.iter().filter(|c| c.host_id == host.host_id).collect();
            let mut all_placed = true;
            let mut migrations = Vec::new();
            for container in &residents {
                let destination = snapshot
                    .hosts
                    .iter()
                    .filter(|h| h.host_id != host.host_id)
                    .find(|h| h.can_place(container, true, host.host_id));
                match destination {
                    Some(destination) => migrations.push(Action {
                        target: ActionTarget::Container(container.container_id),
                        kind: ActionKind::Migrate { destination_host: destination.host_id },
                        reason: format!("consolidating underutilized host {}", host.host_id),
                        priority: ActionPriority::Low,
                        confidence: Confidence::clamped(0.7),
                        generated_at: chrono::Utc::now(),
                        sequence: self.next_sequence(),
                    }),
                    None => {
                        all_placed = false;
                        break;
                    }
                }
            }
            if all_placed {
                actions.extend(migrations);
                actions.push(Action {
                    target: ActionTarget::Host(host.host_id),
                    kind: ActionKind::PowerDownHost,
                    reason: "all residents relocated, host idle".into(),
                    priority: ActionPriority::Low,
                    confidence: Confidence::clamped(0.8),
                    generated_at: chrono::Utc::now(),
                    sequence: self.next_sequence(),
                });
            }
        }
        actions
    }

    /// Rejects a plan that would overcommit any host's capacity once every
    /// action executes. Cost-over-budget and low overall confidence are
    /// warnings, surfaced to the caller rather than rejected.
    pub fn validate(&self, plan: &OptimizationPlan, snapshot: &ResourceSnapshot) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();
        let mut projected: HashMap<HostId, f64> = snapshot.hosts.iter().map(|h| (h.host_id, h.cpu_reserved)).collect();

        for action in &plan.actions {
            if let ActionKind::Migrate { destination_host } = action.kind {
                if let ActionTarget::Container(container_id) = action.target {
                    if let Some(container) = snapshot.containers.iter().find(|c| c.container_id == container_id) {
                        *projected.entry(destination_host).or_insert(0.0) += container.cpu_cores;
                        *projected.entry(container.host_id).or_insert(0.0) -= container.cpu_cores;
                    }
                }
            }
        }

        for host in &snapshot.hosts {
            let reserved = projected.get(&host.host_id).copied().unwrap_or(host.cpu_reserved);
            if reserved > host.cpu_capacity {
                return Err(format!("host {} would be overcommitted: {reserved:.2} reserved > {:.2} capacity", host.host_id, host.cpu_capacity));
            }
        }

        if plan.estimated_cost_hourly > self.config.cost_budget_hourly {
            warnings.push(format!("plan cost {:.2}/hr exceeds budget {:.2}/hr", plan.estimated_cost_hourly, self.config.cost_budget_hourly));
        }
        if plan.confidence < MIN_PLAN_CONFIDENCE_WARNING {
            warnings.push(format!("plan confidence {:.2} below {MIN_PLAN_CONFIDENCE_WARNING}", plan.confidence));
        }
        Ok(warnings)
    }

    /// A severe bottleneck bypasses the normal cycle and validation: a
    /// single restricted action against the worst offender, executed under a
    /// shorter deadline.
    pub fn emergency_plan(&self, bottleneck: &BottleneckEvent) -> OptimizationPlan {
        let Some(target) = bottleneck.related_container.map(ActionTarget::Container) else {
            return OptimizationPlan::default();
        };
        let kind = match bottleneck.bottleneck_type {
            runner_orchestrator_domain::bottleneck::BottleneckType::Memory => ActionKind::ClearCaches,
            runner_orchestrator_domain::bottleneck::BottleneckType::Cpu => ActionKind::ReduceConcurrency,
            _ => ActionKind::Stop,
        };
        let action = Action {
            target,
            kind,
            reason: "emergency bypass: severe bottleneck".into(),
            priority: ActionPriority::High,
            confidence: Confidence::clamped(0.6),
            generated_at: chrono::Utc::now(),
            sequence: self.next_sequence(),
        };
        OptimizationPlan { actions: vec![action], confidence: 0.6, estimated_cost_hourly: 0.0 }
    }

    pub fn emergency_deadline() -> std::time::Duration {
        std::time::Duration::from_secs(EMERGENCY_DEADLINE_SECS)
    }
}
