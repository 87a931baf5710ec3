// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rayon Thread Pool Configuration
//!
//! Global Rayon thread pool configuration for the control plane's
//! background compute work: the Analyzer's deep-tick correlation/anomaly
//! pass and the Forecaster's periodic model refit.
//!
//! ## Overview
//!
//! - **Compute Pool**: Sized for the CPU-bound deep-tick/refit work.
//! - **Mixed Pool**: Sized for the Optimization Engine's cycle, which also
//!   calls the runtime driver and therefore suspends.
//! - **Thread Naming**: Clear thread naming for debugging and profiling.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use runner_orchestrator_core::infrastructure::config::rayon_config::RAYON_POOLS;
//!
//! let results = RAYON_POOLS.compute_pool().install(|| {
//!     samples.par_iter().map(correlate).collect::<Vec<_>>()
//! });
//! ```

use runner_orchestrator_domain::error::OrchestratorError;
use runner_orchestrator_domain::value_objects::WorkerCount;
use std::sync::Arc;

/// Rayon thread pool manager for the control plane's two background
/// workload shapes: pure compute and mixed compute+suspend.
pub struct RayonPoolManager {
    compute_pool: Arc<rayon::ThreadPool>,
    mixed_pool: Arc<rayon::ThreadPool>,
}

impl RayonPoolManager {
    /// Creates a new Rayon pool manager with the two pools sized per
    /// [`WorkerCount::optimal_for_compute`] / [`WorkerCount::optimal_for_mixed`].
    pub fn new() -> Result<Self, OrchestratorError> {
        let available_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(WorkerCount::DEFAULT_WORKERS);

        let compute_worker_count = WorkerCount::optimal_for_compute(available_cores);

        let compute_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(compute_worker_count.get())
            .thread_name(|i| format!("rayon-compute-{}", i))
            .build()
            .map_err(|e| OrchestratorError::internal(format!("failed to create compute pool: {e}")))?;

        let mixed_worker_count = WorkerCount::optimal_for_mixed(available_cores);

        let mixed_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(mixed_worker_count.get())
            .thread_name(|i| format!("rayon-mixed-{}", i))
            .build()
            .map_err(|e| OrchestratorError::internal(format!("failed to create mixed pool: {e}")))?;

        Ok(Self { compute_pool: Arc::new(compute_pool), mixed_pool: Arc::new(mixed_pool) })
    }

    /// Compute pool: analyzer deep tick, forecaster model refit.
    pub fn compute_pool(&self) -> &Arc<rayon::ThreadPool> {
        &self.compute_pool
    }

    /// Mixed pool: optimizer cycle (touches the runtime driver).
    pub fn mixed_pool(&self) -> &Arc<rayon::ThreadPool> {
        &self.mixed_pool
    }

    pub fn compute_thread_count(&self) -> usize {
        self.compute_pool.current_num_threads()
    }

    pub fn mixed_thread_count(&self) -> usize {
        self.mixed_pool.current_num_threads()
    }
}

/// Global Rayon pool manager instance, initialized once at program startup.
///
/// # Panics
/// Panics if the pools cannot be built (should never happen in normal
/// operation).
#[allow(clippy::expect_used)]
pub static RAYON_POOLS: std::sync::LazyLock<RayonPoolManager> =
    std::sync::LazyLock::new(|| RayonPoolManager::new().expect("failed to initialize rayon pools"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rayon_pool_creation() {
        let manager = RayonPoolManager::new().unwrap();
        assert!(manager.compute_thread_count() > 0);
        assert!(manager.mixed_thread_count() > 0);
    }

    #[test]
    fn test_global_pool_access() {
        let compute_pool = RAYON_POOLS.compute_pool();
        assert!(compute_pool.current_num_threads() > 0);

        let mixed_pool = RAYON_POOLS.mixed_pool();
        assert!(mixed_pool.current_num_threads() > 0);
    }

    #[test]
    fn test_pool_sizing() {
        let manager = RayonPoolManager::new().unwrap();
        let available_cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

        if available_cores >= 4 {
            assert!(manager.compute_thread_count() >= manager.mixed_thread_count());
        }
    }
}
