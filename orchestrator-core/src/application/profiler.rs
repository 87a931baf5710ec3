// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Profiler: delivers a uniform sampled view of host and container resource
//! usage. Sampling runs on its own timer and never blocks callers; a tick
//! that overruns skips the next one rather than queuing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use runner_orchestrator_domain::error::OrchestratorError;
use runner_orchestrator_domain::ids::{ContainerId, HostId};
use runner_orchestrator_domain::ports::RuntimeDriver;
use runner_orchestrator_domain::sample::Sample;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::infrastructure::adapters::retry_transient;
use crate::infrastructure::config::ProfilerConfig;
use crate::infrastructure::metrics::MetricsService;

/// Backlog size for the sample stream. A slow subscriber that falls this far
/// behind starts missing samples; it can always fall back to
/// [`Profiler::rolling_window`].
const STREAM_CAPACITY: usize = 1024;

pub struct Profiler {
    runtime: Arc<dyn RuntimeDriver>,
    metrics: Arc<MetricsService>,
    config: ProfilerConfig,
    host_id: HostId,
    window: RwLock<VecDeque<Sample>>,
    stream: broadcast::Sender<Sample>,
}

impl Profiler {
    pub fn new(runtime: Arc<dyn RuntimeDriver>, metrics: Arc<MetricsService>, config: ProfilerConfig, host_id: HostId) -> Self {
        let (stream, _) = broadcast::channel(STREAM_CAPACITY);
        Self { runtime, metrics, config, host_id, window: RwLock::new(VecDeque::new()), stream }
    }

    /// Host-wide sample. No host-metrics collector port is defined at this
    /// boundary (only `RuntimeDriver`/`SlotProvider`/`Persistence` are
    /// capability ports); every field is left nulled rather than fabricated,
    /// per the "missing sources nulled, never fabricated" policy, until a
    /// host-metrics adapter is wired in above this layer.
    pub async fn sample_system(&self) -> Result<Sample, OrchestratorError> {
        let sample = Sample::host(self.host_id, Utc::now());
        self.record(sample.clone());
        self.metrics.increment_samples();
        Ok(sample)
    }

    /// Per-container sample via the runtime driver's stats call, retried on
    /// transient failure. `first_sample`/zeroed `cpu_pct` are the driver's
    /// own signal for "no prior snapshot yet"; passed through unchanged.
    pub async fn sample_container(&self, container_id: ContainerId, deadline: Duration) -> Result<Sample, OrchestratorError> {
        let result = retry_transient("profiler.sample_container", || self.runtime.stats(container_id, deadline)).await;
        match result {
            Ok(sample) => {
                self.record(sample.clone());
                self.metrics.increment_samples();
                Ok(sample)
            }
            Err(e) => {
                self.metrics.increment_sampling_errors();
                warn!(%container_id, error = %e, "container sampling failed");
                Err(OrchestratorError::sampling_unavailable(format!("container {container_id}: {e}")))
            }
        }
    }

    /// A live feed of newly-recorded samples. Restartable in the sense that a
    /// fresh subscription always starts from "now"; history before that point
    /// is only available through [`Profiler::rolling_window`].
    pub fn stream(&self) -> broadcast::Receiver<Sample> {
        self.stream.subscribe()
    }

    /// Finite snapshot of samples whose `t` falls within `[now-duration, now]`.
    pub fn rolling_window(&self, duration: Duration) -> Vec<Sample> {
        let cutoff = Utc::now() - chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        self.window.read().iter().filter(|s| s.t >= cutoff).cloned().collect()
    }

    fn record(&self, sample: Sample) {
        let retention = chrono::Duration::milliseconds(self.config.retention_ms as i64);
        let cutoff = Utc::now() - retention;
        {
            let mut window = self.window.write();
            window.push_back(sample.clone());
            while window.front().map(|s| s.t < cutoff).unwrap_or(false) {
                window.pop_front();
            }
        }
        // A stream with no subscribers yields `SendError`; that is the normal
        // steady state between Analyzer ticks and is not a sampling failure.
        let _ = self.stream.send(sample);
    }

    /// Spawns the system-sampling timer. Uses `MissedTickBehavior::Skip` so an
    /// overrunning tick is dropped rather than queued, per policy.
    pub fn spawn_system_sampling_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let profiler = self.clone();
        let interval_ms = self.config.system_interval_ms;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = profiler.sample_system().await {
                    warn!(error = %e, "system sampling tick failed");
                }
                debug!("system sampling tick complete");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_orchestrator_domain::ports::{RuntimeError, SlotSpec};
    use runner_orchestrator_domain::limits::ResourceLimitRecord;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeDriver {
        calls: AtomicU32,
        fail_first: bool,
    }

    #[async_trait::async_trait]
    impl RuntimeDriver for FakeDriver {
        async fn create_slot(&self, _spec: &SlotSpec, _deadline: Duration) -> Result<ContainerId, RuntimeError> {
            Ok(ContainerId::new())
        }
        async fn apply_limits(&self, _slot_id: ContainerId, _limits: &ResourceLimitRecord, _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn stats(&self, slot_id: ContainerId, _deadline: Duration) -> Result<Sample, RuntimeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(RuntimeError::Transient("warming up".into()));
            }
            let mut sample = Sample::container(HostId::new(), slot_id, Utc::now());
            sample.cpu_pct = Some(12.5);
            Ok(sample)
        }
        async fn exec(&self, _slot_id: ContainerId, _cmd: &[String], _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn stop(&self, _slot_id: ContainerId, _force: bool, _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn destroy(&self, _slot_id: ContainerId, _deadline: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn supports_traffic_shaping(&self) -> bool {
            false
        }
    }

    fn profiler(fail_first: bool) -> Profiler {
        Profiler::new(
            Arc::new(FakeDriver { calls: AtomicU32::new(0), fail_first }),
            Arc::new(MetricsService::new().unwrap()),
            ProfilerConfig::default(),
            HostId::new(),
        )
    }

    #[tokio::test]
    async fn sample_system_has_nulled_fields_not_fabricated() {
        let p = profiler(false);
        let sample = p.sample_system().await.unwrap();
        assert!(sample.cpu_pct.is_none());
        assert!(sample.mem_used.is_none());
    }

    #[tokio::test]
    async fn sample_container_retries_transient_failure() {
        let p = profiler(true);
        let sample = p.sample_container(ContainerId::new(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(sample.cpu_pct, Some(12.5));
    }

    #[tokio::test]
    async fn rolling_window_only_returns_recent_samples() {
        let p = profiler(false);
        p.sample_system().await.unwrap();
        let recent = p.rolling_window(Duration::from_secs(60));
        assert_eq!(recent.len(), 1);
        let empty = p.rolling_window(Duration::from_millis(0));
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn stream_delivers_recorded_samples_to_subscribers() {
        let p = profiler(false);
        let mut rx = p.stream();
        p.sample_system().await.unwrap();
        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.host_id, p.host_id);
    }
}
