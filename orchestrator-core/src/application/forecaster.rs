// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Forecaster: predicts future demand and per-job resources well enough to
//! pre-commit capacity. Owns the per-job-class Resource Profiles.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use parking_lot::RwLock;
use runner_orchestrator_domain::error::OrchestratorError;
use runner_orchestrator_domain::forecast::{Forecast, ForecastPoint, Horizon};
use runner_orchestrator_domain::job::{JobClass, Priority};
use runner_orchestrator_domain::ports::Persistence;
use runner_orchestrator_domain::profile::ResourceProfile;
use runner_orchestrator_domain::value_objects::Confidence;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::infrastructure::config::ForecasterConfig;

const SEASONAL_SLOTS: usize = 24;
const DEMAND_ALPHA: f64 = 0.3;
const DEMAND_BETA: f64 = 0.1;
const DEFAULT_PREDICTED_CPU_CORES: f64 = 1.0;
const DEFAULT_PREDICTED_MEMORY_BYTES: f64 = 1024.0 * 1024.0 * 1024.0;

/// Cosine similarity above which a training record counts as a neighbour.
const KNN_SIMILARITY_THRESHOLD: f64 = 0.8;
/// Neighbours considered once the similarity threshold narrows the corpus.
const KNN_MAX_NEIGHBORS: usize = 10;
/// Bound on the persisted training corpus; oldest records are evicted first.
const TRAINING_CORPUS_CAPACITY: usize = 500;
const TRAINING_CORPUS_KEY: &str = "/forecaster/training_corpus";

/// Feature vector for the job-feature-similarity resource model:
/// repository, workflow, label count, time-of-week, and priority. Hashes
/// are reduced to a bounded range so no single feature dominates cosine
/// similarity purely through magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobFeatures {
    pub repository_hash: f64,
    pub workflow_hash: f64,
    pub label_count: f64,
    pub hour_of_day: f64,
    pub day_of_week: f64,
    pub priority: f64,
}

impl JobFeatures {
    pub fn extract(job_class: &JobClass, priority: Priority, at: DateTime<Utc>) -> Self {
        Self {
            repository_hash: Self::hash_component(job_class.repository()),
            workflow_hash: Self::hash_component(job_class.workflow()),
            label_count: job_class.labels().len() as f64,
            hour_of_day: at.hour() as f64,
            day_of_week: at.weekday().num_days_from_monday() as f64,
            priority: match priority {
                Priority::Low => 0.0,
                Priority::Normal => 1.0,
                Priority::High => 2.0,
            },
        }
    }

    fn hash_component(s: &str) -> f64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        s.hash(&mut hasher);
        (hasher.finish() % 10_000) as f64
    }

    fn components(&self) -> [f64; 6] {
        [self.repository_hash, self.workflow_hash, self.label_count, self.hour_of_day, self.day_of_week, self.priority]
    }

    /// `cos(theta) = (a . b) / (|a| |b|)`; zero when either vector is the
    /// origin, since direction is undefined there.
    fn cosine_similarity(&self, other: &Self) -> f64 {
        let a = self.components();
        let b = other.components();
        let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

/// One completed job's feature vector paired with its actuals, accumulated
/// into the KNN training corpus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct TrainingRecord {
    features: JobFeatures,
    cpu_cores: f64,
    memory_bytes: f64,
    disk_bytes: f64,
    network_mbps: f64,
}

/// Predicted per-dimension resource usage plus the confidence backing it.
#[derive(Debug, Clone, Copy)]
pub struct ResourcePrediction {
    pub cpu_cores: f64,
    pub memory_bytes: f64,
    pub disk_bytes: f64,
    pub network_mbps: f64,
    pub confidence: Confidence,
}

/// Exponential-smoothing state for the system-wide demand model.
#[derive(Debug, Clone, Copy, Default)]
struct DemandState {
    level: f64,
    trend: f64,
    initialized: bool,
}

pub struct Forecaster {
    config: ForecasterConfig,
    persistence: Arc<dyn Persistence>,
    profiles: RwLock<HashMap<JobClass, ResourceProfile>>,
    training: RwLock<Vec<TrainingRecord>>,
    demand: RwLock<DemandState>,
    seasonal: RwLock<[f64; SEASONAL_SLOTS]>,
    anomaly_times: RwLock<Vec<DateTime<Utc>>>,
}

impl Forecaster {
    pub fn new(persistence: Arc<dyn Persistence>, config: ForecasterConfig) -> Self {
        Self {
            config,
            persistence,
            profiles: RwLock::new(HashMap::new()),
            training: RwLock::new(Vec::new()),
            demand: RwLock::new(DemandState::default()),
            seasonal: RwLock::new([0.0; SEASONAL_SLOTS]),
            anomaly_times: RwLock::new(Vec::new()),
        }
    }

    /// Loads the persisted profile for `job_class`, if any, into memory.
    pub async fn restore_profile(&self, job_class: &JobClass) -> Result<(), OrchestratorError> {
        let key = format!("/profiles/{}", job_class.key());
        if let Some(bytes) = self.persistence.get(&key).await? {
            let profile: ResourceProfile = serde_json::from_slice(&bytes)?;
            self.profiles.write().insert(job_class.clone(), profile);
        }
        Ok(())
    }

    /// Loads the persisted KNN training corpus, if any, into memory.
    pub async fn restore_training_corpus(&self) -> Result<(), OrchestratorError> {
        if let Some(bytes) = self.persistence.get(TRAINING_CORPUS_KEY).await? {
            let records: Vec<TrainingRecord> = serde_json::from_slice(&bytes)?;
            *self.training.write() = records;
        }
        Ok(())
    }

    /// Records one completed job's actuals, refits the class profile, and
    /// appends its feature vector to the KNN training corpus (oldest record
    /// evicted once the corpus reaches [`TRAINING_CORPUS_CAPACITY`]). Writes
    /// are fire-and-forget from the domain's perspective: a persistence
    /// failure is logged but never propagated as a training failure.
    pub async fn record_actual(
        &self,
        job_class: &JobClass,
        priority: Priority,
        at: DateTime<Utc>,
        cpu_cores: f64,
        memory_bytes: f64,
        disk_bytes: f64,
        network_mbps: f64,
        duration_ms: f64,
    ) {
        let profile = {
            let mut profiles = self.profiles.write();
            let profile = profiles.entry(job_class.clone()).or_default();
            profile.record(cpu_cores, memory_bytes, disk_bytes, network_mbps, duration_ms);
            profile.clone()
        };

        let key = format!("/profiles/{}", job_class.key());
        match serde_json::to_vec(&profile) {
            Ok(bytes) => {
                if let Err(e) = self.persistence.put(&key, &bytes).await {
                    debug!(%job_class, error = %e, "failed to persist resource profile (non-fatal)");
                }
            }
            Err(e) => debug!(%job_class, error = %e, "failed to serialize resource profile"),
        }

        let corpus = {
            let mut training = self.training.write();
            training.push(TrainingRecord { features: JobFeatures::extract(job_class, priority, at), cpu_cores, memory_bytes, disk_bytes, network_mbps });
            while training.len() > TRAINING_CORPUS_CAPACITY {
                training.remove(0);
            }
            training.clone()
        };
        match serde_json::to_vec(&corpus) {
            Ok(bytes) => {
                if let Err(e) = self.persistence.put(TRAINING_CORPUS_KEY, &bytes).await {
                    debug!(error = %e, "failed to persist training corpus (non-fatal)");
                }
            }
            Err(e) => debug!(error = %e, "failed to serialize training corpus"),
        }
    }

    /// Predicts per-dimension resource usage for a job about to be admitted.
    /// Tries the k-nearest-neighbours feature-similarity model first
    /// (repository, workflow, label count, time-of-week, priority; cosine
    /// similarity above [`KNN_SIMILARITY_THRESHOLD`]); falls back through
    /// `class profile -> configured defaults` when the corpus has no
    /// sufficiently similar neighbour yet.
    pub fn predict_job_resources(&self, job_class: &JobClass, priority: Priority, at: DateTime<Utc>) -> ResourcePrediction {
        let query = JobFeatures::extract(job_class, priority, at);
        if let Some(prediction) = self.knn_predict(&query) {
            return prediction;
        }

        let profiles = self.profiles.read();
        match profiles.get(job_class) {
            Some(profile) if profile.is_trusted(self.config.min_samples as u64) => {
                let confidence = Confidence::clamped((profile.sample_count() as f64 / 10.0).min(0.9));
                ResourcePrediction {
                    cpu_cores: profile.cpu_cores.p95,
                    memory_bytes: profile.memory_bytes.p95,
                    disk_bytes: profile.disk_bytes.p95,
                    network_mbps: profile.network_mbps.p95,
                    confidence,
                }
            }
            Some(profile) if profile.sample_count() > 0 => ResourcePrediction {
                cpu_cores: profile.cpu_cores.mean,
                memory_bytes: profile.memory_bytes.mean,
                disk_bytes: profile.disk_bytes.mean,
                network_mbps: profile.network_mbps.mean,
                confidence: Confidence::clamped(0.5),
            },
            _ => ResourcePrediction {
                cpu_cores: DEFAULT_PREDICTED_CPU_CORES,
                memory_bytes: DEFAULT_PREDICTED_MEMORY_BYTES,
                disk_bytes: 0.0,
                network_mbps: 0.0,
                confidence: Confidence::clamped(0.5),
            },
        }
    }

    /// Similarity-weighted average over the nearest neighbours above
    /// [`KNN_SIMILARITY_THRESHOLD`], confidence `min(0.9, neighbours/10)`.
    /// `None` when the corpus has no sufficiently similar record, so the
    /// caller falls back to the class profile.
    fn knn_predict(&self, query: &JobFeatures) -> Option<ResourcePrediction> {
        let training = self.training.read();
        let mut neighbors: Vec<(f64, TrainingRecord)> =
            training.iter().map(|r| (query.cosine_similarity(&r.features), *r)).filter(|(sim, _)| *sim > KNN_SIMILARITY_THRESHOLD).collect();
        if neighbors.is_empty() {
            return None;
        }
        neighbors.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        neighbors.truncate(KNN_MAX_NEIGHBORS);

        let weight_sum: f64 = neighbors.iter().map(|(sim, _)| sim).sum();
        let weighted = |pick: fn(&TrainingRecord) -> f64| neighbors.iter().map(|(sim, r)| sim * pick(r)).sum::<f64>() / weight_sum;

        Some(ResourcePrediction {
            cpu_cores: weighted(|r| r.cpu_cores),
            memory_bytes: weighted(|r| r.memory_bytes),
            disk_bytes: weighted(|r| r.disk_bytes),
            network_mbps: weighted(|r| r.network_mbps),
            confidence: Confidence::clamped((neighbors.len() as f64 / 10.0).min(0.9)),
        })
    }

    /// Whether a prediction counts as accurate: within 20% of actual for
    /// every dimension supplied.
    pub fn is_accurate(predicted: &[(f64, f64)]) -> bool {
        predicted.iter().all(|&(predicted, actual)| {
            if actual == 0.0 {
                predicted == 0.0
            } else {
                ((predicted - actual) / actual).abs() < 0.2
            }
        })
    }

    /// Folds one new system-wide demand observation into the exponential
    /// smoothing model: `level_t = a*x_t + (1-a)*(level_{t-1} + trend_{t-1})`,
    /// `trend_t = b*(level_t - level_{t-1}) + (1-b)*trend_{t-1}`.
    pub fn observe_demand(&self, hour_of_day: usize, value: f64) {
        let mut demand = self.demand.write();
        if !demand.initialized {
            demand.level = value;
            demand.trend = 0.0;
            demand.initialized = true;
        } else {
            let prior_level = demand.level;
            demand.level = DEMAND_ALPHA * value + (1.0 - DEMAND_ALPHA) * (demand.level + demand.trend);
            demand.trend = DEMAND_BETA * (demand.level - prior_level) + (1.0 - DEMAND_BETA) * demand.trend;
        }
        let mut seasonal = self.seasonal.write();
        let slot = hour_of_day % SEASONAL_SLOTS;
        seasonal[slot] += (value - seasonal[slot]) * 0.1;
    }

    /// Produces a forecast series out to `horizon_hours`, one point per hour,
    /// with linearly-decaying confidence.
    pub fn demand_forecast(&self, horizon: Horizon, now: DateTime<Utc>) -> Forecast {
        let demand = *self.demand.read();
        let seasonal = *self.seasonal.read();
        let steps = match horizon {
            Horizon::Short => 1,
            Horizon::Medium => self.config.horizon_hours.min(1).max(1) as usize,
            Horizon::Long => self.config.horizon_hours as usize,
        };

        let base_confidence = if demand.level.abs() > f64::EPSILON {
            (1.0 - (demand.trend.abs() / demand.level.abs())).max(0.5)
        } else {
            0.5
        };

        let mut series = Vec::with_capacity(steps);
        for step in 1..=steps.max(1) {
            let hour = (now.hour() as usize + step) % SEASONAL_SLOTS;
            let value = demand.level + demand.trend * step as f64 + seasonal[hour];
            let confidence = Confidence::clamped(base_confidence - 0.01 * step as f64);
            series.push(ForecastPoint { t: now + chrono::Duration::hours(step as i64), value, confidence });
        }

        Forecast { horizon, series, mean_trend: demand.trend, seasonality: Some(seasonal.to_vec()) }
    }

    /// z-score classification: `|value - mean| / stddev > burst_sensitivity`.
    pub fn is_demand_anomaly(value: f64, mean: f64, stddev: f64, burst_sensitivity: f64) -> bool {
        if stddev <= 0.0 {
            return false;
        }
        ((value - mean) / stddev).abs() > burst_sensitivity
    }

    pub fn record_anomaly(&self, at: DateTime<Utc>) {
        self.anomaly_times.write().push(at);
    }

    /// Given >= 3 recent anomalies, predicts whether the next one falls
    /// within `horizon` of `now`, emitting a scale-up hint confidence of 0.7
    /// when it does.
    pub fn burst_prediction(&self, now: DateTime<Utc>, horizon: chrono::Duration) -> Option<Confidence> {
        let anomalies = self.anomaly_times.read();
        if anomalies.len() < 3 {
            return None;
        }
        let mut intervals = Vec::with_capacity(anomalies.len() - 1);
        for pair in anomalies.windows(2) {
            intervals.push((pair[1] - pair[0]).num_seconds() as f64);
        }
        let mean_interval_secs = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let last = *anomalies.last().unwrap();
        let predicted_next = last + chrono::Duration::seconds(mean_interval_secs as i64);
        if predicted_next <= now + horizon {
            Some(Confidence::clamped(0.7))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_orchestrator_domain::job::JobClass;

    fn forecaster() -> Forecaster {
        let persistence = futures::executor::block_on(crate::infrastructure::repositories::SqlitePersistence::in_memory()).unwrap();
        Forecaster::new(Arc::new(persistence), ForecasterConfig::default())
    }

    #[tokio::test]
    async fn untrained_job_class_falls_back_to_defaults() {
        let f = forecaster();
        let class = JobClass::new("acme/app", "ci", vec![]);
        let prediction = f.predict_job_resources(&class, Priority::Normal, Utc::now());
        assert_eq!(prediction.cpu_cores, DEFAULT_PREDICTED_CPU_CORES);
    }

    #[tokio::test]
    async fn trained_profile_is_used_once_trusted() {
        let f = forecaster();
        let class = JobClass::new("acme/app", "ci", vec![]);
        let at = Utc::now();
        for _ in 0..ForecasterConfig::default().min_samples {
            f.record_actual(&class, Priority::Normal, at, 2.0, 2_000_000_000.0, 0.0, 0.0, 1000.0).await;
        }
        let prediction = f.predict_job_resources(&class, Priority::Normal, at);
        assert!(prediction.confidence.get() >= 0.85);
    }

    #[tokio::test]
    async fn knn_model_predicts_from_similar_completed_jobs_before_any_class_profile_exists() {
        let f = forecaster();
        let trained = JobClass::new("acme/build", "ci", vec!["gpu".to_string()]);
        let at = Utc::now();
        // Ten completed jobs for one class feed the corpus; a *different*,
        // never-trained class with identical features (same repository,
        // workflow, labels, priority, and time-of-week) should still get a
        // confident KNN-backed prediction rather than falling through to
        // the untrained-class defaults.
        for _ in 0..10 {
            f.record_actual(&trained, Priority::Normal, at, 4.0, 8.0 * 1024.0 * 1024.0 * 1024.0, 0.0, 0.0, 1000.0).await;
        }
        let query = JobClass::new("acme/build", "ci", vec!["gpu".to_string()]);
        let prediction = f.predict_job_resources(&query, Priority::Normal, at);
        assert!((prediction.cpu_cores - 4.0).abs() < 0.01);
        assert!(prediction.confidence.get() >= 0.85);
    }

    #[test]
    fn cosine_similarity_of_identical_features_is_one() {
        let class = JobClass::new("acme/build", "ci", vec![]);
        let at = Utc::now();
        let a = JobFeatures::extract(&class, Priority::Normal, at);
        let b = JobFeatures::extract(&class, Priority::Normal, at);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn accuracy_requires_all_dimensions_within_tolerance() {
        assert!(Forecaster::is_accurate(&[(1.0, 1.1), (500.0, 520.0)]));
        assert!(!Forecaster::is_accurate(&[(1.0, 2.0)]));
    }

    #[test]
    fn demand_forecast_confidence_is_monotonic() {
        let f = forecaster();
        f.observe_demand(0, 10.0);
        f.observe_demand(1, 11.0);
        f.observe_demand(2, 12.0);
        let forecast = f.demand_forecast(Horizon::Long, Utc::now());
        assert!(forecast.confidence_is_monotonic());
    }

    #[test]
    fn burst_prediction_requires_at_least_three_anomalies() {
        let f = forecaster();
        let now = Utc::now();
        f.record_anomaly(now - chrono::Duration::minutes(20));
        f.record_anomaly(now - chrono::Duration::minutes(10));
        assert!(f.burst_prediction(now, chrono::Duration::minutes(30)).is_none());

        f.record_anomaly(now);
        assert!(f.burst_prediction(now, chrono::Duration::hours(1)).is_some());
    }

    #[test]
    fn demand_anomaly_respects_burst_sensitivity() {
        assert!(Forecaster::is_demand_anomaly(100.0, 50.0, 10.0, 2.0));
        assert!(!Forecaster::is_demand_anomaly(55.0, 50.0, 10.0, 2.0));
    }
}
