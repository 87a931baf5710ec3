// /////////////////////////////////////////////////////////////////////////////
// Optimized Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Forecaster output: a series of predicted points with non-increasing
//! confidence over the horizon.

use crate::value_objects::Confidence;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    /// <= 5 minutes.
    Short,
    /// <= 1 hour.
    Medium,
    /// <= 24 hours.
    Long,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub t: chrono::DateTime<chrono::Utc>,
    pub value: f64,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub horizon: Horizon,
    pub series: Vec<ForecastPoint>,
    pub mean_trend: f64,
    pub seasonality: Option<Vec<f64>>,
}

impl Forecast {
    /// Confidence must be monotonically non-increasing in horizon
    /// distance: `i < j => series[i].confidence >= series[j].confidence`.
    pub fn confidence_is_monotonic(&self) -> bool {
        self.series.windows(2).all(|w| w[0].confidence.get() >= w[1].confidence.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(confidence: f64) -> ForecastPoint {
        ForecastPoint { t: chrono::Utc::now(), value: 1.0, confidence: Confidence::clamped(confidence) }
    }

    #[test]
    fn non_increasing_series_is_monotonic() {
        let f = Forecast {
            horizon: Horizon::Long,
            series: vec![point(0.9), point(0.85), point(0.8), point(0.8)],
            mean_trend: 0.0,
            seasonality: None,
        };
        assert!(f.confidence_is_monotonic());
    }

    #[test]
    fn increasing_confidence_violates_monotonicity() {
        let f = Forecast {
            horizon: Horizon::Long,
            series: vec![point(0.7), point(0.9)],
            mean_trend: 0.0,
            seasonality: None,
        };
        assert!(!f.confidence_is_monotonic());
    }
}
