//! Aggregate activation metrics for dashboards.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One live boundary's contribution to the aggregate.
#[derive(Debug, Clone, Copy)]
pub struct BoundarySample {
    pub active: bool,
    pub deferred: bool,
    /// Registration-to-activation interval, when active.
    pub activation: Option<Duration>,
}

/// Snapshot over all live boundaries.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMetrics {
    pub total: usize,
    pub active: usize,
    pub deferred: usize,
    /// `active / total` as a percentage; 0 when nothing is registered.
    pub completion_pct: f64,
    pub mean_activation_ms: Option<f64>,
    /// Nearest-rank 95th percentile.
    pub p95_activation_ms: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl SchedulerMetrics {
    pub fn from_samples(samples: &[BoundarySample]) -> Self {
        let total = samples.len();
        let active = samples.iter().filter(|s| s.active).count();
        let deferred = samples.iter().filter(|s| s.deferred).count();

        let mut durations: Vec<f64> = samples
            .iter()
            .filter_map(|s| s.activation)
            .map(|d| d.as_micros() as f64 / 1000.0)
            .collect();
        durations.sort_by(f64::total_cmp);

        let completion_pct = if total == 0 {
            0.0
        } else {
            active as f64 / total as f64 * 100.0
        };
        let mean_activation_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        Self {
            total,
            active,
            deferred,
            completion_pct,
            mean_activation_ms,
            p95_activation_ms: percentile(&durations, 95.0),
            captured_at: Utc::now(),
        }
    }
}

/// Nearest-rank percentile of an ascending slice.
pub fn percentile(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    Some(sorted[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ms: Option<u64>) -> BoundarySample {
        BoundarySample {
            active: ms.is_some(),
            deferred: false,
            activation: ms.map(Duration::from_millis),
        }
    }

    #[test]
    fn test_empty() {
        let m = SchedulerMetrics::from_samples(&[]);
        assert_eq!(m.total, 0);
        assert_eq!(m.completion_pct, 0.0);
        assert!(m.mean_activation_ms.is_none());
        assert!(m.p95_activation_ms.is_none());
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 95.0), Some(19.0));
        assert_eq!(percentile(&values, 100.0), Some(20.0));
        assert_eq!(percentile(&[7.0], 95.0), Some(7.0));
        assert_eq!(percentile(&values, 0.0), Some(1.0));
    }

    #[test]
    fn test_aggregate() {
        let samples = [sample(Some(300)), sample(Some(100)), sample(None), sample(None)];
        let m = SchedulerMetrics::from_samples(&samples);
        assert_eq!(m.total, 4);
        assert_eq!(m.active, 2);
        assert_eq!(m.completion_pct, 50.0);
        assert_eq!(m.mean_activation_ms, Some(200.0));
        assert_eq!(m.p95_activation_ms, Some(300.0));
    }

    #[test]
    fn test_serializes_for_dashboard() {
        let m = SchedulerMetrics::from_samples(&[sample(Some(50))]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["p95_activation_ms"], 50.0);
        assert!(json["captured_at"].is_string());
    }
}
