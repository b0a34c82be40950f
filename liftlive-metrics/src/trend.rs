//! Velocity analytics over a set's speed series

use serde::{Deserialize, Serialize};

/// Slope (m/s per rep) inside which a series counts as stable
const STABLE_SLOPE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Declining,
    Stable,
    Increasing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trend", rename_all = "snake_case")]
pub enum VelocityTrend {
    InsufficientData,
    Measured {
        direction: TrendDirection,
        /// Least-squares slope over rep index
        slope: f64,
        /// First-to-last speed drop (percent)
        velocity_loss_pct: f64,
        mean_velocity: f64,
        std_velocity: f64,
    },
}

/// Fit a line through the speed series and classify its direction.
pub fn velocity_trend(speeds: &[f64]) -> VelocityTrend {
    if speeds.len() < 2 {
        return VelocityTrend::InsufficientData;
    }

    let n = speeds.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = statistical::mean(speeds);

    let (num, den) = speeds
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    let slope = num / den;

    let direction = if slope < -STABLE_SLOPE {
        TrendDirection::Declining
    } else if slope < STABLE_SLOPE {
        TrendDirection::Stable
    } else {
        TrendDirection::Increasing
    };

    let first = speeds[0];
    let last = speeds[speeds.len() - 1];
    let velocity_loss_pct = if first > 0.0 {
        (first - last) / first * 100.0
    } else {
        0.0
    };

    VelocityTrend::Measured {
        direction,
        slope,
        velocity_loss_pct,
        mean_velocity: y_mean,
        std_velocity: statistical::population_standard_deviation(speeds, Some(y_mean)),
    }
}

/// `(max - min) / max * 100`; 0 for an empty series or a zero peak.
pub fn fatigue_index(speeds: &[f64]) -> f64 {
    if speeds.is_empty() {
        return 0.0;
    }

    let max = speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = speeds.iter().copied().fold(f64::INFINITY, f64::min);

    if max <= 0.0 {
        return 0.0;
    }
    (max - min) / max * 100.0
}
