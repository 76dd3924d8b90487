//! Velocity & strength calculator
//!
//! Derives [`TrendFeatures`] from a chronologically ordered [`RawSeries`]. The
//! statistics are order-sensitive: velocity compares the later half of the window
//! with the earlier half.
//!
//! Time is measured in sample intervals: the median spacing of the timestamps.
//! Missing samples therefore widen the distance between halves instead of
//! compressing it.

use statrs::statistics::{Data, Median, Statistics};

use crate::trends::error::{TrendError, TrendResult};
use crate::trends::types::{RawSeries, TrendFeatures};

/// Fewest points velocity can be computed from
pub const MIN_POINTS: usize = 2;

/// Index ranges of the earlier and later halves of a series of `n` points
///
/// For four or more points each half holds `n / 2` points (the middle point of an
/// odd series belongs to neither); shorter series compare first and last point.
fn halves(n: usize) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    if n >= 4 {
        let half = n / 2;
        (0..half, n - half..n)
    } else {
        (0..1, n - 1..n)
    }
}

/// Position of every point in sample intervals from the first point
///
/// Falls back to plain indices when the timestamps carry no spacing.
fn positions(series: &RawSeries) -> Vec<f64> {
    let points = series.points();
    let steps: Vec<f64> = points
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds() as f64)
        .filter(|&secs| secs > 0.0)
        .collect();

    if steps.is_empty() {
        return (0..points.len()).map(|i| i as f64).collect();
    }

    let step = Data::new(steps).median();
    let origin = points[0].timestamp;
    points
        .iter()
        .map(|p| (p.timestamp - origin).num_seconds() as f64 / step)
        .collect()
}

/// Compute trend features of a series
///
/// # Errors
///
/// Returns `TrendError::InsufficientData` when the series has fewer than two points.
pub fn compute_features(series: &RawSeries) -> TrendResult<TrendFeatures> {
    let values = series.values();
    let n = values.len();

    if n < MIN_POINTS {
        return Err(TrendError::InsufficientData {
            keyword: series.keyword().to_string(),
            needed: MIN_POINTS,
            got: n,
        });
    }

    let (earlier, later) = halves(n);
    let earlier_mean = values[earlier.clone()].iter().mean();
    let recent_strength = values[later.clone()].iter().mean();

    // Distance between the half centers, in sample intervals
    let offsets = positions(series);
    let elapsed = offsets[later].iter().mean() - offsets[earlier].iter().mean();
    let velocity = (recent_strength - earlier_mean) / elapsed;

    let average_strength = values.iter().mean();
    let volatility = values.iter().population_std_dev();
    let peak_value = values.iter().copied().fold(f64::MIN, f64::max);
    let current_value = values[n - 1];

    Ok(TrendFeatures {
        keyword: series.keyword().to_string(),
        velocity,
        average_strength,
        volatility,
        recent_strength,
        current_value,
        peak_value,
        points: n,
    })
}
