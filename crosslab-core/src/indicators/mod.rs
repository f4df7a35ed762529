//! Indicators and the moving-average computer.
//!
//! Indicators are pure functions: price series in, one value per bar out.
//! A bar whose value cannot be formed yet (warm-up) is `None`, never zero.
//! Averages are computed once, up front, and the simulator only reads them.

pub mod moving_average;
pub mod sma;

pub use moving_average::{compute_moving_averages, AugmentedBar, AugmentedSeries};
pub use sma::Sma;

use crate::domain::PriceSeries;

/// Trait for indicators.
///
/// # Look-ahead guard
/// No value at bar t may depend on price data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces a value.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire series. Output length equals input length.
    fn compute(&self, series: &PriceSeries) -> Vec<Option<f64>>;
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
