//! Performance metrics: pure functions that compute run statistics.
//!
//! Every metric is a pure function of the snapshot trail and/or event list.
//! No dependencies on the runner or the data layer.

use crosslab_core::domain::{BuySellEvent, PortfolioSnapshot, Side};
use serde::{Deserialize, Serialize};

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub initial_cash: f64,
    pub final_value: f64,
    /// (final - initial) / initial, as a fraction.
    pub total_return: f64,
    /// Largest peak-to-trough decline of total value, as a positive fraction.
    pub max_drawdown: f64,
    pub buy_count: usize,
    pub sell_count: usize,
    /// Fraction of bars spent Long.
    pub exposure: f64,
    pub bar_count: usize,
}

impl PerformanceMetrics {
    pub fn compute(
        initial_cash: f64,
        snapshots: &[PortfolioSnapshot],
        events: &[BuySellEvent],
    ) -> Self {
        let values: Vec<f64> = snapshots.iter().map(|s| s.total_value).collect();
        let final_value = values.last().copied().unwrap_or(initial_cash);
        Self {
            initial_cash,
            final_value,
            total_return: total_return(initial_cash, final_value),
            max_drawdown: max_drawdown(&values),
            buy_count: count_side(events, Side::Buy),
            sell_count: count_side(events, Side::Sell),
            exposure: exposure(snapshots),
            bar_count: snapshots.len(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction. Zero when nothing was invested to begin with.
pub fn total_return(initial: f64, final_value: f64) -> f64 {
    if initial <= 0.0 {
        return 0.0;
    }
    (final_value - initial) / initial
}

/// Maximum drawdown as a positive fraction (0.0 = no drawdown).
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}

/// Fraction of snapshots with a Long position.
pub fn exposure(snapshots: &[PortfolioSnapshot]) -> f64 {
    if snapshots.is_empty() {
        return 0.0;
    }
    let long = snapshots.iter().filter(|s| s.position.is_long()).count();
    long as f64 / snapshots.len() as f64
}

pub fn count_side(events: &[BuySellEvent], side: Side) -> usize {
    events.iter().filter(|e| e.side == side).count()
}
