//! Crossover portfolio simulator.
//!
//! Walks an augmented series once, left to right, threading a
//! [`SimulationState`] through [`SimulationState::step`]. Every bar yields
//! exactly one snapshot. All validation happens before the first bar, and a
//! bad close aborts the whole run: callers never see a partial trajectory.

use crate::domain::{PortfolioSnapshot, PositionState};
use crate::error::{DataError, SimulationError, SimulationWarning};
use crate::indicators::AugmentedSeries;
use serde::{Deserialize, Serialize};

use super::state::{AveragePair, SimulationConfig, SimulationState};

/// Result of a completed simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    /// One snapshot per input bar, in series order.
    pub snapshots: Vec<PortfolioSnapshot>,
    pub warnings: Vec<SimulationWarning>,
}

impl SimulationOutput {
    /// Position at each bar, in series order.
    pub fn positions(&self) -> Vec<PositionState> {
        self.snapshots.iter().map(|s| s.position).collect()
    }

    pub fn final_snapshot(&self) -> Option<&PortfolioSnapshot> {
        self.snapshots.last()
    }
}

/// Run the crossover strategy over `augmented`.
///
/// The augmented series must contain averages for both `config.fast` and
/// `config.slow`.
pub fn simulate(
    augmented: &AugmentedSeries,
    config: &SimulationConfig,
) -> Result<SimulationOutput, SimulationError> {
    config.validate()?;
    if augmented.is_empty() {
        return Err(DataError::EmptySeries.into());
    }
    for window in config.windows() {
        if !augmented.has_window(window) {
            return Err(DataError::MissingWindow { window }.into());
        }
    }

    let bar_count = augmented.len();
    let warnings = config
        .windows()
        .into_iter()
        .filter(|&window| window > bar_count)
        .map(|window| SimulationWarning::InsufficientData {
            window,
            bars: bar_count,
        })
        .collect();

    let mut snapshots = Vec::with_capacity(bar_count);
    augmented.iter().try_fold(
        SimulationState::new(config.initial_cash),
        |state, row| {
            if !row.bar.has_tradable_close() {
                return Err(SimulationError::InvalidPrice {
                    index: row.index,
                    date: row.bar.date,
                    close: row.bar.close,
                });
            }
            let averages =
                AveragePair::from_options(row.average(config.fast), row.average(config.slow));
            let (next, snapshot) = state.step(row.bar, averages);
            snapshots.push(snapshot);
            Ok(next)
        },
    )?;

    Ok(SimulationOutput {
        snapshots,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::make_series;
    use crate::indicators::compute_moving_averages;

    fn augmented(closes: &[f64], windows: &[usize]) -> AugmentedSeries {
        compute_moving_averages(&make_series(closes), windows).unwrap()
    }

    #[test]
    fn one_snapshot_per_bar() {
        let aug = augmented(&[10.0, 11.0, 12.0, 13.0, 12.0, 11.0], &[2, 3]);
        let out = simulate(&aug, &SimulationConfig::new(2, 3, 1000.0)).unwrap();
        assert_eq!(out.snapshots.len(), 6);
        assert_eq!(out.positions().len(), 6);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn rejects_fast_not_below_slow() {
        let aug = augmented(&[10.0, 11.0, 12.0], &[3]);
        let err = simulate(&aug, &SimulationConfig::new(3, 3, 100.0)).unwrap_err();
        assert_eq!(err, SimulationError::Data(DataError::WindowOrder { fast: 3, slow: 3 }));
    }

    #[test]
    fn rejects_missing_window() {
        let aug = augmented(&[10.0, 11.0, 12.0], &[2]);
        let err = simulate(&aug, &SimulationConfig::new(2, 3, 100.0)).unwrap_err();
        assert_eq!(err, SimulationError::Data(DataError::MissingWindow { window: 3 }));
    }

    #[test]
    fn invalid_price_aborts_without_snapshots() {
        let aug = augmented(&[10.0, 11.0, 0.0, 13.0], &[1, 2]);
        let err = simulate(&aug, &SimulationConfig::new(1, 2, 100.0)).unwrap_err();
        match err {
            SimulationError::InvalidPrice { index, close, .. } => {
                assert_eq!(index, 2);
                assert_eq!(close, 0.0);
            }
            other => panic!("expected InvalidPrice, got {other:?}"),
        }
    }

    #[test]
    fn negative_price_in_warm_up_still_fails() {
        let aug = augmented(&[-1.0, 11.0, 12.0], &[5, 10]);
        let err = simulate(&aug, &SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidPrice { index: 0, .. }));
    }

    #[test]
    fn short_series_warns_and_stays_flat() {
        let aug = augmented(&[10.0, 11.0], &[5, 10]);
        let out = simulate(&aug, &SimulationConfig::default()).unwrap();
        assert_eq!(
            out.warnings,
            vec![
                SimulationWarning::InsufficientData { window: 5, bars: 2 },
                SimulationWarning::InsufficientData { window: 10, bars: 2 },
            ]
        );
        assert!(out
            .snapshots
            .iter()
            .all(|s| s.total_value == 10_000.0 && s.position == PositionState::Flat));
    }

    #[test]
    fn no_forced_liquidation_at_end() {
        let aug = augmented(&[10.0, 10.0, 10.0, 12.0, 14.0], &[1, 2]);
        let out = simulate(&aug, &SimulationConfig::new(1, 2, 100.0)).unwrap();
        let last = out.final_snapshot().unwrap();
        assert_eq!(last.position, PositionState::Long);
        assert!(last.shares > 0);
    }
}
