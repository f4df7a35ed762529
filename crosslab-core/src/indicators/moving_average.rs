//! Moving-average computer: a price series augmented with one SMA per window.

use super::{Indicator, Sma};
use crate::domain::{PriceBar, PriceSeries};
use crate::error::DataError;
use serde::Serialize;
use std::collections::BTreeMap;

/// A price series plus precomputed moving averages, keyed by window length.
///
/// Every average series has the same length as the price series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentedSeries {
    series: PriceSeries,
    averages: BTreeMap<usize, Vec<Option<f64>>>,
}

/// Borrowed view of one bar and its averages.
#[derive(Debug, Clone, Copy)]
pub struct AugmentedBar<'a> {
    pub index: usize,
    pub bar: &'a PriceBar,
    series: &'a AugmentedSeries,
}

impl<'a> AugmentedBar<'a> {
    /// Average for `window` at this bar; `None` during warm-up or if the window was not computed.
    pub fn average(&self, window: usize) -> Option<f64> {
        self.series.average(window, self.index)
    }
}

impl AugmentedSeries {
    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Window lengths that were computed, ascending.
    pub fn windows(&self) -> impl Iterator<Item = usize> + '_ {
        self.averages.keys().copied()
    }

    pub fn has_window(&self, window: usize) -> bool {
        self.averages.contains_key(&window)
    }

    /// Average for `window` at `index`.
    pub fn average(&self, window: usize, index: usize) -> Option<f64> {
        self.averages
            .get(&window)
            .and_then(|v| v.get(index).copied().flatten())
    }

    /// Full average series for a window.
    pub fn averages(&self, window: usize) -> Option<&[Option<f64>]> {
        self.averages.get(&window).map(|v| v.as_slice())
    }

    pub fn get(&self, index: usize) -> Option<AugmentedBar<'_>> {
        self.series.bars().get(index).map(|bar| AugmentedBar {
            index,
            bar,
            series: self,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = AugmentedBar<'_>> + '_ {
        self.series
            .bars()
            .iter()
            .enumerate()
            .map(move |(index, bar)| AugmentedBar {
                index,
                bar,
                series: self,
            })
    }
}

/// Compute the trailing SMA of `close` for every requested window.
///
/// Fails if the series is empty or any window is zero. Repeated windows are
/// computed once.
pub fn compute_moving_averages(
    series: &PriceSeries,
    windows: &[usize],
) -> Result<AugmentedSeries, DataError> {
    if let Some(&window) = windows.iter().find(|&&w| w == 0) {
        return Err(DataError::NonPositiveWindow { window });
    }
    if series.is_empty() {
        return Err(DataError::EmptySeries);
    }

    let averages = windows
        .iter()
        .map(|&window| (window, Sma::new(window).compute(series)))
        .collect();

    Ok(AugmentedSeries {
        series: series.clone(),
        averages,
    })
}
