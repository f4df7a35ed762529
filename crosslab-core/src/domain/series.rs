//! PriceSeries: a chronologically ordered, duplicate-free run of bars.

use super::bar::PriceBar;
use crate::error::DataError;
use serde::Serialize;

/// Bars in strictly ascending date order.
///
/// The ordering is checked on construction and never changed afterwards;
/// the series is read-only once built. Sorting raw provider output is the
/// job of [`crate::data::ingest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Validate date order and uniqueness. An empty vector is accepted.
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, DataError> {
        for pair in bars.windows(2) {
            let (previous, next) = (pair[0].date, pair[1].date);
            if next == previous {
                return Err(DataError::DuplicateDate { date: next });
            }
            if next < previous {
                return Err(DataError::UnsortedDates { previous, next });
            }
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&PriceBar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// Close prices in series order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Sub-series of bars whose date falls within `[start, end]`.
    pub fn between(&self, start: chrono::NaiveDate, end: chrono::NaiveDate) -> PriceSeries {
        Self {
            bars: self
                .bars
                .iter()
                .filter(|b| b.date >= start && b.date <= end)
                .cloned()
                .collect(),
        }
    }

    pub fn into_bars(self) -> Vec<PriceBar> {
        self.bars
    }
}

impl<'a> IntoIterator for &'a PriceSeries {
    type Item = &'a PriceBar;
    type IntoIter = std::slice::Iter<'a, PriceBar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
