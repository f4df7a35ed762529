//! Ingest pipeline: raw provider rows → validated [`PriceSeries`].
//!
//! Sorts by date and collapses duplicate dates. When a date appears more
//! than once the row seen last wins, the same way a re-download overwrites
//! a cached row. Bars that fail the OHLC sanity check are kept but counted;
//! whether a close is tradable is for the simulator to decide.

use crate::domain::{PriceBar, PriceSeries};
use crate::error::DataError;
use serde::Serialize;

/// Outcome of ingesting one symbol's raw rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub series: PriceSeries,
    pub raw_count: usize,
    pub duplicates_removed: usize,
    /// Bars failing [`PriceBar::is_sane`].
    pub insane_bars: usize,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.duplicates_removed == 0 && self.insane_bars == 0
    }
}

pub fn ingest(mut bars: Vec<PriceBar>) -> Result<IngestReport, DataError> {
    if bars.is_empty() {
        return Err(DataError::EmptySeries);
    }
    let raw_count = bars.len();

    // Stable sort keeps arrival order within a date.
    bars.sort_by_key(|b| b.date);

    let mut deduped: Vec<PriceBar> = Vec::with_capacity(raw_count);
    for bar in bars {
        match deduped.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => deduped.push(bar),
        }
    }

    let duplicates_removed = raw_count - deduped.len();
    let insane_bars = deduped.iter().filter(|b| !b.is_sane()).count();
    if duplicates_removed > 0 || insane_bars > 0 {
        tracing::warn!(duplicates_removed, insane_bars, "ingest found irregular rows");
    }

    Ok(IngestReport {
        series: PriceSeries::new(deduped)?,
        raw_count,
        duplicates_removed,
        insane_bars,
    })
}
